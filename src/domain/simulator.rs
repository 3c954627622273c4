//! Equal-weight portfolio simulation over one test window.
//!
//! The simulator moves INITIAL -> (REBALANCING <-> HOLDING) -> FINAL.
//! Trading happens only in REBALANCING; HOLDING marks to market.

use chrono::NaiveDate;
use tracing::{debug, warn};

use super::diagnostics::{Diagnostic, Diagnostics};
use super::execution::{CostModel, Trade, allocate_equal, liquidate};
use super::portfolio::{Portfolio, ValuePoint};
use super::price_panel::PricePanel;
use super::selector::SelectedUniverse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimulatorState {
    Initial,
    Rebalancing,
    Holding,
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationConfig {
    pub initial_capital: f64,
    /// Trading days between rebalances.
    pub rebalance_cadence: usize,
    pub costs: CostModel,
}

/// Outcome of one simulated window.
#[derive(Debug, Clone, PartialEq)]
pub struct Simulation {
    pub rebalance_dates: Vec<NaiveDate>,
    /// Starting capital, the pre-trade mark at each later rebalance, and the
    /// terminal mark.
    pub value_path: Vec<ValuePoint>,
    /// Mark after every trading day of the window.
    pub daily_values: Vec<ValuePoint>,
    pub trades: Vec<Trade>,
    /// Rebalances that ended with a non-empty allocation target.
    pub num_rebalances: usize,
    /// Mean holding count after each rebalance.
    pub avg_holdings: f64,
    /// Commission plus slippage cost over the trade log.
    pub transaction_costs: f64,
    pub final_value: f64,
    pub state: SimulatorState,
}

impl Simulation {
    pub fn values(&self) -> Vec<f64> {
        self.value_path.iter().map(|p| p.value).collect()
    }
}

/// Every `cadence`-th trading day in `[start, end]`, starting with the first.
///
/// The last trading day of the window is reserved for the terminal mark and
/// never rebalances.
pub fn rebalance_schedule(
    panel: &PricePanel,
    start: NaiveDate,
    end: NaiveDate,
    cadence: usize,
) -> Vec<NaiveDate> {
    let dates = panel.dates_between(start, end);
    let tradable = dates.split_last().map_or(&[][..], |(_, rest)| rest);
    tradable
        .iter()
        .step_by(cadence.max(1))
        .copied()
        .collect()
}

pub struct PortfolioSimulator<'a> {
    panel: &'a PricePanel,
    config: SimulationConfig,
    label: String,
    portfolio: Portfolio,
    state: SimulatorState,
    previous: SelectedUniverse,
    value_path: Vec<ValuePoint>,
    daily_values: Vec<ValuePoint>,
    rebalance_dates: Vec<NaiveDate>,
    trades: Vec<Trade>,
    num_rebalances: usize,
    holdings_after_rebalance: Vec<usize>,
}

impl<'a> PortfolioSimulator<'a> {
    /// `label` names the run in diagnostics, usually the combiner policy.
    pub fn new(panel: &'a PricePanel, config: SimulationConfig, label: &str) -> Self {
        PortfolioSimulator {
            panel,
            config,
            label: label.to_string(),
            portfolio: Portfolio::new(config.initial_capital),
            state: SimulatorState::Initial,
            previous: SelectedUniverse::default(),
            value_path: Vec::new(),
            daily_values: Vec::new(),
            rebalance_dates: Vec::new(),
            trades: Vec::new(),
            num_rebalances: 0,
            holdings_after_rebalance: Vec::new(),
        }
    }

    pub fn state(&self) -> SimulatorState {
        self.state
    }

    pub fn portfolio(&self) -> &Portfolio {
        &self.portfolio
    }

    /// Run over `[start, end]`, asking `select` for the universe at each
    /// rebalance date.
    pub fn run<F>(
        mut self,
        start: NaiveDate,
        end: NaiveDate,
        mut select: F,
        diagnostics: &mut Diagnostics,
    ) -> Simulation
    where
        F: FnMut(NaiveDate) -> SelectedUniverse,
    {
        let panel = self.panel;
        let dates = panel.dates_between(start, end);
        let schedule = rebalance_schedule(panel, start, end, self.config.rebalance_cadence);
        let mut pending = schedule.iter().peekable();

        for &date in dates {
            if pending.next_if(|d| **d == date).is_some() {
                let universe = select(date);
                self.rebalance(date, universe, diagnostics);
            }
            self.mark(date);
        }

        let last = dates.last().copied().unwrap_or(start);
        self.finish(last)
    }

    /// 1. Record the pre-trade mark (the starting capital at the first event).
    /// 2. Liquidate every holding.
    /// 3. An empty `universe` falls back to the previous selection.
    /// 4. Buy the target set with equal cash per ticker.
    pub fn rebalance(
        &mut self,
        date: NaiveDate,
        universe: SelectedUniverse,
        diagnostics: &mut Diagnostics,
    ) {
        let pre_trade = if self.state == SimulatorState::Initial {
            self.config.initial_capital
        } else {
            self.portfolio.market_value(self.panel, date)
        };
        self.value_path.push(ValuePoint {
            date,
            value: pre_trade,
        });
        self.state = SimulatorState::Rebalancing;
        self.rebalance_dates.push(date);

        let costs = self.config.costs;
        let sold = liquidate(&mut self.portfolio, self.panel, date, &costs, diagnostics);
        self.trades.extend(sold);

        let target = if universe.is_empty() {
            warn!(
                method = %self.label,
                %date,
                carried = self.previous.len(),
                "empty universe, keeping previous selection"
            );
            diagnostics.push(Diagnostic::EmptyUniverse {
                method: self.label.clone(),
                date,
                carried: self.previous.len(),
            });
            self.previous.clone()
        } else {
            self.previous = universe.clone();
            universe
        };

        if !target.is_empty() {
            let bought = allocate_equal(
                &mut self.portfolio,
                &target.tickers,
                self.panel,
                date,
                &costs,
                diagnostics,
            );
            self.trades.extend(bought);
            self.num_rebalances += 1;
            self.holdings_after_rebalance
                .push(self.portfolio.holding_count());
        }

        debug!(
            method = %self.label,
            %date,
            holdings = self.portfolio.holding_count(),
            cash = self.portfolio.cash,
            "rebalanced"
        );
        self.state = SimulatorState::Holding;
    }

    pub fn mark(&mut self, date: NaiveDate) {
        let value = self.portfolio.market_value(self.panel, date);
        self.daily_values.push(ValuePoint { date, value });
    }

    pub fn finish(mut self, date: NaiveDate) -> Simulation {
        let final_value = if self.state == SimulatorState::Initial {
            self.config.initial_capital
        } else {
            self.portfolio.market_value(self.panel, date)
        };
        if self.value_path.is_empty() {
            self.value_path.push(ValuePoint {
                date,
                value: self.config.initial_capital,
            });
        }
        self.value_path.push(ValuePoint {
            date,
            value: final_value,
        });
        self.state = SimulatorState::Final;

        let transaction_costs = self.trades.iter().map(Trade::cost).sum();
        let avg_holdings = if self.holdings_after_rebalance.is_empty() {
            0.0
        } else {
            self.holdings_after_rebalance.iter().sum::<usize>() as f64
                / self.holdings_after_rebalance.len() as f64
        };

        Simulation {
            rebalance_dates: self.rebalance_dates,
            value_path: self.value_path,
            daily_values: self.daily_values,
            trades: self.trades,
            num_rebalances: self.num_rebalances,
            avg_holdings,
            transaction_costs,
            final_value,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::Side;
    use crate::domain::observation::PriceObservation;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i)
    }

    fn panel_from(series: &[(&str, Vec<f64>)]) -> PricePanel {
        let mut prices = Vec::new();
        for (ticker, closes) in series {
            for (i, &close) in closes.iter().enumerate() {
                prices.push(PriceObservation {
                    ticker: ticker.to_string(),
                    date: day(i as i64),
                    close,
                });
            }
        }
        PricePanel::from_observations(prices)
    }

    fn universe(tickers: &[&str]) -> SelectedUniverse {
        SelectedUniverse {
            tickers: tickers.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn config(cadence: usize, costs: CostModel) -> SimulationConfig {
        SimulationConfig {
            initial_capital: 10_000.0,
            rebalance_cadence: cadence,
            costs,
        }
    }

    #[test]
    fn schedule_steps_by_cadence() {
        let panel = panel_from(&[("AAA", vec![1.0; 10])]);
        assert_eq!(
            rebalance_schedule(&panel, day(0), day(9), 4),
            vec![day(0), day(4), day(8)]
        );
        assert_eq!(
            rebalance_schedule(&panel, day(2), day(3), 4),
            vec![day(2)]
        );
        assert!(rebalance_schedule(&panel, day(3), day(3), 4).is_empty());
    }

    #[test]
    fn last_trading_day_is_never_rebalanced() {
        let panel = panel_from(&[("AAA", vec![100.0; 11])]);
        assert_eq!(
            rebalance_schedule(&panel, day(0), day(10), 5),
            vec![day(0), day(5)]
        );

        let sim = PortfolioSimulator::new(&panel, config(5, CostModel::default()), "test");
        let mut diags = Diagnostics::new();
        let result = sim.run(day(0), day(10), |_| universe(&["AAA"]), &mut diags);

        assert_eq!(result.rebalance_dates, vec![day(0), day(5)]);
        assert_eq!(result.num_rebalances, 2);
        let dates: Vec<NaiveDate> = result.value_path.iter().map(|p| p.date).collect();
        assert_eq!(dates, vec![day(0), day(5), day(10)]);
        assert!(dates.windows(2).all(|w| w[0] < w[1]));
        // no closing trades on the final day
        assert!(result.trades.iter().all(|t| t.date < day(10)));
    }

    #[test]
    fn flat_prices_without_costs_keep_value() {
        let panel = panel_from(&[("AAA", vec![100.0; 20]), ("BBB", vec![100.0; 20])]);
        let sim = PortfolioSimulator::new(&panel, config(5, CostModel::free()), "test");
        let mut diags = Diagnostics::new();

        let result = sim.run(day(0), day(19), |_| universe(&["AAA", "BBB"]), &mut diags);

        assert_eq!(result.state, SimulatorState::Final);
        assert_eq!(result.num_rebalances, 4);
        assert_eq!(result.rebalance_dates, vec![day(0), day(5), day(10), day(15)]);
        assert_eq!(result.value_path.len(), 5);
        assert!(result.values().iter().all(|v| (v - 10_000.0).abs() < 1e-9));
        assert!((result.avg_holdings - 2.0).abs() < f64::EPSILON);
        assert_eq!(result.transaction_costs, 0.0);
        assert_eq!(result.daily_values.len(), 20);
        assert!(diags.is_empty());
    }

    #[test]
    fn growth_is_marked_to_market() {
        let closes: Vec<f64> = (0..10).map(|i| 100.0 + 10.0 * i as f64).collect();
        let panel = panel_from(&[("AAA", closes)]);
        let sim = PortfolioSimulator::new(&panel, config(100, CostModel::free()), "test");
        let mut diags = Diagnostics::new();

        let result = sim.run(day(0), day(9), |_| universe(&["AAA"]), &mut diags);

        // 100 shares bought at 100, worth 190 each at the end
        assert_eq!(result.num_rebalances, 1);
        assert!((result.final_value - 19_000.0).abs() < 1e-9);
        assert_eq!(result.values(), vec![10_000.0, 19_000.0]);
    }

    #[test]
    fn empty_universe_carries_previous_selection() {
        let panel = panel_from(&[("AAA", vec![100.0; 10]), ("BBB", vec![50.0; 10])]);
        let sim = PortfolioSimulator::new(&panel, config(5, CostModel::free()), "rank_based");
        let mut diags = Diagnostics::new();

        let result = sim.run(
            day(0),
            day(9),
            |d| {
                if d == day(0) {
                    universe(&["BBB"])
                } else {
                    SelectedUniverse::default()
                }
            },
            &mut diags,
        );

        assert_eq!(result.num_rebalances, 2);
        assert_eq!(diags.empty_universes(), 1);
        let buys: Vec<&Trade> = result.trades.iter().filter(|t| t.side == Side::Buy).collect();
        assert_eq!(buys.len(), 2);
        assert!(buys.iter().all(|t| t.ticker == "BBB"));
    }

    #[test]
    fn empty_first_universe_stays_in_cash() {
        let panel = panel_from(&[("AAA", vec![100.0; 5])]);
        let sim = PortfolioSimulator::new(&panel, config(2, CostModel::free()), "test");
        let mut diags = Diagnostics::new();

        let result = sim.run(day(0), day(4), |_| SelectedUniverse::default(), &mut diags);

        assert_eq!(result.num_rebalances, 0);
        assert!(result.trades.is_empty());
        assert!((result.final_value - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(result.avg_holdings, 0.0);
        assert_eq!(diags.empty_universes(), 2);
    }

    #[test]
    fn costs_reduce_value_on_flat_prices() {
        let panel = panel_from(&[("AAA", vec![100.0; 10])]);
        let costs = CostModel {
            commission_rate: 0.001,
            slippage_rate: 0.001,
        };
        let sim = PortfolioSimulator::new(&panel, config(5, costs), "test");
        let mut diags = Diagnostics::new();

        let result = sim.run(day(0), day(9), |_| universe(&["AAA"]), &mut diags);

        assert!(result.final_value < 10_000.0);
        assert!(result.transaction_costs > 0.0);
        // flat prices: every unit lost is a booked cost
        let lost = 10_000.0 - result.final_value;
        assert!((result.transaction_costs - lost).abs() < 1e-6);
    }

    #[test]
    fn window_without_trading_days() {
        let panel = panel_from(&[("AAA", vec![100.0; 3])]);
        let sim = PortfolioSimulator::new(&panel, config(5, CostModel::free()), "test");
        let mut diags = Diagnostics::new();

        let result = sim.run(day(30), day(40), |_| universe(&["AAA"]), &mut diags);

        assert_eq!(result.state, SimulatorState::Final);
        assert_eq!(result.num_rebalances, 0);
        assert_eq!(result.values(), vec![10_000.0, 10_000.0]);
    }
}
