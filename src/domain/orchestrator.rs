//! Walk-forward protocol: estimate on each train window, trade the following
//! test window, then compare combiner policies across all periods.

use crate::domain::cache::CachedSignalStore;
use crate::domain::combiner::{Combiner, CombinerPolicy, FitContext};
use crate::domain::diagnostics::Diagnostics;
use crate::domain::engine_config::EngineConfig;
use crate::domain::error::FactorwalkError;
use crate::domain::ic::{self, IcSummary, IcWindow};
use crate::domain::observation::{FactorObservation, ScoreTable};
use crate::domain::performance::PerformanceSummary;
use crate::domain::price_panel::PricePanel;
use crate::domain::selector::{SelectedUniverse, select_top};
use crate::domain::simulator::{PortfolioSimulator, Simulation};
use crate::domain::stats;
use crate::domain::walk_forward::{WalkForwardPeriod, require_periods};
use crate::ports::signal_store::SignalStore;
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// One (period, policy) outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct BacktestResult {
    pub period_index: usize,
    pub method_name: String,
    pub total_return: f64,
    pub sharpe_ratio: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub win_rate: f64,
    pub num_rebalances: usize,
    pub avg_holdings: f64,
    pub transaction_costs: f64,
}

impl BacktestResult {
    fn from_simulation(
        period_index: usize,
        policy: CombinerPolicy,
        simulation: &Simulation,
        performance: &PerformanceSummary,
    ) -> Self {
        BacktestResult {
            period_index,
            method_name: policy.name().to_string(),
            total_return: performance.total_return,
            sharpe_ratio: performance.sharpe_ratio,
            max_drawdown: performance.max_drawdown,
            win_rate: performance.win_rate,
            num_rebalances: simulation.num_rebalances,
            avg_holdings: simulation.avg_holdings,
            transaction_costs: simulation.transaction_costs,
        }
    }
}

/// Training-window IC statistics of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodTraining {
    pub period_index: usize,
    pub summaries: Vec<IcSummary>,
}

/// Cross-period comparison of one policy.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSummary {
    pub method: String,
    pub periods: usize,
    pub mean_total_return: f64,
    /// Mean over the periods where the ratio is defined.
    pub mean_sharpe: Option<f64>,
    pub mean_max_drawdown: Option<f64>,
    pub mean_win_rate: f64,
    /// `(period_index, total_return)` of the best period.
    pub best_period: (usize, f64),
    pub worst_period: (usize, f64),
    pub total_transaction_costs: f64,
}

impl MethodSummary {
    /// Group `results` by method, best mean total return first.
    pub fn aggregate(results: &[BacktestResult]) -> Vec<MethodSummary> {
        let mut by_method: BTreeMap<&str, Vec<&BacktestResult>> = BTreeMap::new();
        for r in results {
            by_method.entry(r.method_name.as_str()).or_default().push(r);
        }

        let mut summaries: Vec<MethodSummary> = by_method
            .into_iter()
            .filter_map(|(method, rows)| summarize_method(method, &rows))
            .collect();
        summaries.sort_by(|a, b| {
            b.mean_total_return
                .total_cmp(&a.mean_total_return)
                .then_with(|| a.method.cmp(&b.method))
        });
        summaries
    }
}

fn summarize_method(method: &str, rows: &[&BacktestResult]) -> Option<MethodSummary> {
    let returns: Vec<f64> = rows.iter().map(|r| r.total_return).collect();
    let sharpes: Vec<f64> = rows.iter().filter_map(|r| r.sharpe_ratio).collect();
    let drawdowns: Vec<f64> = rows.iter().filter_map(|r| r.max_drawdown).collect();
    let win_rates: Vec<f64> = rows.iter().map(|r| r.win_rate).collect();

    let best = rows
        .iter()
        .max_by(|a, b| a.total_return.total_cmp(&b.total_return))?;
    let worst = rows
        .iter()
        .min_by(|a, b| a.total_return.total_cmp(&b.total_return))?;

    Some(MethodSummary {
        method: method.to_string(),
        periods: rows.len(),
        mean_total_return: stats::mean(&returns)?,
        mean_sharpe: stats::mean(&sharpes),
        mean_max_drawdown: stats::mean(&drawdowns),
        mean_win_rate: stats::mean(&win_rates).unwrap_or(0.0),
        best_period: (best.period_index, best.total_return),
        worst_period: (worst.period_index, worst.total_return),
        total_transaction_costs: rows.iter().map(|r| r.transaction_costs).sum(),
    })
}

#[derive(Debug, Clone)]
pub struct WalkForwardReport {
    pub periods: Vec<WalkForwardPeriod>,
    /// One per (period, policy), period-major in configured policy order.
    pub results: Vec<BacktestResult>,
    /// IC summary of every factor over the whole configured range.
    pub factor_summaries: Vec<IcSummary>,
    pub training: Vec<PeriodTraining>,
    pub method_summaries: Vec<MethodSummary>,
    pub diagnostics: Diagnostics,
}

pub struct WalkForwardOrchestrator<S> {
    store: CachedSignalStore<S>,
    config: EngineConfig,
}

impl<S: SignalStore> WalkForwardOrchestrator<S> {
    /// Validates `config`; an invalid configuration never reaches the store.
    pub fn new(store: S, config: EngineConfig) -> Result<Self, FactorwalkError> {
        config.validate()?;
        Ok(WalkForwardOrchestrator {
            store: CachedSignalStore::new(store),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &CachedSignalStore<S> {
        &self.store
    }

    pub fn periods(&self) -> Result<Vec<WalkForwardPeriod>, FactorwalkError> {
        require_periods(
            self.config.start_date,
            self.config.end_date,
            self.config.train_window,
            self.config.test_window,
        )
    }

    /// Run every period and policy.
    ///
    /// Zero periods is an error raised before any data is read.
    pub fn run(&self) -> Result<WalkForwardReport, FactorwalkError> {
        let periods = self.periods()?;
        info!(
            periods = periods.len(),
            policies = self.config.policies.len(),
            factors = self.config.factors.len(),
            "starting walk-forward run"
        );

        let mut diagnostics = Diagnostics::new();
        let mut results = Vec::with_capacity(periods.len() * self.config.policies.len());
        let mut training = Vec::with_capacity(periods.len());
        let data = self.load_range()?;

        for period in &periods {
            info!(period = %period, "walk-forward period");
            let (summaries, period_results) = self.run_period(period, &data, &mut diagnostics);
            training.push(PeriodTraining {
                period_index: period.index,
                summaries,
            });
            results.extend(period_results);
        }

        let factor_summaries = self.factor_summaries(&mut diagnostics)?;
        let method_summaries = MethodSummary::aggregate(&results);
        for m in &method_summaries {
            info!(
                method = %m.method,
                mean_total_return = m.mean_total_return,
                periods = m.periods,
                "policy summary"
            );
        }
        info!(
            results = results.len(),
            diagnostics = diagnostics.len(),
            cache_hits = self.store.hits(),
            "walk-forward run complete"
        );

        Ok(WalkForwardReport {
            periods,
            results,
            factor_summaries,
            training,
            method_summaries,
            diagnostics,
        })
    }

    /// IC summaries of every configured factor over the whole range.
    ///
    /// Reads the same store keys as [`Self::run`], so after a run both reads
    /// are answered by the cache.
    pub fn factor_summaries(
        &self,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<IcSummary>, FactorwalkError> {
        let series = ic::analyze_factors(
            &self.store,
            &self.config.factors,
            &self.config.region,
            IcWindow::causal(self.config.start_date, self.config.end_date),
            &self.config.ic_params(),
            diagnostics,
        )?;
        Ok(series.into_iter().map(|s| s.summary).collect())
    }

    /// Factor scores and prices over the whole configured range, read once
    /// per run under the keys [`Self::factor_summaries`] also uses.
    fn load_range(&self) -> Result<RangeData, FactorwalkError> {
        let config = &self.config;
        let observations = self.store.get_factor_scores(
            &config.factors,
            &config.region,
            config.start_date,
            config.end_date,
        )?;
        let tickers: BTreeSet<String> = observations.iter().map(|o| o.ticker.clone()).collect();
        let prices =
            self.store
                .get_prices(&tickers, &config.region, config.start_date, config.end_date)?;
        debug!(
            scores = observations.len(),
            prices = prices.len(),
            tickers = tickers.len(),
            "range loaded"
        );
        Ok(RangeData {
            tables: tables_by_date(&observations),
            panel: PricePanel::from_observations(prices),
            observations,
        })
    }

    /// 1. IC statistics over the train window, with forward returns capped at
    ///    `train_end`.
    /// 2. Per policy: fit on those statistics, then simulate the test window
    ///    using the latest cross-section at each rebalance.
    fn run_period(
        &self,
        period: &WalkForwardPeriod,
        data: &RangeData,
        diagnostics: &mut Diagnostics,
    ) -> (Vec<IcSummary>, Vec<BacktestResult>) {
        let config = &self.config;
        let params = config.ic_params();
        let window = IcWindow::causal(period.train_start, period.train_end);

        let summaries: Vec<IcSummary> = config
            .factors
            .iter()
            .map(|f| {
                ic::ic_series(f, &data.observations, &data.panel, window, &params, diagnostics)
                    .summary
            })
            .collect();
        let tables = &data.tables;
        let panel = &data.panel;

        let context = FitContext {
            period_index: period.index,
            sign_aware: config.sign_aware_weights,
        };

        let mut results = Vec::with_capacity(config.policies.len());
        for &policy in &config.policies {
            let combiner = Combiner::fit(policy, &config.factors, &summaries, context, diagnostics);
            let simulation = simulate_policy(
                &combiner,
                tables,
                panel,
                period,
                config,
                diagnostics,
            );
            let performance =
                PerformanceSummary::compute(&simulation.values(), config.periods_per_year());
            let result =
                BacktestResult::from_simulation(period.index, policy, &simulation, &performance);
            info!(
                period = period.index,
                method = policy.name(),
                total_return = result.total_return,
                rebalances = result.num_rebalances,
                "period simulated"
            );
            results.push(result);
        }

        (summaries, results)
    }
}

/// Store reads shared by every period of a run.
struct RangeData {
    observations: Vec<FactorObservation>,
    tables: BTreeMap<NaiveDate, ScoreTable>,
    panel: PricePanel,
}

fn tables_by_date(observations: &[FactorObservation]) -> BTreeMap<NaiveDate, ScoreTable> {
    let mut tables: BTreeMap<NaiveDate, ScoreTable> = BTreeMap::new();
    for obs in observations.iter().filter(|o| o.score.is_finite()) {
        tables
            .entry(obs.date)
            .or_insert_with(|| ScoreTable::new(obs.date))
            .insert(&obs.ticker, &obs.factor_name, obs.score);
    }
    tables
}

/// Latest cross-section dated in `[floor, date]`.
fn latest_table(
    tables: &BTreeMap<NaiveDate, ScoreTable>,
    floor: NaiveDate,
    date: NaiveDate,
) -> Option<&ScoreTable> {
    if floor > date {
        return None;
    }
    tables.range(floor..=date).next_back().map(|(_, t)| t)
}

fn simulate_policy(
    combiner: &Combiner,
    tables: &BTreeMap<NaiveDate, ScoreTable>,
    panel: &PricePanel,
    period: &WalkForwardPeriod,
    config: &EngineConfig,
    diagnostics: &mut Diagnostics,
) -> Simulation {
    let simulator = PortfolioSimulator::new(panel, config.simulation_config(), combiner.name());
    simulator.run(
        period.test_start,
        period.test_end,
        |date| match latest_table(tables, period.train_start, date) {
            Some(table) => {
                let composite = combiner.combine(table);
                let universe = select_top(&composite, config.top_fraction);
                debug!(
                    method = combiner.name(),
                    %date,
                    scored = composite.len(),
                    selected = universe.len(),
                    "universe selected"
                );
                universe
            }
            None => SelectedUniverse::default(),
        },
        diagnostics,
    )
}
