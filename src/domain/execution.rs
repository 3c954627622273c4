//! Fill simulation with slippage and commission.
//!
//! Rates are fractions (0.001 = 10 bps). Buys fill above the close, sells
//! below it; commission is charged on the filled notional of both legs.

use chrono::NaiveDate;
use std::fmt;

use super::diagnostics::{Diagnostic, Diagnostics};
use super::portfolio::Portfolio;
use super::price_panel::PricePanel;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub commission_rate: f64,
    pub slippage_rate: f64,
}

impl CostModel {
    pub fn free() -> Self {
        CostModel {
            commission_rate: 0.0,
            slippage_rate: 0.0,
        }
    }

    pub fn buy_price(&self, close: f64) -> f64 {
        close * (1.0 + self.slippage_rate)
    }

    pub fn sell_price(&self, close: f64) -> f64 {
        close * (1.0 - self.slippage_rate)
    }

    pub fn commission(&self, notional: f64) -> f64 {
        notional * self.commission_rate
    }

    /// Whole shares affordable with `budget` at `close`, commission included.
    pub fn affordable_shares(&self, budget: f64, close: f64) -> u64 {
        let all_in = self.buy_price(close) * (1.0 + self.commission_rate);
        if all_in <= 0.0 || budget <= 0.0 {
            return 0;
        }
        (budget / all_in).floor() as u64
    }
}

impl Default for CostModel {
    fn default() -> Self {
        CostModel {
            commission_rate: 0.00015,
            slippage_rate: 0.001,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => f.write_str("BUY"),
            Side::Sell => f.write_str("SELL"),
        }
    }
}

/// One fill in the trade log.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub date: NaiveDate,
    pub ticker: String,
    pub side: Side,
    pub shares: u64,
    /// Execution price after slippage.
    pub price: f64,
    pub commission: f64,
    /// `shares * |price - close|`.
    pub slippage_cost: f64,
}

impl Trade {
    pub fn cost(&self) -> f64 {
        self.commission + self.slippage_cost
    }
}

/// Sell every holding.
///
/// Each holding fills at its close on `date`, or the last earlier close when
/// the ticker did not trade that day. A holding that was never priced stays
/// in place and is reported as a data gap.
pub fn liquidate(
    portfolio: &mut Portfolio,
    panel: &PricePanel,
    date: NaiveDate,
    costs: &CostModel,
    diagnostics: &mut Diagnostics,
) -> Vec<Trade> {
    let tickers: Vec<String> = portfolio.holdings.keys().cloned().collect();
    let mut trades = Vec::with_capacity(tickers.len());

    for ticker in tickers {
        let close = match panel.close(&ticker, date) {
            Some(c) => c,
            None => match panel.last_close(&ticker, date) {
                Some(c) => {
                    debug!(ticker = %ticker, %date, "no close on rebalance date, selling at last close");
                    c
                }
                None => {
                    diagnostics.push(Diagnostic::DataGap {
                        ticker: ticker.clone(),
                        date,
                        detail: "no price to liquidate at".to_string(),
                    });
                    continue;
                }
            },
        };

        let Some(holding) = portfolio.remove_holding(&ticker) else {
            continue;
        };
        if holding.shares == 0 {
            continue;
        }

        let price = costs.sell_price(close);
        let notional = holding.shares as f64 * price;
        let commission = costs.commission(notional);
        portfolio.cash += notional - commission;

        trades.push(Trade {
            date,
            ticker,
            side: Side::Sell,
            shares: holding.shares,
            price,
            commission,
            slippage_cost: holding.shares as f64 * (close - price).abs(),
        });
    }

    trades
}

/// Split the available cash equally over the `tickers` priced on `date` and
/// buy whole shares. Unpriced tickers are skipped with a data gap; leftover
/// cash stays uninvested.
pub fn allocate_equal(
    portfolio: &mut Portfolio,
    tickers: &[String],
    panel: &PricePanel,
    date: NaiveDate,
    costs: &CostModel,
    diagnostics: &mut Diagnostics,
) -> Vec<Trade> {
    let mut priced = Vec::with_capacity(tickers.len());
    for ticker in tickers {
        match panel.close(ticker, date) {
            Some(close) => priced.push((ticker, close)),
            None => {
                debug!(ticker = %ticker, %date, "selected ticker has no close, skipped");
                diagnostics.push(Diagnostic::DataGap {
                    ticker: ticker.clone(),
                    date,
                    detail: "no close on rebalance date".to_string(),
                });
            }
        }
    }
    if priced.is_empty() || portfolio.cash <= 0.0 {
        return Vec::new();
    }

    let budget = portfolio.cash / priced.len() as f64;
    let mut trades = Vec::with_capacity(priced.len());

    for (ticker, close) in priced {
        let price = costs.buy_price(close);
        let mut shares = costs.affordable_shares(budget, close);
        // guard against rounding pushing the last fill past the cash balance
        while shares > 0 {
            let notional = shares as f64 * price;
            if notional + costs.commission(notional) <= portfolio.cash {
                break;
            }
            shares -= 1;
        }
        if shares == 0 {
            debug!(ticker = %ticker, %date, budget, "allocation below one share");
            continue;
        }

        let notional = shares as f64 * price;
        let commission = costs.commission(notional);
        portfolio.cash -= notional + commission;
        portfolio.add_shares(ticker, shares);

        trades.push(Trade {
            date,
            ticker: ticker.clone(),
            side: Side::Buy,
            shares,
            price,
            commission,
            slippage_cost: shares as f64 * (price - close).abs(),
        });
    }

    trades
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::observation::PriceObservation;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap()
    }

    fn flat_panel(tickers: &[&str], close: f64) -> PricePanel {
        PricePanel::from_observations(
            tickers
                .iter()
                .map(|t| PriceObservation {
                    ticker: t.to_string(),
                    date: date(),
                    close,
                })
                .collect(),
        )
    }

    fn make_costs() -> CostModel {
        CostModel {
            commission_rate: 0.001,
            slippage_rate: 0.0005,
        }
    }

    #[test]
    fn slippage_moves_against_the_trader() {
        let costs = make_costs();
        assert!((costs.buy_price(100.0) - 100.05).abs() < 1e-12);
        assert!((costs.sell_price(100.0) - 99.95).abs() < 1e-12);
        assert!((costs.commission(10_000.0) - 10.0).abs() < 1e-12);
    }

    #[test]
    fn affordable_shares_includes_commission() {
        let costs = make_costs();
        let shares = costs.affordable_shares(10_000.0, 100.0);
        let expected = (10_000.0_f64 / (100.05 * 1.001)).floor() as u64;
        assert_eq!(shares, expected);
        assert_eq!(CostModel::free().affordable_shares(1_000.0, 100.0), 10);
        assert_eq!(CostModel::free().affordable_shares(99.0, 100.0), 0);
    }

    #[test]
    fn allocate_splits_cash_equally() {
        let mut portfolio = Portfolio::new(10_000.0);
        let panel = flat_panel(&["AAA", "BBB"], 100.0);
        let mut diags = Diagnostics::new();
        let tickers = vec!["AAA".to_string(), "BBB".to_string()];

        let trades = allocate_equal(
            &mut portfolio,
            &tickers,
            &panel,
            date(),
            &CostModel::free(),
            &mut diags,
        );

        assert_eq!(trades.len(), 2);
        assert_eq!(portfolio.get_holding("AAA").unwrap().shares, 50);
        assert_eq!(portfolio.get_holding("BBB").unwrap().shares, 50);
        assert!(portfolio.cash.abs() < f64::EPSILON);
        assert!(diags.is_empty());
    }

    #[test]
    fn allocate_skips_unpriced_ticker() {
        let mut portfolio = Portfolio::new(10_000.0);
        let panel = flat_panel(&["AAA"], 100.0);
        let mut diags = Diagnostics::new();
        let tickers = vec!["AAA".to_string(), "ZZZ".to_string()];

        let trades = allocate_equal(
            &mut portfolio,
            &tickers,
            &panel,
            date(),
            &CostModel::free(),
            &mut diags,
        );

        assert_eq!(trades.len(), 1);
        assert_eq!(portfolio.get_holding("AAA").unwrap().shares, 100);
        assert_eq!(diags.data_gaps(), 1);
    }

    #[test]
    fn buy_records_costs() {
        let mut portfolio = Portfolio::new(100_000.0);
        let panel = flat_panel(&["AAA"], 100.0);
        let mut diags = Diagnostics::new();
        let costs = make_costs();

        let trades = allocate_equal(
            &mut portfolio,
            &["AAA".to_string()],
            &panel,
            date(),
            &costs,
            &mut diags,
        );
        let trade = &trades[0];
        assert_eq!(trade.side, Side::Buy);
        let notional = trade.shares as f64 * 100.05;
        assert!((trade.commission - notional * 0.001).abs() < 1e-9);
        assert!((trade.slippage_cost - trade.shares as f64 * 0.05).abs() < 1e-9);
        assert!((portfolio.cash - (100_000.0 - notional - trade.commission)).abs() < 1e-6);
        assert!(portfolio.cash >= 0.0);
    }

    #[test]
    fn liquidate_sells_everything() {
        let mut portfolio = Portfolio::new(0.0);
        portfolio.add_shares("AAA", 100);
        let panel = flat_panel(&["AAA"], 100.0);
        let mut diags = Diagnostics::new();
        let costs = make_costs();

        let trades = liquidate(&mut portfolio, &panel, date(), &costs, &mut diags);

        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].side, Side::Sell);
        assert!((trades[0].price - 99.95).abs() < 1e-12);
        let proceeds = 100.0 * 99.95;
        assert!((portfolio.cash - (proceeds - proceeds * 0.001)).abs() < 1e-9);
        assert!(portfolio.is_flat());
    }

    #[test]
    fn liquidate_uses_last_close_when_missing() {
        let mut portfolio = Portfolio::new(0.0);
        portfolio.add_shares("AAA", 10);
        let panel = flat_panel(&["AAA"], 20.0);
        let mut diags = Diagnostics::new();
        let later = date() + chrono::Duration::days(3);

        liquidate(&mut portfolio, &panel, later, &CostModel::free(), &mut diags);

        assert!((portfolio.cash - 200.0).abs() < f64::EPSILON);
        assert!(diags.is_empty());
    }

    #[test]
    fn liquidate_keeps_unpriced_holding() {
        let mut portfolio = Portfolio::new(0.0);
        portfolio.add_shares("ZZZ", 10);
        let panel = flat_panel(&["AAA"], 20.0);
        let mut diags = Diagnostics::new();

        let trades = liquidate(&mut portfolio, &panel, date(), &CostModel::free(), &mut diags);

        assert!(trades.is_empty());
        assert_eq!(portfolio.holding_count(), 1);
        assert_eq!(diags.data_gaps(), 1);
    }
}
