//! Portfolio state and value tracking.

use crate::domain::price_panel::PricePanel;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Whole-share long position.
#[derive(Debug, Clone, PartialEq)]
pub struct Holding {
    pub ticker: String,
    pub shares: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValuePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub cash: f64,
    pub initial_capital: f64,
    pub holdings: BTreeMap<String, Holding>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            cash: initial_capital,
            initial_capital,
            holdings: BTreeMap::new(),
        }
    }

    pub fn add_shares(&mut self, ticker: &str, shares: u64) {
        self.holdings
            .entry(ticker.to_string())
            .or_insert_with(|| Holding {
                ticker: ticker.to_string(),
                shares: 0,
            })
            .shares += shares;
    }

    pub fn get_holding(&self, ticker: &str) -> Option<&Holding> {
        self.holdings.get(ticker)
    }

    pub fn remove_holding(&mut self, ticker: &str) -> Option<Holding> {
        self.holdings.remove(ticker)
    }

    pub fn holding_count(&self) -> usize {
        self.holdings.len()
    }

    pub fn is_flat(&self) -> bool {
        self.holdings.is_empty()
    }

    /// Cash plus every holding at its last close on or before `date`.
    /// A holding with no close yet contributes nothing.
    pub fn market_value(&self, panel: &PricePanel, date: NaiveDate) -> f64 {
        let holdings_value: f64 = self
            .holdings
            .values()
            .filter_map(|h| {
                panel
                    .last_close(&h.ticker, date)
                    .map(|price| h.shares as f64 * price)
            })
            .sum();
        self.cash + holdings_value
    }
}
