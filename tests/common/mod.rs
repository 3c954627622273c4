#![allow(dead_code)]

use chrono::{Duration, NaiveDate};
use factorwalk::domain::error::FactorwalkError;
use factorwalk::domain::observation::{FactorObservation, PriceObservation};
use factorwalk::ports::signal_store::SignalStore;
use std::cell::Cell;
use std::collections::BTreeSet;

/// In-memory store holding one region's observations.
pub struct MockSignalStore {
    pub scores: Vec<FactorObservation>,
    pub prices: Vec<PriceObservation>,
    pub error: Option<String>,
    pub calls: Cell<usize>,
}

impl MockSignalStore {
    pub fn new() -> Self {
        Self {
            scores: Vec::new(),
            prices: Vec::new(),
            error: None,
            calls: Cell::new(0),
        }
    }

    pub fn with_factor_scores(mut self, scores: Vec<FactorObservation>) -> Self {
        self.scores.extend(scores);
        self
    }

    pub fn with_prices(mut self, prices: Vec<PriceObservation>) -> Self {
        self.prices.extend(prices);
        self
    }

    pub fn with_error(mut self, reason: &str) -> Self {
        self.error = Some(reason.to_string());
        self
    }

    fn check(&self) -> Result<(), FactorwalkError> {
        self.calls.set(self.calls.get() + 1);
        match &self.error {
            Some(reason) => Err(FactorwalkError::Store {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl SignalStore for MockSignalStore {
    fn get_factor_scores(
        &self,
        factor_names: &BTreeSet<String>,
        _region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<FactorObservation>, FactorwalkError> {
        self.check()?;
        Ok(self
            .scores
            .iter()
            .filter(|o| {
                factor_names.contains(&o.factor_name) && o.date >= start_date && o.date <= end_date
            })
            .cloned()
            .collect())
    }

    fn get_prices(
        &self,
        tickers: &BTreeSet<String>,
        _region: &str,
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> Result<Vec<PriceObservation>, FactorwalkError> {
        self.check()?;
        Ok(self
            .prices
            .iter()
            .filter(|p| tickers.contains(&p.ticker) && p.date >= start_date && p.date <= end_date)
            .cloned()
            .collect())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn ticker(i: usize) -> String {
    format!("T{i:02}")
}

pub fn score(ticker: &str, date: NaiveDate, factor: &str, value: f64) -> FactorObservation {
    FactorObservation {
        ticker: ticker.to_string(),
        date,
        factor_name: factor.to_string(),
        score: value,
        percentile: 50.0,
    }
}

pub fn price(ticker: &str, date: NaiveDate, close: f64) -> PriceObservation {
    PriceObservation {
        ticker: ticker.to_string(),
        date,
        close,
    }
}

/// `days` consecutive calendar days of the same close.
pub fn flat_prices(ticker: &str, start: NaiveDate, days: i64, close: f64) -> Vec<PriceObservation> {
    (0..days)
        .map(|k| price(ticker, start + Duration::days(k), close))
        .collect()
}

/// `days` daily closes compounding at `daily_rate` from 100.0.
pub fn growing_prices(
    ticker: &str,
    start: NaiveDate,
    days: i64,
    daily_rate: f64,
) -> Vec<PriceObservation> {
    (0..days)
        .map(|k| {
            price(
                ticker,
                start + Duration::days(k),
                100.0 * (1.0 + daily_rate).powi(k as i32),
            )
        })
        .collect()
}

/// The same score for `ticker` on each of `days` consecutive days.
pub fn daily_scores(
    ticker: &str,
    factor: &str,
    start: NaiveDate,
    days: i64,
    value: f64,
) -> Vec<FactorObservation> {
    (0..days)
        .map(|k| score(ticker, start + Duration::days(k), factor, value))
        .collect()
}
