//! Immutable records read from the signal store.

use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

/// One factor value for one ticker on one date.
///
/// Keyed by `(ticker, date, factor_name)`.
#[derive(Debug, Clone, PartialEq)]
pub struct FactorObservation {
    pub ticker: String,
    pub date: NaiveDate,
    pub factor_name: String,
    pub score: f64,
    /// Cross-sectional percentile, 0-100.
    pub percentile: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PriceObservation {
    pub ticker: String,
    pub date: NaiveDate,
    pub close: f64,
}

/// Per-ticker, per-factor scores at a single date.
///
/// Tickers missing a factor simply have no entry for it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScoreTable {
    pub date: Option<NaiveDate>,
    rows: BTreeMap<String, BTreeMap<String, f64>>,
}

impl ScoreTable {
    pub fn new(date: NaiveDate) -> Self {
        ScoreTable {
            date: Some(date),
            rows: BTreeMap::new(),
        }
    }

    /// Build the table for `date` from any observations, ignoring other dates and
    /// non-finite scores.
    pub fn from_observations<'a, I>(date: NaiveDate, observations: I) -> Self
    where
        I: IntoIterator<Item = &'a FactorObservation>,
    {
        let mut table = ScoreTable::new(date);
        for obs in observations {
            if obs.date == date && obs.score.is_finite() {
                table.insert(&obs.ticker, &obs.factor_name, obs.score);
            }
        }
        table
    }

    pub fn insert(&mut self, ticker: &str, factor: &str, score: f64) {
        self.rows
            .entry(ticker.to_string())
            .or_default()
            .insert(factor.to_string(), score);
    }

    pub fn get(&self, ticker: &str, factor: &str) -> Option<f64> {
        self.rows.get(ticker).and_then(|r| r.get(factor)).copied()
    }

    /// Tickers in ascending order.
    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    pub fn factors(&self) -> BTreeSet<&str> {
        self.rows
            .values()
            .flat_map(|r| r.keys().map(String::as_str))
            .collect()
    }

    /// Scores available for one ticker, keyed by factor name.
    pub fn row(&self, ticker: &str) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(ticker)
    }

    /// `(ticker, score)` pairs for one factor, ticker ascending.
    pub fn column(&self, factor: &str) -> Vec<(&str, f64)> {
        self.rows
            .iter()
            .filter_map(|(ticker, r)| r.get(factor).map(|&s| (ticker.as_str(), s)))
            .collect()
    }

    pub fn ticker_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
