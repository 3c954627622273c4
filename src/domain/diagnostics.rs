//! Recoverable data conditions recorded during a run.

use chrono::NaiveDate;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum Diagnostic {
    /// A ticker was dropped because a required price or factor point was absent.
    DataGap {
        ticker: String,
        date: NaiveDate,
        detail: String,
    },
    /// Too few valid pairs for a rank correlation; the IC is undefined for this date.
    InsufficientSample {
        factor: String,
        date: NaiveDate,
        sample_size: usize,
        minimum: usize,
    },
    /// The selector returned nothing; the previous universe was carried forward.
    EmptyUniverse {
        method: String,
        date: NaiveDate,
        carried: usize,
    },
    /// A factor had no usable training-window statistic for a weighting policy.
    UndefinedTrainingStatistic {
        method: String,
        factor: String,
        period_index: usize,
    },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DataGap {
                ticker,
                date,
                detail,
            } => write!(f, "data gap: {ticker} on {date} ({detail})"),
            Diagnostic::InsufficientSample {
                factor,
                date,
                sample_size,
                minimum,
            } => write!(
                f,
                "insufficient sample: {factor} on {date} has {sample_size} pairs, need {minimum}"
            ),
            Diagnostic::EmptyUniverse {
                method,
                date,
                carried,
            } => write!(
                f,
                "empty universe: {method} on {date}, carried {carried} previous tickers"
            ),
            Diagnostic::UndefinedTrainingStatistic {
                method,
                factor,
                period_index,
            } => write!(
                f,
                "undefined training statistic: {method} / {factor} in period {period_index}"
            ),
        }
    }
}

/// Collected diagnostics, appended to as the run progresses.
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn data_gaps(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::DataGap { .. }))
            .count()
    }

    pub fn empty_universes(&self) -> usize {
        self.entries
            .iter()
            .filter(|d| matches!(d, Diagnostic::EmptyUniverse { .. }))
            .count()
    }
}
