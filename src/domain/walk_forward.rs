//! Rolling train/test period generation for walk-forward validation.

use crate::domain::error::FactorwalkError;
use chrono::{Days, Months, NaiveDate};
use std::fmt;
use std::str::FromStr;

/// A window length in calendar units, e.g. `252d`, `6m`, `1y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowLength {
    Days(u32),
    Months(u32),
    Years(u32),
}

impl WindowLength {
    pub fn add_to(&self, date: NaiveDate) -> Option<NaiveDate> {
        match *self {
            WindowLength::Days(n) => date.checked_add_days(Days::new(n as u64)),
            WindowLength::Months(n) => date.checked_add_months(Months::new(n)),
            WindowLength::Years(n) => date.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(
            self,
            WindowLength::Days(0) | WindowLength::Months(0) | WindowLength::Years(0)
        )
    }
}

impl fmt::Display for WindowLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowLength::Days(n) => write!(f, "{n}d"),
            WindowLength::Months(n) => write!(f, "{n}m"),
            WindowLength::Years(n) => write!(f, "{n}y"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid window length '{0}', expected <n>d, <n>m or <n>y")]
pub struct WindowLengthError(pub String);

impl FromStr for WindowLength {
    type Err = WindowLengthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim().to_lowercase();
        let err = || WindowLengthError(s.to_string());
        let unit = trimmed.chars().last().ok_or_else(err)?;
        let count: u32 = trimmed[..trimmed.len() - unit.len_utf8()]
            .trim()
            .parse()
            .map_err(|_| err())?;
        match unit {
            'd' => Ok(WindowLength::Days(count)),
            'm' => Ok(WindowLength::Months(count)),
            'y' => Ok(WindowLength::Years(count)),
            _ => Err(err()),
        }
    }
}

/// One train/test split. `test_start` is the day after `train_end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkForwardPeriod {
    /// 1-based.
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

impl fmt::Display for WalkForwardPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} train {}..{} test {}..{}",
            self.index, self.train_start, self.train_end, self.test_start, self.test_end
        )
    }
}

/// Split `[global_start, global_end]` into rolling periods.
///
/// Each period trains on `[start, start + train]`, tests on
/// `[train_end + 1d, test_start + test]`, and the next period starts at this
/// period's `test_start`. Stops before any `test_end` would pass `global_end`.
pub fn generate_periods(
    global_start: NaiveDate,
    global_end: NaiveDate,
    train: WindowLength,
    test: WindowLength,
) -> Vec<WalkForwardPeriod> {
    let mut periods = Vec::new();
    if train.is_zero() || test.is_zero() {
        return periods;
    }

    let mut cursor = global_start;
    loop {
        let Some(train_end) = train.add_to(cursor) else {
            break;
        };
        let Some(test_start) = train_end.succ_opt() else {
            break;
        };
        let Some(test_end) = test.add_to(test_start) else {
            break;
        };
        if test_end > global_end {
            break;
        }
        periods.push(WalkForwardPeriod {
            index: periods.len() + 1,
            train_start: cursor,
            train_end,
            test_start,
            test_end,
        });
        cursor = test_start;
    }
    periods
}

/// Like [`generate_periods`], but zero periods is a configuration error.
pub fn require_periods(
    global_start: NaiveDate,
    global_end: NaiveDate,
    train: WindowLength,
    test: WindowLength,
) -> Result<Vec<WalkForwardPeriod>, FactorwalkError> {
    let periods = generate_periods(global_start, global_end, train, test);
    if periods.is_empty() {
        return Err(FactorwalkError::NoPeriods {
            start: global_start,
            end: global_end,
            train: train.to_string(),
            test: test.to_string(),
        });
    }
    Ok(periods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_window_lengths() {
        assert_eq!("1y".parse::<WindowLength>(), Ok(WindowLength::Years(1)));
        assert_eq!("6M".parse::<WindowLength>(), Ok(WindowLength::Months(6)));
        assert_eq!(" 252d ".parse::<WindowLength>(), Ok(WindowLength::Days(252)));
        assert!("y".parse::<WindowLength>().is_err());
        assert!("12w".parse::<WindowLength>().is_err());
        assert!("".parse::<WindowLength>().is_err());
    }

    #[test]
    fn five_years_one_year_windows_gives_three_periods() {
        let periods = generate_periods(
            d(2019, 1, 1),
            d(2023, 12, 31),
            WindowLength::Years(1),
            WindowLength::Years(1),
        );
        assert_eq!(periods.len(), 3);

        let first = periods[0];
        assert_eq!(first.index, 1);
        assert_eq!(first.train_start, d(2019, 1, 1));
        assert_eq!(first.train_end, d(2020, 1, 1));
        assert_eq!(first.test_start, d(2020, 1, 2));
        assert_eq!(first.test_end, d(2021, 1, 2));
        assert_eq!(periods[2].index, 3);
    }

    #[test]
    fn periods_roll_without_gaps() {
        let periods = generate_periods(
            d(2015, 1, 1),
            d(2024, 12, 31),
            WindowLength::Months(18),
            WindowLength::Months(6),
        );
        assert!(periods.len() > 1);
        for pair in periods.windows(2) {
            assert!(pair[0].train_end < pair[0].test_start);
            assert_eq!(pair[0].test_start, pair[1].train_start);
        }
    }

    #[test]
    fn short_range_produces_nothing() {
        let periods = generate_periods(
            d(2020, 1, 1),
            d(2021, 6, 1),
            WindowLength::Years(1),
            WindowLength::Years(1),
        );
        assert!(periods.is_empty());

        let err = require_periods(
            d(2020, 1, 1),
            d(2021, 6, 1),
            WindowLength::Years(1),
            WindowLength::Years(1),
        )
        .unwrap_err();
        assert!(matches!(err, FactorwalkError::NoPeriods { .. }));
    }

    #[test]
    fn zero_length_windows_produce_nothing() {
        let periods = generate_periods(
            d(2020, 1, 1),
            d(2024, 1, 1),
            WindowLength::Days(0),
            WindowLength::Years(1),
        );
        assert!(periods.is_empty());
    }

    proptest! {
        #[test]
        fn generated_periods_hold_invariants(
            start_offset in 0i64..3000,
            span in 30i64..4000,
            train in 1u32..400,
            test in 1u32..200,
        ) {
            let start = d(2000, 1, 1) + chrono::Duration::days(start_offset);
            let end = start + chrono::Duration::days(span);
            let periods = generate_periods(
                start,
                end,
                WindowLength::Days(train),
                WindowLength::Days(test),
            );
            for (i, p) in periods.iter().enumerate() {
                prop_assert_eq!(p.index, i + 1);
                prop_assert!(p.train_end < p.test_start);
                prop_assert_eq!(p.test_start, p.train_end.succ_opt().unwrap());
                prop_assert!(p.test_end <= end);
            }
            for pair in periods.windows(2) {
                prop_assert_eq!(pair[0].test_start, pair[1].train_start);
            }
        }
    }
}
