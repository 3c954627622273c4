//! Close-price panel and unified trading calendar.

use crate::domain::observation::PriceObservation;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
struct TickerSeries {
    closes: Vec<(NaiveDate, f64)>,
    date_index: HashMap<NaiveDate, usize>,
}

impl TickerSeries {
    fn new(mut closes: Vec<(NaiveDate, f64)>) -> Self {
        closes.sort_by_key(|(d, _)| *d);
        closes.dedup_by_key(|(d, _)| *d);
        let date_index = closes
            .iter()
            .enumerate()
            .map(|(i, (d, _))| (*d, i))
            .collect();
        Self {
            closes,
            date_index,
        }
    }

    fn close_on(&self, date: NaiveDate) -> Option<f64> {
        self.date_index.get(&date).map(|&i| self.closes[i].1)
    }

    /// Most recent close dated on or before `date`.
    fn last_close(&self, date: NaiveDate) -> Option<f64> {
        let idx = self.closes.partition_point(|(d, _)| *d <= date);
        idx.checked_sub(1).map(|i| self.closes[i].1)
    }
}

/// Closes for many tickers plus the sorted union of their dates.
#[derive(Debug, Clone, Default)]
pub struct PricePanel {
    series: HashMap<String, TickerSeries>,
    calendar: Vec<NaiveDate>,
}

impl PricePanel {
    /// Non-positive or non-finite closes are dropped; a later duplicate of the
    /// same (ticker, date) is ignored.
    pub fn from_observations(observations: Vec<PriceObservation>) -> Self {
        let mut grouped: HashMap<String, Vec<(NaiveDate, f64)>> = HashMap::new();
        for obs in observations {
            if obs.close.is_finite() && obs.close > 0.0 {
                grouped
                    .entry(obs.ticker)
                    .or_default()
                    .push((obs.date, obs.close));
            }
        }

        let series: HashMap<String, TickerSeries> = grouped
            .into_iter()
            .map(|(ticker, closes)| (ticker, TickerSeries::new(closes)))
            .collect();

        let calendar = build_calendar(series.values());
        Self { series, calendar }
    }

    pub fn calendar(&self) -> &[NaiveDate] {
        &self.calendar
    }

    pub fn ticker_count(&self) -> usize {
        self.series.len()
    }

    pub fn close(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(ticker).and_then(|s| s.close_on(date))
    }

    pub fn last_close(&self, ticker: &str, date: NaiveDate) -> Option<f64> {
        self.series.get(ticker).and_then(|s| s.last_close(date))
    }

    /// The calendar date `offset` trading days after `date`.
    ///
    /// `date` must itself be a calendar date.
    pub fn offset_date(&self, date: NaiveDate, offset: usize) -> Option<NaiveDate> {
        let idx = self.calendar.binary_search(&date).ok()?;
        idx.checked_add(offset)
            .and_then(|i| self.calendar.get(i))
            .copied()
    }

    /// Calendar dates in `[start, end]`.
    pub fn dates_between(&self, start: NaiveDate, end: NaiveDate) -> &[NaiveDate] {
        let lo = self.calendar.partition_point(|d| *d < start);
        let hi = self.calendar.partition_point(|d| *d <= end);
        if lo >= hi {
            &[]
        } else {
            &self.calendar[lo..hi]
        }
    }
}

fn build_calendar<'a, I>(series: I) -> Vec<NaiveDate>
where
    I: IntoIterator<Item = &'a TickerSeries>,
{
    let unique: BTreeSet<NaiveDate> = series
        .into_iter()
        .flat_map(|s| s.closes.iter().map(|(d, _)| *d))
        .collect();
    unique.into_iter().collect()
}
