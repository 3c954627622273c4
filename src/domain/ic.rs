//! Information coefficient: rank correlation between a factor's cross-section
//! and forward returns, per date and as a time series.

use crate::domain::diagnostics::{Diagnostic, Diagnostics};
use crate::domain::error::FactorwalkError;
use crate::domain::observation::{FactorObservation, ScoreTable};
use crate::domain::price_panel::PricePanel;
use crate::domain::stats;
use crate::ports::signal_store::SignalStore;
use chrono::{Duration, NaiveDate};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

pub const DEFAULT_MIN_SAMPLE_SIZE: usize = 10;
pub const DEFAULT_SIGNIFICANCE_THRESHOLD: f64 = 0.05;
/// Longest forward horizon or rebalance cadence accepted, in trading days.
pub const MAX_HORIZON_DAYS: usize = 2520;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcParams {
    /// Forward-return horizon in trading days.
    pub holding_period: usize,
    pub min_sample_size: usize,
    pub significance_threshold: f64,
}

impl Default for IcParams {
    fn default() -> Self {
        IcParams {
            holding_period: 63,
            min_sample_size: DEFAULT_MIN_SAMPLE_SIZE,
            significance_threshold: DEFAULT_SIGNIFICANCE_THRESHOLD,
        }
    }
}

/// IC of one factor at one date. `ic` and `p_value` are `None` when the
/// sample is too small or a side of the correlation has no variance.
#[derive(Debug, Clone, PartialEq)]
pub struct IcObservation {
    pub factor_name: String,
    pub date: NaiveDate,
    pub ic: Option<f64>,
    pub p_value: Option<f64>,
    pub sample_size: usize,
    pub significant: bool,
    /// Tickers in the cross-section dropped for a missing price point.
    pub excluded: usize,
}

impl IcObservation {
    pub fn is_defined(&self) -> bool {
        self.ic.is_some()
    }
}

/// Evaluate one date.
///
/// 1. Take every `(ticker, score)` of the cross-section.
/// 2. Look up the close at `date` and `holding_period` trading days later;
///    a ticker missing either point is excluded and recorded as a data gap,
///    the date is not aborted.
/// 3. forward_return = future / current - 1.
/// 4. Spearman correlation and two-sided p-value over the surviving pairs.
pub fn evaluate_ic(
    factor_name: &str,
    date: NaiveDate,
    cross_section: &[(&str, f64)],
    panel: &PricePanel,
    params: &IcParams,
    diagnostics: &mut Diagnostics,
) -> IcObservation {
    let forward_date = panel.offset_date(date, params.holding_period);

    let mut scores = Vec::with_capacity(cross_section.len());
    let mut returns = Vec::with_capacity(cross_section.len());
    let mut excluded = 0usize;

    for &(ticker, score) in cross_section {
        let current = panel.close(ticker, date);
        let future = forward_date.and_then(|fd| panel.close(ticker, fd));
        match (current, future) {
            (Some(c), Some(f)) if score.is_finite() => {
                scores.push(score);
                returns.push(f / c - 1.0);
                continue;
            }
            (None, _) => diagnostics.push(Diagnostic::DataGap {
                ticker: ticker.to_string(),
                date,
                detail: format!("no close for {factor_name} IC"),
            }),
            (Some(_), None) => {
                // a calendar that ends before the horizon is not a gap in the ticker
                if let Some(fd) = forward_date {
                    diagnostics.push(Diagnostic::DataGap {
                        ticker: ticker.to_string(),
                        date,
                        detail: format!("no forward close on {fd} for {factor_name} IC"),
                    });
                }
            }
            _ => {}
        }
        excluded += 1;
        debug!(ticker, %date, factor = factor_name, "excluded from IC");
    }

    let sample_size = scores.len();
    if sample_size < params.min_sample_size {
        diagnostics.push(Diagnostic::InsufficientSample {
            factor: factor_name.to_string(),
            date,
            sample_size,
            minimum: params.min_sample_size,
        });
        return IcObservation {
            factor_name: factor_name.to_string(),
            date,
            ic: None,
            p_value: None,
            sample_size,
            significant: false,
            excluded,
        };
    }

    let correlation = stats::spearman(&scores, &returns);
    let ic = correlation.map(|c| c.coefficient);
    let p_value = correlation.map(|c| c.p_value);
    let significant = p_value.is_some_and(|p| p < params.significance_threshold);

    IcObservation {
        factor_name: factor_name.to_string(),
        date,
        ic,
        p_value,
        sample_size,
        significant,
        excluded,
    }
}

/// Summary moments over the defined observations of an IC series.
#[derive(Debug, Clone, PartialEq)]
pub struct IcSummary {
    pub factor_name: String,
    /// Dates evaluated, defined or not.
    pub evaluated: usize,
    /// Dates with a defined IC.
    pub defined: usize,
    pub mean_ic: Option<f64>,
    pub std_ic: Option<f64>,
    pub median_ic: Option<f64>,
    /// Fraction of defined ICs above zero.
    pub hit_rate: Option<f64>,
    pub significance_rate: Option<f64>,
    /// mean / std.
    pub information_ratio: Option<f64>,
    /// mean / (std / sqrt(n)).
    pub t_stat: Option<f64>,
}

impl IcSummary {
    pub fn from_observations(factor_name: &str, observations: &[IcObservation]) -> Self {
        let defined: Vec<&IcObservation> =
            observations.iter().filter(|o| o.is_defined()).collect();
        let ics: Vec<f64> = defined.iter().filter_map(|o| o.ic).collect();
        let n = ics.len();

        let mean_ic = stats::mean(&ics);
        let std_ic = stats::sample_std(&ics);
        let (hit_rate, significance_rate) = if n > 0 {
            let hits = ics.iter().filter(|&&ic| ic > 0.0).count();
            let sig = defined.iter().filter(|o| o.significant).count();
            (Some(hits as f64 / n as f64), Some(sig as f64 / n as f64))
        } else {
            (None, None)
        };

        let information_ratio = match (mean_ic, std_ic) {
            (Some(m), Some(s)) if s > 0.0 => Some(m / s),
            _ => None,
        };
        let t_stat = information_ratio.map(|ir| ir * (n as f64).sqrt());

        IcSummary {
            factor_name: factor_name.to_string(),
            evaluated: observations.len(),
            defined: n,
            mean_ic,
            std_ic,
            median_ic: stats::median(&ics),
            hit_rate,
            significance_rate,
            information_ratio,
            t_stat,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IcSeries {
    pub observations: Vec<IcObservation>,
    pub summary: IcSummary,
}

/// Evaluation dates `[start, end]` and an optional cap on forward dates.
///
/// When `horizon_end` is set, dates whose forward date falls after it are not
/// evaluated, so no return beyond that bound enters the series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IcWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub horizon_end: Option<NaiveDate>,
}

impl IcWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        IcWindow {
            start,
            end,
            horizon_end: None,
        }
    }

    /// Window whose forward returns may not look past `end`.
    pub fn causal(start: NaiveDate, end: NaiveDate) -> Self {
        IcWindow {
            start,
            end,
            horizon_end: Some(end),
        }
    }
}

/// Run [`evaluate_ic`] on every distinct date of the window at which the
/// factor has observations.
pub fn ic_series(
    factor_name: &str,
    observations: &[FactorObservation],
    panel: &PricePanel,
    window: IcWindow,
    params: &IcParams,
    diagnostics: &mut Diagnostics,
) -> IcSeries {
    let mut by_date: BTreeMap<NaiveDate, ScoreTable> = BTreeMap::new();
    for obs in observations.iter().filter(|o| {
        o.factor_name == factor_name && o.date >= window.start && o.date <= window.end
    }) {
        if obs.score.is_finite() {
            by_date
                .entry(obs.date)
                .or_insert_with(|| ScoreTable::new(obs.date))
                .insert(&obs.ticker, factor_name, obs.score);
        }
    }

    let mut series = Vec::new();
    for (date, table) in &by_date {
        let date = *date;
        if let Some(limit) = window.horizon_end {
            match panel.offset_date(date, params.holding_period) {
                Some(fd) if fd <= limit => {}
                _ => {
                    debug!(factor = factor_name, %date, "forward date beyond horizon, skipped");
                    continue;
                }
            }
        }
        let cross_section = table.column(factor_name);
        series.push(evaluate_ic(
            factor_name,
            date,
            &cross_section,
            panel,
            params,
            diagnostics,
        ));
    }

    let summary = IcSummary::from_observations(factor_name, &series);
    IcSeries {
        observations: series,
        summary,
    }
}

/// Calendar-day padding that covers `trading_days` trading days.
pub fn forward_padding(trading_days: usize) -> Duration {
    let days = i64::try_from(trading_days.min(MAX_HORIZON_DAYS)).unwrap_or(0);
    Duration::days(days * 2 + 10)
}

/// Store-backed IC analysis of several factors over one window.
///
/// Prices are read through the window end plus enough padding to resolve
/// forward returns of the last dates, unless `horizon_end` caps them.
pub fn analyze_factors(
    store: &dyn SignalStore,
    factors: &BTreeSet<String>,
    region: &str,
    window: IcWindow,
    params: &IcParams,
    diagnostics: &mut Diagnostics,
) -> Result<Vec<IcSeries>, FactorwalkError> {
    let observations = store.get_factor_scores(factors, region, window.start, window.end)?;
    let tickers: BTreeSet<String> = observations.iter().map(|o| o.ticker.clone()).collect();
    let price_end = window.horizon_end.unwrap_or_else(|| {
        window
            .end
            .checked_add_signed(forward_padding(params.holding_period))
            .unwrap_or(NaiveDate::MAX)
    });
    let prices = store.get_prices(&tickers, region, window.start, price_end)?;
    let panel = PricePanel::from_observations(prices);

    Ok(factors
        .iter()
        .map(|f| ic_series(f, &observations, &panel, window, params, diagnostics))
        .collect())
}
