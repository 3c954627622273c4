//! Risk/return summary of a rebalance-sampled value path.

use super::stats;

#[derive(Debug, Clone, PartialEq)]
pub struct PerformanceSummary {
    pub total_return: f64,
    /// Returns between consecutive marks of the value path.
    pub period_returns: Vec<f64>,
    /// Annualised; `None` with fewer than two period returns.
    pub sharpe_ratio: Option<f64>,
    /// Always `<= 0`; `None` with fewer than two period returns.
    pub max_drawdown: Option<f64>,
    /// Fraction of period returns above zero.
    pub win_rate: f64,
}

impl PerformanceSummary {
    /// Summarise `values`, the first of which is the starting capital.
    ///
    /// `periods_per_year` scales the Sharpe ratio, e.g. 4 for a quarterly
    /// rebalance cadence.
    pub fn compute(values: &[f64], periods_per_year: f64) -> Self {
        let period_returns = compute_period_returns(values);

        let total_return = match (values.first(), values.last()) {
            (Some(&first), Some(&last)) if first > 0.0 => last / first - 1.0,
            _ => 0.0,
        };

        let win_rate = if period_returns.is_empty() {
            0.0
        } else {
            period_returns.iter().filter(|&&r| r > 0.0).count() as f64
                / period_returns.len() as f64
        };

        let (sharpe_ratio, max_drawdown) = if period_returns.len() < 2 {
            (None, None)
        } else {
            (
                compute_sharpe(&period_returns, periods_per_year),
                Some(compute_drawdown(&period_returns)),
            )
        };

        PerformanceSummary {
            total_return,
            period_returns,
            sharpe_ratio,
            max_drawdown,
            win_rate,
        }
    }
}

fn compute_period_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

/// Zero dispersion gives a Sharpe of 0.
fn compute_sharpe(returns: &[f64], periods_per_year: f64) -> Option<f64> {
    let mean = stats::mean(returns)?;
    let std = stats::sample_std(returns)?;
    if std > 0.0 {
        Some(mean / std * periods_per_year.sqrt())
    } else {
        Some(0.0)
    }
}

/// Worst `cumulative / running_peak - 1`, with the starting value (1.0) as the
/// first peak.
fn compute_drawdown(returns: &[f64]) -> f64 {
    let mut cumulative = 1.0_f64;
    let mut peak = 1.0_f64;
    let mut max_dd = 0.0_f64;
    for r in returns {
        cumulative *= 1.0 + r;
        if cumulative > peak {
            peak = cumulative;
        }
        let dd = cumulative / peak - 1.0;
        if dd < max_dd {
            max_dd = dd;
        }
    }
    max_dd
}
