//! Factor combination: one composite score per ticker from a score table.
//!
//! Every policy averages over the factors a ticker actually has, so a ticker
//! missing a factor is still scored on its available subset.

use crate::domain::diagnostics::{Diagnostic, Diagnostics};
use crate::domain::ic::IcSummary;
use crate::domain::observation::ScoreTable;
use crate::domain::stats;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CombinerPolicy {
    IcWeighted,
    EqualWeighted,
    InverseDispersion,
    RankBased,
}

impl CombinerPolicy {
    pub const ALL: [CombinerPolicy; 4] = [
        CombinerPolicy::IcWeighted,
        CombinerPolicy::EqualWeighted,
        CombinerPolicy::InverseDispersion,
        CombinerPolicy::RankBased,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CombinerPolicy::IcWeighted => "ic_weighted",
            CombinerPolicy::EqualWeighted => "equal_weighted",
            CombinerPolicy::InverseDispersion => "inverse_dispersion",
            CombinerPolicy::RankBased => "rank_based",
        }
    }
}

impl fmt::Display for CombinerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CombinerPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ic_weighted" | "ic" => Ok(CombinerPolicy::IcWeighted),
            "equal_weighted" | "equal" => Ok(CombinerPolicy::EqualWeighted),
            "inverse_dispersion" | "inverse_std" => Ok(CombinerPolicy::InverseDispersion),
            "rank_based" | "rank" => Ok(CombinerPolicy::RankBased),
            other => Err(format!("unknown combiner policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompositeScore {
    pub ticker: String,
    pub composite_score: f64,
}

/// Composite score descending, then ticker ascending.
pub fn composite_order(a: &CompositeScore, b: &CompositeScore) -> Ordering {
    b.composite_score
        .total_cmp(&a.composite_score)
        .then_with(|| a.ticker.cmp(&b.ticker))
}

/// Per-factor weights estimated on a training window.
///
/// Raw weights are kept unnormalised; the per-ticker average divides by the
/// weights of the factors present, which is the same as normalising.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FactorWeights {
    raw: BTreeMap<String, f64>,
    /// Factors whose scores are negated before weighting.
    flipped: BTreeSet<String>,
    /// Every raw weight was zero or undefined and equal weights were used.
    pub fallback: bool,
}

impl FactorWeights {
    /// Weight 1 for every factor.
    pub fn uniform<'a, I>(factors: I) -> Self
    where
        I: IntoIterator<Item = &'a String>,
    {
        FactorWeights {
            raw: factors.into_iter().map(|f| (f.clone(), 1.0)).collect(),
            flipped: BTreeSet::new(),
            fallback: false,
        }
    }

    pub fn from_raw(raw: BTreeMap<String, f64>) -> Self {
        FactorWeights {
            raw,
            flipped: BTreeSet::new(),
            fallback: false,
        }
    }

    pub fn with_flipped(mut self, flipped: BTreeSet<String>) -> Self {
        self.flipped = flipped;
        self
    }

    pub fn raw(&self, factor: &str) -> Option<f64> {
        self.raw.get(factor).copied()
    }

    pub fn is_flipped(&self, factor: &str) -> bool {
        self.flipped.contains(factor)
    }

    /// Weights scaled to sum to 1.
    pub fn normalized(&self) -> BTreeMap<String, f64> {
        let total: f64 = self.raw.values().sum();
        if total <= 0.0 {
            return self.raw.keys().map(|k| (k.clone(), 0.0)).collect();
        }
        self.raw
            .iter()
            .map(|(k, w)| (k.clone(), w / total))
            .collect()
    }

    fn total(&self) -> f64 {
        self.raw.values().sum()
    }
}

/// Settings shared by every fit within one walk-forward period.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitContext {
    pub period_index: usize,
    /// Negate the scores of factors with a negative training mean IC.
    pub sign_aware: bool,
}

/// A fitted combiner, ready to score any number of dates.
#[derive(Debug, Clone, PartialEq)]
pub enum Combiner {
    IcWeighted(FactorWeights),
    EqualWeighted,
    InverseDispersion(FactorWeights),
    RankBased,
}

impl Combiner {
    /// Derive the policy's parameters from training-window IC summaries of
    /// the configured `factors`.
    pub fn fit(
        policy: CombinerPolicy,
        factors: &BTreeSet<String>,
        training: &[IcSummary],
        context: FitContext,
        diagnostics: &mut Diagnostics,
    ) -> Self {
        match policy {
            CombinerPolicy::EqualWeighted => Combiner::EqualWeighted,
            CombinerPolicy::RankBased => Combiner::RankBased,
            CombinerPolicy::IcWeighted => Combiner::IcWeighted(fit_weights(
                policy,
                factors,
                training,
                context,
                diagnostics,
                |s| s.mean_ic.map(f64::abs),
            )),
            CombinerPolicy::InverseDispersion => Combiner::InverseDispersion(fit_weights(
                policy,
                factors,
                training,
                context,
                diagnostics,
                |s| s.std_ic.filter(|sd| *sd > 0.0).map(|sd| 1.0 / sd),
            )),
        }
    }

    pub fn policy(&self) -> CombinerPolicy {
        match self {
            Combiner::IcWeighted(_) => CombinerPolicy::IcWeighted,
            Combiner::EqualWeighted => CombinerPolicy::EqualWeighted,
            Combiner::InverseDispersion(_) => CombinerPolicy::InverseDispersion,
            Combiner::RankBased => CombinerPolicy::RankBased,
        }
    }

    pub fn name(&self) -> &'static str {
        self.policy().name()
    }

    pub fn weights(&self) -> Option<&FactorWeights> {
        match self {
            Combiner::IcWeighted(w) | Combiner::InverseDispersion(w) => Some(w),
            _ => None,
        }
    }

    /// Composite scores sorted by [`composite_order`]. An empty table gives an
    /// empty result.
    pub fn combine(&self, table: &ScoreTable) -> Vec<CompositeScore> {
        let mut scores = match self {
            Combiner::EqualWeighted => equal_weighted(table),
            Combiner::IcWeighted(w) | Combiner::InverseDispersion(w) => weighted(table, w),
            Combiner::RankBased => rank_based(table),
        };
        scores.sort_by(composite_order);
        scores
    }
}

fn fit_weights<F>(
    policy: CombinerPolicy,
    factors: &BTreeSet<String>,
    training: &[IcSummary],
    context: FitContext,
    diagnostics: &mut Diagnostics,
    statistic: F,
) -> FactorWeights
where
    F: Fn(&IcSummary) -> Option<f64>,
{
    let by_name: BTreeMap<&str, &IcSummary> = training
        .iter()
        .map(|s| (s.factor_name.as_str(), s))
        .collect();

    let mut raw = BTreeMap::new();
    let mut flipped = BTreeSet::new();
    for factor in factors {
        let summary = by_name.get(factor.as_str()).copied();
        let weight = summary.and_then(&statistic).filter(|w| w.is_finite());
        if weight.is_none() {
            warn!(
                method = policy.name(),
                factor = %factor,
                period = context.period_index,
                "no usable training statistic, weight set to zero"
            );
            diagnostics.push(Diagnostic::UndefinedTrainingStatistic {
                method: policy.name().to_string(),
                factor: factor.clone(),
                period_index: context.period_index,
            });
        }
        raw.insert(factor.clone(), weight.unwrap_or(0.0));

        if context.sign_aware && summary.and_then(|s| s.mean_ic).is_some_and(|m| m < 0.0) {
            flipped.insert(factor.clone());
        }
    }

    let weights = FactorWeights::from_raw(raw);
    if weights.total() > 0.0 {
        return weights.with_flipped(flipped);
    }

    warn!(
        method = policy.name(),
        period = context.period_index,
        "all training weights zero, falling back to equal weights"
    );
    FactorWeights {
        fallback: true,
        ..FactorWeights::uniform(factors)
    }
}

fn equal_weighted(table: &ScoreTable) -> Vec<CompositeScore> {
    table
        .tickers()
        .filter_map(|ticker| {
            let row = table.row(ticker)?;
            let values: Vec<f64> = row.values().copied().collect();
            stats::mean(&values).map(|m| CompositeScore {
                ticker: ticker.to_string(),
                composite_score: m,
            })
        })
        .collect()
}

/// Weighted average over the factors present for each ticker. A ticker whose
/// present factors all carry zero weight has no composite.
fn weighted(table: &ScoreTable, weights: &FactorWeights) -> Vec<CompositeScore> {
    table
        .tickers()
        .filter_map(|ticker| {
            let row = table.row(ticker)?;
            let mut numerator = 0.0;
            let mut denominator = 0.0;
            for (factor, &score) in row {
                let Some(w) = weights.raw(factor) else {
                    continue;
                };
                let s = if weights.is_flipped(factor) { -score } else { score };
                numerator += w * s;
                denominator += w;
            }
            (denominator > 0.0).then(|| CompositeScore {
                ticker: ticker.to_string(),
                composite_score: numerator / denominator,
            })
        })
        .collect()
}

/// Mean of per-factor ascending ranks (ties averaged).
fn rank_based(table: &ScoreTable) -> Vec<CompositeScore> {
    let mut ranks: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
    for factor in table.factors() {
        let column = table.column(factor);
        let values: Vec<f64> = column.iter().map(|(_, s)| *s).collect();
        for ((ticker, _), rank) in column.iter().zip(stats::average_ranks(&values)) {
            ranks.entry(ticker).or_default().push(rank);
        }
    }

    ranks
        .into_iter()
        .filter_map(|(ticker, r)| {
            stats::mean(&r).map(|m| CompositeScore {
                ticker: ticker.to_string(),
                composite_score: m,
            })
        })
        .collect()
}
