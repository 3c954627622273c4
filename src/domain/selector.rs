//! Top-fraction selection from a composite ranking.

use crate::domain::combiner::{CompositeScore, composite_order};

/// Tickers chosen at one rebalance, best first.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectedUniverse {
    pub tickers: Vec<String>,
}

impl SelectedUniverse {
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }
}

/// Number of tickers kept out of `n`: `floor(n * top_fraction)`, at least one
/// for a non-empty ranking. The small epsilon absorbs products such as
/// `100 * 0.45 = 45.000000000000004`.
pub fn selection_size(n: usize, top_fraction: f64) -> usize {
    if n == 0 {
        return 0;
    }
    let raw = (n as f64 * top_fraction + 1e-9).floor() as usize;
    raw.clamp(1, n)
}

/// Keep the best [`selection_size`] tickers. An empty ranking gives an empty
/// universe, which callers treat as "keep the previous selection".
pub fn select_top(scores: &[CompositeScore], top_fraction: f64) -> SelectedUniverse {
    let mut ranked: Vec<&CompositeScore> = scores.iter().collect();
    ranked.sort_by(|a, b| composite_order(a, b));
    let k = selection_size(ranked.len(), top_fraction);
    SelectedUniverse {
        tickers: ranked
            .into_iter()
            .take(k)
            .map(|s| s.ticker.clone())
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(n: usize) -> Vec<CompositeScore> {
        (0..n)
            .map(|i| CompositeScore {
                ticker: format!("T{i:03}"),
                composite_score: i as f64,
            })
            .collect()
    }

    #[test]
    fn hundred_at_045_keeps_45() {
        let universe = select_top(&ranking(100), 0.45);
        assert_eq!(universe.len(), 45);
        assert_eq!(universe.tickers[0], "T099");
        assert_eq!(universe.tickers[44], "T055");
    }

    #[test]
    fn single_ticker_always_kept() {
        assert_eq!(select_top(&ranking(1), 0.45).len(), 1);
        assert_eq!(select_top(&ranking(1), 0.01).len(), 1);
    }

    #[test]
    fn three_at_034_keeps_the_best() {
        let universe = select_top(&ranking(3), 0.34);
        assert_eq!(universe.tickers, vec!["T002".to_string()]);
    }

    #[test]
    fn full_fraction_keeps_everything() {
        assert_eq!(select_top(&ranking(7), 1.0).len(), 7);
    }

    #[test]
    fn empty_ranking_gives_empty_universe() {
        let universe = select_top(&[], 0.45);
        assert!(universe.is_empty());
    }

    #[test]
    fn unsorted_input_ranked_with_tie_break() {
        let scores = vec![
            CompositeScore {
                ticker: "BBB".into(),
                composite_score: 1.0,
            },
            CompositeScore {
                ticker: "CCC".into(),
                composite_score: 2.0,
            },
            CompositeScore {
                ticker: "AAA".into(),
                composite_score: 1.0,
            },
        ];
        let universe = select_top(&scores, 0.67);
        assert_eq!(universe.tickers, vec!["CCC".to_string(), "AAA".to_string()]);
    }
}
