//! Small-sample statistics used by the IC evaluator and the summarizer.
//!
//! Dispersion is the sample standard deviation (n - 1 denominator) throughout.

use statrs::distribution::{ContinuousCDF, StudentsT};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation; undefined for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Ascending 1-based ranks; tied values share the average of their positions.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j (0-based) share rank mean(i+1..=j+1)
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for &k in &order[i..=j] {
            ranks[k] = avg;
        }
        i = j + 1;
    }
    ranks
}

/// Pearson correlation; undefined when either side has zero variance.
pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let mx = mean(x)?;
    let my = mean(y)?;
    let mut sxy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correlation {
    pub coefficient: f64,
    /// Two-sided p-value of the t-test on `coefficient`.
    pub p_value: f64,
}

/// Spearman rank correlation with a two-sided p-value from the t distribution
/// with n - 2 degrees of freedom.
pub fn spearman(x: &[f64], y: &[f64]) -> Option<Correlation> {
    if x.len() != y.len() || x.len() < 3 {
        return None;
    }
    let rho = pearson(&average_ranks(x), &average_ranks(y))?;
    Some(Correlation {
        coefficient: rho,
        p_value: correlation_p_value(rho, x.len()),
    })
}

fn correlation_p_value(r: f64, n: usize) -> f64 {
    let df = (n - 2) as f64;
    let denom = 1.0 - r * r;
    if denom <= f64::EPSILON {
        return 0.0;
    }
    let t = r * (df / denom).sqrt();
    match StudentsT::new(0.0, 1.0, df) {
        Ok(dist) => (2.0 * (1.0 - dist.cdf(t.abs()))).clamp(0.0, 1.0),
        Err(_) => 1.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    #[test]
    fn mean_and_std() {
        let v = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&v).unwrap(), 5.0);
        // sample variance = 32 / 7
        assert_relative_eq!(sample_std(&v).unwrap(), (32.0_f64 / 7.0).sqrt());
        assert!(sample_std(&[1.0]).is_none());
        assert!(mean(&[]).is_none());
    }

    #[test]
    fn median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn ranks_average_ties() {
        let ranks = average_ranks(&[10.0, 20.0, 20.0, 5.0]);
        assert_eq!(ranks, vec![2.0, 3.5, 3.5, 1.0]);
    }

    #[test]
    fn pearson_zero_variance_undefined() {
        assert!(pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn spearman_perfect_monotonic() {
        let x: Vec<f64> = (0..12).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| v.powi(3) + 1.0).collect();
        let c = spearman(&x, &y).unwrap();
        assert_relative_eq!(c.coefficient, 1.0);
        assert_eq!(c.p_value, 0.0);
    }

    #[test]
    fn spearman_reversed() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| -v).collect();
        let c = spearman(&x, &y).unwrap();
        assert_relative_eq!(c.coefficient, -1.0);
    }

    #[test]
    fn spearman_p_value_matches_reference() {
        // rho = 0.5 with n = 12: t = 0.5 * sqrt(10 / 0.75) = 1.8257, p ~= 0.0979
        let p = correlation_p_value(0.5, 12);
        assert!((p - 0.0979).abs() < 2e-3, "p = {p}");
    }

    proptest! {
        #[test]
        fn spearman_is_bounded(pairs in prop::collection::vec((-1e6f64..1e6, -1e6f64..1e6), 3..60)) {
            let (x, y): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
            if let Some(c) = spearman(&x, &y) {
                prop_assert!((-1.0..=1.0).contains(&c.coefficient));
                prop_assert!((0.0..=1.0).contains(&c.p_value));
            }
        }

        #[test]
        fn ranks_sum_is_triangular(values in prop::collection::vec(-100i32..100, 1..50)) {
            let v: Vec<f64> = values.iter().map(|&i| i as f64).collect();
            let n = v.len() as f64;
            let total: f64 = average_ranks(&v).iter().sum();
            prop_assert!((total - n * (n + 1.0) / 2.0).abs() < 1e-9);
        }
    }
}
