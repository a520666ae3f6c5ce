//! Pairwise correlation over numeric columns.
//!
//! Each pair only uses the rows where both values are present. Spearman ranks
//! those values (ties get their average rank) and then applies Pearson;
//! Kendall is tau-b, which corrects for ties on either side.

use super::types::{CorrelationMethod, CorrelationPair, CorrelationReport, Strength};
use crate::analyser::dataset::Dataset;
use crate::error::{AnalysisError, Result};

/// All values equal. Decided on the values, not on a computed variance: the
/// mean of a constant like 0.1 is not exact, so the variance is not zero.
fn is_constant(values: &[f64]) -> bool {
    values.windows(2).all(|w| w[0] == w[1])
}

pub fn pearson(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 || is_constant(&x[..n]) || is_constant(&y[..n]) {
        return None;
    }
    let mx = x.iter().take(n).sum::<f64>() / n as f64;
    let my = y.iter().take(n).sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let (dx, dy) = (a - mx, b - my);
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return None;
    }
    Some((sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0))
}

/// 1-based ranks; tied values share the mean of the ranks they span.
pub fn average_ranks(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        // positions start..end hold ranks start+1..=end
        let rank = (start + 1 + end) as f64 / 2.0;
        for &idx in &order[start..end] {
            ranks[idx] = rank;
        }
        start = end;
    }
    ranks
}

pub fn spearman(x: &[f64], y: &[f64]) -> Option<f64> {
    pearson(&average_ranks(x), &average_ranks(y))
}

pub fn kendall_tau_b(x: &[f64], y: &[f64]) -> Option<f64> {
    let n = x.len().min(y.len());
    if n < 2 {
        return None;
    }
    let (mut concordant, mut discordant) = (0_i64, 0_i64);
    let (mut tied_x, mut tied_y) = (0_i64, 0_i64);
    for i in 0..n {
        for j in (i + 1)..n {
            let dx = x[i] - x[j];
            let dy = y[i] - y[j];
            match (dx == 0.0, dy == 0.0) {
                (true, true) => {
                    tied_x += 1;
                    tied_y += 1;
                }
                (true, false) => tied_x += 1,
                (false, true) => tied_y += 1,
                (false, false) => {
                    if (dx > 0.0) == (dy > 0.0) {
                        concordant += 1;
                    } else {
                        discordant += 1;
                    }
                }
            }
        }
    }
    let pairs = (n * (n - 1) / 2) as i64;
    let denom = (((pairs - tied_x) * (pairs - tied_y)) as f64).sqrt();
    if denom == 0.0 {
        return None;
    }
    Some(((concordant - discordant) as f64 / denom).clamp(-1.0, 1.0))
}

fn coefficient(method: CorrelationMethod, x: &[f64], y: &[f64]) -> Option<f64> {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
        CorrelationMethod::Kendall => kendall_tau_b(x, y),
    }
}

/// Values of two columns on the rows where both are numeric.
fn complete_pairs(dataset: &Dataset, a: usize, b: usize) -> (Vec<f64>, Vec<f64>) {
    dataset
        .rows
        .iter()
        .filter_map(|row| Some((row.get(a)?.as_f64()?, row.get(b)?.as_f64()?)))
        .unzip()
}

pub fn compute(
    dataset: &Dataset,
    method: CorrelationMethod,
    threshold: f64,
) -> Result<CorrelationReport> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(AnalysisError::InvalidArgument(format!(
            "threshold must be between 0 and 1, got {threshold}"
        )));
    }
    let numeric = dataset.numeric_columns();
    if numeric.len() < 2 {
        return Err(AnalysisError::InsufficientColumns {
            found: numeric.len(),
        });
    }

    let k = numeric.len();
    let mut matrix = vec![vec![None; k]; k];
    let mut pairs = Vec::new();
    for i in 0..k {
        matrix[i][i] = Some(1.0);
        for j in (i + 1)..k {
            let (x, y) = complete_pairs(dataset, numeric[i], numeric[j]);
            let r = coefficient(method, &x, &y);
            matrix[i][j] = r;
            matrix[j][i] = r;
            if let Some(r) = r
                && r.abs() >= threshold
            {
                pairs.push(CorrelationPair {
                    column_a: dataset.columns[numeric[i]].name.clone(),
                    column_b: dataset.columns[numeric[j]].name.clone(),
                    coefficient: r,
                    strength: Strength::of(r),
                });
            }
        }
    }
    pairs.sort_by(|a, b| b.coefficient.abs().total_cmp(&a.coefficient.abs()));

    Ok(CorrelationReport {
        dataset: dataset.name.clone(),
        method,
        threshold,
        columns: numeric
            .iter()
            .map(|&i| dataset.columns[i].name.clone())
            .collect(),
        matrix,
        pairs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::dataset::{SourceDescriptor, SourceFormat, Value};

    fn dataset(columns: &[(&str, Vec<f64>)]) -> Dataset {
        let height = columns[0].1.len();
        let rows = (0..height)
            .map(|r| columns.iter().map(|(_, v)| Value::number(v[r])).collect())
            .collect();
        Dataset::new(
            "t",
            columns.iter().map(|(n, _)| (*n).to_owned()).collect(),
            rows,
            SourceDescriptor::Loaded {
                format: SourceFormat::Csv,
                origin: None,
            },
        )
        .expect("valid dataset")
    }

    #[test]
    fn test_linear_columns_correlate_perfectly() -> Result<()> {
        let x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v + 2.0).collect();
        let ds = dataset(&[("x", x), ("y", y)]);
        let report = compute(&ds, CorrelationMethod::Pearson, 0.99)?;
        let r = report.coefficient("x", "y").expect("defined");
        assert!((r - 1.0).abs() < 1e-9);
        assert_eq!(report.pairs.len(), 1);
        assert_eq!(report.pairs[0].strength, Strength::VeryStrong);
        assert_eq!(report.coefficient("x", "x"), Some(1.0));
        Ok(())
    }

    #[test]
    fn test_zero_variance_is_undefined() -> Result<()> {
        let ds = dataset(&[("x", vec![1.0, 2.0, 3.0]), ("flat", vec![5.0, 5.0, 5.0])]);
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let report = compute(&ds, method, 0.0)?;
            assert_eq!(report.coefficient("x", "flat"), None);
            assert_eq!(report.coefficient("flat", "flat"), Some(1.0));
            assert!(report.pairs.is_empty());
        }
        Ok(())
    }

    #[test]
    fn test_inexact_constant_column_is_undefined() -> Result<()> {
        let ds = dataset(&[
            ("x", vec![1.0, 2.0, 3.0]),
            ("flat", vec![0.1, 0.1, 0.1]),
            ("tenths", vec![0.3, 0.3, 0.3]),
        ]);
        for method in [
            CorrelationMethod::Pearson,
            CorrelationMethod::Spearman,
            CorrelationMethod::Kendall,
        ] {
            let report = compute(&ds, method, 0.0)?;
            assert_eq!(report.coefficient("x", "flat"), None, "{method:?}");
            assert_eq!(report.coefficient("flat", "tenths"), None, "{method:?}");
            assert!(report.pairs.is_empty(), "{method:?}");
        }
        assert_eq!(pearson(&[0.1, 0.1, 0.1], &[1.0, 2.0, 3.0]), None);
        Ok(())
    }

    #[test]
    fn test_rank_methods_on_monotonic_data() -> Result<()> {
        let x = vec![1.0, 2.0, 3.0, 4.0, 10.0];
        let y = vec![1.0, 4.0, 9.0, 16.0, 1000.0];
        let ds = dataset(&[("x", x), ("y", y)]);
        let spearman = compute(&ds, CorrelationMethod::Spearman, 0.5)?;
        assert!((spearman.coefficient("x", "y").expect("defined") - 1.0).abs() < 1e-12);
        let kendall = compute(&ds, CorrelationMethod::Kendall, 0.5)?;
        assert!((kendall.coefficient("x", "y").expect("defined") - 1.0).abs() < 1e-12);
        Ok(())
    }

    #[test]
    fn test_average_ranks_with_ties() {
        assert_eq!(average_ranks(&[10.0, 20.0, 10.0, 30.0]), vec![1.5, 3.0, 1.5, 4.0]);
    }

    #[test]
    fn test_kendall_tau_b_with_ties() {
        // x has one tied pair; tau-b = (C - D) / sqrt((n0 - n1)(n0 - n2))
        let x = [1.0, 1.0, 2.0, 3.0];
        let y = [1.0, 2.0, 3.0, 4.0];
        let tau = kendall_tau_b(&x, &y).expect("defined");
        let expected = 5.0 / (5.0_f64 * 6.0).sqrt();
        assert!((tau - expected).abs() < 1e-12);
    }

    #[test]
    fn test_pairs_sorted_by_strength_and_negative_values() -> Result<()> {
        let ds = dataset(&[
            ("a", vec![1.0, 2.0, 3.0, 4.0]),
            ("b", vec![1.0, 2.0, 4.0, 3.0]),
            ("c", vec![4.0, 3.0, 2.0, 1.0]),
        ]);
        let report = compute(&ds, CorrelationMethod::Pearson, 0.5)?;
        assert_eq!(report.pairs[0].column_b, "c");
        assert!((report.pairs[0].coefficient + 1.0).abs() < 1e-12);
        assert!(
            report
                .pairs
                .windows(2)
                .all(|w| w[0].coefficient.abs() >= w[1].coefficient.abs())
        );
        Ok(())
    }

    #[test]
    fn test_errors() {
        let ds = dataset(&[("only", vec![1.0, 2.0])]);
        let err = compute(&ds, CorrelationMethod::Pearson, 0.5).unwrap_err();
        assert_eq!(err.kind(), "InsufficientColumnsError");

        let ds = dataset(&[("a", vec![1.0, 2.0]), ("b", vec![2.0, 1.0])]);
        let err = compute(&ds, CorrelationMethod::Pearson, 1.5).unwrap_err();
        assert_eq!(err.kind(), "InvalidArgumentError");
    }
}
