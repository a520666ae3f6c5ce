//! Descriptive statistics over numeric columns.

use super::types::{NumericSummary, StatisticsReport};
use crate::analyser::dataset::Dataset;
use crate::error::{AnalysisError, Result};

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Sample standard deviation (n - 1); undefined for fewer than two values.
pub fn sample_std(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values)?;
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    Some((ss / (values.len() - 1) as f64).sqrt())
}

/// Quantile of ascending `sorted` values by linear interpolation between the
/// closest order statistics.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let (a, b) = (sorted[lo], sorted[hi]);
    Some(a + (b - a) * (pos - lo as f64))
}

pub fn sorted(values: &[f64]) -> Vec<f64> {
    let mut out = values.to_vec();
    out.sort_by(f64::total_cmp);
    out
}

pub fn summarize(column: &str, values: &[f64], missing: usize, include_percentiles: bool) -> NumericSummary {
    let s = sorted(values);
    let pct = |q| if include_percentiles { quantile(&s, q) } else { None };
    NumericSummary {
        column: column.to_owned(),
        count: values.len(),
        missing,
        mean: mean(values),
        std_dev: sample_std(values),
        min: s.first().copied(),
        q25: quantile(&s, 0.25),
        median: quantile(&s, 0.5),
        q75: quantile(&s, 0.75),
        max: s.last().copied(),
        p90: pct(0.90),
        p95: pct(0.95),
    }
}

/// Statistics for `columns` (or every numeric column). Requested columns that
/// are absent or not numeric are reported as skipped.
pub fn compute(
    dataset: &Dataset,
    columns: Option<&[String]>,
    include_percentiles: bool,
) -> Result<StatisticsReport> {
    let mut skipped = Vec::new();
    let selected: Vec<usize> = match columns {
        Some(names) => names
            .iter()
            .filter_map(|name| {
                let idx = dataset
                    .column_index(name)
                    .filter(|&i| dataset.columns[i].kind.is_numeric());
                if idx.is_none() {
                    skipped.push(name.clone());
                }
                idx
            })
            .collect(),
        None => dataset.numeric_columns(),
    };
    if selected.is_empty() {
        return Err(AnalysisError::NoNumericColumns);
    }

    let columns = selected
        .into_iter()
        .map(|idx| {
            let (values, missing) = dataset.numeric_values(idx);
            summarize(&dataset.columns[idx].name, &values, missing, include_percentiles)
        })
        .collect();

    Ok(StatisticsReport {
        dataset: dataset.name.clone(),
        include_percentiles,
        columns,
        skipped,
    })
}
