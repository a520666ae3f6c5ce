//! Completeness, duplication and type-consistency diagnostics.
//!
//! Dirty data is reported on, never rejected: this engine has no failure path
//! of its own.

use super::types::{ColumnQuality, IssueKind, QualityIssue, QualityReport};
use crate::analyser::dataset::{ColumnKind, Dataset, Value, ValueKey};
use std::collections::HashSet;

pub const HIGH_MISSING_PCT: f64 = 50.0;
pub const MISSING_DATA_HIGH: f64 = 15.0;
pub const MISSING_DATA_MEDIUM: f64 = 5.0;

/// Distinct non-missing values of a column.
pub fn distinct_count<'a>(values: impl IntoIterator<Item = &'a Value>) -> usize {
    values
        .into_iter()
        .filter(|v| !v.is_missing())
        .map(Value::key)
        .collect::<HashSet<ValueKey>>()
        .len()
}

pub fn duplicate_rows(dataset: &Dataset) -> usize {
    let mut seen: HashSet<Vec<ValueKey>> = HashSet::with_capacity(dataset.row_count());
    dataset
        .rows
        .iter()
        .filter(|row| !seen.insert(row.iter().map(Value::key).collect()))
        .count()
}

fn pct(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn looks_like_identifier(dataset: &Dataset, idx: usize, distinct: usize) -> bool {
    let rows = dataset.row_count();
    if rows < 2 || distinct != rows {
        return false;
    }
    match dataset.columns[idx].kind {
        ColumnKind::Text => true,
        ColumnKind::Numeric => dataset
            .column_values(idx)
            .all(|v| v.as_f64().is_some_and(|x| x.fract() == 0.0)),
        _ => false,
    }
}

pub fn compute(dataset: &Dataset) -> QualityReport {
    let rows = dataset.row_count();
    let mut issues = Vec::new();
    let mut score: f64 = 100.0;

    let columns: Vec<ColumnQuality> = dataset
        .columns
        .iter()
        .enumerate()
        .map(|(idx, col)| {
            let missing = dataset.column_values(idx).filter(|v| v.is_missing()).count();
            let missing_pct = pct(missing, rows);
            let distinct = distinct_count(dataset.column_values(idx));
            let type_conflict = col.kind == ColumnKind::Mixed;

            if missing_pct > HIGH_MISSING_PCT {
                issues.push(QualityIssue {
                    kind: IssueKind::HighMissing,
                    column: Some(col.name.clone()),
                    message: format!("Column '{}' is {missing_pct:.1}% missing.", col.name),
                });
            }
            if missing_pct > MISSING_DATA_HIGH {
                score -= 10.0;
            } else if missing_pct > MISSING_DATA_MEDIUM {
                score -= 5.0;
            }

            if distinct == 1 && rows > 1 {
                issues.push(QualityIssue {
                    kind: IssueKind::SingleValue,
                    column: Some(col.name.clone()),
                    message: format!("Column '{}' holds a single distinct value.", col.name),
                });
                score -= 5.0;
            }

            if looks_like_identifier(dataset, idx, distinct) {
                issues.push(QualityIssue {
                    kind: IssueKind::AllUnique,
                    column: Some(col.name.clone()),
                    message: format!(
                        "All values in '{}' are unique (potential identifier).",
                        col.name
                    ),
                });
            }

            if type_conflict {
                issues.push(QualityIssue {
                    kind: IssueKind::MixedTypes,
                    column: Some(col.name.clone()),
                    message: format!("Column '{}' mixes value types across rows.", col.name),
                });
                score -= 10.0;
            }

            ColumnQuality {
                column: col.name.clone(),
                kind: col.kind,
                missing,
                missing_pct,
                distinct,
                type_conflict,
            }
        })
        .collect();

    let duplicate_rows = duplicate_rows(dataset);
    let duplicate_pct = pct(duplicate_rows, rows);
    if duplicate_rows > 0 {
        issues.push(QualityIssue {
            kind: IssueKind::DuplicateRows,
            column: None,
            message: format!("{duplicate_rows} duplicate row(s) ({duplicate_pct:.1}%)."),
        });
        score -= duplicate_pct.min(20.0);
    }

    QualityReport {
        dataset: dataset.name.clone(),
        rows,
        columns,
        duplicate_rows,
        duplicate_pct,
        issues,
        health_score: score.max(0.0) / 100.0,
    }
}
