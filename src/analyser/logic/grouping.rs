//! Grouped aggregates keyed on the exact value of one column.

use super::statistics::{mean, quantile, sorted};
use super::types::{AggOp, Aggregate, GroupReport, GroupRow};
use crate::analyser::dataset::{Dataset, ValueKey};
use crate::error::{AnalysisError, Result};
use std::collections::HashMap;

pub const DEFAULT_OPERATIONS: [AggOp; 2] = [AggOp::Mean, AggOp::Count];

/// Parse operation names, keeping their order and dropping repeats.
pub fn parse_operations(names: &[String]) -> Result<Vec<AggOp>> {
    if names.is_empty() {
        return Err(AnalysisError::InvalidArgument(
            "operations must not be empty".to_owned(),
        ));
    }
    let mut ops = Vec::with_capacity(names.len());
    for name in names {
        let op = AggOp::from_name(name)
            .ok_or_else(|| AnalysisError::UnsupportedOperation(name.clone()))?;
        if !ops.contains(&op) {
            ops.push(op);
        }
    }
    Ok(ops)
}

fn aggregate(op: AggOp, values: &[f64]) -> Option<f64> {
    match op {
        AggOp::Mean => mean(values),
        AggOp::Median => quantile(&sorted(values), 0.5),
        AggOp::Count => Some(values.len() as f64),
        AggOp::Sum => Some(values.iter().sum()),
        AggOp::Min => values.iter().copied().min_by(f64::total_cmp),
        AggOp::Max => values.iter().copied().max_by(f64::total_cmp),
    }
}

pub fn compute(
    dataset: &Dataset,
    group_by: &str,
    agg_columns: Option<&[String]>,
    operations: &[AggOp],
) -> Result<GroupReport> {
    let key_idx = dataset
        .column_index(group_by)
        .ok_or_else(|| AnalysisError::ColumnNotFound(group_by.to_owned()))?;

    let mut skipped = Vec::new();
    let targets: Vec<usize> = match agg_columns {
        Some(names) => {
            let mut targets = Vec::new();
            for name in names {
                let idx = dataset
                    .column_index(name)
                    .ok_or_else(|| AnalysisError::ColumnNotFound(name.clone()))?;
                if dataset.columns[idx].kind.is_numeric() {
                    targets.push(idx);
                } else {
                    skipped.push(name.clone());
                }
            }
            targets
        }
        None => dataset
            .numeric_columns()
            .into_iter()
            .filter(|&i| i != key_idx)
            .collect(),
    };
    if targets.is_empty() {
        return Err(AnalysisError::NoNumericColumns);
    }

    // group key -> (position in first-occurrence order, member rows)
    let mut slots: HashMap<ValueKey, usize> = HashMap::new();
    let mut members: Vec<(usize, Vec<usize>)> = Vec::new();
    for (row_idx, row) in dataset.rows.iter().enumerate() {
        let key = row[key_idx].key();
        let slot = *slots.entry(key).or_insert_with(|| {
            members.push((row_idx, Vec::new()));
            members.len() - 1
        });
        members[slot].1.push(row_idx);
    }

    let groups = members
        .into_iter()
        .map(|(first_row, rows)| {
            let mut aggregates = Vec::with_capacity(targets.len() * operations.len());
            for &col in &targets {
                let values: Vec<f64> = rows
                    .iter()
                    .filter_map(|&r| dataset.rows[r][col].as_f64())
                    .collect();
                for &op in operations {
                    aggregates.push(Aggregate {
                        column: dataset.columns[col].name.clone(),
                        operation: op,
                        value: aggregate(op, &values),
                    });
                }
            }
            GroupRow {
                key: dataset.rows[first_row][key_idx].clone(),
                rows: rows.len(),
                aggregates,
            }
        })
        .collect();

    Ok(GroupReport {
        dataset: dataset.name.clone(),
        group_by: group_by.to_owned(),
        agg_columns: targets
            .iter()
            .map(|&i| dataset.columns[i].name.clone())
            .collect(),
        operations: operations.to_vec(),
        groups,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::dataset::{SourceDescriptor, SourceFormat, Value};

    fn depts() -> Dataset {
        let rows = vec![
            vec![Value::text("A"), Value::Number(10.0)],
            vec![Value::text("A"), Value::Number(20.0)],
            vec![Value::text("B"), Value::Number(30.0)],
        ];
        Dataset::new(
            "d",
            vec!["dept".to_owned(), "salary".to_owned()],
            rows,
            SourceDescriptor::Loaded {
                format: SourceFormat::Csv,
                origin: None,
            },
        )
        .expect("valid dataset")
    }

    #[test]
    fn test_mean_and_count_per_dept() -> Result<()> {
        let report = compute(&depts(), "dept", Some(&["salary".to_owned()]), &DEFAULT_OPERATIONS)?;
        assert_eq!(report.groups.len(), 2);
        let a = report.group(&Value::text("A")).expect("group A");
        assert_eq!(a.get("salary", AggOp::Mean), Some(15.0));
        assert_eq!(a.get("salary", AggOp::Count), Some(2.0));
        let b = report.group(&Value::text("B")).expect("group B");
        assert_eq!(b.get("salary", AggOp::Mean), Some(30.0));
        assert_eq!(b.get("salary", AggOp::Count), Some(1.0));
        Ok(())
    }

    #[test]
    fn test_missing_key_is_its_own_group_in_first_seen_order() -> Result<()> {
        let rows = vec![
            vec![Value::text("z"), Value::Number(1.0)],
            vec![Value::Missing, Value::Number(2.0)],
            vec![Value::text("a"), Value::Missing],
            vec![Value::Missing, Value::Number(4.0)],
        ];
        let ds = Dataset::new(
            "d",
            vec!["k".to_owned(), "v".to_owned()],
            rows,
            SourceDescriptor::Loaded {
                format: SourceFormat::Csv,
                origin: None,
            },
        )?;
        let ops = parse_operations(&["sum".to_owned(), "median".to_owned(), "max".to_owned()])?;
        let report = compute(&ds, "k", None, &ops)?;
        let keys: Vec<Value> = report.groups.iter().map(|g| g.key.clone()).collect();
        assert_eq!(keys, vec![Value::text("z"), Value::Missing, Value::text("a")]);

        let missing = &report.groups[1];
        assert_eq!(missing.rows, 2);
        assert_eq!(missing.get("v", AggOp::Sum), Some(6.0));
        assert_eq!(missing.get("v", AggOp::Median), Some(3.0));

        let empty = &report.groups[2];
        assert_eq!(empty.get("v", AggOp::Sum), Some(0.0));
        assert_eq!(empty.get("v", AggOp::Max), None);
        Ok(())
    }

    #[test]
    fn test_errors() {
        let ds = depts();
        let err = compute(&ds, "team", None, &DEFAULT_OPERATIONS).unwrap_err();
        assert_eq!(err.kind(), "ColumnNotFoundError");

        let err = parse_operations(&["mean".to_owned(), "mode".to_owned()]).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedOperationError");

        let err = compute(&ds, "dept", Some(&["dept".to_owned()]), &DEFAULT_OPERATIONS)
            .unwrap_err();
        assert_eq!(err.kind(), "NoNumericColumnsError");
    }
}
