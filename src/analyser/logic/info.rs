use super::quality::distinct_count;
use super::types::{ColumnInfo, DatasetInfo};
use crate::analyser::dataset::Dataset;

pub const SAMPLE_ROWS: usize = 5;

/// Shape, per-column profile and the first few records of a dataset.
pub fn describe(dataset: &Dataset) -> DatasetInfo {
    let column_details = dataset
        .columns
        .iter()
        .enumerate()
        .map(|(idx, col)| ColumnInfo {
            name: col.name.clone(),
            kind: col.kind,
            missing: dataset.column_values(idx).filter(|v| v.is_missing()).count(),
            distinct: distinct_count(dataset.column_values(idx)),
        })
        .collect();

    let sample = (0..dataset.row_count().min(SAMPLE_ROWS))
        .filter_map(|i| dataset.record(i))
        .map(|r| r.to_json())
        .collect();

    DatasetInfo {
        summary: dataset.summary(),
        column_details,
        sample,
    }
}
