//! Parse raw CSV/JSON bytes into a [`Dataset`].
//!
//! The engine never touches the filesystem: callers hand over bytes that the
//! file-access layer already read.

use super::dataset::{Dataset, SourceDescriptor, SourceFormat, Value};
use crate::error::{AnalysisError, Result, ResultExt as _};

/// Options for a single load.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub format: SourceFormat,
    pub delimiter: u8,
    pub max_rows: usize,
    /// Label of where the bytes came from (usually a path)
    pub origin: Option<String>,
}

impl LoadOptions {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            delimiter: b',',
            max_rows: usize::MAX,
            origin: None,
        }
    }
}

pub fn load_dataset(name: &str, bytes: &[u8], opts: &LoadOptions) -> Result<Dataset> {
    let (columns, rows) = match opts.format {
        SourceFormat::Csv => parse_csv(bytes, opts.delimiter, opts.max_rows)
            .context("Failed to parse CSV")?,
        SourceFormat::Json => parse_json(bytes, opts.max_rows).context("Failed to parse JSON")?,
    };

    let source = SourceDescriptor::Loaded {
        format: opts.format,
        origin: opts.origin.clone(),
    };
    Dataset::new(name, columns, rows, source)
}

fn check_row_limit(rows: usize, max_rows: usize) -> Result<()> {
    if rows > max_rows {
        return Err(AnalysisError::LimitExceeded {
            what: "rows per load",
            limit: max_rows,
        });
    }
    Ok(())
}

fn parse_csv(bytes: &[u8], delimiter: u8, max_rows: usize) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(bytes);

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(AnalysisError::MalformedInput("no header row".to_owned()));
    }
    let columns: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = h.trim();
            if h.is_empty() { format!("Unnamed: {i}") } else { h.to_owned() }
        })
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        check_row_limit(rows.len() + 1, max_rows)?;
        rows.push(record.iter().map(Value::parse_cell).collect());
    }

    Ok((columns, rows))
}

fn parse_json(bytes: &[u8], max_rows: usize) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let root: serde_json::Value = serde_json::from_slice(bytes)?;
    match root {
        serde_json::Value::Array(records) => parse_json_records(&records, max_rows),
        serde_json::Value::Object(columns) => parse_json_columns(&columns, max_rows),
        _ => Err(AnalysisError::MalformedInput(
            "expected an array of records or an object of columns".to_owned(),
        )),
    }
}

/// `[{"a": 1, "b": "x"}, ...]`; keys missing from a record become missing values.
fn parse_json_records(
    records: &[serde_json::Value],
    max_rows: usize,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    check_row_limit(records.len(), max_rows)?;

    let mut columns: Vec<String> = Vec::new();
    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec.as_object().ok_or_else(|| {
            AnalysisError::MalformedInput(format!("record {} is not a JSON object", i + 1))
        })?;
        for key in obj.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let rows = objects
        .into_iter()
        .map(|obj| {
            columns
                .iter()
                .map(|c| obj.get(c).map_or(Value::Missing, Value::from_json))
                .collect()
        })
        .collect();

    Ok((columns, rows))
}

/// `{"a": [1, 2], "b": ["x", "y"]}`; every column must have the same length.
fn parse_json_columns(
    object: &serde_json::Map<String, serde_json::Value>,
    max_rows: usize,
) -> Result<(Vec<String>, Vec<Vec<Value>>)> {
    let mut columns = Vec::with_capacity(object.len());
    let mut data: Vec<&Vec<serde_json::Value>> = Vec::with_capacity(object.len());
    for (name, values) in object {
        let values = values.as_array().ok_or_else(|| {
            AnalysisError::MalformedInput(format!("column '{name}' is not a JSON array"))
        })?;
        columns.push(name.clone());
        data.push(values);
    }

    let height = data.first().map_or(0, |d| d.len());
    if let Some((name, col)) = columns.iter().zip(&data).find(|(_, d)| d.len() != height) {
        return Err(AnalysisError::MalformedInput(format!(
            "column '{name}' has {} values, expected {height}",
            col.len()
        )));
    }
    check_row_limit(height, max_rows)?;

    let rows = (0..height)
        .map(|r| {
            data.iter()
                .map(|col| col.get(r).map_or(Value::Missing, Value::from_json))
                .collect()
        })
        .collect();

    Ok((columns, rows))
}
