//! Immutable in-memory tables.
//!
//! A [`Dataset`] is built once (by a loader or by the filter engine) and never
//! mutated afterwards; the registry hands out `Arc<Dataset>` snapshots so
//! readers need no lock while they compute.

use crate::error::{AnalysisError, Result};
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

/// Tokens read as a missing value when parsing text cells.
const MISSING_TOKENS: [&str; 9] = ["", "na", "n/a", "nan", "null", "none", "nil", "-", "#n/a"];

/// A single typed cell.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Missing,
    Number(f64),
    Text(String),
    Bool(bool),
}

impl Value {
    /// Numeric value; NaN is folded into [`Value::Missing`].
    pub fn number(v: f64) -> Self {
        if v.is_nan() { Self::Missing } else { Self::Number(v) }
    }

    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    /// Infer the type of a raw text cell (CSV).
    pub fn parse_cell(raw: &str) -> Self {
        let trimmed = raw.trim();
        let lower = trimmed.to_ascii_lowercase();
        if MISSING_TOKENS.contains(&lower.as_str()) {
            return Self::Missing;
        }
        match lower.as_str() {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        match trimmed.parse::<f64>() {
            Ok(v) if v.is_finite() => Self::Number(v),
            _ => Self::Text(raw.to_owned()),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Missing,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n.as_f64().map_or(Self::Missing, Self::number),
            serde_json::Value::String(s) => Self::Text(s.clone()),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Self::Text(nested.to_string())
            }
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Self::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ColumnKind> {
        match self {
            Self::Missing => None,
            Self::Number(_) => Some(ColumnKind::Numeric),
            Self::Text(_) => Some(ColumnKind::Text),
            Self::Bool(_) => Some(ColumnKind::Boolean),
        }
    }

    /// Hashable identity of the value, used for grouping and duplicate checks.
    pub fn key(&self) -> ValueKey {
        match self {
            Self::Missing => ValueKey::Missing,
            // -0.0 and 0.0 are the same group
            Self::Number(v) => ValueKey::Number(if *v == 0.0 { 0.0_f64.to_bits() } else { v.to_bits() }),
            Self::Text(s) => ValueKey::Text(s.clone()),
            Self::Bool(b) => ValueKey::Bool(*b),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Missing => serde_json::Value::Null,
            Self::Number(v) => serde_json::Number::from_f64(*v)
                .map_or(serde_json::Value::Null, serde_json::Value::Number),
            Self::Text(s) => serde_json::Value::String(s.clone()),
            Self::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => Ok(()),
            Self::Number(v) => write!(f, "{}", crate::utils::fmt_number(*v)),
            Self::Text(s) => f.write_str(s),
            Self::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Missing => serializer.serialize_none(),
            Self::Number(v) => serializer.serialize_f64(*v),
            Self::Text(s) => serializer.serialize_str(s),
            Self::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// Hash/Eq identity of a [`Value`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Missing,
    Number(u64),
    Text(String),
    Bool(bool),
}

/// Inferred type of a column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ColumnKind {
    Numeric,
    Text,
    Boolean,
    /// Non-missing values of more than one type
    Mixed,
    /// Every value is missing
    Empty,
}

impl ColumnKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Numeric => "Numeric",
            Self::Text => "Text",
            Self::Boolean => "Boolean",
            Self::Mixed => "Mixed",
            Self::Empty => "Empty",
        }
    }

    pub fn is_numeric(&self) -> bool {
        *self == Self::Numeric
    }

    /// Fold the types observed in a column into a single kind.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut seen: Option<Self> = None;
        for kind in values.into_iter().filter_map(Value::kind) {
            match seen {
                None => seen = Some(kind),
                Some(prev) if prev == kind => {}
                Some(_) => return Self::Mixed,
            }
        }
        seen.unwrap_or(Self::Empty)
    }
}

impl fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

/// Where the raw bytes of a load came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Json,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    /// Guess the format from a file name's extension.
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = std::path::Path::new(path)
            .extension()
            .and_then(|e| e.to_str())?
            .to_ascii_lowercase();
        match ext.as_str() {
            "csv" | "tsv" | "txt" => Some(Self::Csv),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How a dataset was produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceDescriptor {
    Loaded {
        format: SourceFormat,
        origin: Option<String>,
    },
    Filtered {
        parent: String,
        condition: String,
    },
}

impl fmt::Display for SourceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded { format, origin } => match origin {
                Some(o) => write!(f, "loaded from {o} ({})", format.as_str()),
                None => write!(f, "loaded from {} bytes", format.as_str()),
            },
            Self::Filtered { parent, condition } => {
                write!(f, "filtered from '{parent}' where {condition}")
            }
        }
    }
}

/// A named, immutable table.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    pub id: Uuid,
    pub name: String,
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<Value>>,
    pub created_at: DateTime<Utc>,
    pub source: SourceDescriptor,
    pub approx_memory_bytes: usize,
}

impl Dataset {
    /// Build a dataset, inferring each column's kind from its values.
    ///
    /// Every row must have exactly one value per column and column names must
    /// be unique.
    pub fn new(
        name: impl Into<String>,
        column_names: Vec<String>,
        rows: Vec<Vec<Value>>,
        source: SourceDescriptor,
    ) -> Result<Self> {
        let mut seen = HashSet::new();
        for col in &column_names {
            if !seen.insert(col.as_str()) {
                return Err(AnalysisError::MalformedInput(format!(
                    "duplicate column name '{col}'"
                )));
            }
        }
        check_row_widths(column_names.len(), &rows)?;

        let columns = column_names
            .into_iter()
            .enumerate()
            .map(|(idx, name)| Column {
                kind: ColumnKind::infer(rows.iter().filter_map(|r| r.get(idx))),
                name,
            })
            .collect();

        Ok(Self::assemble(name.into(), columns, rows, source))
    }

    /// Build a dataset that shares this one's schema (no re-inference).
    pub fn derive(
        &self,
        name: impl Into<String>,
        rows: Vec<Vec<Value>>,
        source: SourceDescriptor,
    ) -> Result<Self> {
        check_row_widths(self.columns.len(), &rows)?;
        Ok(Self::assemble(name.into(), self.columns.clone(), rows, source))
    }

    fn assemble(
        name: String,
        columns: Vec<Column>,
        rows: Vec<Vec<Value>>,
        source: SourceDescriptor,
    ) -> Self {
        let approx_memory_bytes = estimate_memory(&columns, &rows);
        Self {
            id: Uuid::new_v4(),
            name,
            columns,
            rows,
            created_at: Utc::now(),
            source,
            approx_memory_bytes,
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Indices of the columns inferred as numeric, in column order.
    pub fn numeric_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.kind.is_numeric())
            .map(|(i, _)| i)
            .collect()
    }

    /// All values of one column, top to bottom.
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> + '_ {
        self.rows.iter().filter_map(move |r| r.get(idx))
    }

    /// Non-missing numeric values of a column and the number of missing ones.
    pub fn numeric_values(&self, idx: usize) -> (Vec<f64>, usize) {
        let mut values = Vec::with_capacity(self.rows.len());
        let mut missing = 0;
        for v in self.column_values(idx) {
            match v.as_f64() {
                Some(x) => values.push(x),
                None => missing += 1,
            }
        }
        (values, missing)
    }

    pub fn record(&self, row: usize) -> Option<Record<'_>> {
        self.rows.get(row).map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    pub fn summary(&self) -> DatasetSummary {
        DatasetSummary {
            name: self.name.clone(),
            rows: self.row_count(),
            columns: self.column_count(),
            column_names: self.column_names(),
            created_at: self.created_at,
            source: self.source.clone(),
            approx_memory_bytes: self.approx_memory_bytes,
        }
    }
}

fn check_row_widths(width: usize, rows: &[Vec<Value>]) -> Result<()> {
    if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != width) {
        return Err(AnalysisError::MalformedInput(format!(
            "row {} has {} values but the dataset has {width} columns",
            i + 1,
            row.len()
        )));
    }
    Ok(())
}

fn estimate_memory(columns: &[Column], rows: &[Vec<Value>]) -> usize {
    let header: usize = columns
        .iter()
        .map(|c| std::mem::size_of::<Column>() + c.name.len())
        .sum();
    let cells: usize = rows
        .iter()
        .map(|r| {
            std::mem::size_of::<Vec<Value>>()
                + r.iter()
                    .map(|v| {
                        std::mem::size_of::<Value>()
                            + match v {
                                Value::Text(s) => s.capacity(),
                                _ => 0,
                            }
                    })
                    .sum::<usize>()
        })
        .sum();
    header + cells
}

/// Borrowed view of one row, addressable by column name.
#[derive(Clone, Copy, Debug)]
pub struct Record<'a> {
    columns: &'a [Column],
    values: &'a [Value],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a Value> {
        let idx = self.columns.iter().position(|c| c.name == column)?;
        self.values.get(idx)
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }

    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .columns
            .iter()
            .zip(self.values)
            .map(|(c, v)| (c.name.clone(), v.to_json()))
            .collect();
        serde_json::Value::Object(map)
    }
}

/// Lightweight description used by registry listings.
#[derive(Clone, Debug, Serialize)]
pub struct DatasetSummary {
    pub name: String,
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub source: SourceDescriptor,
    pub approx_memory_bytes: usize,
}
