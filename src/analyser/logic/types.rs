use crate::analyser::dataset::{ColumnKind, DatasetSummary, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Output of any analysis engine.
///
/// Results are never stored in the registry; the history tracker keeps a
/// shared reference so a result can be exported after the fact.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum AnalysisResult {
    Statistics(StatisticsReport),
    Correlation(CorrelationReport),
    Groups(GroupReport),
    Quality(QualityReport),
    Insights(InsightReport),
    Info(DatasetInfo),
}

impl AnalysisResult {
    pub fn dataset(&self) -> &str {
        match self {
            Self::Statistics(r) => &r.dataset,
            Self::Correlation(r) => &r.dataset,
            Self::Groups(r) => &r.dataset,
            Self::Quality(r) => &r.dataset,
            Self::Insights(r) => &r.dataset,
            Self::Info(r) => &r.summary.name,
        }
    }

    /// Short human-readable description, used for history outcomes.
    pub fn summary(&self) -> String {
        match self {
            Self::Statistics(r) => format!(
                "statistics for {} numeric column(s){}",
                r.columns.len(),
                if r.skipped.is_empty() {
                    String::new()
                } else {
                    format!(", skipped {}", r.skipped.join(", "))
                }
            ),
            Self::Correlation(r) => format!(
                "{} correlation over {} columns, {} pair(s) with |r| >= {}",
                r.method,
                r.columns.len(),
                r.pairs.len(),
                r.threshold
            ),
            Self::Groups(r) => format!(
                "{} group(s) by '{}' over {} column(s)",
                r.groups.len(),
                r.group_by,
                r.agg_columns.len()
            ),
            Self::Quality(r) => format!(
                "{} issue(s), {} duplicate row(s), health score {:.2}",
                r.issues.len(),
                r.duplicate_rows,
                r.health_score
            ),
            Self::Insights(r) => format!("{} insight(s), focus {}", r.insights.len(), r.focus),
            Self::Info(r) => format!(
                "{} rows x {} columns",
                r.summary.rows, r.summary.columns
            ),
        }
    }

    /// Row/column view for CSV and HTML export; `None` when the result has no
    /// tabular shape.
    pub fn to_table(&self) -> Option<Table> {
        match self {
            Self::Statistics(r) => Some(r.to_table()),
            Self::Correlation(r) => Some(r.to_table()),
            Self::Groups(r) => Some(r.to_table()),
            Self::Quality(r) => Some(r.to_table()),
            Self::Insights(r) => Some(r.to_table()),
            Self::Info(_) => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Statistics(_) => "statistics",
            Self::Correlation(_) => "correlation analysis",
            Self::Groups(_) => "group analysis",
            Self::Quality(_) => "quality report",
            Self::Insights(_) => "insights",
            Self::Info(_) => "dataset info",
        }
    }

    pub fn as_statistics(&self) -> Option<&StatisticsReport> {
        match self {
            Self::Statistics(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_correlation(&self) -> Option<&CorrelationReport> {
        match self {
            Self::Correlation(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_groups(&self) -> Option<&GroupReport> {
        match self {
            Self::Groups(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_quality(&self) -> Option<&QualityReport> {
        match self {
            Self::Quality(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_insights(&self) -> Option<&InsightReport> {
        match self {
            Self::Insights(r) => Some(r),
            _ => None,
        }
    }

    pub fn as_info(&self) -> Option<&DatasetInfo> {
        match self {
            Self::Info(r) => Some(r),
            _ => None,
        }
    }
}

/// Headers plus rows of cells.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

fn opt(v: Option<f64>) -> Value {
    v.map_or(Value::Missing, Value::number)
}

fn count(n: usize) -> Value {
    Value::Number(n as f64)
}

// Statistics

#[derive(Clone, Debug, Serialize)]
pub struct NumericSummary {
    pub column: String,
    pub count: usize,
    pub missing: usize,
    pub mean: Option<f64>,
    /// Sample standard deviation; undefined below two values
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p90: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p95: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct StatisticsReport {
    pub dataset: String,
    pub include_percentiles: bool,
    pub columns: Vec<NumericSummary>,
    /// Requested columns that were absent or not numeric
    pub skipped: Vec<String>,
}

impl StatisticsReport {
    pub fn column(&self, name: &str) -> Option<&NumericSummary> {
        self.columns.iter().find(|c| c.column == name)
    }

    fn to_table(&self) -> Table {
        let mut headers: Vec<String> = [
            "column", "count", "missing", "mean", "std", "min", "25%", "50%", "75%", "max",
        ]
        .map(str::to_owned)
        .to_vec();
        if self.include_percentiles {
            headers.extend(["90%".to_owned(), "95%".to_owned()]);
        }
        let rows = self
            .columns
            .iter()
            .map(|s| {
                let mut row = vec![
                    Value::text(s.column.as_str()),
                    count(s.count),
                    count(s.missing),
                    opt(s.mean),
                    opt(s.std_dev),
                    opt(s.min),
                    opt(s.q25),
                    opt(s.median),
                    opt(s.q75),
                    opt(s.max),
                ];
                if self.include_percentiles {
                    row.extend([opt(s.p90), opt(s.p95)]);
                }
                row
            })
            .collect();
        Table { headers, rows }
    }
}

// Correlation

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrelationMethod {
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "pearson" => Some(Self::Pearson),
            "spearman" => Some(Self::Spearman),
            "kendall" => Some(Self::Kendall),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pearson => "pearson",
            Self::Spearman => "spearman",
            Self::Kendall => "kendall",
        }
    }
}

impl fmt::Display for CorrelationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strength {
    VeryStrong,
    Strong,
    Moderate,
    Weak,
    Negligible,
}

impl Strength {
    /// Band on the absolute coefficient.
    pub fn of(coefficient: f64) -> Self {
        let r = coefficient.abs();
        if r >= 0.8 {
            Self::VeryStrong
        } else if r >= 0.6 {
            Self::Strong
        } else if r >= 0.4 {
            Self::Moderate
        } else if r >= 0.2 {
            Self::Weak
        } else {
            Self::Negligible
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::VeryStrong => "very strong",
            Self::Strong => "strong",
            Self::Moderate => "moderate",
            Self::Weak => "weak",
            Self::Negligible => "negligible",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct CorrelationPair {
    pub column_a: String,
    pub column_b: String,
    pub coefficient: f64,
    pub strength: Strength,
}

#[derive(Clone, Debug, Serialize)]
pub struct CorrelationReport {
    pub dataset: String,
    pub method: CorrelationMethod,
    pub threshold: f64,
    pub columns: Vec<String>,
    /// Symmetric, diagonal 1.0; `None` where undefined (zero variance)
    pub matrix: Vec<Vec<Option<f64>>>,
    /// Pairs with |r| >= threshold, strongest first
    pub pairs: Vec<CorrelationPair>,
}

impl CorrelationReport {
    pub fn coefficient(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.matrix.get(i)?.get(j).copied().flatten()
    }

    fn to_table(&self) -> Table {
        let mut headers = vec!["column".to_owned()];
        headers.extend(self.columns.iter().cloned());
        let rows = self
            .columns
            .iter()
            .zip(&self.matrix)
            .map(|(name, row)| {
                let mut cells = vec![Value::text(name.as_str())];
                cells.extend(row.iter().map(|v| opt(*v)));
                cells
            })
            .collect();
        Table { headers, rows }
    }
}

// Grouping

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggOp {
    Mean,
    Median,
    Count,
    Sum,
    Min,
    Max,
}

impl AggOp {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "mean" => Some(Self::Mean),
            "median" => Some(Self::Median),
            "count" => Some(Self::Count),
            "sum" => Some(Self::Sum),
            "min" => Some(Self::Min),
            "max" => Some(Self::Max),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Count => "count",
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Aggregate {
    pub column: String,
    pub operation: AggOp,
    pub value: Option<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupRow {
    pub key: Value,
    /// Records in the group, missing values included
    pub rows: usize,
    pub aggregates: Vec<Aggregate>,
}

impl GroupRow {
    pub fn get(&self, column: &str, operation: AggOp) -> Option<f64> {
        self.aggregates
            .iter()
            .find(|a| a.column == column && a.operation == operation)
            .and_then(|a| a.value)
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct GroupReport {
    pub dataset: String,
    pub group_by: String,
    pub agg_columns: Vec<String>,
    pub operations: Vec<AggOp>,
    /// In order of first occurrence
    pub groups: Vec<GroupRow>,
    pub skipped: Vec<String>,
}

impl GroupReport {
    pub fn group(&self, key: &Value) -> Option<&GroupRow> {
        let key = key.key();
        self.groups.iter().find(|g| g.key.key() == key)
    }

    fn to_table(&self) -> Table {
        let mut headers = vec![self.group_by.clone(), "rows".to_owned()];
        for col in &self.agg_columns {
            for op in &self.operations {
                headers.push(format!("{col}_{}", op.as_str()));
            }
        }
        let rows = self
            .groups
            .iter()
            .map(|g| {
                let mut cells = vec![g.key.clone(), count(g.rows)];
                cells.extend(g.aggregates.iter().map(|a| opt(a.value)));
                cells
            })
            .collect();
        Table { headers, rows }
    }
}

// Quality

#[derive(Clone, Debug, Serialize)]
pub struct ColumnQuality {
    pub column: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub missing_pct: f64,
    pub distinct: usize,
    /// Non-missing values of more than one type
    pub type_conflict: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    HighMissing,
    SingleValue,
    AllUnique,
    MixedTypes,
    DuplicateRows,
}

#[derive(Clone, Debug, Serialize)]
pub struct QualityIssue {
    pub kind: IssueKind,
    pub column: Option<String>,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct QualityReport {
    pub dataset: String,
    pub rows: usize,
    pub columns: Vec<ColumnQuality>,
    pub duplicate_rows: usize,
    pub duplicate_pct: f64,
    pub issues: Vec<QualityIssue>,
    /// 0 (unusable) to 1 (clean)
    pub health_score: f64,
}

impl QualityReport {
    pub fn column(&self, name: &str) -> Option<&ColumnQuality> {
        self.columns.iter().find(|c| c.column == name)
    }

    fn to_table(&self) -> Table {
        let headers = ["column", "type", "missing", "missing_pct", "distinct", "type_conflict"]
            .map(str::to_owned)
            .to_vec();
        let rows = self
            .columns
            .iter()
            .map(|c| {
                vec![
                    Value::text(c.column.as_str()),
                    Value::text(c.kind.as_str()),
                    count(c.missing),
                    Value::number(c.missing_pct),
                    count(c.distinct),
                    Value::Bool(c.type_conflict),
                ]
            })
            .collect();
        Table { headers, rows }
    }
}

// Insights

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InsightFocus {
    #[default]
    Overview,
    Outliers,
    Patterns,
    Recommendations,
    All,
}

impl InsightFocus {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "overview" => Some(Self::Overview),
            "outliers" => Some(Self::Outliers),
            "patterns" => Some(Self::Patterns),
            "recommendations" => Some(Self::Recommendations),
            "all" => Some(Self::All),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Overview => "overview",
            Self::Outliers => "outliers",
            Self::Patterns => "patterns",
            Self::Recommendations => "recommendations",
            Self::All => "all",
        }
    }

    pub fn includes(self, section: Self) -> bool {
        self == Self::All || self == section
    }
}

impl fmt::Display for InsightFocus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct Insight {
    /// Section that produced the finding
    pub section: InsightFocus,
    pub column: Option<String>,
    /// Ranking weight in [0, 1]
    pub severity: f64,
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct InsightReport {
    pub dataset: String,
    pub focus: InsightFocus,
    /// Ranked by severity, most severe first
    pub insights: Vec<Insight>,
}

impl InsightReport {
    fn to_table(&self) -> Table {
        let headers = ["rank", "section", "column", "severity", "finding"]
            .map(str::to_owned)
            .to_vec();
        let rows = self
            .insights
            .iter()
            .enumerate()
            .map(|(i, ins)| {
                vec![
                    count(i + 1),
                    Value::text(ins.section.as_str()),
                    ins.column.as_deref().map_or(Value::Missing, Value::text),
                    Value::number(ins.severity),
                    Value::text(ins.message.as_str()),
                ]
            })
            .collect();
        Table { headers, rows }
    }
}

// Info

#[derive(Clone, Debug, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
    pub distinct: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct DatasetInfo {
    #[serde(flatten)]
    pub summary: DatasetSummary,
    pub column_details: Vec<ColumnInfo>,
    /// First records, keyed by column name
    pub sample: Vec<serde_json::Value>,
}
