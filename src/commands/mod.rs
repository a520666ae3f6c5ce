//! Tool-call boundary.
//!
//! A transport hands the [`Dispatcher`] an operation name plus a JSON object
//! of named arguments. The dispatcher decodes the arguments into typed
//! structs, calls the matching [`Analyser`] entry point and turns the outcome
//! into a [`ToolResponse`]: readable text plus a structured payload, or a typed
//! failure. Argument errors are recorded in history like any other failure.

pub mod analysis;
pub mod datasets;
pub mod export;
pub mod files;
pub mod resources;

use crate::analyser::Analyser;
use crate::analyser::dataset::Value;
use crate::analyser::logic::Table;
use crate::error::{AnalysisError, FailurePayload, OperationFailure};
use crate::history::OperationKind;
use crate::utils::{fmt_number, fmt_opt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;

pub use files::{FileAccess, FsAccess};

/// One invocation as it arrives from a transport.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default = "empty_object")]
    pub arguments: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

impl ToolCall {
    pub fn new(name: &str, arguments: serde_json::Value) -> Self {
        Self {
            name: name.to_owned(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolResponse {
    Success {
        /// History record of the call
        #[serde(skip_serializing_if = "Option::is_none")]
        sequence_id: Option<u64>,
        text: String,
        data: serde_json::Value,
    },
    Failure(FailurePayload),
}

impl ToolResponse {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Success { text, .. } => text,
            Self::Failure(f) => &f.message,
        }
    }

    pub fn data(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Success { data, .. } => Some(data),
            Self::Failure(_) => None,
        }
    }

    pub fn sequence_id(&self) -> Option<u64> {
        match self {
            Self::Success { sequence_id, .. } => *sequence_id,
            Self::Failure(_) => None,
        }
    }

    /// Failure kind, e.g. `NotFoundError`.
    pub fn error_kind(&self) -> Option<&'static str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(f) => Some(f.kind),
        }
    }

    fn success(sequence_id: u64, text: String, data: serde_json::Value) -> Self {
        Self::Success {
            sequence_id: Some(sequence_id),
            text,
            data,
        }
    }
}

impl From<OperationFailure> for ToolResponse {
    fn from(failure: OperationFailure) -> Self {
        Self::Failure(failure.to_payload())
    }
}

/// Routes tool calls to the analyser.
#[derive(Clone)]
pub struct Dispatcher {
    analyser: Arc<Analyser>,
    files: Arc<dyn FileAccess>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("analyser", &self.analyser)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(analyser: Arc<Analyser>, files: Arc<dyn FileAccess>) -> Self {
        Self { analyser, files }
    }

    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub(crate) fn files(&self) -> &dyn FileAccess {
        self.files.as_ref()
    }

    pub fn dispatch(&self, call: &ToolCall) -> ToolResponse {
        tracing::debug!("dispatching tool call: {}", call.name);
        let Some(op) = OperationKind::from_name(&call.name) else {
            tracing::error!("unknown tool requested: {}", call.name);
            return ToolResponse::Failure(FailurePayload {
                operation: "dispatch",
                dataset: None,
                kind: "InvalidArgumentError",
                message: format!(
                    "unknown tool '{}'; call list_tools for the available ones",
                    call.name
                ),
            });
        };

        let response = match op {
            OperationKind::Load => datasets::load(self, &call.arguments),
            OperationKind::Unload => datasets::unload(self, &call.arguments),
            OperationKind::List => datasets::list(self),
            OperationKind::Exists => datasets::exists(self, &call.arguments),
            OperationKind::Info => datasets::info(self, &call.arguments),
            OperationKind::Statistics => analysis::statistics(self, &call.arguments),
            OperationKind::Correlation => analysis::correlation(self, &call.arguments),
            OperationKind::GroupBy => analysis::group(self, &call.arguments),
            OperationKind::Quality => analysis::quality(self, &call.arguments),
            OperationKind::Insights => analysis::insights(self, &call.arguments),
            OperationKind::Filter => analysis::filter(self, &call.arguments),
            OperationKind::Export => export::export(self, &call.arguments),
        };
        response.unwrap_or_else(ToolResponse::from)
    }

    /// Decode `arguments` for `op`; a decode failure is recorded before it is returned.
    pub(crate) fn args<T: DeserializeOwned>(
        &self,
        op: OperationKind,
        arguments: &serde_json::Value,
    ) -> Result<T, OperationFailure> {
        serde_json::from_value(arguments.clone()).map_err(|e| {
            self.reject(op, arguments, AnalysisError::InvalidArgument(e.to_string()))
        })
    }

    pub(crate) fn reject(
        &self,
        op: OperationKind,
        arguments: &serde_json::Value,
        error: AnalysisError,
    ) -> OperationFailure {
        let dataset = arguments.get("name").and_then(serde_json::Value::as_str);
        self.analyser.reject(op, dataset, arguments.clone(), error)
    }
}

/// One request line of the stdio transport.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    #[serde(default)]
    pub id: serde_json::Value,
    pub method: String,
    #[serde(default = "empty_object")]
    pub params: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

impl Dispatcher {
    /// Answer one transport request. Tool failures travel inside `result`;
    /// `error` is reserved for requests that could not be understood.
    pub fn handle(&self, request: &Request) -> serde_json::Value {
        let outcome: Result<serde_json::Value, AnalysisError> = match request.method.as_str() {
            "list_tools" => Ok(to_data(&list_tools())),
            "call_tool" => serde_json::from_value::<ToolCall>(request.params.clone())
                .map(|call| to_data(&self.dispatch(&call)))
                .map_err(|e| AnalysisError::InvalidArgument(format!("bad call_tool params: {e}"))),
            "list_resources" => resources::list_resources(self).map(|r| to_data(&r)),
            "read_resource" => serde_json::from_value::<ReadResourceParams>(request.params.clone())
                .map_err(|e| AnalysisError::InvalidArgument(format!("bad read_resource params: {e}")))
                .and_then(|p| resources::read_resource(self, &p.uri))
                .map(|c| to_data(&c)),
            other => Err(AnalysisError::InvalidArgument(format!("unknown method '{other}'"))),
        };
        match outcome {
            Ok(result) => serde_json::json!({ "id": request.id, "result": result }),
            Err(e) => {
                tracing::warn!("request {} failed: {e}", request.method);
                serde_json::json!({
                    "id": request.id,
                    "error": { "kind": e.kind(), "message": e.to_string() },
                })
            }
        }
    }
}

/// Serialize a payload; payload types only hold string-keyed maps.
pub(crate) fn to_data<T: Serialize + ?Sized>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::warn!("failed to serialize tool payload: {e}");
        serde_json::Value::Null
    })
}

/// Plain-text rendering of a table, columns padded to a common width.
pub(crate) fn render_table(table: &Table) -> String {
    let cells: Vec<Vec<String>> = table
        .rows
        .iter()
        .map(|row| row.iter().map(cell_text).collect())
        .collect();
    let mut widths: Vec<usize> = table.headers.iter().map(|h| h.chars().count()).collect();
    for row in &cells {
        for (w, c) in widths.iter_mut().zip(row) {
            *w = (*w).max(c.chars().count());
        }
    }

    let mut out = String::new();
    let line = |out: &mut String, row: &[String]| {
        let padded: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(c, &w)| format!("{c:<w$}"))
            .collect();
        let _ = writeln!(out, "{}", padded.join("  ").trim_end());
    };
    line(&mut out, &table.headers);
    let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    line(&mut out, &rule);
    for row in &cells {
        line(&mut out, row);
    }
    out
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Missing => fmt_opt(None),
        Value::Number(v) if v.fract() == 0.0 => fmt_number(*v),
        Value::Number(v) => fmt_opt(Some(*v)),
        other => other.to_string(),
    }
}

/// Description of one argument of a tool.
#[derive(Debug, Clone, Serialize)]
pub struct ArgSpec {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub required: bool,
    pub description: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub arguments: Vec<ArgSpec>,
}

const fn arg(
    name: &'static str,
    kind: &'static str,
    required: bool,
    description: &'static str,
) -> ArgSpec {
    ArgSpec {
        name,
        kind,
        required,
        description,
    }
}

const NAME: ArgSpec = arg("name", "string", true, "Name of a loaded dataset");

/// Every tool the dispatcher understands, in a stable order.
pub fn list_tools() -> Vec<ToolSpec> {
    OperationKind::ALL.into_iter().map(describe).collect()
}

fn describe(op: OperationKind) -> ToolSpec {
    let (description, arguments) = match op {
        OperationKind::Load => (
            "Load a CSV or JSON file (or inline content) and register it under a name",
            vec![
                arg("name", "string", true, "Name to register the dataset under"),
                arg("file_path", "string", false, "File to read; give this or content"),
                arg("content", "string", false, "Inline CSV or JSON text"),
                arg("format", "string", false, "csv or json; inferred from the file extension"),
                arg("delimiter", "string", false, "Single-character CSV delimiter"),
            ],
        ),
        OperationKind::Unload => ("Remove a dataset from the registry", vec![NAME]),
        OperationKind::List => ("List loaded datasets in creation order", vec![]),
        OperationKind::Exists => ("Check whether a dataset name is registered", vec![NAME]),
        OperationKind::Info => (
            "Shape, column types, missing counts and a sample of a dataset",
            vec![NAME],
        ),
        OperationKind::Statistics => (
            "Descriptive statistics for numeric columns",
            vec![
                NAME,
                arg("columns", "string[]", false, "Restrict to these columns"),
                arg("include_percentiles", "boolean", false, "Add 90th and 95th percentiles (default true)"),
            ],
        ),
        OperationKind::Correlation => (
            "Pairwise correlation matrix and the pairs above a threshold",
            vec![
                NAME,
                arg("method", "string", false, "pearson, spearman or kendall (default pearson)"),
                arg("threshold", "number", false, "Minimum absolute coefficient to report a pair"),
            ],
        ),
        OperationKind::GroupBy => (
            "Aggregate numeric columns per distinct value of a column",
            vec![
                NAME,
                arg("group_by", "string", true, "Column whose values define the groups"),
                arg("agg_columns", "string[]", false, "Numeric columns to aggregate (default all)"),
                arg("operations", "string[]", false, "mean, median, count, sum, min, max (default mean, count)"),
            ],
        ),
        OperationKind::Quality => (
            "Missing values, distinct counts, duplicates, issues and a health score",
            vec![NAME],
        ),
        OperationKind::Insights => (
            "Ranked findings about a dataset",
            vec![
                NAME,
                arg("focus", "string", false, "overview, outliers, patterns, recommendations or all"),
            ],
        ),
        OperationKind::Filter => (
            "Keep the rows matching a condition and register them under a new name",
            vec![
                NAME,
                arg("condition", "string | clause[]", true, "Expression such as `age > 30 and dept = \"Sales\"`, or a list of {column, operator, value}"),
                arg("new_name", "string", true, "Name for the filtered dataset"),
            ],
        ),
        OperationKind::Export => (
            "Serialize a dataset or an earlier analysis result as json, csv or html",
            vec![
                arg("name", "string", false, "Dataset to export; give this or sequence_id"),
                arg("sequence_id", "integer", false, "History record whose result to export"),
                arg("format", "string", true, "json, csv or html"),
                arg("output_path", "string", false, "Write the export here instead of returning it"),
            ],
        ),
    };
    ToolSpec {
        name: op.as_str(),
        description,
        arguments,
    }
}
