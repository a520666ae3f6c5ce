//! Dataset registry and analysis engine.
//!
//! [`Analyser`] is the single entry point: it owns the [`DatasetRegistry`] and
//! the [`HistoryTracker`], exposes one method per operation, and wraps every
//! failure in an [`OperationFailure`] after recording it.
//!
//! ```
//! use datalens::analyser::{Analyser, LoadRequest};
//! use datalens::analyser::dataset::SourceFormat;
//! use datalens::config::EngineConfig;
//!
//! let analyser = Analyser::new(EngineConfig::default());
//! let csv = b"dept,salary\nA,10\nA,20\nB,30\n";
//! analyser.load("staff", csv, &LoadRequest::new(SourceFormat::Csv)).unwrap();
//!
//! let stats = analyser.statistics("staff", None, true).unwrap();
//! let report = stats.value.as_statistics().unwrap();
//! assert_eq!(report.columns[0].mean, Some(20.0));
//! assert_eq!(analyser.history().len(), 2);
//! ```

pub mod dataset;
pub mod expr;
pub mod filter;
pub mod io;
pub mod logic;
pub mod registry;

use crate::config::EngineConfig;
use crate::error::{AnalysisError, OperationFailure, Result};
use crate::export::{self, ExportFormat, ExportOptions, ExportSource};
use crate::history::{HistoryRecord, HistoryTracker, NewRecord, OperationKind, Outcome};
use dataset::{DatasetSummary, SourceFormat};
use filter::{FilterOutcome, FilterSpec};
use io::LoadOptions;
use logic::{AnalysisResult, CorrelationMethod, InsightFocus};
use registry::DatasetRegistry;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

/// Result of a facade call: the value plus the history record it produced.
pub type OpResult<T> = std::result::Result<Recorded<T>, OperationFailure>;

#[derive(Debug, Clone)]
pub struct Recorded<T> {
    pub sequence_id: u64,
    pub value: T,
}

/// How to parse the bytes of a load.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub format: SourceFormat,
    /// Falls back to the configured delimiter
    pub delimiter: Option<u8>,
    pub origin: Option<String>,
}

impl LoadRequest {
    pub fn new(format: SourceFormat) -> Self {
        Self {
            format,
            delimiter: None,
            origin: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub summary: DatasetSummary,
    pub replaced: bool,
}

/// What `export` should serialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportTarget {
    Dataset(String),
    /// A result produced earlier, addressed by its history sequence id
    Result(u64),
}

#[derive(Debug, Clone)]
pub struct Exported {
    pub bytes: Vec<u8>,
    pub format: ExportFormat,
    /// What was exported, e.g. `dataset 'sales'`
    pub description: String,
    /// Where the bytes were written, for [`Analyser::export_to`]
    pub path: Option<PathBuf>,
}

/// Writes export bytes to a caller-chosen path and returns where they landed.
pub type WriteFn<'a> = &'a dyn Fn(&str, &[u8]) -> Result<PathBuf>;

/// Successful body of an operation before it is recorded.
struct Done<T> {
    value: T,
    summary: String,
    result: Option<Arc<AnalysisResult>>,
}

impl<T> Done<T> {
    fn new(value: T, summary: impl Into<String>) -> Self {
        Self {
            value,
            summary: summary.into(),
            result: None,
        }
    }
}

impl Done<Arc<AnalysisResult>> {
    fn analysis(result: AnalysisResult) -> Self {
        let result = Arc::new(result);
        Self {
            summary: result.summary(),
            result: Some(Arc::clone(&result)),
            value: result,
        }
    }
}

/// The registry, the engines and the history log behind one handle.
#[derive(Debug)]
pub struct Analyser {
    config: EngineConfig,
    registry: DatasetRegistry,
    history: HistoryTracker,
}

impl Analyser {
    pub fn new(config: EngineConfig) -> Self {
        let registry = DatasetRegistry::new(config.max_datasets, config.max_name_length);
        Self {
            config,
            registry,
            history: HistoryTracker::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &DatasetRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryTracker {
        &self.history
    }

    /// Run `body`, time it, log it and append exactly one history record.
    fn run<T>(
        &self,
        op: OperationKind,
        dataset: Option<&str>,
        parameters: serde_json::Value,
        body: impl FnOnce() -> Result<Done<T>>,
    ) -> OpResult<T> {
        let started = Instant::now();
        let outcome = body();
        let duration = started.elapsed();

        match outcome {
            Ok(done) => {
                tracing::info!(
                    operation = op.as_str(),
                    dataset = dataset.unwrap_or("-"),
                    elapsed_ms = duration.as_millis() as u64,
                    "{}",
                    done.summary
                );
                let sequence_id = self.history.record(NewRecord {
                    operation_kind: op,
                    dataset_name: dataset.map(str::to_owned),
                    parameters,
                    outcome: Outcome::success(done.summary),
                    duration,
                    result: done.result,
                });
                Ok(Recorded {
                    sequence_id,
                    value: done.value,
                })
            }
            Err(error) => Err(self.fail(op, dataset, parameters, error, duration)),
        }
    }

    fn fail(
        &self,
        op: OperationKind,
        dataset: Option<&str>,
        parameters: serde_json::Value,
        error: AnalysisError,
        duration: std::time::Duration,
    ) -> OperationFailure {
        let failure = OperationFailure::new(op, dataset, error);
        tracing::error!(
            operation = op.as_str(),
            kind = failure.kind(),
            "{failure}"
        );
        self.history.record(NewRecord {
            operation_kind: op,
            dataset_name: dataset.map(str::to_owned),
            parameters,
            outcome: Outcome::failure(failure.kind(), failure.error.to_string()),
            duration,
            result: None,
        });
        failure
    }

    /// Record an invocation whose arguments were rejected before it could run.
    pub fn reject(
        &self,
        op: OperationKind,
        dataset: Option<&str>,
        parameters: serde_json::Value,
        error: AnalysisError,
    ) -> OperationFailure {
        self.fail(op, dataset, parameters, error, std::time::Duration::ZERO)
    }

    /// Parse raw bytes and register them under `name`.
    pub fn load(&self, name: &str, bytes: &[u8], request: &LoadRequest) -> OpResult<LoadOutcome> {
        let delimiter = request
            .delimiter
            .unwrap_or_else(|| self.config.csv_delimiter_byte());
        let params = json!({
            "name": name,
            "format": request.format.as_str(),
            "origin": request.origin,
            "delimiter": char::from(delimiter).to_string(),
            "bytes": bytes.len(),
        });
        self.run(OperationKind::Load, Some(name), params, || {
            self.registry.validate_name(name)?;
            let opts = LoadOptions {
                format: request.format,
                delimiter,
                max_rows: self.config.max_rows_per_load,
                origin: request.origin.clone(),
            };
            let parsed = io::load_dataset(name, bytes, &opts)?;
            let registered = self.registry.register(name, parsed)?;
            let summary = registered.dataset.summary();
            let text = format!(
                "loaded {} rows x {} columns{}",
                summary.rows,
                summary.columns,
                if registered.replaced { ", replacing the previous dataset" } else { "" }
            );
            Ok(Done::new(
                LoadOutcome {
                    summary,
                    replaced: registered.replaced,
                },
                text,
            ))
        })
    }

    pub fn unload(&self, name: &str) -> OpResult<DatasetSummary> {
        self.run(OperationKind::Unload, Some(name), json!({ "name": name }), || {
            let removed = self.registry.unload(name)?;
            Ok(Done::new(removed.summary(), format!("unloaded '{name}'")))
        })
    }

    pub fn list(&self) -> OpResult<Vec<DatasetSummary>> {
        self.run(OperationKind::List, None, json!({}), || {
            let all = self.registry.list()?;
            let text = format!("{} dataset(s) loaded", all.len());
            Ok(Done::new(all, text))
        })
    }

    pub fn exists(&self, name: &str) -> OpResult<bool> {
        self.run(OperationKind::Exists, Some(name), json!({ "name": name }), || {
            let found = self.registry.exists(name)?;
            Ok(Done::new(found, if found { "exists" } else { "not loaded" }))
        })
    }

    pub fn info(&self, name: &str) -> OpResult<Arc<AnalysisResult>> {
        self.run(OperationKind::Info, Some(name), json!({ "name": name }), || {
            let ds = self.registry.get(name)?;
            Ok(Done::analysis(AnalysisResult::Info(logic::info::describe(&ds))))
        })
    }

    pub fn statistics(
        &self,
        name: &str,
        columns: Option<&[String]>,
        include_percentiles: bool,
    ) -> OpResult<Arc<AnalysisResult>> {
        let params = json!({
            "name": name,
            "columns": columns,
            "include_percentiles": include_percentiles,
        });
        self.run(OperationKind::Statistics, Some(name), params, || {
            let ds = self.registry.get(name)?;
            let report = logic::statistics::compute(&ds, columns, include_percentiles)?;
            Ok(Done::analysis(AnalysisResult::Statistics(report)))
        })
    }

    /// Pairwise correlation; `threshold` defaults to the configured one.
    pub fn correlation(
        &self,
        name: &str,
        method: CorrelationMethod,
        threshold: Option<f64>,
    ) -> OpResult<Arc<AnalysisResult>> {
        let threshold = threshold.unwrap_or(self.config.default_correlation_threshold);
        let params = json!({
            "name": name,
            "method": method.as_str(),
            "threshold": threshold,
        });
        self.run(OperationKind::Correlation, Some(name), params, || {
            let ds = self.registry.get(name)?;
            let report = logic::correlation::compute(&ds, method, threshold)?;
            Ok(Done::analysis(AnalysisResult::Correlation(report)))
        })
    }

    /// Grouped aggregates; `operations` defaults to mean and count.
    pub fn group(
        &self,
        name: &str,
        group_by: &str,
        agg_columns: Option<&[String]>,
        operations: Option<&[String]>,
    ) -> OpResult<Arc<AnalysisResult>> {
        let params = json!({
            "name": name,
            "group_by": group_by,
            "agg_columns": agg_columns,
            "operations": operations,
        });
        self.run(OperationKind::GroupBy, Some(name), params, || {
            let ops = match operations {
                Some(names) => logic::grouping::parse_operations(names)?,
                None => logic::grouping::DEFAULT_OPERATIONS.to_vec(),
            };
            let ds = self.registry.get(name)?;
            let report = logic::grouping::compute(&ds, group_by, agg_columns, &ops)?;
            Ok(Done::analysis(AnalysisResult::Groups(report)))
        })
    }

    pub fn quality(&self, name: &str) -> OpResult<Arc<AnalysisResult>> {
        self.run(OperationKind::Quality, Some(name), json!({ "name": name }), || {
            let ds = self.registry.get(name)?;
            Ok(Done::analysis(AnalysisResult::Quality(logic::quality::compute(&ds))))
        })
    }

    pub fn insights(&self, name: &str, focus: InsightFocus) -> OpResult<Arc<AnalysisResult>> {
        let params = json!({ "name": name, "focus": focus.as_str() });
        self.run(OperationKind::Insights, Some(name), params, || {
            let ds = self.registry.get(name)?;
            Ok(Done::analysis(AnalysisResult::Insights(logic::insights::generate(&ds, focus))))
        })
    }

    /// Keep the rows of `name` that satisfy `spec` and register them as `new_name`.
    pub fn filter(&self, name: &str, spec: &FilterSpec, new_name: &str) -> OpResult<FilterOutcome> {
        let self_overwrite = name == new_name;
        let condition = match spec {
            FilterSpec::Expression(text) => json!(text),
            FilterSpec::Clauses(clauses) => json!(clauses),
        };
        let mut params = json!({
            "name": name,
            "condition": condition,
            "new_name": new_name,
        });
        if self_overwrite {
            params["self_overwrite"] = json!(true);
            tracing::warn!(
                dataset = name,
                "filter result replaces its own parent dataset"
            );
        }

        self.run(OperationKind::Filter, Some(name), params, || {
            let out = filter::apply(&self.registry, name, spec, new_name)?;
            if out.rows_failed > 0 {
                tracing::warn!(
                    dataset = name,
                    failed = out.rows_failed,
                    first_error = out.first_row_error.as_deref().unwrap_or_default(),
                    "condition failed on some rows; they were excluded"
                );
            }
            let mut text = format!(
                "kept {} of {} rows into '{new_name}'",
                out.rows_kept, out.rows_in
            );
            if out.rows_failed > 0 {
                text.push_str(&format!(", {} row(s) failed to evaluate", out.rows_failed));
            }
            if out.self_overwrite {
                text.push_str(", replacing the parent dataset");
            } else if out.registered.replaced {
                text.push_str(&format!(", replacing the previous '{new_name}'"));
            }
            Ok(Done::new(out, text))
        })
    }

    /// Serialize a dataset or an earlier result. Nothing is recomputed.
    pub fn export(&self, target: &ExportTarget, format: ExportFormat) -> OpResult<Exported> {
        self.export_with(target, format, None)
    }

    /// Like [`Analyser::export`], then hand the bytes to `write` for `output_path`.
    /// A failed write fails the operation, so history records it as a failure.
    pub fn export_to(
        &self,
        target: &ExportTarget,
        format: ExportFormat,
        output_path: &str,
        write: WriteFn<'_>,
    ) -> OpResult<Exported> {
        self.export_with(target, format, Some((output_path, write)))
    }

    fn export_with(
        &self,
        target: &ExportTarget,
        format: ExportFormat,
        destination: Option<(&str, WriteFn<'_>)>,
    ) -> OpResult<Exported> {
        let (dataset, mut params) = match target {
            ExportTarget::Dataset(name) => (
                Some(name.as_str()),
                json!({ "name": name, "format": format.as_str() }),
            ),
            ExportTarget::Result(id) => (
                None,
                json!({ "sequence_id": id, "format": format.as_str() }),
            ),
        };
        if let Some((path, _)) = destination {
            params["output_path"] = json!(path);
        }
        let opts = ExportOptions {
            html_row_limit: self.config.html_row_limit,
            csv_delimiter: self.config.csv_delimiter_byte(),
        };

        self.run(OperationKind::Export, dataset, params, || {
            let (bytes, description) = match target {
                ExportTarget::Dataset(name) => {
                    let ds = self.registry.get(name)?;
                    let bytes = export::export(ExportSource::Dataset(&ds), format, &opts)?;
                    (bytes, format!("dataset '{name}'"))
                }
                ExportTarget::Result(id) => {
                    let result = self.stored_result(*id)?;
                    let bytes = export::export(ExportSource::Result(&result), format, &opts)?;
                    (
                        bytes,
                        format!("{} #{id} of '{}'", result.label(), result.dataset()),
                    )
                }
            };
            let mut text = format!("exported {description} as {} ({} bytes)", format.as_str(), bytes.len());
            let path = match destination {
                Some((output_path, write)) => {
                    let written = write(output_path, &bytes)?;
                    text.push_str(&format!(" to {}", written.display()));
                    Some(written)
                }
                None => None,
            };
            Ok(Done::new(
                Exported {
                    bytes,
                    format,
                    description,
                    path,
                },
                text,
            ))
        })
    }

    fn stored_result(&self, sequence_id: u64) -> Result<Arc<AnalysisResult>> {
        let record = self.history.get(sequence_id).ok_or_else(|| {
            AnalysisError::InvalidArgument(format!("no history record #{sequence_id}"))
        })?;
        record.result.ok_or_else(|| {
            AnalysisError::InvalidArgument(format!(
                "history record #{sequence_id} ({}) holds no analysis result",
                record.operation_kind
            ))
        })
    }

    /// History records, newest last. Reading history is not itself recorded.
    pub fn history_records(
        &self,
        limit: Option<usize>,
        kind: Option<OperationKind>,
    ) -> Vec<HistoryRecord> {
        self.history.list(limit, kind)
    }
}

impl Default for Analyser {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
