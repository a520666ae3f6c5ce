use super::{Dispatcher, ToolResponse, to_data};
use crate::analyser::LoadRequest;
use crate::analyser::dataset::{DatasetSummary, SourceFormat};
use crate::error::{AnalysisError, OperationFailure};
use crate::history::OperationKind;
use crate::utils::fmt_number;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;

type Response = Result<ToolResponse, OperationFailure>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LoadArgs {
    name: String,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    format: Option<SourceFormat>,
    #[serde(default)]
    delimiter: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

pub fn load(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: LoadArgs = d.args(OperationKind::Load, arguments)?;
    tracing::info!("load_dataset called for '{}'", args.name);

    let (bytes, origin) = match (&args.file_path, &args.content) {
        (Some(path), None) => {
            let bytes = d
                .files()
                .read(path)
                .map_err(|e| d.reject(OperationKind::Load, arguments, e))?;
            (bytes, Some(path.clone()))
        }
        (None, Some(content)) => (content.clone().into_bytes(), None),
        _ => {
            return Err(d.reject(
                OperationKind::Load,
                arguments,
                AnalysisError::InvalidArgument(
                    "give exactly one of file_path or content".to_owned(),
                ),
            ));
        }
    };

    let format = args
        .format
        .or_else(|| origin.as_deref().and_then(SourceFormat::from_path))
        .unwrap_or(SourceFormat::Csv);
    let delimiter = match args.delimiter.as_deref() {
        Some(text) => Some(parse_delimiter(text).map_err(|e| d.reject(OperationKind::Load, arguments, e))?),
        None if origin.as_deref().is_some_and(|p| p.to_ascii_lowercase().ends_with(".tsv")) => {
            Some(b'\t')
        }
        None => None,
    };

    let request = LoadRequest {
        format,
        delimiter,
        origin,
    };
    let loaded = d.analyser().load(&args.name, &bytes, &request)?;
    let summary = &loaded.value.summary;
    let mut text = format!(
        "Loaded '{}' from {}: {} rows x {} columns ({}).",
        summary.name,
        summary.source,
        summary.rows,
        summary.columns,
        summary.column_names.join(", ")
    );
    if loaded.value.replaced {
        text.push_str(" The previous dataset with this name was replaced.");
    }
    Ok(ToolResponse::success(
        loaded.sequence_id,
        text,
        json!({ "dataset": to_data(summary), "replaced": loaded.value.replaced }),
    ))
}

fn parse_delimiter(text: &str) -> Result<u8, AnalysisError> {
    let text = if text == "\\t" { "\t" } else { text };
    match text.as_bytes() {
        [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
        _ => Err(AnalysisError::InvalidArgument(format!(
            "delimiter must be a single ASCII character, got '{text}'"
        ))),
    }
}

pub fn unload(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: NameArgs = d.args(OperationKind::Unload, arguments)?;
    let removed = d.analyser().unload(&args.name)?;
    Ok(ToolResponse::success(
        removed.sequence_id,
        format!(
            "Unloaded '{}' ({} rows, about {} bytes released).",
            removed.value.name, removed.value.rows, removed.value.approx_memory_bytes
        ),
        to_data(&removed.value),
    ))
}

pub fn list(d: &Dispatcher) -> Response {
    let all = d.analyser().list()?;
    Ok(ToolResponse::success(
        all.sequence_id,
        describe_listing(&all.value),
        to_data(&all.value),
    ))
}

pub(crate) fn describe_listing(all: &[DatasetSummary]) -> String {
    if all.is_empty() {
        return "No datasets are loaded.".to_owned();
    }
    let mut text = format!("{} dataset(s) loaded:\n", all.len());
    for s in all {
        let _ = writeln!(
            text,
            "- {}: {} rows x {} columns, {} (~{} KB)",
            s.name,
            s.rows,
            s.columns,
            s.source,
            fmt_number((s.approx_memory_bytes as f64 / 1024.0).ceil())
        );
    }
    text
}

pub fn exists(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: NameArgs = d.args(OperationKind::Exists, arguments)?;
    let found = d.analyser().exists(&args.name)?;
    let text = if found.value {
        format!("Dataset '{}' is loaded.", args.name)
    } else {
        format!("Dataset '{}' is not loaded.", args.name)
    };
    Ok(ToolResponse::success(
        found.sequence_id,
        text,
        json!({ "name": args.name, "exists": found.value }),
    ))
}

pub fn info(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: NameArgs = d.args(OperationKind::Info, arguments)?;
    let result = d.analyser().info(&args.name)?;
    let text = result
        .value
        .as_info()
        .map(|info| {
            let mut text = format!(
                "Dataset '{}' ({}): {} rows x {} columns, ~{} bytes.\n",
                info.summary.name,
                info.summary.source,
                info.summary.rows,
                info.summary.columns,
                info.summary.approx_memory_bytes
            );
            for c in &info.column_details {
                let _ = writeln!(
                    text,
                    "- {} ({}): {} missing, {} distinct",
                    c.name, c.kind, c.missing, c.distinct
                );
            }
            text
        })
        .unwrap_or_else(|| result.value.summary());
    Ok(ToolResponse::success(
        result.sequence_id,
        text,
        to_data(result.value.as_ref()),
    ))
}
