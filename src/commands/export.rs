use super::{Dispatcher, ToolResponse};
use crate::analyser::ExportTarget;
use crate::error::{AnalysisError, OperationFailure};
use crate::export::ExportFormat;
use crate::history::OperationKind;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExportArgs {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sequence_id: Option<u64>,
    format: String,
    #[serde(default)]
    output_path: Option<String>,
}

pub fn export(d: &Dispatcher, arguments: &serde_json::Value) -> Result<ToolResponse, OperationFailure> {
    let args: ExportArgs = d.args(OperationKind::Export, arguments)?;
    let reject = |msg: String| {
        d.reject(
            OperationKind::Export,
            arguments,
            AnalysisError::InvalidArgument(msg),
        )
    };

    let format = ExportFormat::from_name(&args.format)
        .ok_or_else(|| reject(format!("unknown export format '{}' (expected json, csv or html)", args.format)))?;
    let target = match (args.name, args.sequence_id) {
        (Some(name), None) => ExportTarget::Dataset(name),
        (None, Some(id)) => ExportTarget::Result(id),
        _ => return Err(reject("give exactly one of name or sequence_id".to_owned())),
    };
    tracing::info!("export_analysis called: {:?} as {}", target, format.as_str());

    match args.output_path {
        Some(path) => {
            let write = |dest: &str, bytes: &[u8]| d.files().write(dest, bytes);
            let exported = d.analyser().export_to(&target, format, &path, &write)?;
            let e = &exported.value;
            let written = e.path.as_deref().unwrap_or_else(|| std::path::Path::new(&path));
            Ok(ToolResponse::success(
                exported.sequence_id,
                format!(
                    "Exported {} as {} to {} ({} bytes).",
                    e.description,
                    format.as_str(),
                    written.display(),
                    e.bytes.len()
                ),
                json!({
                    "format": format.as_str(),
                    "path": written.to_string_lossy(),
                    "bytes": e.bytes.len(),
                }),
            ))
        }
        None => {
            let exported = d.analyser().export(&target, format)?;
            let e = &exported.value;
            let content = String::from_utf8_lossy(&e.bytes).into_owned();
            Ok(ToolResponse::success(
                exported.sequence_id,
                format!("Exported {} as {} ({} bytes).", e.description, format.as_str(), e.bytes.len()),
                json!({
                    "format": format.as_str(),
                    "bytes": e.bytes.len(),
                    "content": content,
                }),
            ))
        }
    }
}
