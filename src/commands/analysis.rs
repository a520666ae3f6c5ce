use super::{Dispatcher, ToolResponse, render_table, to_data};
use crate::analyser::Recorded;
use crate::analyser::filter::FilterSpec;
use crate::analyser::logic::{AnalysisResult, CorrelationMethod, InsightFocus};
use crate::error::{AnalysisError, OperationFailure};
use crate::history::OperationKind;
use serde::Deserialize;
use serde_json::json;
use std::fmt::Write as _;
use std::sync::Arc;

type Response = Result<ToolResponse, OperationFailure>;

#[derive(Debug, Deserialize)]
struct NameArgs {
    name: String,
}

#[derive(Debug, Deserialize)]
struct StatisticsArgs {
    name: String,
    #[serde(default)]
    columns: Option<Vec<String>>,
    #[serde(default = "default_true")]
    include_percentiles: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct CorrelationArgs {
    name: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct GroupArgs {
    name: String,
    group_by: String,
    #[serde(default)]
    agg_columns: Option<Vec<String>>,
    #[serde(default)]
    operations: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct InsightArgs {
    name: String,
    #[serde(default)]
    focus: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FilterArgs {
    name: String,
    condition: FilterSpec,
    new_name: String,
}

/// Summary line, then the tabular view when the result has one.
fn tabular(result: Recorded<Arc<AnalysisResult>>) -> ToolResponse {
    let mut text = result.value.summary();
    if let Some(table) = result.value.to_table() {
        text.push_str("\n\n");
        text.push_str(&render_table(&table));
    }
    ToolResponse::success(result.sequence_id, text, to_data(result.value.as_ref()))
}

pub fn statistics(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: StatisticsArgs = d.args(OperationKind::Statistics, arguments)?;
    tracing::info!("calculate_statistics called for '{}'", args.name);
    let result = d.analyser().statistics(
        &args.name,
        args.columns.as_deref(),
        args.include_percentiles,
    )?;
    Ok(tabular(result))
}

pub fn correlation(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: CorrelationArgs = d.args(OperationKind::Correlation, arguments)?;
    let method = match args.method.as_deref() {
        None => CorrelationMethod::Pearson,
        Some(name) => CorrelationMethod::from_name(name).ok_or_else(|| {
            d.reject(
                OperationKind::Correlation,
                arguments,
                AnalysisError::InvalidArgument(format!(
                    "unknown correlation method '{name}' (expected pearson, spearman or kendall)"
                )),
            )
        })?,
    };
    tracing::info!("find_correlations called for '{}' ({method})", args.name);
    let result = d.analyser().correlation(&args.name, method, args.threshold)?;

    let mut text = result.value.summary();
    if let Some(report) = result.value.as_correlation() {
        if report.pairs.is_empty() {
            let _ = write!(
                text,
                "\n\nNo pairs reach |r| >= {}.",
                report.threshold
            );
        } else {
            text.push_str("\n\n");
            for p in &report.pairs {
                let _ = writeln!(
                    text,
                    "- {} / {}: {:.4} ({})",
                    p.column_a,
                    p.column_b,
                    p.coefficient,
                    p.strength.label()
                );
            }
        }
    }
    Ok(ToolResponse::success(
        result.sequence_id,
        text,
        to_data(result.value.as_ref()),
    ))
}

pub fn group(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: GroupArgs = d.args(OperationKind::GroupBy, arguments)?;
    tracing::info!(
        "group_analysis called for '{}' grouped by '{}'",
        args.name,
        args.group_by
    );
    let result = d.analyser().group(
        &args.name,
        &args.group_by,
        args.agg_columns.as_deref(),
        args.operations.as_deref(),
    )?;
    Ok(tabular(result))
}

pub fn quality(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: NameArgs = d.args(OperationKind::Quality, arguments)?;
    let result = d.analyser().quality(&args.name)?;

    let mut text = result.value.summary();
    if let Some(report) = result.value.as_quality() {
        if let Some(table) = result.value.to_table() {
            text.push_str("\n\n");
            text.push_str(&render_table(&table));
        }
        if !report.issues.is_empty() {
            text.push_str("\nIssues:\n");
            for issue in &report.issues {
                let _ = writeln!(text, "- {}", issue.message);
            }
        }
    }
    Ok(ToolResponse::success(
        result.sequence_id,
        text,
        to_data(result.value.as_ref()),
    ))
}

pub fn insights(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: InsightArgs = d.args(OperationKind::Insights, arguments)?;
    let focus = match args.focus.as_deref() {
        None => InsightFocus::default(),
        Some(name) => InsightFocus::from_name(name).ok_or_else(|| {
            d.reject(
                OperationKind::Insights,
                arguments,
                AnalysisError::InvalidArgument(format!(
                    "unknown focus '{name}' (expected overview, outliers, patterns, recommendations or all)"
                )),
            )
        })?,
    };
    let result = d.analyser().insights(&args.name, focus)?;

    let mut text = format!("Insights for '{}' ({focus}):\n", args.name);
    if let Some(report) = result.value.as_insights() {
        for insight in &report.insights {
            let _ = writeln!(text, "- [{}] {}", insight.section, insight.message);
        }
    }
    Ok(ToolResponse::success(
        result.sequence_id,
        text,
        to_data(result.value.as_ref()),
    ))
}

pub fn filter(d: &Dispatcher, arguments: &serde_json::Value) -> Response {
    let args: FilterArgs = d.args(OperationKind::Filter, arguments)?;
    tracing::info!(
        "filter_data called: '{}' -> '{}'",
        args.name,
        args.new_name
    );
    let out = d
        .analyser()
        .filter(&args.name, &args.condition, &args.new_name)?;
    let o = &out.value;

    let mut text = format!(
        "Filtered '{}' with `{}`: kept {} of {} rows as '{}'.",
        args.name, o.condition, o.rows_kept, o.rows_in, args.new_name
    );
    if o.rows_failed > 0 {
        let _ = write!(
            text,
            " {} row(s) were excluded because the condition could not be evaluated ({}).",
            o.rows_failed,
            o.first_row_error.as_deref().unwrap_or_default()
        );
    }
    if o.self_overwrite {
        text.push_str(" The parent dataset was replaced by the filtered rows.");
    }

    Ok(ToolResponse::success(
        out.sequence_id,
        text,
        json!({
            "dataset": to_data(&o.registered.dataset.summary()),
            "condition": o.condition,
            "rows_in": o.rows_in,
            "rows_kept": o.rows_kept,
            "rows_failed": o.rows_failed,
            "first_row_error": o.first_row_error,
            "replaced": o.registered.replaced,
            "self_overwrite": o.self_overwrite,
        }),
    ))
}
