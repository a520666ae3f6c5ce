//! Serialization of datasets and analysis results to JSON, CSV and HTML.
//!
//! Export never recomputes anything: it writes exactly the value it is handed
//! and returns the bytes. Writing them somewhere is the caller's business.

use crate::analyser::dataset::{Dataset, Value};
use crate::analyser::logic::AnalysisResult;
use crate::error::{AnalysisError, Result, ResultExt as _};
use crate::utils::html_escape;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Html,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "csv" => Some(Self::Csv),
            "html" | "htm" => Some(Self::Html),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Csv => "csv",
            Self::Html => "html",
        }
    }
}

/// What to export.
#[derive(Clone, Copy, Debug)]
pub enum ExportSource<'a> {
    Dataset(&'a Dataset),
    Result(&'a AnalysisResult),
}

#[derive(Clone, Debug)]
pub struct ExportOptions {
    /// Maximum dataset rows rendered into HTML
    pub html_row_limit: usize,
    pub csv_delimiter: u8,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            html_row_limit: 500,
            csv_delimiter: b',',
        }
    }
}

pub fn export(source: ExportSource<'_>, format: ExportFormat, opts: &ExportOptions) -> Result<Vec<u8>> {
    match (format, source) {
        (ExportFormat::Json, ExportSource::Dataset(ds)) => {
            serde_json::to_vec_pretty(&dataset_json(ds)).context("Failed to serialize dataset")
        }
        (ExportFormat::Json, ExportSource::Result(result)) => {
            serde_json::to_vec_pretty(result).context("Failed to serialize result")
        }
        (ExportFormat::Csv, ExportSource::Dataset(ds)) => write_csv(
            &ds.column_names(),
            ds.rows.iter().map(Vec::as_slice),
            opts.csv_delimiter,
        ),
        (ExportFormat::Csv, ExportSource::Result(result)) => {
            let table = result
                .to_table()
                .ok_or_else(|| AnalysisError::NotTabular(result.label().to_owned()))?;
            write_csv(
                &table.headers,
                table.rows.iter().map(Vec::as_slice),
                opts.csv_delimiter,
            )
        }
        (ExportFormat::Html, ExportSource::Dataset(ds)) => {
            let shown = ds.row_count().min(opts.html_row_limit);
            let note = (shown < ds.row_count())
                .then(|| format!("Showing the first {shown} of {} rows.", ds.row_count()));
            Ok(render_html(
                &format!("Dataset: {}", ds.name),
                &ds.column_names(),
                ds.rows.iter().take(shown).map(Vec::as_slice),
                note.as_deref(),
            )
            .into_bytes())
        }
        (ExportFormat::Html, ExportSource::Result(result)) => {
            let table = result
                .to_table()
                .ok_or_else(|| AnalysisError::NotTabular(result.label().to_owned()))?;
            let title = format!("{} for {}", capitalize(result.label()), result.dataset());
            Ok(render_html(
                &title,
                &table.headers,
                table.rows.iter().map(Vec::as_slice),
                None,
            )
            .into_bytes())
        }
    }
}

fn dataset_json(ds: &Dataset) -> serde_json::Value {
    let records: Vec<serde_json::Value> = (0..ds.row_count())
        .filter_map(|i| ds.record(i))
        .map(|r| r.to_json())
        .collect();
    serde_json::json!({
        "name": ds.name,
        "columns": ds.columns,
        "source": ds.source,
        "row_count": ds.row_count(),
        "rows": records,
    })
}

fn write_csv<'a>(
    headers: &[String],
    rows: impl Iterator<Item = &'a [Value]>,
    delimiter: u8,
) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(Vec::new());
    writer.write_record(headers)?;
    for row in rows {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| AnalysisError::Internal(format!("Failed to flush CSV writer: {e}")))
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |c| {
        c.to_uppercase().chain(chars).collect()
    })
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em;color:#222}\
table{border-collapse:collapse}\
th,td{border:1px solid #ccc;padding:4px 8px;text-align:left}\
th{background:#f0f0f0}\
tr:nth-child(even){background:#fafafa}\
.note{color:#666}";

fn render_html<'a>(
    title: &str,
    headers: &[String],
    rows: impl Iterator<Item = &'a [Value]>,
    note: Option<&str>,
) -> String {
    let title = html_escape(title);
    let mut html = format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n<h1>{title}</h1>\n"
    );
    if let Some(note) = note {
        html.push_str(&format!("<p class=\"note\">{}</p>\n", html_escape(note)));
    }
    html.push_str("<table>\n<thead><tr>");
    for h in headers {
        html.push_str(&format!("<th>{}</th>", html_escape(h)));
    }
    html.push_str("</tr></thead>\n<tbody>\n");
    for row in rows {
        html.push_str("<tr>");
        for v in row {
            html.push_str(&format!("<td>{}</td>", html_escape(&v.to_string())));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</tbody>\n</table>\n</body>\n</html>\n");
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::dataset::{SourceDescriptor, SourceFormat};
    use crate::analyser::logic::{info, statistics};

    fn people() -> Dataset {
        Dataset::new(
            "people",
            vec!["name".to_owned(), "age".to_owned()],
            vec![
                vec![Value::text("Ann <admin>"), Value::Number(34.0)],
                vec![Value::text("Bob, Jr."), Value::Missing],
                vec![Value::text("Cy"), Value::Number(28.5)],
            ],
            SourceDescriptor::Loaded {
                format: SourceFormat::Csv,
                origin: None,
            },
        )
        .expect("valid dataset")
    }

    #[test]
    fn test_dataset_csv() -> Result<()> {
        let bytes = export(ExportSource::Dataset(&people()), ExportFormat::Csv, &ExportOptions::default())?;
        let text = String::from_utf8(bytes).expect("utf-8");
        assert_eq!(text, "name,age\nAnn <admin>,34\n\"Bob, Jr.\",\nCy,28.5\n");
        Ok(())
    }

    #[test]
    fn test_result_json_is_structural() -> Result<()> {
        let ds = people();
        let result = AnalysisResult::Statistics(statistics::compute(&ds, None, false)?);
        let bytes = export(ExportSource::Result(&result), ExportFormat::Json, &ExportOptions::default())?;
        let parsed: serde_json::Value = serde_json::from_slice(&bytes)?;
        assert_eq!(parsed["result"], "statistics");
        assert_eq!(parsed["columns"][0]["column"], "age");
        assert_eq!(parsed["columns"][0]["count"], 2);
        Ok(())
    }

    #[test]
    fn test_info_is_not_tabular() {
        let result = AnalysisResult::Info(info::describe(&people()));
        for format in [ExportFormat::Csv, ExportFormat::Html] {
            let err = export(ExportSource::Result(&result), format, &ExportOptions::default())
                .unwrap_err();
            assert_eq!(err.kind(), "NotTabularError");
        }
        assert!(export(ExportSource::Result(&result), ExportFormat::Json, &ExportOptions::default()).is_ok());
    }

    #[test]
    fn test_html_escapes_and_truncates() -> Result<()> {
        let opts = ExportOptions {
            html_row_limit: 2,
            ..ExportOptions::default()
        };
        let bytes = export(ExportSource::Dataset(&people()), ExportFormat::Html, &opts)?;
        let html = String::from_utf8(bytes).expect("utf-8");
        assert!(html.contains("<td>Ann &lt;admin&gt;</td>"));
        assert!(html.contains("Showing the first 2 of 3 rows."));
        assert!(!html.contains("<td>Cy</td>"));
        Ok(())
    }

    #[test]
    fn test_stats_csv_has_percentile_columns_only_when_requested() -> Result<()> {
        let ds = people();
        let result = AnalysisResult::Statistics(statistics::compute(&ds, None, true)?);
        let bytes = export(ExportSource::Result(&result), ExportFormat::Csv, &ExportOptions::default())?;
        let text = String::from_utf8(bytes).expect("utf-8");
        let header = text.lines().next().unwrap_or_default();
        assert_eq!(header, "column,count,missing,mean,std,min,25%,50%,75%,max,90%,95%");
        Ok(())
    }
}
