//! Read-only resources. Reading them never appends to history.

use super::Dispatcher;
use crate::analyser::logic::{info, statistics};
use crate::error::{AnalysisError, Result};
use serde::Serialize;
use serde_json::json;

pub const LOADED_DATASETS: &str = "data://loaded_datasets";
pub const ANALYSIS_GUIDE: &str = "data://analysis_guide";
pub const ANALYSIS_HISTORY: &str = "data://analysis_history";
pub const DATASET_PREFIX: &str = "data://dataset/";

const JSON: &str = "application/json";
const MARKDOWN: &str = "text/markdown";

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSpec {
    pub uri: String,
    pub name: String,
    pub description: String,
    pub mime_type: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceContent {
    pub uri: String,
    pub mime_type: &'static str,
    pub text: String,
}

const GUIDE: &str = "# Dataset analysis guide

## Workflow

1. `load_dataset` a CSV or JSON file (or inline content) under a name.
2. `dataset_info` to see column types, missing values and a sample.
3. `data_quality_check` before anything else; it scores the data and lists issues.
4. `calculate_statistics` for descriptive statistics of numeric columns.
5. `find_correlations` (pearson, spearman or kendall) to find related columns.
6. `group_analysis` to compare segments.
7. `filter_data` to derive a subset under a new name.
8. `generate_insights` with a focus of overview, outliers, patterns, recommendations or all.
9. `export_analysis` a dataset or any earlier result (by its sequence id) as json, csv or html.

## Filter conditions

Conditions compare columns with literals or with each other:

    age > 30 and department = \"Sales\"
    not (salary / 12 < 2500) or `start year` >= 2020

Operators: `=` (or `==`), `!=`, `<`, `<=`, `>`, `>=`, `+ - * /`, `and`, `or`, `not`.
Literals: numbers, quoted strings, `true`, `false`, `null`. Column names that are
not plain identifiers go in backticks. Comparing a number with text is rejected
before any row is evaluated. A row on which the condition fails (for example a
division by zero) is excluded and counted.

## Tips

- Start with a quality check; a low health score usually means cleaning first.
- Highly correlated columns are often redundant features.
- Numbers stored as text are reported by the recommendations focus.
";

pub fn list_resources(d: &Dispatcher) -> Result<Vec<ResourceSpec>> {
    let mut all = vec![
        ResourceSpec {
            uri: LOADED_DATASETS.to_owned(),
            name: "Loaded datasets".to_owned(),
            description: "Summaries of every registered dataset".to_owned(),
            mime_type: JSON,
        },
        ResourceSpec {
            uri: ANALYSIS_GUIDE.to_owned(),
            name: "Analysis guide".to_owned(),
            description: "How to use the analysis tools".to_owned(),
            mime_type: MARKDOWN,
        },
        ResourceSpec {
            uri: ANALYSIS_HISTORY.to_owned(),
            name: "Analysis history".to_owned(),
            description: "Every operation run so far, oldest first".to_owned(),
            mime_type: JSON,
        },
    ];
    for summary in d.analyser().registry().list()? {
        all.push(ResourceSpec {
            uri: format!("{DATASET_PREFIX}{}", summary.name),
            description: format!("Profile of the '{}' dataset", summary.name),
            name: format!("Dataset: {}", summary.name),
            mime_type: JSON,
        });
    }
    Ok(all)
}

pub fn read_resource(d: &Dispatcher, uri: &str) -> Result<ResourceContent> {
    let analyser = d.analyser();
    let (mime_type, text) = match uri {
        LOADED_DATASETS => (JSON, pretty(&analyser.registry().list()?)?),
        ANALYSIS_GUIDE => (MARKDOWN, GUIDE.to_owned()),
        ANALYSIS_HISTORY => (JSON, pretty(&analyser.history_records(None, None))?),
        _ => {
            let name = uri.strip_prefix(DATASET_PREFIX).ok_or_else(|| {
                AnalysisError::InvalidArgument(format!("unknown resource '{uri}'"))
            })?;
            let ds = analyser.registry().get(name)?;
            // A dataset without numeric columns simply has no statistics section.
            let stats = statistics::compute(&ds, None, false).ok();
            let profile = json!({
                "info": info::describe(&ds),
                "statistics": stats,
            });
            (JSON, pretty(&profile)?)
        }
    };
    tracing::debug!("read resource {uri} ({} bytes)", text.len());
    Ok(ResourceContent {
        uri: uri.to_owned(),
        mime_type,
        text,
    })
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value)
        .map_err(|e| AnalysisError::Internal(format!("Failed to serialize resource: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::Analyser;
    use crate::commands::{FsAccess, ToolCall};
    use std::sync::Arc;

    fn dispatcher() -> Result<Dispatcher> {
        let files = FsAccess::new(&[std::env::temp_dir()])?;
        Ok(Dispatcher::new(Arc::new(Analyser::default()), Arc::new(files)))
    }

    #[test]
    fn test_reading_resources_records_nothing() -> Result<()> {
        let d = dispatcher()?;
        let loaded = d.dispatch(&ToolCall::new(
            "load_dataset",
            json!({ "name": "t", "content": "a,b\n1,x\n2,y\n" }),
        ));
        assert!(loaded.is_success());
        let before = d.analyser().history().len();

        for uri in [LOADED_DATASETS, ANALYSIS_GUIDE, ANALYSIS_HISTORY, "data://dataset/t"] {
            let content = read_resource(&d, uri)?;
            assert!(!content.text.is_empty());
        }
        assert_eq!(d.analyser().history().len(), before);

        let listed = list_resources(&d)?;
        assert!(listed.iter().any(|r| r.uri == "data://dataset/t"));
        Ok(())
    }

    #[test]
    fn test_dataset_profile() -> Result<()> {
        let d = dispatcher()?;
        d.dispatch(&ToolCall::new(
            "load_dataset",
            json!({ "name": "t", "content": "a,b\n1,x\n3,y\n" }),
        ));
        let content = read_resource(&d, "data://dataset/t")?;
        let value: serde_json::Value = serde_json::from_str(&content.text)?;
        assert_eq!(value["info"]["rows"], 2);
        assert_eq!(value["statistics"]["columns"][0]["mean"], 2.0);
        Ok(())
    }

    #[test]
    fn test_unknown_resources() -> Result<()> {
        let d = dispatcher()?;
        assert_eq!(
            read_resource(&d, "data://nope").unwrap_err().kind(),
            "InvalidArgumentError"
        );
        assert_eq!(
            read_resource(&d, "data://dataset/ghost").unwrap_err().kind(),
            "NotFoundError"
        );
        Ok(())
    }
}
