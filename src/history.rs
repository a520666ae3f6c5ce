//! Append-only audit trail of every operation run against the registry.
//!
//! Each public operation of the [`Analyser`](crate::analyser::Analyser) calls
//! [`HistoryTracker::record`] exactly once, on both the success and the failure
//! path. Records are never edited or removed for the lifetime of the process.
//!
//! The tracker has its own lock and counter, so appending never waits on the
//! dataset registry.

use crate::analyser::logic::AnalysisResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Which public operation a record describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Load,
    Unload,
    List,
    Exists,
    Info,
    Statistics,
    Correlation,
    GroupBy,
    Quality,
    Insights,
    Filter,
    Export,
}

impl OperationKind {
    pub const ALL: [Self; 12] = [
        Self::Load,
        Self::Unload,
        Self::List,
        Self::Exists,
        Self::Info,
        Self::Statistics,
        Self::Correlation,
        Self::GroupBy,
        Self::Quality,
        Self::Insights,
        Self::Filter,
        Self::Export,
    ];

    /// Tool name the operation is exposed under.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load_dataset",
            Self::Unload => "unload_dataset",
            Self::List => "list_datasets",
            Self::Exists => "dataset_exists",
            Self::Info => "dataset_info",
            Self::Statistics => "calculate_statistics",
            Self::Correlation => "find_correlations",
            Self::GroupBy => "group_analysis",
            Self::Quality => "data_quality_check",
            Self::Insights => "generate_insights",
            Self::Filter => "filter_data",
            Self::Export => "export_analysis",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Success or failure of one invocation, with a short summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Success { summary: String },
    Failure { error_kind: String, summary: String },
}

impl Outcome {
    pub fn success(summary: impl Into<String>) -> Self {
        Self::Success {
            summary: summary.into(),
        }
    }

    pub fn failure(error_kind: &str, summary: impl Into<String>) -> Self {
        Self::Failure {
            error_kind: error_kind.to_owned(),
            summary: summary.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// One immutable audit entry.
#[derive(Clone, Debug, Serialize)]
pub struct HistoryRecord {
    pub sequence_id: u64,
    pub timestamp: DateTime<Utc>,
    pub operation_kind: OperationKind,
    pub dataset_name: Option<String>,
    pub parameters: serde_json::Value,
    pub outcome: Outcome,
    #[serde(with = "duration_ms", rename = "duration_ms")]
    pub duration: Duration,
    /// Analysis value the operation produced, kept so it can be exported later.
    #[serde(skip)]
    pub result: Option<Arc<AnalysisResult>>,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64() * 1000.0)
    }
}

/// Fields of a record supplied by the caller of [`HistoryTracker::record`].
#[derive(Debug)]
pub struct NewRecord {
    pub operation_kind: OperationKind,
    pub dataset_name: Option<String>,
    pub parameters: serde_json::Value,
    pub outcome: Outcome,
    pub duration: Duration,
    pub result: Option<Arc<AnalysisResult>>,
}

#[derive(Debug, Default)]
struct HistoryLog {
    next_id: u64,
    records: Vec<HistoryRecord>,
}

/// Thread-safe, append-only history.
#[derive(Debug, Default)]
pub struct HistoryTracker {
    log: Mutex<HistoryLog>,
}

impl HistoryTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record and return its sequence id.
    ///
    /// The id is assigned under the same lock that appends, so ids are strictly
    /// increasing in list order.
    pub fn record(&self, new: NewRecord) -> u64 {
        // A panic elsewhere cannot leave a half-written record behind, so a
        // poisoned log is still consistent.
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.next_id += 1;
        let sequence_id = log.next_id;
        log.records.push(HistoryRecord {
            sequence_id,
            timestamp: Utc::now(),
            operation_kind: new.operation_kind,
            dataset_name: new.dataset_name,
            parameters: new.parameters,
            outcome: new.outcome,
            duration: new.duration,
            result: new.result,
        });
        sequence_id
    }

    /// Records in append order (newest last), optionally filtered by kind and
    /// truncated to the `limit` most recent matches.
    pub fn list(
        &self,
        limit: Option<usize>,
        kind_filter: Option<OperationKind>,
    ) -> Vec<HistoryRecord> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        let matching: Vec<&HistoryRecord> = log
            .records
            .iter()
            .filter(|r| kind_filter.is_none_or(|k| r.operation_kind == k))
            .collect();
        let skip = limit.map_or(0, |l| matching.len().saturating_sub(l));
        matching.into_iter().skip(skip).cloned().collect()
    }

    pub fn get(&self, sequence_id: u64) -> Option<HistoryRecord> {
        let log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        // Ids start at 1 and are dense.
        let index = usize::try_from(sequence_id.checked_sub(1)?).ok()?;
        log.records.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
