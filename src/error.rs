//! Centralized error handling for the datalens engine.
//!
//! Every engine reports failures through [`AnalysisError`], a plain `enum`
//! whose variants map one-to-one onto the failure kinds a caller can act on.
//! Each variant has a stable [`kind`](AnalysisError::kind) string which the
//! history tracker stores instead of the full error payload.
//!
//! ```
//! use datalens::error::AnalysisError;
//!
//! let err = AnalysisError::NotFound("sales".to_owned());
//! assert_eq!(err.kind(), "NotFoundError");
//! assert_eq!(err.to_string(), "dataset 'sales' is not loaded");
//! ```
//!
//! At the operation boundary errors are wrapped in an [`OperationFailure`],
//! which adds the name of the operation and the dataset it ran against:
//!
//! ```
//! use datalens::error::{AnalysisError, OperationFailure};
//! use datalens::history::OperationKind;
//!
//! let failure = OperationFailure::new(
//!     OperationKind::Statistics,
//!     Some("sales"),
//!     AnalysisError::NoNumericColumns,
//! );
//! assert!(failure.to_string().starts_with("calculate_statistics on 'sales' failed"));
//! ```

use crate::history::OperationKind;
use serde::Serialize;
use std::fmt;

/// Main error type for datalens operations.
#[derive(Debug)]
pub enum AnalysisError {
    /// Dataset name is empty or too long
    InvalidName(String),

    /// No dataset registered under this name
    NotFound(String),

    /// Raw input bytes could not be parsed into a dataset
    MalformedInput(String),

    /// A token or construct outside the condition grammar
    UnsupportedSyntax(String),

    /// Identifier that is neither a column nor a known constant
    UnknownIdentifier(String),

    /// Operand types that cannot be combined
    TypeMismatch(String),

    /// Division by zero while evaluating a row
    DivisionByZero,

    /// Every row of a non-empty dataset failed to evaluate
    AllRowsFailed { rows: usize, first_error: String },

    /// None of the requested columns hold numeric data
    NoNumericColumns,

    /// Correlation needs at least two numeric columns
    InsufficientColumns { found: usize },

    /// Referenced column does not exist
    ColumnNotFound(String),

    /// Aggregation operation name is not supported
    UnsupportedOperation(String),

    /// The value has no row/column structure for CSV or HTML
    NotTabular(String),

    /// Tool-call arguments are missing or of the wrong shape
    InvalidArgument(String),

    /// A configured capacity would be exceeded
    LimitExceeded { what: &'static str, limit: usize },

    /// I/O failure at the boundary
    Io(std::io::Error),

    /// Broken internal invariant (e.g. poisoned lock)
    Internal(String),
}

impl AnalysisError {
    /// Stable name of the failure kind, recorded in history outcomes.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidName(_) => "InvalidNameError",
            Self::NotFound(_) => "NotFoundError",
            Self::MalformedInput(_) => "MalformedInputError",
            Self::UnsupportedSyntax(_) => "UnsupportedSyntaxError",
            Self::UnknownIdentifier(_) => "UnknownIdentifierError",
            Self::TypeMismatch(_) => "TypeMismatchError",
            Self::DivisionByZero => "DivisionByZeroError",
            Self::AllRowsFailed { .. } => "AllRowsFailedError",
            Self::NoNumericColumns => "NoNumericColumnsError",
            Self::InsufficientColumns { .. } => "InsufficientColumnsError",
            Self::ColumnNotFound(_) => "ColumnNotFoundError",
            Self::UnsupportedOperation(_) => "UnsupportedOperationError",
            Self::NotTabular(_) => "NotTabularError",
            Self::InvalidArgument(_) => "InvalidArgumentError",
            Self::LimitExceeded { .. } => "LimitExceededError",
            Self::Io(_) => "IoError",
            Self::Internal(_) => "InternalError",
        }
    }

    /// True for the errors raised while parsing or evaluating a condition.
    pub fn is_evaluator_error(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedSyntax(_)
                | Self::UnknownIdentifier(_)
                | Self::TypeMismatch(_)
                | Self::DivisionByZero
        )
    }
}

impl fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidName(msg) => write!(f, "invalid dataset name: {msg}"),
            Self::NotFound(name) => write!(f, "dataset '{name}' is not loaded"),
            Self::MalformedInput(msg) => write!(f, "malformed input: {msg}"),
            Self::UnsupportedSyntax(msg) => write!(f, "unsupported syntax: {msg}"),
            Self::UnknownIdentifier(name) => {
                write!(f, "unknown identifier '{name}': not a column of the dataset")
            }
            Self::TypeMismatch(msg) => write!(f, "type mismatch: {msg}"),
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::AllRowsFailed { rows, first_error } => write!(
                f,
                "condition failed to evaluate on all {rows} rows (first error: {first_error})"
            ),
            Self::NoNumericColumns => write!(f, "no numeric columns to analyse"),
            Self::InsufficientColumns { found } => write!(
                f,
                "at least two numeric columns are required, found {found}"
            ),
            Self::ColumnNotFound(name) => write!(f, "column '{name}' does not exist"),
            Self::UnsupportedOperation(op) => write!(
                f,
                "unsupported aggregation '{op}' (expected one of mean, median, count, sum, min, max)"
            ),
            Self::NotTabular(what) => {
                write!(f, "{what} has no tabular shape; export it as json instead")
            }
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::LimitExceeded { what, limit } => write!(f, "{what} limit of {limit} exceeded"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for AnalysisError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_json::Error> for AnalysisError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedInput(format!("JSON error: {err}"))
    }
}

impl From<csv::Error> for AnalysisError {
    fn from(err: csv::Error) -> Self {
        Self::MalformedInput(format!("CSV error: {err}"))
    }
}

/// Result type alias for datalens operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Extension trait to add context to results.
pub trait ResultExt<T> {
    /// Prefix the error message with `msg`, keeping the error kind where it carries text.
    fn context(self, msg: impl Into<String>) -> Result<T>;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<AnalysisError>,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| {
            let msg = msg.into();
            match e.into() {
                AnalysisError::MalformedInput(inner) => {
                    AnalysisError::MalformedInput(format!("{msg}: {inner}"))
                }
                AnalysisError::InvalidArgument(inner) => {
                    AnalysisError::InvalidArgument(format!("{msg}: {inner}"))
                }
                AnalysisError::Internal(inner) => AnalysisError::Internal(format!("{msg}: {inner}")),
                other => other,
            }
        })
    }
}

/// A failed operation, as reported at the tool boundary.
#[derive(Debug)]
pub struct OperationFailure {
    pub operation: OperationKind,
    pub dataset: Option<String>,
    pub error: AnalysisError,
}

impl OperationFailure {
    pub fn new(operation: OperationKind, dataset: Option<&str>, error: AnalysisError) -> Self {
        Self {
            operation,
            dataset: dataset.map(str::to_owned),
            error,
        }
    }

    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }

    /// Serializable view for transports.
    pub fn to_payload(&self) -> FailurePayload {
        FailurePayload {
            operation: self.operation.as_str(),
            dataset: self.dataset.clone(),
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for OperationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.dataset {
            Some(name) => write!(
                f,
                "{} on '{name}' failed: {}",
                self.operation.as_str(),
                self.error
            ),
            None => write!(f, "{} failed: {}", self.operation.as_str(), self.error),
        }
    }
}

impl std::error::Error for OperationFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Typed failure as sent back over the wire.
#[derive(Debug, Clone, Serialize)]
pub struct FailurePayload {
    pub operation: &'static str,
    pub dataset: Option<String>,
    pub kind: &'static str,
    pub message: String,
}
