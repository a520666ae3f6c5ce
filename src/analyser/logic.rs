//! Analysis engines.
//!
//! Every engine is a pure function of an immutable [`Dataset`] snapshot (plus
//! its parameters) and returns one of the report types in [`types`]. None of
//! them touch the registry or the history log; the [`Analyser`] facade does.
//!
//! [`Dataset`]: crate::analyser::dataset::Dataset
//! [`Analyser`]: crate::analyser::Analyser

pub mod correlation;
pub mod grouping;
pub mod info;
pub mod insights;
pub mod quality;
pub mod statistics;
pub mod types;

pub use types::{
    AggOp, AnalysisResult, CorrelationMethod, CorrelationReport, DatasetInfo, GroupReport,
    InsightFocus, InsightReport, QualityReport, StatisticsReport, Strength, Table,
};
