//! # datalens - in-memory dataset registry and analysis engine
//!
//! datalens keeps named, immutable tabular datasets in memory and runs
//! analyses over them: descriptive statistics, correlations, grouped
//! aggregates, quality checks, filtering with a small safe expression
//! language, generated insights and export to JSON, CSV or HTML. Every
//! operation is recorded in an append-only history.
//!
//! ## Quick Start
//!
//! ```
//! use datalens::analyser::{Analyser, LoadRequest};
//! use datalens::analyser::dataset::SourceFormat;
//! use datalens::analyser::filter::FilterSpec;
//! use datalens::config::EngineConfig;
//!
//! let analyser = Analyser::new(EngineConfig::default());
//! let csv = b"name,age,department\nAnn,45,Sales\nBob,25,Sales\nCy,38,Ops\n";
//! analyser.load("staff", csv, &LoadRequest::new(SourceFormat::Csv))?;
//!
//! let condition = FilterSpec::Expression(r#"age > 30 and department = "Sales""#.to_owned());
//! let filtered = analyser.filter("staff", &condition, "senior_sales")?;
//! assert_eq!(filtered.value.rows_kept, 1);
//! # Ok::<(), datalens::error::OperationFailure>(())
//! ```
//!
//! ## Core Modules
//!
//! - [`analyser`]: the [`Analyser`](analyser::Analyser) facade and everything behind it
//!   - [`analyser::registry`]: the named dataset store
//!   - [`analyser::expr`]: condition parser and evaluator
//!   - [`analyser::logic`]: statistics, correlation, grouping, quality and insight engines
//! - [`history`]: the operation audit trail
//! - [`export`]: JSON, CSV and HTML serialization
//! - [`commands`]: tool-call dispatch, resources and file access for transports
//! - [`config`], [`logging`], [`error`], [`utils`]

pub mod analyser;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod history;
pub mod logging;
pub mod utils;
