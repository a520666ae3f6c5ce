//! Derive a new dataset by keeping the rows a condition accepts.

use super::dataset::SourceDescriptor;
use super::expr::{Clause, Condition};
use super::registry::{DatasetRegistry, Registered};
use crate::error::{AnalysisError, Result};
use serde::Deserialize;

/// How the caller expressed the predicate.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FilterSpec {
    Expression(String),
    Clauses(Vec<Clause>),
}

/// What a filter pass did.
#[derive(Debug, Clone)]
pub struct FilterOutcome {
    pub registered: Registered,
    /// Normalized text of the condition that ran
    pub condition: String,
    pub rows_in: usize,
    pub rows_kept: usize,
    /// Rows excluded because the condition failed to evaluate on them
    pub rows_failed: usize,
    pub first_row_error: Option<String>,
    /// The derived dataset replaced its own parent
    pub self_overwrite: bool,
}

/// Evaluate `spec` on every row of `parent` and register the kept rows under
/// `new_name`. The read of the parent and the write of the result happen under
/// one registry write lock.
pub fn apply(
    registry: &DatasetRegistry,
    parent: &str,
    spec: &FilterSpec,
    new_name: &str,
) -> Result<FilterOutcome> {
    let mut condition_text = String::new();
    let mut rows_in = 0;
    let mut rows_failed = 0;
    let mut first_row_error: Option<String> = None;

    let registered = registry.derive(parent, new_name, |source| {
        let condition = match spec {
            FilterSpec::Expression(text) => Condition::parse(text, &source.columns)?,
            FilterSpec::Clauses(clauses) => Condition::from_clauses(clauses, &source.columns)?,
        };

        let mut kept = Vec::new();
        for (i, row) in source.rows.iter().enumerate() {
            match condition.matches(row) {
                Ok(true) => kept.push(row.clone()),
                Ok(false) => {}
                Err(e) => {
                    rows_failed += 1;
                    if first_row_error.is_none() {
                        first_row_error = Some(format!("row {}: {e}", i + 1));
                    }
                }
            }
        }

        rows_in = source.row_count();
        if rows_in > 0 && rows_failed == rows_in {
            return Err(AnalysisError::AllRowsFailed {
                rows: rows_in,
                first_error: first_row_error.clone().unwrap_or_default(),
            });
        }

        condition_text = condition.text().to_owned();
        source.derive(
            new_name,
            kept,
            SourceDescriptor::Filtered {
                parent: parent.to_owned(),
                condition: condition_text.clone(),
            },
        )
    })?;

    Ok(FilterOutcome {
        rows_kept: registered.dataset.row_count(),
        self_overwrite: parent == new_name,
        registered,
        condition: condition_text,
        rows_in,
        rows_failed,
        first_row_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::dataset::{Dataset, SourceFormat, Value};

    fn registry_with_staff() -> DatasetRegistry {
        let registry = DatasetRegistry::new(16, 64);
        let rows = [
            (45.0, "Sales", 0.0),
            (25.0, "Sales", 2.0),
            (38.0, "Ops", 4.0),
            (52.0, "Sales", 5.0),
        ]
        .into_iter()
        .map(|(age, dept, tenure)| {
            vec![Value::Number(age), Value::text(dept), Value::Number(tenure)]
        })
        .collect();
        let ds = Dataset::new(
            "staff",
            vec!["age".to_owned(), "dept".to_owned(), "tenure".to_owned()],
            rows,
            SourceDescriptor::Loaded {
                format: SourceFormat::Csv,
                origin: None,
            },
        )
        .expect("valid dataset");
        registry.register("staff", ds).expect("registered");
        registry
    }

    fn expr(text: &str) -> FilterSpec {
        FilterSpec::Expression(text.to_owned())
    }

    #[test]
    fn test_filter_registers_derived_dataset() -> Result<()> {
        let registry = registry_with_staff();
        let out = apply(&registry, "staff", &expr("age > 30 and dept = 'Sales'"), "senior")?;
        assert_eq!(out.rows_in, 4);
        assert_eq!(out.rows_kept, 2);
        assert!(!out.self_overwrite);

        let senior = registry.get("senior")?;
        assert_eq!(senior.row_count(), 2);
        assert_eq!(
            senior.source,
            SourceDescriptor::Filtered {
                parent: "staff".to_owned(),
                condition: "age > 30 and dept = 'Sales'".to_owned(),
            }
        );
        // parent untouched
        assert_eq!(registry.get("staff")?.row_count(), 4);
        Ok(())
    }

    #[test]
    fn test_empty_result_is_valid() -> Result<()> {
        let registry = registry_with_staff();
        let out = apply(&registry, "staff", &expr("age > 100"), "nobody")?;
        assert_eq!(out.rows_kept, 0);
        let nobody = registry.get("nobody")?;
        assert_eq!(nobody.row_count(), 0);
        assert_eq!(nobody.column_count(), 3);
        Ok(())
    }

    #[test]
    fn test_row_failures_are_counted() -> Result<()> {
        let registry = registry_with_staff();
        let out = apply(&registry, "staff", &expr("age / tenure > 11"), "ratio")?;
        assert_eq!(out.rows_failed, 1);
        assert_eq!(out.rows_kept, 1);
        assert!(out.first_row_error.as_deref().is_some_and(|e| e.contains("row 1")));
        Ok(())
    }

    #[test]
    fn test_all_rows_failing_is_an_error() {
        let registry = registry_with_staff();
        let err = apply(&registry, "staff", &expr("age / (tenure * 0) > 1"), "broken")
            .unwrap_err();
        assert_eq!(err.kind(), "AllRowsFailedError");
        assert!(!registry.exists("broken").unwrap_or(true));
    }

    #[test]
    fn test_parse_errors_register_nothing() {
        let registry = registry_with_staff();
        let err = apply(&registry, "staff", &expr("salary > 1"), "x").unwrap_err();
        assert_eq!(err.kind(), "UnknownIdentifierError");
        let err = apply(&registry, "ghost", &expr("age > 1"), "x").unwrap_err();
        assert_eq!(err.kind(), "NotFoundError");
        assert!(!registry.exists("x").unwrap_or(true));
    }

    #[test]
    fn test_self_overwrite() -> Result<()> {
        let registry = registry_with_staff();
        let out = apply(&registry, "staff", &expr("dept = 'Ops'"), "staff")?;
        assert!(out.self_overwrite);
        assert!(out.registered.replaced);
        assert_eq!(registry.get("staff")?.row_count(), 1);
        Ok(())
    }

    #[test]
    fn test_filtering_twice_equals_combined_condition() -> Result<()> {
        let registry = registry_with_staff();
        apply(&registry, "staff", &expr("age > 30"), "step1")?;
        apply(&registry, "step1", &expr("dept = 'Sales'"), "step2")?;
        apply(&registry, "staff", &expr("(age > 30) and (dept = 'Sales')"), "once")?;
        assert_eq!(registry.get("step2")?.rows, registry.get("once")?.rows);
        Ok(())
    }

    #[test]
    fn test_clause_spec_deserializes() -> Result<()> {
        let spec: FilterSpec = serde_json::from_value(serde_json::json!([
            {"column": "dept", "operator": "==", "value": "Ops"}
        ]))
        .map_err(AnalysisError::from)?;
        let registry = registry_with_staff();
        let out = apply(&registry, "staff", &spec, "ops")?;
        assert_eq!(out.rows_kept, 1);
        assert_eq!(out.condition, "dept = \"Ops\"");
        Ok(())
    }
}
