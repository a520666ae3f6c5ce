//! Integration tests for the full tool workflow
//!
//! These tests drive the dispatcher and the analyser facade with the fixture
//! files under `testdata/` and check the end-to-end results.

use datalens::analyser::dataset::{SourceFormat, Value};
use datalens::analyser::io::{LoadOptions, load_dataset};
use datalens::analyser::logic::AggOp;
use datalens::analyser::{Analyser, LoadRequest};
use datalens::commands::{Dispatcher, FsAccess, ToolCall, ToolResponse};
use datalens::config::EngineConfig;
use datalens::history::{OperationKind, Outcome};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

fn testdata() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("testdata")
}

fn dispatcher_with_roots(extra: &[PathBuf]) -> Dispatcher {
    let mut roots = vec![testdata()];
    roots.extend_from_slice(extra);
    let files = FsAccess::new(&roots).expect("testdata is accessible");
    Dispatcher::new(Arc::new(Analyser::default()), Arc::new(files))
}

fn dispatcher() -> Dispatcher {
    dispatcher_with_roots(&[])
}

fn call(d: &Dispatcher, name: &str, arguments: serde_json::Value) -> ToolResponse {
    d.dispatch(&ToolCall::new(name, arguments))
}

fn load_staff(d: &Dispatcher) {
    let response = call(
        d,
        "load_dataset",
        json!({ "name": "staff", "file_path": "employees.csv" }),
    );
    assert!(response.is_success(), "load failed: {}", response.text());
}

#[test]
fn test_load_csv_fixture() {
    let d = dispatcher();
    let response = call(
        &d,
        "load_dataset",
        json!({ "name": "staff", "file_path": "employees.csv" }),
    );
    let data = response.data().expect("success payload");
    assert_eq!(data["dataset"]["rows"], 10);
    assert_eq!(data["dataset"]["columns"], 6);
    assert_eq!(data["replaced"], false);

    let info = call(&d, "dataset_info", json!({ "name": "staff" }));
    let data = info.data().expect("success payload");
    let age = &data["column_details"][2];
    assert_eq!(age["name"], "age");
    assert_eq!(age["kind"], "Numeric");
    assert_eq!(age["missing"], 1);
    assert_eq!(data["sample"].as_array().map(Vec::len), Some(5));
}

#[test]
fn test_load_json_columns_infers_format_from_extension() {
    let d = dispatcher();
    let response = call(
        &d,
        "load_dataset",
        json!({ "name": "lin", "file_path": "linear.json" }),
    );
    assert!(response.is_success(), "{}", response.text());
    let summary = &response.data().expect("payload")["dataset"];
    assert_eq!(summary["rows"], 6);
    assert_eq!(summary["column_names"], json!(["x", "y", "noise", "label"]));
    assert_eq!(summary["source"]["format"], "json");
}

#[test]
fn test_registered_dataset_equals_parsed_dataset() {
    let bytes = std::fs::read(testdata().join("employees.csv")).expect("fixture");
    let parsed = load_dataset("staff", &bytes, &LoadOptions::new(SourceFormat::Csv))
        .expect("fixture parses");

    let analyser = Analyser::default();
    analyser
        .load("staff", &bytes, &LoadRequest::new(SourceFormat::Csv))
        .expect("load succeeds");
    let stored = analyser.registry().get("staff").expect("registered");

    assert_eq!(stored.columns, parsed.columns);
    assert_eq!(stored.rows, parsed.rows);
    assert_eq!(stored.name, parsed.name);
}

#[test]
fn test_reload_replaces_previous_dataset() {
    let analyser = Analyser::default();
    let csv = LoadRequest::new(SourceFormat::Csv);
    analyser.load("d", b"a\n1\n2\n", &csv).expect("first load");
    let first = analyser.registry().get("d").expect("registered");

    let second = analyser.load("d", b"b,c\nx,1\n", &csv).expect("second load");
    assert!(second.value.replaced);

    let current = analyser.registry().get("d").expect("registered");
    assert_eq!(current.column_names(), ["b", "c"]);
    assert_eq!(current.row_count(), 1);
    assert_ne!(current.id, first.id);
    assert_eq!(analyser.registry().len().expect("lock"), 1);
}

#[test]
fn test_filter_example_condition() {
    let d = dispatcher();
    load_staff(&d);

    let response = call(
        &d,
        "filter_data",
        json!({
            "name": "staff",
            "condition": "age > 30 and department = \"Sales\"",
            "new_name": "senior_sales",
        }),
    );
    let data = response.data().expect("success payload");
    assert_eq!(data["rows_kept"], 3);
    assert_eq!(data["rows_failed"], 0);
    assert_eq!(data["dataset"]["source"]["type"], "filtered");
    assert_eq!(data["dataset"]["source"]["parent"], "staff");

    let names: Vec<Value> = d
        .analyser()
        .registry()
        .get("senior_sales")
        .expect("registered")
        .column_values(1)
        .cloned()
        .collect();
    assert_eq!(
        names,
        [Value::text("Alice"), Value::text("Dan"), Value::text("Ivan")]
    );
    // The parent is untouched.
    assert_eq!(d.analyser().registry().get("staff").expect("parent").row_count(), 10);
}

#[test]
fn test_unknown_column_fails_at_parse_time() {
    let d = dispatcher();
    load_staff(&d);

    let response = call(
        &d,
        "filter_data",
        json!({ "name": "staff", "condition": "bonus > 10", "new_name": "x" }),
    );
    assert_eq!(response.error_kind(), Some("UnknownIdentifierError"));
    assert!(response.text().contains("filter_data on 'staff' failed"));
    assert!(!d.analyser().registry().exists("x").expect("lock"));

    let mismatch = call(
        &d,
        "filter_data",
        json!({ "name": "staff", "condition": "age = \"old\"", "new_name": "x" }),
    );
    assert_eq!(mismatch.error_kind(), Some("TypeMismatchError"));
}

#[test]
fn test_filter_twice_equals_combined_condition() {
    let d = dispatcher();
    load_staff(&d);

    let steps = [
        ("staff", "age > 30", "older"),
        ("older", "salary >= 60000 or years > 15", "stepwise"),
        (
            "staff",
            "age > 30 and (salary >= 60000 or years > 15)",
            "combined",
        ),
    ];
    for (name, condition, new_name) in steps {
        let response = call(
            &d,
            "filter_data",
            json!({ "name": name, "condition": condition, "new_name": new_name }),
        );
        assert!(response.is_success(), "{}", response.text());
    }

    let registry = d.analyser().registry();
    let stepwise = registry.get("stepwise").expect("stepwise");
    let combined = registry.get("combined").expect("combined");
    assert_eq!(stepwise.rows, combined.rows);
    assert!(combined.row_count() > 0);
}

#[test]
fn test_structured_clauses_match_expression() {
    let d = dispatcher();
    load_staff(&d);

    let response = call(
        &d,
        "filter_data",
        json!({
            "name": "staff",
            "condition": [
                { "column": "age", "operator": ">", "value": 30 },
                { "column": "department", "operator": "==", "value": "Sales" },
            ],
            "new_name": "by_clauses",
        }),
    );
    let data = response.data().expect("success payload");
    assert_eq!(data["rows_kept"], 3);
    assert_eq!(data["condition"], "age > 30 and department = \"Sales\"");
}

#[test]
fn test_statistics_of_one_to_five() {
    let analyser = Analyser::default();
    analyser
        .load("a", b"a\n1\n2\n3\n4\n5\n", &LoadRequest::new(SourceFormat::Csv))
        .expect("load");
    let result = analyser.statistics("a", None, true).expect("statistics");
    let stats = result.value.as_statistics().expect("statistics report");
    let a = stats.column("a").expect("column a");
    assert_eq!(a.count, 5);
    assert_eq!(a.mean, Some(3.0));
    assert_eq!(a.min, Some(1.0));
    assert_eq!(a.max, Some(5.0));
    assert_eq!(a.median, Some(3.0));
}

#[test]
fn test_statistics_skip_missing_values() {
    let d = dispatcher();
    load_staff(&d);

    let response = call(
        &d,
        "calculate_statistics",
        json!({ "name": "staff", "columns": ["age", "name", "nope"], "include_percentiles": false }),
    );
    let data = response.data().expect("success payload");
    let age = &data["columns"][0];
    assert_eq!(age["column"], "age");
    assert_eq!(age["count"], 9);
    assert_eq!(age["missing"], 1);
    assert_eq!(age["min"], 25.0);
    assert!(age.get("p90").is_none());
    assert_eq!(data["skipped"], json!(["name", "nope"]));

    let none = call(
        &d,
        "calculate_statistics",
        json!({ "name": "staff", "columns": ["name"] }),
    );
    assert_eq!(none.error_kind(), Some("NoNumericColumnsError"));
}

#[test]
fn test_perfect_linear_correlation() {
    let d = dispatcher();
    call(
        &d,
        "load_dataset",
        json!({ "name": "lin", "file_path": "linear.json" }),
    );

    let result = d
        .analyser()
        .correlation(
            "lin",
            datalens::analyser::logic::CorrelationMethod::Pearson,
            Some(0.99),
        )
        .expect("correlation");
    let report = result.value.as_correlation().expect("correlation report");
    let r = report.coefficient("x", "y").expect("defined");
    assert!((r - 1.0).abs() < 1e-9, "r = {r}");
    assert_eq!(report.pairs.len(), 1);
    assert_eq!(report.pairs[0].strength.label(), "very strong");

    for method in ["spearman", "kendall"] {
        let response = call(
            &d,
            "find_correlations",
            json!({ "name": "lin", "method": method, "threshold": 0.99 }),
        );
        let data = response.data().expect("success payload");
        assert_eq!(data["pairs"].as_array().map(Vec::len), Some(1), "{method}");
    }

    let bad = call(
        &d,
        "find_correlations",
        json!({ "name": "lin", "method": "cosine" }),
    );
    assert_eq!(bad.error_kind(), Some("InvalidArgumentError"));
}

#[test]
fn test_group_example() {
    let d = dispatcher();
    call(
        &d,
        "load_dataset",
        json!({ "name": "pay", "content": "dept,salary\nA,10\nA,20\nB,30\n" }),
    );

    let result = d
        .analyser()
        .group(
            "pay",
            "dept",
            Some(&["salary".to_owned()]),
            Some(&["mean".to_owned(), "count".to_owned()]),
        )
        .expect("group");
    let report = result.value.as_groups().expect("group report");
    let a = report.group(&Value::text("A")).expect("group A");
    let b = report.group(&Value::text("B")).expect("group B");
    assert_eq!(a.get("salary", AggOp::Mean), Some(15.0));
    assert_eq!(a.get("salary", AggOp::Count), Some(2.0));
    assert_eq!(b.get("salary", AggOp::Mean), Some(30.0));
    assert_eq!(b.get("salary", AggOp::Count), Some(1.0));
}

#[test]
fn test_group_errors() {
    let d = dispatcher();
    load_staff(&d);

    let missing = call(
        &d,
        "group_analysis",
        json!({ "name": "staff", "group_by": "team" }),
    );
    assert_eq!(missing.error_kind(), Some("ColumnNotFoundError"));

    let bad_op = call(
        &d,
        "group_analysis",
        json!({ "name": "staff", "group_by": "department", "operations": ["mode"] }),
    );
    assert_eq!(bad_op.error_kind(), Some("UnsupportedOperationError"));

    let no_group_by = call(&d, "group_analysis", json!({ "name": "staff" }));
    assert_eq!(no_group_by.error_kind(), Some("InvalidArgumentError"));

    let failures = d
        .analyser()
        .history_records(None, Some(OperationKind::GroupBy));
    assert_eq!(failures.len(), 3);
    assert!(failures.iter().all(|r| !r.outcome.is_success()));
    let Outcome::Failure { error_kind, summary } = &failures[2].outcome else {
        panic!("expected a failure outcome");
    };
    assert_eq!(error_kind, "InvalidArgumentError");
    assert!(summary.contains("group_by"), "{summary}");
}

#[test]
fn test_quality_of_messy_file() {
    let d = dispatcher();
    call(
        &d,
        "load_dataset",
        json!({ "name": "messy", "file_path": "messy.csv" }),
    );
    let result = d.analyser().quality("messy").expect("quality never fails");
    let report = result.value.as_quality().expect("quality report");

    assert_eq!(report.rows, 6);
    assert_eq!(report.duplicate_rows, 1);
    assert!(report.column("value").is_some_and(|c| c.type_conflict));
    assert_eq!(report.column("note").map(|c| c.missing), Some(4));
    assert!(report.health_score < 1.0);
    assert!(report.health_score > 0.0);

    let issue_columns: Vec<Option<&str>> =
        report.issues.iter().map(|i| i.column.as_deref()).collect();
    assert!(issue_columns.contains(&Some("note")));
    assert!(issue_columns.contains(&Some("value")));
}

#[test]
fn test_insights_all_sections() {
    let d = dispatcher();
    load_staff(&d);
    let response = call(
        &d,
        "generate_insights",
        json!({ "name": "staff", "focus": "all" }),
    );
    let data = response.data().expect("success payload");
    let insights = data["insights"].as_array().expect("insights array");
    assert!(!insights.is_empty());
    let severities: Vec<f64> = insights
        .iter()
        .filter_map(|i| i["severity"].as_f64())
        .collect();
    assert!(severities.windows(2).all(|w| w[0] >= w[1]));
    assert!(response.text().starts_with("Insights for 'staff' (all)"));
}

#[test]
fn test_export_prior_result_to_file() {
    let out = tempfile::tempdir().expect("tempdir");
    let d = dispatcher_with_roots(&[out.path().to_path_buf()]);
    load_staff(&d);

    let stats = call(
        &d,
        "calculate_statistics",
        json!({ "name": "staff", "columns": ["salary"], "include_percentiles": false }),
    );
    let seq = stats.sequence_id().expect("recorded");

    let target = out.path().join("salary.csv");
    let response = call(
        &d,
        "export_analysis",
        json!({ "sequence_id": seq, "format": "csv", "output_path": target.to_string_lossy() }),
    );
    assert!(response.is_success(), "{}", response.text());
    let written = std::fs::read_to_string(&target).expect("export written");
    let mut lines = written.lines();
    assert_eq!(
        lines.next(),
        Some("column,count,missing,mean,std,min,25%,50%,75%,max")
    );
    assert!(lines.next().is_some_and(|l| l.starts_with("salary,9,1,")));
}

#[test]
fn test_failed_export_write_is_recorded_as_failure() {
    let out = tempfile::tempdir().expect("tempdir");
    let blocked = out.path().join("taken");
    std::fs::create_dir(&blocked).expect("mkdir");
    let d = dispatcher_with_roots(&[out.path().to_path_buf()]);
    load_staff(&d);

    for path in [blocked.clone(), out.path().join("missing").join("x.csv")] {
        let response = call(
            &d,
            "export_analysis",
            json!({ "name": "staff", "format": "csv", "output_path": path.to_string_lossy() }),
        );
        assert!(!response.is_success(), "write to {} succeeded", path.display());

        let records = d.analyser().history().list(None, None);
        let last = records.last().expect("recorded");
        assert_eq!(last.operation_kind, OperationKind::Export);
        assert_eq!(last.parameters["output_path"], json!(path.to_string_lossy()));
        let Outcome::Failure { error_kind, .. } = &last.outcome else {
            panic!("export that failed to write was recorded as {:?}", last.outcome);
        };
        assert_eq!(Some(error_kind.as_str()), response.error_kind());
    }
    // one load plus one record per export attempt
    assert_eq!(d.analyser().history().len(), 3);
}

#[test]
fn test_export_inline_and_not_tabular() {
    let d = dispatcher();
    load_staff(&d);

    let html = call(
        &d,
        "export_analysis",
        json!({ "name": "staff", "format": "html" }),
    );
    let content = html.data().expect("payload")["content"]
        .as_str()
        .unwrap_or_default()
        .to_owned();
    assert!(content.starts_with("<!DOCTYPE html>"));
    assert!(content.contains("<td>Alice</td>"));

    let info = call(&d, "dataset_info", json!({ "name": "staff" }));
    let seq = info.sequence_id().expect("recorded");
    let csv = call(
        &d,
        "export_analysis",
        json!({ "sequence_id": seq, "format": "csv" }),
    );
    assert_eq!(csv.error_kind(), Some("NotTabularError"));

    let json_export = call(
        &d,
        "export_analysis",
        json!({ "sequence_id": seq, "format": "json" }),
    );
    assert!(json_export.is_success());

    let both = call(
        &d,
        "export_analysis",
        json!({ "name": "staff", "sequence_id": seq, "format": "json" }),
    );
    assert_eq!(both.error_kind(), Some("InvalidArgumentError"));
}

#[test]
fn test_file_access_is_confined() {
    let d = dispatcher();
    let response = call(
        &d,
        "load_dataset",
        json!({ "name": "etc", "file_path": "/etc/passwd" }),
    );
    assert_eq!(response.error_kind(), Some("InvalidArgumentError"));
    assert_eq!(d.analyser().history().len(), 1);
}

#[test]
fn test_batch_of_calls_fixture() {
    let d = dispatcher();
    let contents = std::fs::read_to_string(testdata().join("calls.json")).expect("fixture");
    let calls: Vec<ToolCall> = serde_json::from_str(&contents).expect("valid calls");

    for c in &calls {
        let response = d.dispatch(c);
        assert!(response.is_success(), "{} failed: {}", c.name, response.text());
    }
    let records = d.analyser().history_records(None, None);
    assert_eq!(records.len(), calls.len());
    assert!(d.analyser().registry().exists("senior_sales").expect("lock"));
}

#[test]
fn test_config_limits_apply_through_tools() {
    let config = EngineConfig {
        max_rows_per_load: 5,
        ..EngineConfig::default()
    };
    let files = FsAccess::new(&[testdata()]).expect("testdata");
    let d = Dispatcher::new(Arc::new(Analyser::new(config)), Arc::new(files));
    let response = call(
        &d,
        "load_dataset",
        json!({ "name": "staff", "file_path": "employees.csv" }),
    );
    assert_eq!(response.error_kind(), Some("LimitExceededError"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_history_ids_increase_under_concurrency() {
    let d = dispatcher();
    load_staff(&d);
    let before = d.analyser().history().len();

    let mut tasks = Vec::new();
    for i in 0..40 {
        let d = d.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            // Every third call targets a dataset that does not exist.
            let name = if i % 3 == 0 { "ghost" } else { "staff" };
            match i % 4 {
                0 => call(&d, "calculate_statistics", json!({ "name": name })),
                1 => call(&d, "data_quality_check", json!({ "name": name })),
                2 => call(
                    &d,
                    "filter_data",
                    json!({ "name": name, "condition": "age > 40", "new_name": format!("f{i}") }),
                ),
                _ => call(&d, "dataset_exists", json!({ "name": name })),
            }
        }));
    }
    let mut failures = 0;
    for task in tasks {
        let response = task.await.expect("task completes");
        if !response.is_success() {
            failures += 1;
        }
    }
    assert!(failures > 0);

    let records = d.analyser().history_records(None, None);
    assert_eq!(records.len(), before + 40);
    assert!(
        records
            .windows(2)
            .all(|w| w[0].sequence_id < w[1].sequence_id)
    );
    let failed = records.iter().filter(|r| !r.outcome.is_success()).count();
    assert_eq!(failed, failures);
}

#[test]
fn test_filter_self_overwrite_through_tool() {
    let d = dispatcher();
    load_staff(&d);
    let response = call(
        &d,
        "filter_data",
        json!({ "name": "staff", "condition": "years >= 10", "new_name": "staff" }),
    );
    let data = response.data().expect("success payload");
    assert_eq!(data["self_overwrite"], true);
    assert_eq!(data["replaced"], true);
    assert_eq!(
        d.analyser().registry().get("staff").expect("replaced").row_count(),
        5
    );
    let last = d
        .analyser()
        .history_records(Some(1), None)
        .pop()
        .expect("recorded");
    assert_eq!(last.parameters["self_overwrite"], true);
}
