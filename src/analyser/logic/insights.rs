//! Natural-language findings composed from the other engines.

use super::correlation;
use super::quality::{self, distinct_count};
use super::statistics::{quantile, sorted};
use super::types::{CorrelationMethod, Insight, InsightFocus, InsightReport, QualityReport};
use crate::analyser::dataset::{ColumnKind, Dataset, Value};
use crate::utils::fmt_number;

pub const IQR_FACTOR: f64 = 1.5;
pub const IDENTIFIER_UNIQUENESS: f64 = 0.95;
pub const LOW_VARIABILITY_UNIQUENESS: f64 = 0.05;
pub const STRONG_CORRELATION: f64 = 0.7;
pub const REDUNDANT_CORRELATION: f64 = 0.9;

struct Findings {
    items: Vec<Insight>,
}

impl Findings {
    fn push(&mut self, section: InsightFocus, column: Option<&str>, severity: f64, message: String) {
        self.items.push(Insight {
            section,
            column: column.map(str::to_owned),
            severity: severity.clamp(0.0, 1.0),
            message,
        });
    }
}

pub fn generate(dataset: &Dataset, focus: InsightFocus) -> InsightReport {
    let mut findings = Findings { items: Vec::new() };
    let quality = quality::compute(dataset);

    if focus.includes(InsightFocus::Overview) {
        overview(dataset, &quality, &mut findings);
    }
    if focus.includes(InsightFocus::Outliers) {
        outliers(dataset, &mut findings);
    }
    if focus.includes(InsightFocus::Patterns) {
        patterns(dataset, &mut findings);
    }
    if focus.includes(InsightFocus::Recommendations) {
        recommendations(dataset, &quality, &mut findings);
    }
    if findings.items.is_empty() {
        findings.push(
            focus,
            None,
            0.0,
            format!("No notable {}findings for '{}'.", finding_label(focus), dataset.name),
        );
    }

    // stable: equal severities keep discovery order
    findings
        .items
        .sort_by(|a, b| b.severity.total_cmp(&a.severity));

    InsightReport {
        dataset: dataset.name.clone(),
        focus,
        insights: findings.items,
    }
}

fn finding_label(focus: InsightFocus) -> &'static str {
    match focus {
        InsightFocus::Overview => "overview ",
        InsightFocus::Outliers => "outlier ",
        InsightFocus::Patterns => "pattern ",
        InsightFocus::Recommendations => "recommendation ",
        InsightFocus::All => "",
    }
}

fn overview(dataset: &Dataset, quality: &QualityReport, out: &mut Findings) {
    let numeric = dataset.numeric_columns().len();
    out.push(
        InsightFocus::Overview,
        None,
        0.1,
        format!(
            "'{}' has {} rows and {} columns ({numeric} numeric, {} other).",
            dataset.name,
            dataset.row_count(),
            dataset.column_count(),
            dataset.column_count().saturating_sub(numeric)
        ),
    );

    let cells = dataset.row_count() * dataset.column_count();
    let missing: usize = quality.columns.iter().map(|c| c.missing).sum();
    if cells > 0 && missing > 0 {
        let frac = missing as f64 / cells as f64;
        let worst = quality
            .columns
            .iter()
            .max_by(|a, b| a.missing_pct.total_cmp(&b.missing_pct));
        let worst_text = worst.map_or_else(String::new, |w| {
            format!("; '{}' is the least complete at {:.1}%", w.column, w.missing_pct)
        });
        out.push(
            InsightFocus::Overview,
            None,
            0.3 + 0.7 * frac,
            format!("{:.1}% of all cells are missing{worst_text}.", frac * 100.0),
        );
    }

    if quality.duplicate_rows > 0 {
        out.push(
            InsightFocus::Overview,
            None,
            0.4 + quality.duplicate_pct / 100.0,
            format!(
                "{} duplicate row(s) ({:.1}% of the data).",
                quality.duplicate_rows, quality.duplicate_pct
            ),
        );
    }

    out.push(
        InsightFocus::Overview,
        None,
        if quality.health_score < 0.7 { 0.6 } else { 0.15 },
        format!(
            "Data health score is {:.2} with {} quality issue(s).",
            quality.health_score,
            quality.issues.len()
        ),
    );
}

fn outliers(dataset: &Dataset, out: &mut Findings) {
    for idx in dataset.numeric_columns() {
        let (values, _) = dataset.numeric_values(idx);
        if values.len() < 4 {
            continue;
        }
        let s = sorted(&values);
        let (Some(q1), Some(q3)) = (quantile(&s, 0.25), quantile(&s, 0.75)) else {
            continue;
        };
        let iqr = q3 - q1;
        let (lo, hi) = (q1 - IQR_FACTOR * iqr, q3 + IQR_FACTOR * iqr);
        let count = values.iter().filter(|v| **v < lo || **v > hi).count();
        if count == 0 {
            continue;
        }
        let frac = count as f64 / values.len() as f64;
        let name = &dataset.columns[idx].name;
        out.push(
            InsightFocus::Outliers,
            Some(name),
            (0.3 + 2.0 * frac).min(0.9),
            format!(
                "Column '{name}' has {count} outlier(s) ({:.1}%) outside [{}, {}].",
                frac * 100.0,
                fmt_number(lo),
                fmt_number(hi)
            ),
        );
    }
}

fn patterns(dataset: &Dataset, out: &mut Findings) {
    for (idx, col) in dataset.columns.iter().enumerate() {
        let present = dataset.column_values(idx).filter(|v| !v.is_missing()).count();
        if present < 2 {
            continue;
        }
        let ratio = distinct_count(dataset.column_values(idx)) as f64 / present as f64;
        if ratio > IDENTIFIER_UNIQUENESS {
            out.push(
                InsightFocus::Patterns,
                Some(&col.name),
                0.35,
                format!(
                    "'{}' is {:.0}% unique; it may be an identifier rather than a feature.",
                    col.name,
                    ratio * 100.0
                ),
            );
        } else if ratio < LOW_VARIABILITY_UNIQUENESS {
            out.push(
                InsightFocus::Patterns,
                Some(&col.name),
                0.3,
                format!("'{}' has very limited variability.", col.name),
            );
        }
    }

    if let Ok(report) = correlation::compute(dataset, CorrelationMethod::Pearson, STRONG_CORRELATION) {
        for pair in &report.pairs {
            let direction = if pair.coefficient > 0.0 { "positive" } else { "negative" };
            out.push(
                InsightFocus::Patterns,
                Some(&pair.column_a),
                0.5 + (pair.coefficient.abs() - STRONG_CORRELATION),
                format!(
                    "'{}' and '{}' show a {} {direction} correlation (r = {:.3}).",
                    pair.column_a,
                    pair.column_b,
                    pair.strength.label(),
                    pair.coefficient
                ),
            );
        }
    }
}

fn recommendations(dataset: &Dataset, quality: &QualityReport, out: &mut Findings) {
    for col in quality.columns.iter().filter(|c| c.missing > 0) {
        let (severity, advice) = if col.missing_pct > 20.0 {
            (0.7, "consider dropping it or imputing with care")
        } else {
            (0.45, "consider mean/median imputation or dropping the affected rows")
        };
        out.push(
            InsightFocus::Recommendations,
            Some(&col.column),
            severity,
            format!(
                "'{}' is {:.1}% missing; {advice}.",
                col.column, col.missing_pct
            ),
        );
    }

    if let Ok(report) = correlation::compute(dataset, CorrelationMethod::Pearson, REDUNDANT_CORRELATION)
    {
        for pair in &report.pairs {
            out.push(
                InsightFocus::Recommendations,
                Some(&pair.column_b),
                0.55,
                format!(
                    "'{}' and '{}' are highly correlated (r = {:.3}); consider keeping only one.",
                    pair.column_a, pair.column_b, pair.coefficient
                ),
            );
        }
    }

    for (idx, col) in dataset.columns.iter().enumerate() {
        if col.kind != ColumnKind::Text {
            continue;
        }
        let mut texts = dataset.column_values(idx).filter_map(|v| match v {
            Value::Text(s) => Some(s),
            _ => None,
        });
        let all_numeric = texts.all(|s| s.trim().parse::<f64>().is_ok_and(f64::is_finite));
        if all_numeric {
            out.push(
                InsightFocus::Recommendations,
                Some(&col.name),
                0.5,
                format!(
                    "'{}' stores numbers as text; convert it to a numeric column.",
                    col.name
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyser::dataset::{SourceDescriptor, SourceFormat};

    fn dataset(columns: &[&str], rows: Vec<Vec<Value>>) -> Dataset {
        Dataset::new(
            "ins",
            columns.iter().map(|c| (*c).to_owned()).collect(),
            rows,
            SourceDescriptor::Loaded {
                format: SourceFormat::Json,
                origin: None,
            },
        )
        .expect("valid dataset")
    }

    fn sample() -> Dataset {
        let mut rows: Vec<Vec<Value>> = (1..=10)
            .map(|i| {
                let x = f64::from(i);
                vec![
                    Value::Number(x),
                    Value::Number(2.0 * x),
                    Value::text(format!("{}", i * 100)),
                    Value::text("same"),
                ]
            })
            .collect();
        // one extreme value and a gap
        rows[9][0] = Value::Number(1000.0);
        rows[3][1] = Value::Missing;
        dataset(&["x", "double", "code", "flag"], rows)
    }

    #[test]
    fn test_overview_is_default_and_ranked() {
        let report = generate(&sample(), InsightFocus::default());
        assert_eq!(report.focus, InsightFocus::Overview);
        assert!(report.insights.iter().all(|i| i.section == InsightFocus::Overview));
        assert!(
            report
                .insights
                .windows(2)
                .all(|w| w[0].severity >= w[1].severity)
        );
        assert!(report.insights.iter().any(|i| i.message.contains("10 rows and 4 columns")));
    }

    #[test]
    fn test_outliers_use_iqr_rule() {
        let report = generate(&sample(), InsightFocus::Outliers);
        assert_eq!(report.insights.len(), 1);
        let finding = &report.insights[0];
        assert_eq!(finding.column.as_deref(), Some("x"));
        assert!(finding.message.contains("1 outlier"));
    }

    #[test]
    fn test_patterns_flag_identifiers_and_constants() {
        let report = generate(&sample(), InsightFocus::Patterns);
        let about = |col: &str| {
            report
                .insights
                .iter()
                .filter(|i| i.column.as_deref() == Some(col))
                .count()
        };
        assert!(about("code") >= 1);
        assert!(report.insights.iter().any(|i| i.message.contains("identifier")));
        assert!(report.insights.iter().all(|i| i.section == InsightFocus::Patterns));
    }

    #[test]
    fn test_recommendations() {
        let report = generate(&sample(), InsightFocus::Recommendations);
        let messages: Vec<&str> = report.insights.iter().map(|i| i.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("'double' is 10.0% missing")));
        assert!(messages.iter().any(|m| m.contains("'code' stores numbers as text")));
        assert!(!messages.iter().any(|m| m.contains("'flag' stores numbers")));
    }

    #[test]
    fn test_empty_findings_message() {
        let ds = dataset(&["a"], vec![vec![Value::Number(1.0)], vec![Value::Number(2.0)]]);
        let report = generate(&ds, InsightFocus::Outliers);
        assert_eq!(report.insights.len(), 1);
        assert!(report.insights[0].message.starts_with("No notable outlier findings"));
    }
}
