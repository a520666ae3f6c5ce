//! Safe evaluation of filter conditions.
//!
//! A condition is tokenized, parsed into a closed syntax tree ([`Expr`]) and
//! type-checked against the dataset's columns before any row is touched.
//! Evaluation is plain structural recursion over that tree; nothing else can
//! compute a predicate.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! or_expr    := and_expr ("or" and_expr)*
//! and_expr   := not_expr ("and" not_expr)*
//! not_expr   := "not" not_expr | comparison
//! comparison := additive (("=" | "==" | "!=" | "<" | "<=" | ">" | ">=") additive)?
//! additive   := term (("+" | "-") term)*
//! term       := unary (("*" | "/") unary)*
//! unary      := ("-" | "+") unary | primary
//! primary    := number | string | true | false | null | column | "(" or_expr ")"
//! ```
//!
//! Missing values never raise: comparisons against them are false, arithmetic
//! propagates them, and `and`/`or`/`not` read them as false.

mod lexer;
mod parser;

pub use parser::MAX_DEPTH;

use super::dataset::{Column, ColumnKind, Value};
use crate::error::{AnalysisError, Result};
use crate::utils::fmt_number;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Parse the operator names accepted in structured clauses.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim() {
            "=" | "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            _ => None,
        }
    }

    fn is_ordering(self) -> bool {
        !matches!(self, Self::Eq | Self::Ne)
    }

    fn holds(self, ord: Ordering) -> bool {
        match self {
            Self::Eq => ord == Ordering::Equal,
            Self::Ne => ord != Ordering::Equal,
            Self::Lt => ord == Ordering::Less,
            Self::Le => ord != Ordering::Greater,
            Self::Gt => ord == Ordering::Greater,
            Self::Ge => ord != Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
        }
    }
}

/// Parsed condition tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Column {
        index: usize,
        name: String,
        kind: ColumnKind,
    },
    Compare {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Neg(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Type of an expression as far as it can be known before evaluation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum StaticType {
    Number,
    Text,
    Bool,
    /// Mixed or empty column, or `null`
    Unknown,
}

impl StaticType {
    fn of_kind(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Numeric => Self::Number,
            ColumnKind::Text => Self::Text,
            ColumnKind::Boolean => Self::Bool,
            ColumnKind::Mixed | ColumnKind::Empty => Self::Unknown,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Number => "a number",
            Self::Text => "text",
            Self::Bool => "a boolean",
            Self::Unknown => "a value",
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Missing => "missing",
        Value::Number(_) => "a number",
        Value::Text(_) => "text",
        Value::Bool(_) => "a boolean",
    }
}

impl Expr {
    /// Reject operand combinations that can never succeed.
    fn check(&self) -> Result<StaticType> {
        match self {
            Self::Literal(v) => Ok(v.kind().map_or(StaticType::Unknown, StaticType::of_kind)),
            Self::Column { kind, .. } => Ok(StaticType::of_kind(*kind)),
            Self::Neg(inner) => {
                expect_number(inner.check()?, "-")?;
                Ok(StaticType::Number)
            }
            Self::Arith { op, left, right } => {
                expect_number(left.check()?, op.symbol())?;
                expect_number(right.check()?, op.symbol())?;
                Ok(StaticType::Number)
            }
            Self::Compare { op, left, right } => {
                let (lt, rt) = (left.check()?, right.check()?);
                if lt != StaticType::Unknown && rt != StaticType::Unknown && lt != rt {
                    return Err(AnalysisError::TypeMismatch(format!(
                        "cannot compare {} with {} using '{}'",
                        lt.name(),
                        rt.name(),
                        op.symbol()
                    )));
                }
                if op.is_ordering() && (lt == StaticType::Bool || rt == StaticType::Bool) {
                    return Err(AnalysisError::TypeMismatch(format!(
                        "booleans cannot be ordered with '{}'",
                        op.symbol()
                    )));
                }
                Ok(StaticType::Bool)
            }
            Self::And(left, right) | Self::Or(left, right) => {
                expect_bool(left.check()?)?;
                expect_bool(right.check()?)?;
                Ok(StaticType::Bool)
            }
            Self::Not(inner) => {
                expect_bool(inner.check()?)?;
                Ok(StaticType::Bool)
            }
        }
    }

    /// Evaluate against one row, laid out in dataset column order.
    pub fn evaluate<'a>(&'a self, row: &'a [Value]) -> Result<Cow<'a, Value>> {
        match self {
            Self::Literal(v) => Ok(Cow::Borrowed(v)),
            Self::Column { index, .. } => {
                Ok(row.get(*index).map_or(Cow::Owned(Value::Missing), Cow::Borrowed))
            }
            Self::Neg(inner) => {
                let v = inner.evaluate(row)?;
                Ok(Cow::Owned(match v.as_ref() {
                    Value::Missing => Value::Missing,
                    Value::Number(x) => Value::number(-x),
                    other => {
                        return Err(AnalysisError::TypeMismatch(format!(
                            "cannot negate {}",
                            type_name(other)
                        )));
                    }
                }))
            }
            Self::Arith { op, left, right } => {
                let (l, r) = (left.evaluate(row)?, right.evaluate(row)?);
                Ok(Cow::Owned(arithmetic(*op, &l, &r)?))
            }
            Self::Compare { op, left, right } => {
                let (l, r) = (left.evaluate(row)?, right.evaluate(row)?);
                Ok(Cow::Owned(Value::Bool(compare(*op, &l, &r)?)))
            }
            Self::And(left, right) => {
                let holds = truthy(left.evaluate(row)?.as_ref())?
                    && truthy(right.evaluate(row)?.as_ref())?;
                Ok(Cow::Owned(Value::Bool(holds)))
            }
            Self::Or(left, right) => {
                let holds = truthy(left.evaluate(row)?.as_ref())?
                    || truthy(right.evaluate(row)?.as_ref())?;
                Ok(Cow::Owned(Value::Bool(holds)))
            }
            Self::Not(inner) => {
                let holds = truthy(inner.evaluate(row)?.as_ref())?;
                Ok(Cow::Owned(Value::Bool(!holds)))
            }
        }
    }

    /// Binding strength when rendered back to text; higher binds tighter.
    fn precedence(&self) -> u8 {
        match self {
            Self::Or(..) => 1,
            Self::And(..) => 2,
            Self::Not(_) => 3,
            Self::Compare { .. } => 4,
            Self::Arith {
                op: ArithOp::Add | ArithOp::Sub,
                ..
            } => 5,
            Self::Arith { .. } => 6,
            Self::Neg(_) => 7,
            Self::Literal(_) | Self::Column { .. } => 8,
        }
    }
}

fn expect_number(ty: StaticType, op: &str) -> Result<()> {
    match ty {
        StaticType::Number | StaticType::Unknown => Ok(()),
        other => Err(AnalysisError::TypeMismatch(format!(
            "'{op}' needs numbers, found {}",
            other.name()
        ))),
    }
}

fn expect_bool(ty: StaticType) -> Result<()> {
    match ty {
        StaticType::Bool | StaticType::Unknown => Ok(()),
        other => Err(AnalysisError::TypeMismatch(format!(
            "expected a true/false expression, found {}",
            other.name()
        ))),
    }
}

fn truthy(value: &Value) -> Result<bool> {
    match value {
        Value::Bool(b) => Ok(*b),
        Value::Missing => Ok(false),
        other => Err(AnalysisError::TypeMismatch(format!(
            "expected true/false, found {}",
            type_name(other)
        ))),
    }
}

fn arithmetic(op: ArithOp, left: &Value, right: &Value) -> Result<Value> {
    let (a, b) = match (left, right) {
        (Value::Missing, _) | (_, Value::Missing) => return Ok(Value::Missing),
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        (a, b) => {
            return Err(AnalysisError::TypeMismatch(format!(
                "'{}' needs numbers, found {} and {}",
                op.symbol(),
                type_name(a),
                type_name(b)
            )));
        }
    };
    Ok(Value::number(match op {
        ArithOp::Add => a + b,
        ArithOp::Sub => a - b,
        ArithOp::Mul => a * b,
        ArithOp::Div => {
            if b == 0.0 {
                return Err(AnalysisError::DivisionByZero);
            }
            a / b
        }
    }))
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool> {
    let ordering = match (left, right) {
        (Value::Missing, _) | (_, Value::Missing) => return Ok(false),
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => {
            if op.is_ordering() {
                return Err(AnalysisError::TypeMismatch(format!(
                    "booleans cannot be ordered with '{}'",
                    op.symbol()
                )));
            }
            Some(a.cmp(b))
        }
        (a, b) => {
            return Err(AnalysisError::TypeMismatch(format!(
                "cannot compare {} with {}",
                type_name(a),
                type_name(b)
            )));
        }
    };
    Ok(ordering.is_some_and(|ord| op.holds(ord)))
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_')
        && !matches!(
            name.to_ascii_lowercase().as_str(),
            "and" | "or" | "not" | "true" | "false" | "null"
        )
}

/// Write `expr`, in parentheses when it binds looser than `min_precedence`.
fn fmt_operand(expr: &Expr, min_precedence: u8, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if expr.precedence() < min_precedence {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prec = self.precedence();
        match self {
            Self::Literal(Value::Missing) => f.write_str("null"),
            Self::Literal(Value::Number(v)) => f.write_str(&fmt_number(*v)),
            Self::Literal(Value::Text(s)) => {
                write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
            }
            Self::Literal(Value::Bool(b)) => write!(f, "{b}"),
            Self::Column { name, .. } => {
                if is_plain_identifier(name) { f.write_str(name) } else { write!(f, "`{name}`") }
            }
            // comparisons do not chain, so both sides must bind tighter
            Self::Compare { op, left, right } => {
                fmt_operand(left, prec + 1, f)?;
                write!(f, " {} ", op.symbol())?;
                fmt_operand(right, prec + 1, f)
            }
            Self::Arith { op, left, right } => {
                fmt_operand(left, prec, f)?;
                write!(f, " {} ", op.symbol())?;
                fmt_operand(right, prec + 1, f)
            }
            Self::And(left, right) | Self::Or(left, right) => {
                let word = if matches!(self, Self::And(..)) { "and" } else { "or" };
                fmt_operand(left, prec, f)?;
                write!(f, " {word} ")?;
                fmt_operand(right, prec + 1, f)
            }
            Self::Neg(inner) => {
                f.write_str("-")?;
                fmt_operand(inner, prec, f)
            }
            Self::Not(inner) => {
                f.write_str("not ")?;
                fmt_operand(inner, prec, f)
            }
        }
    }
}

/// One `{column, operator, value}` test of a structured filter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub column: String,
    pub operator: String,
    pub value: serde_json::Value,
}

/// A parsed and type-checked predicate, bound to one column layout.
#[derive(Clone, Debug)]
pub struct Condition {
    expr: Expr,
    text: String,
}

impl Condition {
    /// Parse a textual condition against `columns`.
    pub fn parse(text: &str, columns: &[Column]) -> Result<Self> {
        let expr = parser::parse(text, columns)?;
        Self::checked(expr, text.trim().to_owned())
    }

    /// Compile structured clauses into the same tree, joined with `and`.
    pub fn from_clauses(clauses: &[Clause], columns: &[Column]) -> Result<Self> {
        if clauses.len() > MAX_DEPTH {
            return Err(AnalysisError::UnsupportedSyntax(format!(
                "at most {MAX_DEPTH} clauses can be combined, got {}",
                clauses.len()
            )));
        }
        let mut compiled: Option<Expr> = None;
        for (i, clause) in clauses.iter().enumerate() {
            let op = CmpOp::from_symbol(&clause.operator).ok_or_else(|| {
                AnalysisError::UnsupportedSyntax(format!(
                    "unsupported operator '{}' in clause {}",
                    clause.operator,
                    i + 1
                ))
            })?;
            let column = parser::resolve_column(&clause.column, columns)?;
            let test = Expr::Compare {
                op,
                left: Box::new(column),
                right: Box::new(Expr::Literal(Value::from_json(&clause.value))),
            };
            compiled = Some(match compiled {
                Some(prev) => Expr::And(Box::new(prev), Box::new(test)),
                None => test,
            });
        }
        let expr = compiled
            .ok_or_else(|| AnalysisError::UnsupportedSyntax("empty condition".to_owned()))?;
        let text = expr.to_string();
        Self::checked(expr, text)
    }

    fn checked(expr: Expr, text: String) -> Result<Self> {
        expect_bool(expr.check()?).map_err(|_| {
            AnalysisError::TypeMismatch(format!(
                "condition '{text}' does not evaluate to true or false"
            ))
        })?;
        Ok(Self { expr, text })
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Whether `row` satisfies the condition. Errors are per-row failures.
    pub fn matches(&self, row: &[Value]) -> Result<bool> {
        truthy(self.expr.evaluate(row)?.as_ref())
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<Column> {
        [
            ("age", ColumnKind::Numeric),
            ("department", ColumnKind::Text),
            ("active", ColumnKind::Boolean),
            ("score", ColumnKind::Mixed),
            ("annual salary", ColumnKind::Numeric),
        ]
        .into_iter()
        .map(|(name, kind)| Column {
            name: name.to_owned(),
            kind,
        })
        .collect()
    }

    fn row(age: Value, dept: &str) -> Vec<Value> {
        vec![
            age,
            Value::text(dept),
            Value::Bool(true),
            Value::Number(1.0),
            Value::Number(50_000.0),
        ]
    }

    #[test]
    fn test_and_condition_on_records() -> Result<()> {
        let cond = Condition::parse(r#"age > 30 and department = "Sales""#, &columns())?;
        assert!(cond.matches(&row(Value::Number(45.0), "Sales"))?);
        assert!(!cond.matches(&row(Value::Number(25.0), "Sales"))?);
        assert!(!cond.matches(&row(Value::Number(45.0), "Ops"))?);
        Ok(())
    }

    #[test]
    fn test_unknown_column_fails_at_parse_time() {
        let err = Condition::parse("salary > 10", &columns()).unwrap_err();
        assert_eq!(err.kind(), "UnknownIdentifierError");
    }

    #[test]
    fn test_numeric_vs_text_is_rejected_at_parse_time() {
        let err = Condition::parse("age = 'old'", &columns()).unwrap_err();
        assert_eq!(err.kind(), "TypeMismatchError");
        let err = Condition::parse("department + 1 > 2", &columns()).unwrap_err();
        assert_eq!(err.kind(), "TypeMismatchError");
        let err = Condition::parse("active > false", &columns()).unwrap_err();
        assert_eq!(err.kind(), "TypeMismatchError");
        let err = Condition::parse("age + 1", &columns()).unwrap_err();
        assert_eq!(err.kind(), "TypeMismatchError");
    }

    #[test]
    fn test_missing_values_compare_false() -> Result<()> {
        let cond = Condition::parse("age > 30", &columns())?;
        assert!(!cond.matches(&row(Value::Missing, "Sales"))?);
        let cond = Condition::parse("age != 30", &columns())?;
        assert!(!cond.matches(&row(Value::Missing, "Sales"))?);
        let cond = Condition::parse("age * 2 > 10 or active", &columns())?;
        assert!(cond.matches(&row(Value::Missing, "Sales"))?);
        Ok(())
    }

    #[test]
    fn test_arithmetic_and_division_by_zero() -> Result<()> {
        let cond = Condition::parse("(age - 5) / 2 >= 20", &columns())?;
        assert!(cond.matches(&row(Value::Number(45.0), "x"))?);
        assert!(!cond.matches(&row(Value::Number(44.0), "x"))?);

        let cond = Condition::parse("100 / (age - 45) > 1", &columns())?;
        let err = cond.matches(&row(Value::Number(45.0), "x")).unwrap_err();
        assert_eq!(err.kind(), "DivisionByZeroError");
        Ok(())
    }

    #[test]
    fn test_mixed_column_mismatch_is_per_row() -> Result<()> {
        let cond = Condition::parse("score > 0", &columns())?;
        assert!(cond.matches(&row(Value::Number(1.0), "x"))?);
        let mut bad = row(Value::Number(1.0), "x");
        bad[3] = Value::text("high");
        assert_eq!(cond.matches(&bad).unwrap_err().kind(), "TypeMismatchError");
        Ok(())
    }

    #[test]
    fn test_precedence_and_not() -> Result<()> {
        let cols = columns();
        let cond = Condition::parse("not age > 40 or department = 'Ops' and active", &cols)?;
        // not (age > 40) or ((department = 'Ops') and active)
        assert!(cond.matches(&row(Value::Number(30.0), "Sales"))?);
        assert!(!cond.matches(&row(Value::Number(50.0), "Sales"))?);
        assert!(cond.matches(&row(Value::Number(50.0), "Ops"))?);
        assert!(Condition::parse("-age < -40", &cols)?.matches(&row(Value::Number(45.0), "x"))?);
        Ok(())
    }

    #[test]
    fn test_backtick_columns() -> Result<()> {
        let cond = Condition::parse("`annual salary` >= 50000", &columns())?;
        assert!(cond.matches(&row(Value::Number(1.0), "x"))?);
        Ok(())
    }

    #[test]
    fn test_rejects_code_like_input() {
        for text in [
            "__import__('os')",
            "len(department) > 3",
            "department.upper() = 'X'",
            "age > 30; drop",
            "",
            "age >",
            "(age > 1",
            "age > 1 2",
        ] {
            let err = Condition::parse(text, &columns()).unwrap_err();
            assert!(
                matches!(err.kind(), "UnsupportedSyntaxError" | "UnknownIdentifierError"),
                "{text}: {err}"
            );
        }
    }

    #[test]
    fn test_clauses_compile_to_same_tree() -> Result<()> {
        let cols = columns();
        let clauses = vec![
            Clause {
                column: "age".to_owned(),
                operator: ">".to_owned(),
                value: serde_json::json!(30),
            },
            Clause {
                column: "department".to_owned(),
                operator: "==".to_owned(),
                value: serde_json::json!("Sales"),
            },
        ];
        let from_clauses = Condition::from_clauses(&clauses, &cols)?;
        let parsed = Condition::parse(r#"age > 30 and department = "Sales""#, &cols)?;
        assert_eq!(from_clauses.expr(), parsed.expr());
        assert_eq!(from_clauses.text(), r#"age > 30 and department = "Sales""#);

        let bad_op = vec![Clause {
            column: "age".to_owned(),
            operator: "~=".to_owned(),
            value: serde_json::json!(1),
        }];
        let err = Condition::from_clauses(&bad_op, &cols).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedSyntaxError");

        let bad_type = vec![Clause {
            column: "age".to_owned(),
            operator: "=".to_owned(),
            value: serde_json::json!("thirty"),
        }];
        let err = Condition::from_clauses(&bad_type, &cols).unwrap_err();
        assert_eq!(err.kind(), "TypeMismatchError");
        Ok(())
    }

    #[test]
    fn test_deep_conditions_fail_cleanly() -> Result<()> {
        let cols = columns();
        let deep = format!("{}age > 1{}", "(".repeat(50_000), ")".repeat(50_000));
        let err = Condition::parse(&deep, &cols).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedSyntaxError");

        let clause = Clause {
            column: "age".to_owned(),
            operator: ">".to_owned(),
            value: serde_json::json!(1),
        };
        let err = Condition::from_clauses(&vec![clause.clone(); MAX_DEPTH + 1], &cols).unwrap_err();
        assert_eq!(err.kind(), "UnsupportedSyntaxError");

        let cond = Condition::from_clauses(&vec![clause; MAX_DEPTH], &cols)?;
        assert!(cond.matches(&row(Value::Number(2.0), "Sales"))?);
        Ok(())
    }

    #[test]
    fn test_rendered_text_reparses_identically() -> Result<()> {
        let cols = columns();
        let cond = Condition::parse(
            "not (age + 1 > 2 * (3 - 1)) or `annual salary` = -5 and department != 'it''s'",
            &cols,
        );
        // adjacent quotes are two string literals, not an escape
        assert!(cond.is_err());

        let cond = Condition::parse(
            r#"not (age + 1 > 2 * (3 - 1)) or `annual salary` = -5 and department != "it's""#,
            &cols,
        )?;
        let reparsed = Condition::parse(&cond.expr().to_string(), &cols)?;
        assert_eq!(reparsed.expr(), cond.expr());
        Ok(())
    }
}
