//! Tokenizer for filter conditions.

use super::{ArithOp, CmpOp};
use crate::error::{AnalysisError, Result};
use std::fmt;

#[derive(Clone, Debug, PartialEq)]
pub enum Token {
    Ident(String),
    Number(f64),
    Str(String),
    Cmp(CmpOp),
    Arith(ArithOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ident(name) => write!(f, "identifier '{name}'"),
            Self::Number(v) => write!(f, "number {v}"),
            Self::Str(s) => write!(f, "string {s:?}"),
            Self::Cmp(op) => write!(f, "'{}'", op.symbol()),
            Self::Arith(op) => write!(f, "'{}'", op.symbol()),
            Self::And => f.write_str("'and'"),
            Self::Or => f.write_str("'or'"),
            Self::Not => f.write_str("'not'"),
            Self::True => f.write_str("'true'"),
            Self::False => f.write_str("'false'"),
            Self::Null => f.write_str("'null'"),
            Self::LParen => f.write_str("'('"),
            Self::RParen => f.write_str("')'"),
        }
    }
}

/// A token and the character offset it started at.
#[derive(Clone, Debug, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub pos: usize,
}

fn unsupported(msg: impl Into<String>) -> AnalysisError {
    AnalysisError::UnsupportedSyntax(msg.into())
}

pub fn tokenize(text: &str) -> Result<Vec<Spanned>> {
    let chars: Vec<char> = text.chars().collect();
    let mut pos = 0;
    let mut tokens = Vec::new();

    while pos < chars.len() {
        let c = chars[pos];
        if c.is_whitespace() {
            pos += 1;
            continue;
        }
        let start = pos;
        let token = match c {
            '(' => {
                pos += 1;
                Token::LParen
            }
            ')' => {
                pos += 1;
                Token::RParen
            }
            '+' | '-' | '*' | '/' => {
                pos += 1;
                Token::Arith(match c {
                    '+' => ArithOp::Add,
                    '-' => ArithOp::Sub,
                    '*' => ArithOp::Mul,
                    _ => ArithOp::Div,
                })
            }
            '=' | '!' | '<' | '>' => Token::Cmp(next_comparison(&chars, &mut pos)?),
            '"' | '\'' => Token::Str(next_string(&chars, &mut pos)?),
            '`' => Token::Ident(next_quoted_ident(&chars, &mut pos)?),
            c if c.is_ascii_digit() || (c == '.' && peek_is_digit(&chars, pos + 1)) => {
                Token::Number(next_number(&chars, &mut pos)?)
            }
            c if c.is_alphabetic() || c == '_' => next_word(&chars, &mut pos),
            other => {
                return Err(unsupported(format!(
                    "unexpected character '{other}' at position {start}"
                )));
            }
        };
        tokens.push(Spanned { token, pos: start });
    }

    Ok(tokens)
}

fn peek_is_digit(chars: &[char], pos: usize) -> bool {
    chars.get(pos).is_some_and(char::is_ascii_digit)
}

fn next_comparison(chars: &[char], pos: &mut usize) -> Result<CmpOp> {
    let first = chars[*pos];
    let followed_by_eq = chars.get(*pos + 1) == Some(&'=');
    let (op, width) = match (first, followed_by_eq) {
        ('=', true) => (CmpOp::Eq, 2),
        ('=', false) => (CmpOp::Eq, 1),
        ('!', true) => (CmpOp::Ne, 2),
        ('<', true) => (CmpOp::Le, 2),
        ('<', false) => (CmpOp::Lt, 1),
        ('>', true) => (CmpOp::Ge, 2),
        ('>', false) => (CmpOp::Gt, 1),
        _ => {
            return Err(unsupported(format!(
                "unexpected character '{first}' at position {} (use 'not' for negation)",
                *pos
            )));
        }
    };
    *pos += width;
    Ok(op)
}

fn next_string(chars: &[char], pos: &mut usize) -> Result<String> {
    let quote = chars[*pos];
    let start = *pos;
    *pos += 1;
    let mut out = String::new();
    while let Some(&c) = chars.get(*pos) {
        *pos += 1;
        match c {
            '\\' => {
                let escaped = chars
                    .get(*pos)
                    .ok_or_else(|| unsupported(format!("unterminated string at position {start}")))?;
                *pos += 1;
                out.push(match escaped {
                    'n' => '\n',
                    't' => '\t',
                    other => *other,
                });
            }
            c if c == quote => return Ok(out),
            c => out.push(c),
        }
    }
    Err(unsupported(format!("unterminated string at position {start}")))
}

fn next_quoted_ident(chars: &[char], pos: &mut usize) -> Result<String> {
    let start = *pos;
    *pos += 1;
    let rest = &chars[*pos..];
    let Some(len) = rest.iter().position(|&c| c == '`') else {
        return Err(unsupported(format!(
            "unterminated quoted column name at position {start}"
        )));
    };
    let name: String = rest[..len].iter().collect();
    *pos += len + 1;
    if name.is_empty() {
        return Err(unsupported(format!("empty column name at position {start}")));
    }
    Ok(name)
}

fn next_number(chars: &[char], pos: &mut usize) -> Result<f64> {
    let start = *pos;
    let mut seen_dot = false;
    while let Some(&c) = chars.get(*pos) {
        if c.is_ascii_digit() {
            *pos += 1;
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            *pos += 1;
        } else {
            break;
        }
    }
    // optional exponent
    if matches!(chars.get(*pos), Some('e' | 'E')) {
        let mut look = *pos + 1;
        if matches!(chars.get(look), Some('+' | '-')) {
            look += 1;
        }
        if peek_is_digit(chars, look) {
            *pos = look;
            while peek_is_digit(chars, *pos) {
                *pos += 1;
            }
        }
    }
    let literal: String = chars[start..*pos].iter().collect();
    if chars
        .get(*pos)
        .is_some_and(|c| c.is_alphabetic() || *c == '_' || *c == '.')
    {
        return Err(unsupported(format!(
            "malformed number '{literal}{}' at position {start}",
            chars[*pos]
        )));
    }
    literal
        .parse::<f64>()
        .map_err(|e| unsupported(format!("malformed number '{literal}' at position {start}: {e}")))
}

fn next_word(chars: &[char], pos: &mut usize) -> Token {
    let start = *pos;
    while chars
        .get(*pos)
        .is_some_and(|c| c.is_alphanumeric() || *c == '_')
    {
        *pos += 1;
    }
    let word: String = chars[start..*pos].iter().collect();
    match word.to_ascii_lowercase().as_str() {
        "and" => Token::And,
        "or" => Token::Or,
        "not" => Token::Not,
        "true" => Token::True,
        "false" => Token::False,
        "null" => Token::Null,
        _ => Token::Ident(word),
    }
}
