//! Recursive-descent parser producing [`Expr`] trees.

use super::lexer::{Spanned, Token, tokenize};
use super::{ArithOp, Expr};
use crate::analyser::dataset::{Column, Value};
use crate::error::{AnalysisError, Result};

/// Deepest nesting a condition may have, counting parentheses, prefix
/// operators and chained `and`/`or`/arithmetic. Deeper trees would exhaust
/// the stack in the recursive parser, checker and evaluator.
pub const MAX_DEPTH: usize = 128;

pub(super) fn parse(text: &str, columns: &[Column]) -> Result<Expr> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(AnalysisError::UnsupportedSyntax("empty condition".to_owned()));
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        columns,
    };
    let expr = parser.or_expr()?;
    if let Some(extra) = parser.tokens.get(parser.pos) {
        return Err(AnalysisError::UnsupportedSyntax(format!(
            "unexpected {} at position {}",
            extra.token, extra.pos
        )));
    }
    Ok(expr)
}

/// Resolve a column reference; the only identifiers a condition may use.
pub(super) fn resolve_column(name: &str, columns: &[Column]) -> Result<Expr> {
    columns
        .iter()
        .position(|c| c.name == name)
        .map(|index| Expr::Column {
            index,
            name: name.to_owned(),
            kind: columns[index].kind,
        })
        .ok_or_else(|| AnalysisError::UnknownIdentifier(name.to_owned()))
}

struct Parser<'a> {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    columns: &'a [Column],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.token)
    }

    fn advance(&mut self) -> Option<Spanned> {
        let next = self.tokens.get(self.pos).cloned();
        if next.is_some() {
            self.pos += 1;
        }
        next
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    /// Enter one more level of nesting, failing past [`MAX_DEPTH`].
    fn descend(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            let at = self.tokens.get(self.pos).map_or(0, |s| s.pos);
            return Err(AnalysisError::UnsupportedSyntax(format!(
                "condition nests deeper than {MAX_DEPTH} levels (at position {at})"
            )));
        }
        Ok(())
    }

    fn or_expr(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.and_expr()?;
        while self.eat(&Token::Or) {
            self.descend()?;
            let right = self.and_expr()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.not_expr()?;
        while self.eat(&Token::And) {
            self.descend()?;
            let right = self.not_expr()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        self.depth = base;
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expr> {
        if self.eat(&Token::Not) {
            self.descend()?;
            let inner = self.not_expr()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr> {
        let left = self.additive()?;
        if let Some(Token::Cmp(op)) = self.peek() {
            let op = *op;
            self.pos += 1;
            let right = self.additive()?;
            return Ok(Expr::Compare {
                op,
                left: Box::new(left),
                right: Box::new(right),
            });
        }
        Ok(left)
    }

    fn additive(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.term()?;
        while let Some(Token::Arith(op @ (ArithOp::Add | ArithOp::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            self.descend()?;
            let right = self.term()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn term(&mut self) -> Result<Expr> {
        let base = self.depth;
        let mut left = self.unary()?;
        while let Some(Token::Arith(op @ (ArithOp::Mul | ArithOp::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            self.descend()?;
            let right = self.unary()?;
            left = Expr::Arith {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        self.depth = base;
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr> {
        if self.eat(&Token::Arith(ArithOp::Sub)) {
            self.descend()?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(match operand {
                Expr::Literal(Value::Number(v)) => Expr::Literal(Value::Number(-v)),
                other => Expr::Neg(Box::new(other)),
            });
        }
        if self.eat(&Token::Arith(ArithOp::Add)) {
            self.descend()?;
            let operand = self.unary()?;
            self.depth -= 1;
            return Ok(operand);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        let Some(Spanned { token, pos }) = self.advance() else {
            return Err(AnalysisError::UnsupportedSyntax(
                "condition ends unexpectedly".to_owned(),
            ));
        };
        match token {
            Token::Number(v) => Ok(Expr::Literal(Value::Number(v))),
            Token::Str(s) => Ok(Expr::Literal(Value::Text(s))),
            Token::True => Ok(Expr::Literal(Value::Bool(true))),
            Token::False => Ok(Expr::Literal(Value::Bool(false))),
            Token::Null => Ok(Expr::Literal(Value::Missing)),
            Token::Ident(name) => {
                if self.peek() == Some(&Token::LParen) {
                    return Err(AnalysisError::UnsupportedSyntax(format!(
                        "function calls are not supported ('{name}(' at position {pos})"
                    )));
                }
                resolve_column(&name, self.columns)
            }
            Token::LParen => {
                self.descend()?;
                let inner = self.or_expr()?;
                self.depth -= 1;
                if !self.eat(&Token::RParen) {
                    return Err(AnalysisError::UnsupportedSyntax(format!(
                        "missing ')' for '(' at position {pos}"
                    )));
                }
                Ok(inner)
            }
            other => Err(AnalysisError::UnsupportedSyntax(format!(
                "unexpected {other} at position {pos}"
            ))),
        }
    }
}
