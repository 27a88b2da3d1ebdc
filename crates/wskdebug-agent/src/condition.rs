// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Hit conditions.
//!
//! A hit condition decides whether an activation is forwarded to the debugger
//! or passed through to the original action. It is a small boolean expression
//! over the invocation parameters, parsed into a tree and interpreted; nothing
//! in it is ever executed as code.
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := unary ("&&" unary)*
//! unary   := "!" unary | cmp
//! cmp     := operand (("=="|"!="|"<"|"<="|">"|">=") operand)?
//! operand := literal | path | "(" expr ")"
//! literal := number | 'str' | "str" | true | false | null
//! path    := ident ("." segment)*
//! ```
//!
//! Missing paths evaluate to `null`. Truthiness follows JSON: `null`, `false`,
//! `0` and `""` are false.

use std::fmt;
use std::str::FromStr;

use serde_json::{Number, Value};
use thiserror::Error;

use wskdebug_client::Params;

/// Nesting limit for parentheses and negations.
const MAX_DEPTH: usize = 64;
/// Limit for `&&` and `||` in one expression, each one nests the tree a level.
const MAX_OPERATORS: usize = 256;

/// Errors from parsing or evaluating a condition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionError {
    /// The expression is not valid.
    #[error("invalid condition at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// Operands cannot be compared (for example `"a" < 1`).
    #[error("cannot evaluate condition: {0}")]
    Eval(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CmpOp {
    fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Path(Vec<String>),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Path(Vec<String>),
    True,
    False,
    Null,
    Not,
    And,
    Or,
    Cmp(CmpOp),
    LParen,
    RParen,
}

/// A parsed hit condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    /// Parse a condition expression.
    pub fn parse(source: &str) -> Result<Self, ConditionError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
            operators: 0,
            end: source.len(),
        };
        let expr = parser.expr()?;
        if let Some((offset, token)) = parser.peek_with_offset() {
            return Err(ConditionError::Parse {
                offset,
                message: format!("unexpected {:?}", token),
            });
        }
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    /// Evaluate against invocation parameters.
    pub fn evaluate(&self, params: &Params) -> Result<bool, ConditionError> {
        eval(&self.expr, params).map(|v| truthy(&v))
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

// ============================================================================
// Tokenizer
// ============================================================================

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

fn is_segment_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>, ConditionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    let parse_err = |offset: usize, message: &str| ConditionError::Parse {
        offset,
        message: message.to_string(),
    };

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|(_, c)| *c);

        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((offset, Token::LParen));
                i += 1;
            }
            ')' => {
                tokens.push((offset, Token::RParen));
                i += 1;
            }
            '&' if next == Some('&') => {
                tokens.push((offset, Token::And));
                i += 2;
            }
            '|' if next == Some('|') => {
                tokens.push((offset, Token::Or));
                i += 2;
            }
            '=' if next == Some('=') => {
                tokens.push((offset, Token::Cmp(CmpOp::Eq)));
                i += 2;
            }
            '!' if next == Some('=') => {
                tokens.push((offset, Token::Cmp(CmpOp::Ne)));
                i += 2;
            }
            '!' => {
                tokens.push((offset, Token::Not));
                i += 1;
            }
            '<' | '>' => {
                let or_equal = next == Some('=');
                let op = match (c, or_equal) {
                    ('<', false) => CmpOp::Lt,
                    ('<', true) => CmpOp::Le,
                    ('>', false) => CmpOp::Gt,
                    _ => CmpOp::Ge,
                };
                tokens.push((offset, Token::Cmp(op)));
                i += if or_equal { 2 } else { 1 };
            }
            '\'' | '"' => {
                let quote = c;
                let mut text = String::new();
                i += 1;
                loop {
                    let Some(&(_, c)) = chars.get(i) else {
                        return Err(parse_err(offset, "unterminated string"));
                    };
                    i += 1;
                    match c {
                        c if c == quote => break,
                        '\\' => {
                            let Some(&(_, escaped)) = chars.get(i) else {
                                return Err(parse_err(offset, "unterminated string"));
                            };
                            i += 1;
                            text.push(match escaped {
                                'n' => '\n',
                                't' => '\t',
                                other => other,
                            });
                        }
                        other => text.push(other),
                    }
                }
                tokens.push((offset, Token::Str(text)));
            }
            c if c.is_ascii_digit() || (c == '-' && next.is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().map(|(_, c)| c).collect();
                let number = text
                    .parse::<f64>()
                    .map_err(|_| parse_err(offset, "invalid number"))?;
                tokens.push((offset, Token::Number(number)));
            }
            c if is_ident_start(c) => {
                let mut segments = Vec::new();
                loop {
                    let start = i;
                    while i < chars.len() && is_segment_char(chars[i].1) {
                        i += 1;
                    }
                    if start == i {
                        return Err(parse_err(offset, "empty path segment"));
                    }
                    segments.push(chars[start..i].iter().map(|(_, c)| c).collect::<String>());
                    if chars.get(i).map(|(_, c)| *c) == Some('.') {
                        i += 1;
                    } else {
                        break;
                    }
                }
                let token = match (segments.len(), segments[0].as_str()) {
                    (1, "true") => Token::True,
                    (1, "false") => Token::False,
                    (1, "null") => Token::Null,
                    _ => Token::Path(segments),
                };
                tokens.push((offset, token));
            }
            _ => return Err(parse_err(offset, &format!("unexpected character '{}'", c))),
        }
    }

    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Parser {
    tokens: Vec<(usize, Token)>,
    pos: usize,
    depth: usize,
    operators: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(_, t)| t)
    }

    fn peek_with_offset(&self) -> Option<(usize, &Token)> {
        self.tokens.get(self.pos).map(|(o, t)| (*o, t))
    }

    fn offset(&self) -> usize {
        self.tokens.get(self.pos).map(|(o, _)| *o).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(_, t)| t.clone());
        self.pos += 1;
        token
    }

    fn error(&self, message: impl Into<String>) -> ConditionError {
        ConditionError::Parse {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn enter(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn binary(&mut self) -> Result<(), ConditionError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error("too many && and || operators"));
        }
        self.pos += 1;
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, ConditionError> {
        self.or()
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.binary()?;
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let mut left = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.binary()?;
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Not) {
            self.pos += 1;
            self.enter()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.cmp()
    }

    fn cmp(&mut self) -> Result<Expr, ConditionError> {
        let left = self.operand()?;
        if let Some(Token::Cmp(op)) = self.peek().cloned() {
            self.pos += 1;
            let right = self.operand()?;
            return Ok(Expr::Cmp(op, Box::new(left), Box::new(right)));
        }
        Ok(left)
    }

    fn operand(&mut self) -> Result<Expr, ConditionError> {
        let offset = self.offset();
        match self.next() {
            Some(Token::Number(n)) => Number::from_f64(n)
                .map(|n| Expr::Literal(Value::Number(n)))
                .ok_or_else(|| ConditionError::Parse {
                    offset,
                    message: "invalid number".to_string(),
                }),
            Some(Token::Str(s)) => Ok(Expr::Literal(Value::String(s))),
            Some(Token::True) => Ok(Expr::Literal(Value::Bool(true))),
            Some(Token::False) => Ok(Expr::Literal(Value::Bool(false))),
            Some(Token::Null) => Ok(Expr::Literal(Value::Null)),
            Some(Token::Path(segments)) => Ok(Expr::Path(segments)),
            Some(Token::LParen) => {
                self.enter()?;
                let inner = self.expr()?;
                self.depth -= 1;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ConditionError::Parse {
                        offset,
                        message: "unclosed parenthesis".to_string(),
                    }),
                }
            }
            Some(other) => Err(ConditionError::Parse {
                offset,
                message: format!("unexpected {:?}", other),
            }),
            None => Err(ConditionError::Parse {
                offset,
                message: "unexpected end of expression".to_string(),
            }),
        }
    }
}

// ============================================================================
// Evaluation
// ============================================================================

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn resolve(params: &Params, segments: &[String]) -> Value {
    let Some((first, rest)) = segments.split_first() else {
        return Value::Null;
    };
    let mut current = match params.get(first) {
        Some(value) => value,
        None => return Value::Null,
    };
    for segment in rest {
        let next = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return Value::Null,
        }
    }
    current.clone()
}

fn equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        _ => left == right,
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ConditionError> {
    use std::cmp::Ordering;

    let ordering = match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let ordering = ordering.ok_or_else(|| {
        ConditionError::Eval(format!("{} {} {}", left, op.symbol(), right))
    })?;

    Ok(match op {
        CmpOp::Lt => ordering == Ordering::Less,
        CmpOp::Le => ordering != Ordering::Greater,
        CmpOp::Gt => ordering == Ordering::Greater,
        CmpOp::Ge => ordering != Ordering::Less,
        CmpOp::Eq => ordering == Ordering::Equal,
        CmpOp::Ne => ordering != Ordering::Equal,
    })
}

fn eval(expr: &Expr, params: &Params) -> Result<Value, ConditionError> {
    Ok(match expr {
        Expr::Literal(value) => value.clone(),
        Expr::Path(segments) => resolve(params, segments),
        Expr::Not(inner) => Value::Bool(!truthy(&eval(inner, params)?)),
        Expr::And(left, right) => {
            Value::Bool(truthy(&eval(left, params)?) && truthy(&eval(right, params)?))
        }
        Expr::Or(left, right) => {
            Value::Bool(truthy(&eval(left, params)?) || truthy(&eval(right, params)?))
        }
        Expr::Cmp(op, left, right) => {
            let left = eval(left, params)?;
            let right = eval(right, params)?;
            Value::Bool(match op {
                CmpOp::Eq => equal(&left, &right),
                CmpOp::Ne => !equal(&left, &right),
                _ => compare(*op, &left, &right)?,
            })
        }
    })
}
