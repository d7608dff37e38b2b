//! Condition expressions on steps and transitions.
//!
//! The language is deliberately small: one or more `path OP literal`
//! clauses joined by `&&`.
//!
//! ```text
//! result.risk_level == "LOW" && amount < 10000
//! ```
//!
//! - `OP` is one of `==`, `!=`, `>`, `>=`, `<`, `<=`.
//! - Literals are decimals, single- or double-quoted strings, `true`,
//!   `false` and `null`. Ordering operators only accept decimals.
//! - `result.<path>` reads the accumulated step outputs, `payload.<field>`
//!   or a bare field name reads the transaction.
//!
//! Expressions are parsed once when a workflow graph is loaded.

use rust_decimal::Decimal;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::engine::error::ConfigurationError;
use crate::transaction::view::{FieldValue, TransactionView};

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `<`
    Lt,
    /// `<=`
    Le,
}

impl CompareOp {
    fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Ge => ordering != Ordering::Less,
            Self::Lt => ordering == Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
        }
    }
}

/// Right-hand side of a clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    /// Decimal number.
    Decimal(Decimal),
    /// String.
    Text(String),
    /// Boolean.
    Bool(bool),
    /// Absence of a value.
    Null,
}

/// Where a clause reads its left-hand side from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// `result.<path>`
    Result(String),
    /// `payload.<field>` or a bare field name.
    Field(String),
}

/// One `path OP literal` comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    /// Left-hand side.
    pub operand: Operand,
    /// Operator.
    pub op: CompareOp,
    /// Right-hand side.
    pub literal: Literal,
}

/// A parsed condition: the conjunction of its clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    source: String,
    clauses: Vec<Clause>,
}

impl Condition {
    /// Parses a condition expression.
    pub fn parse(source: &str) -> Result<Self, ConfigurationError> {
        let invalid = |reason: String| ConfigurationError::InvalidCondition {
            expression: source.to_string(),
            reason,
        };
        let parts = split_conjunction(source).map_err(invalid)?;
        let clauses = parts
            .iter()
            .map(|part| parse_clause(part))
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        Ok(Self {
            source: source.trim().to_string(),
            clauses,
        })
    }

    /// The source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The parsed clauses.
    #[must_use]
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Evaluates the condition against a transaction view.
    ///
    /// A missing value equals only `null`; it is unequal to every other
    /// literal and fails every ordering comparison.
    #[must_use]
    pub fn evaluate(&self, view: &TransactionView<'_>) -> bool {
        self.clauses.iter().all(|clause| {
            let value = match &clause.operand {
                Operand::Result(path) => view.result(path),
                Operand::Field(name) => view.field(name),
            };
            compare(value.as_ref(), clause.op, &clause.literal)
        })
    }
}

fn compare(value: Option<&FieldValue>, op: CompareOp, literal: &Literal) -> bool {
    match (value, literal) {
        (None, Literal::Null) => op == CompareOp::Eq,
        (Some(_), Literal::Null) | (None, _) => op == CompareOp::Ne,
        (Some(value), Literal::Decimal(expected)) => match value.as_decimal() {
            Some(actual) => op.holds(actual.cmp(expected)),
            None => op == CompareOp::Ne,
        },
        (Some(FieldValue::Bool(actual)), Literal::Bool(expected)) => op.holds(actual.cmp(expected)),
        (Some(value), Literal::Text(expected)) => op.holds(value.to_string().as_str().cmp(expected.as_str())),
        (Some(_), Literal::Bool(_)) => op == CompareOp::Ne,
    }
}

fn split_conjunction(source: &str) -> Result<Vec<String>, String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = source.chars().peekable();
    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => {
                quote = None;
                current.push(c);
            }
            (None, '"' | '\'') => {
                quote = Some(c);
                current.push(c);
            }
            (None, '&') if chars.peek() == Some(&'&') => {
                chars.next();
                parts.push(std::mem::take(&mut current));
            }
            (None, '|') => return Err("'||' is not supported".to_string()),
            _ => current.push(c),
        }
    }
    if quote.is_some() {
        return Err("unterminated string literal".to_string());
    }
    parts.push(current);
    if parts.iter().any(|p| p.trim().is_empty()) {
        return Err("empty clause".to_string());
    }
    Ok(parts)
}

fn parse_clause(text: &str) -> Result<Clause, String> {
    let text = text.trim();
    let (index, op, width) = find_operator(text).ok_or_else(|| format!("no operator in {text:?}"))?;
    let path = text[..index].trim();
    let literal = parse_literal(text[index + width..].trim())?;

    if path.is_empty() || !path.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.') {
        return Err(format!("invalid path {path:?}"));
    }
    if op.is_ordering() && !matches!(literal, Literal::Decimal(_)) {
        return Err(format!("ordering comparison on non-numeric literal in {text:?}"));
    }
    let operand = match path.split_once('.') {
        Some(("result", rest)) if !rest.is_empty() => Operand::Result(rest.to_string()),
        Some(("payload", rest)) if !rest.is_empty() => Operand::Field(rest.to_string()),
        _ => Operand::Field(path.to_string()),
    };
    Ok(Clause {
        operand,
        op,
        literal,
    })
}

/// Finds the first operator outside quotes.
fn find_operator(text: &str) -> Option<(usize, CompareOp, usize)> {
    let bytes = text.as_bytes();
    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate() {
        if let Some(q) = quote {
            if b == q {
                quote = None;
            }
            continue;
        }
        let next = bytes.get(i + 1).copied();
        let found = match (b, next) {
            (b'"' | b'\'', _) => {
                quote = Some(b);
                None
            }
            (b'=', Some(b'=')) => Some((CompareOp::Eq, 2)),
            (b'!', Some(b'=')) => Some((CompareOp::Ne, 2)),
            (b'>', Some(b'=')) => Some((CompareOp::Ge, 2)),
            (b'<', Some(b'=')) => Some((CompareOp::Le, 2)),
            (b'>', _) => Some((CompareOp::Gt, 1)),
            (b'<', _) => Some((CompareOp::Lt, 1)),
            _ => None,
        };
        if let Some((op, width)) = found {
            return Some((i, op, width));
        }
    }
    None
}

fn parse_literal(text: &str) -> Result<Literal, String> {
    match text {
        "" => Err("missing literal".to_string()),
        "true" => Ok(Literal::Bool(true)),
        "false" => Ok(Literal::Bool(false)),
        "null" => Ok(Literal::Null),
        _ => {
            let quoted = ['"', '\''].into_iter().find_map(|q| {
                text.strip_prefix(q)
                    .and_then(|rest| rest.strip_suffix(q))
                    .filter(|inner| !inner.contains(q))
            });
            if let Some(inner) = quoted {
                return Ok(Literal::Text(inner.to_string()));
            }
            Decimal::from_str(text)
                .map(Literal::Decimal)
                .map_err(|_| format!("invalid literal {text:?}"))
        }
    }
}
