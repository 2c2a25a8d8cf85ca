//! Step condition evaluation.
//!
//! Conditions are single comparisons of a context key against a literal:
//! `complexity >= 7`, `env == 'prod'`, `fast != true`.

use std::cmp::Ordering;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::context::ExecutionContext;
use super::error::{Result, WorkflowError};

static CONDITION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*(>=|<=|==|!=|>|<)\s*(.*?)\s*$").unwrap()
});

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Ge,
    Le,
    Eq,
    Ne,
    Gt,
    Lt,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            ">=" => Self::Ge,
            "<=" => Self::Le,
            "==" => Self::Eq,
            "!=" => Self::Ne,
            ">" => Self::Gt,
            "<" => Self::Lt,
            _ => return None,
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            Self::Ge => ordering != Ordering::Less,
            Self::Le => ordering != Ordering::Greater,
            Self::Eq => ordering == Ordering::Equal,
            Self::Ne => ordering != Ordering::Equal,
            Self::Gt => ordering == Ordering::Greater,
            Self::Lt => ordering == Ordering::Less,
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Ne)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
        })
    }
}

/// Right-hand side of a condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Number(f64),
    Str(String),
    Bool(bool),
}

/// A parsed condition expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Context key being compared
    pub variable: String,

    /// Comparison operator
    pub op: Comparison,

    /// Value compared against
    pub literal: Literal,

    expression: String,
}

impl Condition {
    /// Parse a condition expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let syntax = |reason: &str| WorkflowError::ConditionSyntax {
            expression: expression.to_string(),
            reason: reason.to_string(),
        };

        let caps = CONDITION_PATTERN
            .captures(expression)
            .ok_or_else(|| syntax("expected `<name> <op> <value>`"))?;

        let op = Comparison::parse(&caps[2]).ok_or_else(|| syntax("unknown operator"))?;
        let literal = parse_literal(&caps[3]).map_err(|reason| syntax(reason))?;

        if matches!(literal, Literal::Bool(_)) && !op.is_equality() {
            return Err(syntax("booleans only support == and !="));
        }

        Ok(Self { variable: caps[1].to_string(), op, literal, expression: expression.to_string() })
    }

    /// Evaluate against a context.
    pub fn evaluate(&self, context: &ExecutionContext) -> Result<bool> {
        let value = context.get(&self.variable).ok_or_else(|| WorkflowError::UnboundVariable {
            variable: self.variable.clone(),
            expression: self.expression.clone(),
        })?;

        let ordering = match (&self.literal, value) {
            (Literal::Bool(expected), actual) => {
                let actual = as_bool(actual).ok_or_else(|| self.mismatch(value, "a boolean"))?;
                actual.cmp(expected)
            }
            (Literal::Number(expected), actual) => {
                let actual = as_number(actual).ok_or_else(|| self.mismatch(value, "a number"))?;
                actual.partial_cmp(expected).ok_or_else(|| self.mismatch(value, "a number"))?
            }
            (Literal::Str(expected), Value::String(actual)) => actual.as_str().cmp(expected.as_str()),
            (Literal::Str(expected), actual) => {
                let lhs = as_number(actual).ok_or_else(|| self.mismatch(value, "a string"))?;
                let rhs: f64 =
                    expected.parse().map_err(|_| self.mismatch(value, "a string"))?;
                lhs.partial_cmp(&rhs).ok_or_else(|| self.mismatch(value, "a string"))?
            }
        };

        Ok(self.op.holds(ordering))
    }

    fn mismatch(&self, value: &Value, expected: &str) -> WorkflowError {
        WorkflowError::TypeMismatch {
            expression: self.expression.clone(),
            left: format!("{} = {}", self.variable, value),
            right: expected.to_string(),
        }
    }
}

/// Evaluate a condition expression against a context.
pub fn evaluate(expression: &str, context: &ExecutionContext) -> Result<bool> {
    Condition::parse(expression)?.evaluate(context)
}

fn parse_literal(raw: &str) -> std::result::Result<Literal, &'static str> {
    if raw.is_empty() {
        return Err("missing value after operator");
    }

    for quote in ['\'', '"'] {
        if raw.len() >= 2 && raw.starts_with(quote) && raw.ends_with(quote) {
            return Ok(Literal::Str(raw[1..raw.len() - 1].to_string()));
        }
    }

    match raw {
        "true" => return Ok(Literal::Bool(true)),
        "false" => return Ok(Literal::Bool(false)),
        _ => {}
    }

    match raw.parse::<f64>() {
        Ok(n) if n.is_finite() => Ok(Literal::Number(n)),
        _ => Err("value must be a number, a quoted string, true or false"),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|n: &f64| n.is_finite()),
        _ => None,
    }
}

fn as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == "true" => Some(true),
        Value::String(s) if s == "false" => Some(false),
        _ => None,
    }
}
