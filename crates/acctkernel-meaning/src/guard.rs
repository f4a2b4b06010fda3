//! Guard expression compiler and evaluator.
//!
//! A guard expression is compiled once, at policy-compile time, into a
//! [`GuardExpr`] rather than re-parsed on every evaluation. Three shapes are
//! supported:
//!
//! - `field_path OP literal` where `OP` is one of `<= >= < > == = !=`
//! - a bare `field_path`, evaluated for truthiness
//!
//! Numeric literals compare via [`rust_decimal::Decimal`]; boolean literals
//! (`true`/`false`) compare as booleans; anything else falls back to string
//! equality.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::field_path::get_field_value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Le,
    Ge,
    Lt,
    Gt,
    Eq,
    Ne,
}

impl CompareOp {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "<=" => Some(Self::Le),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            ">" => Some(Self::Gt),
            "==" | "=" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum GuardExpr {
    Compare { field_path: String, op: CompareOp, literal: String },
    Truthy { field_path: String },
}

/// Operators are tried longest-first so `<=`/`>=`/`==`/`!=` are not
/// mis-split by their single-character prefixes.
const OPERATORS: &[&str] = &["<=", ">=", "!=", "==", "=", "<", ">"];

impl GuardExpr {
    pub fn compile(expression: &str) -> Self {
        let expression = expression.trim();
        for op in OPERATORS {
            if let Some(idx) = expression.find(op) {
                let field_path = expression[..idx].trim().to_string();
                let literal = expression[idx + op.len()..].trim().to_string();
                let compare_op = CompareOp::parse(op).expect("operator in OPERATORS always parses");
                return GuardExpr::Compare { field_path, op: compare_op, literal };
            }
        }
        GuardExpr::Truthy { field_path: expression.to_string() }
    }

    /// Returns `true` when the condition triggers (i.e. the guard should
    /// reject or block).
    pub fn evaluate(&self, payload: &Value) -> bool {
        match self {
            GuardExpr::Compare { field_path, op, literal } => {
                let Some(actual) = get_field_value(payload, field_path) else {
                    return false;
                };
                compare(actual, *op, literal)
            }
            GuardExpr::Truthy { field_path } => {
                get_field_value(payload, field_path).map(is_truthy).unwrap_or(false)
            }
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn compare(actual: &Value, op: CompareOp, literal: &str) -> bool {
    if actual.is_null() {
        return false;
    }

    if let Ok(expected_bool) = literal.to_ascii_lowercase().parse::<bool>() {
        return match op {
            CompareOp::Eq => is_truthy(actual) == expected_bool,
            CompareOp::Ne => is_truthy(actual) != expected_bool,
            _ => false,
        };
    }

    let actual_decimal = value_to_decimal(actual);
    let expected_decimal = literal.parse::<Decimal>().ok();
    if let (Some(a), Some(e)) = (actual_decimal, expected_decimal) {
        return match op {
            CompareOp::Le => a <= e,
            CompareOp::Ge => a >= e,
            CompareOp::Lt => a < e,
            CompareOp::Gt => a > e,
            CompareOp::Eq => a == e,
            CompareOp::Ne => a != e,
        };
    }

    let actual_str = value_to_string(actual);
    match op {
        CompareOp::Eq => actual_str == literal,
        CompareOp::Ne => actual_str != literal,
        _ => false,
    }
}

fn value_to_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
