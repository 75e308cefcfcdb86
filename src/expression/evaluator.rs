// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::parser::{CompareOp, Expr, Function, Segment};
use crate::errors::ExpressionError;
use serde_json::{Map, Value};

/// Values an expression can see.
pub struct Scope<'a> {
    pub value: &'a Value,
    pub backpack: &'a Map<String, Value>,
}

pub fn evaluate(expr: &Expr, scope: &Scope<'_>) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Path { root, segments } => {
            let start = match root.as_str() {
                "backpack" => Value::Object(scope.backpack.clone()),
                _ => scope.value.clone(),
            };
            Ok(resolve_path(start, segments))
        }
        Expr::Call { function, argument } => {
            let argument = evaluate(argument, scope)?;
            match function {
                Function::Len => length_of(&argument).map(Value::from),
            }
        }
        Expr::Negate(operand) => {
            let operand = evaluate(operand, scope)?;
            match (operand.as_i64().and_then(i64::checked_neg), operand.as_f64()) {
                (Some(n), _) => Ok(Value::from(n)),
                (None, Some(n)) => Ok(Value::from(-n)),
                (None, None) => Err(ExpressionError::Evaluation(format!(
                    "cannot negate {}",
                    type_name(&operand)
                ))),
            }
        }
        Expr::Not(operand) => Ok(Value::Bool(!is_truthy(&evaluate(operand, scope)?))),
        Expr::And(left, right) => {
            if !is_truthy(&evaluate(left, scope)?) {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, scope)?)))
        }
        Expr::Or(left, right) => {
            if is_truthy(&evaluate(left, scope)?) {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(is_truthy(&evaluate(right, scope)?)))
        }
        Expr::Compare { op, left, right } => {
            let left = evaluate(left, scope)?;
            let right = evaluate(right, scope)?;
            compare(*op, &left, &right).map(Value::Bool)
        }
    }
}

/// Missing fields and out-of-range indexes resolve to null.
fn resolve_path(start: Value, segments: &[Segment]) -> Value {
    let mut current = start;
    for segment in segments {
        current = match (segment, current) {
            (Segment::Field(name), Value::Object(mut map)) => {
                map.remove(name).unwrap_or(Value::Null)
            }
            (Segment::Index(index), Value::Array(mut items)) => {
                let len = items.len() as i64;
                let position = if *index < 0 { len + index } else { *index };
                if position < 0 || position >= len {
                    Value::Null
                } else {
                    items.swap_remove(position as usize)
                }
            }
            _ => Value::Null,
        };
    }
    current
}

fn compare(op: CompareOp, left: &Value, right: &Value) -> Result<bool, ExpressionError> {
    match op {
        CompareOp::Eq => Ok(values_equal(left, right)),
        CompareOp::Ne => Ok(!values_equal(left, right)),
        CompareOp::In => contains(right, left),
        CompareOp::NotIn => contains(right, left).map(|found| !found),
        CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
            let ordering = match (left, right) {
                (Value::Number(l), Value::Number(r)) => {
                    let (l, r) = (l.as_f64().unwrap_or(f64::NAN), r.as_f64().unwrap_or(f64::NAN));
                    l.partial_cmp(&r)
                }
                (Value::String(l), Value::String(r)) => Some(l.cmp(r)),
                _ => None,
            };
            let ordering = ordering.ok_or_else(|| {
                ExpressionError::Evaluation(format!(
                    "cannot order {} against {}",
                    type_name(left),
                    type_name(right)
                ))
            })?;
            Ok(match op {
                CompareOp::Lt => ordering.is_lt(),
                CompareOp::Le => ordering.is_le(),
                CompareOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            })
        }
    }
}

fn contains(haystack: &Value, needle: &Value) -> Result<bool, ExpressionError> {
    match (haystack, needle) {
        (Value::Array(items), _) => Ok(items.iter().any(|item| values_equal(item, needle))),
        (Value::String(text), Value::String(fragment)) => Ok(text.contains(fragment.as_str())),
        (Value::Object(map), Value::String(key)) => Ok(map.contains_key(key)),
        _ => Err(ExpressionError::Evaluation(format!(
            "cannot test membership of {} in {}",
            type_name(needle),
            type_name(haystack)
        ))),
    }
}

fn length_of(value: &Value) -> Result<usize, ExpressionError> {
    match value {
        Value::Array(items) => Ok(items.len()),
        Value::String(text) => Ok(text.chars().count()),
        Value::Object(map) => Ok(map.len()),
        other => Err(ExpressionError::Evaluation(format!(
            "len() is not defined for {}",
            type_name(other)
        ))),
    }
}

/// Numbers compare as f64 so `1 == 1.0`.
pub fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => match (l.as_f64(), r.as_f64()) {
            (Some(l), Some(r)) => (l - r).abs() < f64::EPSILON,
            _ => false,
        },
        (Value::Array(l), Value::Array(r)) => {
            l.len() == r.len() && l.iter().zip(r).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(l), Value::Object(r)) => {
            l.len() == r.len()
                && l.iter()
                    .all(|(key, a)| r.get(key).map(|b| values_equal(a, b)).unwrap_or(false))
        }
        _ => left == right,
    }
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}
