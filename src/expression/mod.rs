// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Sandboxed boolean expressions for `if` edges.
//!
//! Expressions see only two names: `value` (the worker's return value) and
//! `backpack`. They can read fields, compare, combine with boolean
//! operators and call `len()`. Nothing else is reachable, so a graph author
//! cannot run arbitrary code inside the coordinator.
//!
//! Expressions are compiled once when the graph config is loaded.
//!
//! # Example
//! ```rust
//! use serde_json::json;
//! use the_switchyard::expression::Expression;
//!
//! let expr = Expression::parse("value.status == 'ok' and len(value.items) > 2").unwrap();
//! let value = json!({"status": "ok", "items": [1, 2, 3]});
//! assert!(expr.evaluate(&value, &Default::default()).unwrap());
//! ```

mod evaluator;
mod lexer;
mod parser;

pub use evaluator::{is_truthy, values_equal};

use crate::envelope::Backpack;
use crate::errors::ExpressionError;
use evaluator::Scope;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

/// A compiled `if` expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    ast: parser::Expr,
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, ExpressionError> {
        Ok(Self {
            source: source.to_string(),
            ast: parser::parse(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against a worker's return value; the result is reduced to its truthiness.
    pub fn evaluate(&self, value: &Value, backpack: &Backpack) -> Result<bool, ExpressionError> {
        let scope = Scope { value, backpack };
        evaluator::evaluate(&self.ast, &scope).map(|result| is_truthy(&result))
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Expression::parse(&source).map_err(serde::de::Error::custom)
    }
}
