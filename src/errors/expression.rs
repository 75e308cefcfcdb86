// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExpressionError {
    /// The source text is not a valid expression.
    #[error("Parse error at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    /// The expression is valid but cannot be applied to this value.
    #[error("Evaluation error: {0}")]
    Evaluation(String),
}
