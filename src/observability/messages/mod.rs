// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Centralized message types for structured logging.
//!
//! Each message type implements `Display` for the human-readable line and
//! [`StructuredLog`] to emit that line with its fields at the right level.

pub mod coordinator;
pub mod dispatch;
pub mod join;
pub mod scaling;
pub mod validation;

use tracing::Span;

/// Emits a message as a tracing event, or opens a span carrying its fields.
pub trait StructuredLog {
    fn log(&self);

    fn span(&self, name: &str) -> Span;
}
