// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the hop lifecycle.
//!
//! This module contains message types for logging events related to:
//! * Control mode selection (warmup, spawner, queue drain, execution)
//! * Worker returns and failures (the pipeline log)
//! * Duplicate deliveries of already-consumed payloads

use crate::observability::messages::StructuredLog;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A hop was received and its control mode decided.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_switchyard::observability::messages::coordinator::HopStarted;
///
/// let msg = HopStarted {
///     node_id: "score",
///     execution_id: "7d1c",
///     mode: "execute",
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct HopStarted<'a> {
    pub node_id: &'a str,
    pub execution_id: &'a str,
    pub mode: &'a str,
}

impl Display for HopStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' received {} hop for execution {}",
            self.node_id, self.mode, self.execution_id
        )
    }
}

impl StructuredLog for HopStarted<'_> {
    fn log(&self) {
        tracing::info!(
            node_id = self.node_id,
            execution_id = self.execution_id,
            mode = self.mode,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "hop",
            span_name = name,
            node_id = self.node_id,
            execution_id = self.execution_id,
            mode = self.mode,
        )
    }
}

/// Worker returned; emitted only when pipeline logging is `all`.
///
/// # Log Level
/// `info!` - Pipeline observability record
pub struct HopReturned<'a> {
    pub node_id: &'a str,
    pub execution_id: &'a str,
    pub input: &'a Value,
    pub output: &'a Value,
    pub backpack: &'a Value,
}

impl Display for HopReturned<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' returned for execution {}",
            self.node_id, self.execution_id
        )
    }
}

impl StructuredLog for HopReturned<'_> {
    fn log(&self) {
        tracing::info!(
            target: "pipeline",
            node_id = self.node_id,
            execution_id = self.execution_id,
            input = %self.input,
            output = %self.output,
            backpack = %self.backpack,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            target: "pipeline",
            "hop_returned",
            span_name = name,
            node_id = self.node_id,
            execution_id = self.execution_id,
        )
    }
}

/// Worker failed and the failure was routed to exception edges.
///
/// # Log Level
/// `warn!` - Handled failure
pub struct CaughtException<'a> {
    pub node_id: &'a str,
    pub execution_id: &'a str,
    pub error: &'a str,
    pub handlers: usize,
}

impl Display for CaughtException<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' failed, routing to {} exception handler(s): {}",
            self.node_id, self.handlers, self.error
        )
    }
}

impl StructuredLog for CaughtException<'_> {
    fn log(&self) {
        tracing::warn!(
            target: "pipeline",
            node_id = self.node_id,
            execution_id = self.execution_id,
            error = self.error,
            handlers = self.handlers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            target: "pipeline",
            "caught_exception",
            span_name = name,
            node_id = self.node_id,
            execution_id = self.execution_id,
            handlers = self.handlers,
        )
    }
}

/// Worker failed with nowhere to route the failure.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct UncaughtException<'a> {
    pub node_id: &'a str,
    pub execution_id: &'a str,
    pub error: &'a str,
    pub propagated: bool,
}

impl Display for UncaughtException<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' failed with no exception handler: {}",
            self.node_id, self.error
        )
    }
}

impl StructuredLog for UncaughtException<'_> {
    fn log(&self) {
        tracing::error!(
            target: "pipeline",
            node_id = self.node_id,
            execution_id = self.execution_id,
            error = self.error,
            propagated = self.propagated,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            target: "pipeline",
            "uncaught_exception",
            span_name = name,
            node_id = self.node_id,
            execution_id = self.execution_id,
        )
    }
}

/// An indirect payload was already consumed. Expected under at-least-once delivery.
///
/// # Log Level
/// `debug!` - Never an error
pub struct DuplicateDelivery<'a> {
    pub node_id: &'a str,
    pub key: &'a str,
}

impl Display for DuplicateDelivery<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' ignoring duplicate delivery of '{}'",
            self.node_id, self.key
        )
    }
}

impl StructuredLog for DuplicateDelivery<'_> {
    fn log(&self) {
        tracing::debug!(node_id = self.node_id, key = self.key, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "duplicate_delivery",
            span_name = name,
            node_id = self.node_id,
            key = self.key,
        )
    }
}

pub struct WarmupRelayed<'a> {
    pub node_id: &'a str,
    pub remaining: i64,
}

impl Display for WarmupRelayed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' warmed, relaying warmup with {} remaining",
            self.node_id, self.remaining
        )
    }
}

impl StructuredLog for WarmupRelayed<'_> {
    fn log(&self) {
        tracing::info!(node_id = self.node_id, remaining = self.remaining, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "warmup",
            span_name = name,
            node_id = self.node_id,
            remaining = self.remaining,
        )
    }
}

/// A fan-out edge received an empty list; nothing is dispatched for it.
pub struct EmptyFanOutSkipped<'a> {
    pub node_id: &'a str,
    pub target: &'a str,
}

impl Display for EmptyFanOutSkipped<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' returned an empty list, skipping fan-out to {}",
            self.node_id, self.target
        )
    }
}

impl StructuredLog for EmptyFanOutSkipped<'_> {
    fn log(&self) {
        tracing::info!(node_id = self.node_id, destination = self.target, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fan_out",
            span_name = name,
            node_id = self.node_id,
            destination = self.target,
        )
    }
}

/// A hop returned a collaborator error. The platform's redelivery is the retry.
///
/// # Log Level
/// `error!` - The hop did not finish
pub struct HopErrored<'a> {
    pub node_id: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for HopErrored<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Node '{}' failed to complete hop: {}", self.node_id, self.error)
    }
}

impl StructuredLog for HopErrored<'_> {
    fn log(&self) {
        tracing::error!(
            node_id = self.node_id,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!("hop_errored", span_name = name, node_id = self.node_id)
    }
}
