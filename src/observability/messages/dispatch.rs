// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for the parallel dispatcher.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A hop is about to send its next-hop requests.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use the_switchyard::observability::messages::dispatch::DispatchStarted;
///
/// let msg = DispatchStarted {
///     execution_id: "7d1c",
///     request_count: 3,
///     pool_size: 50,
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct DispatchStarted<'a> {
    pub execution_id: &'a str,
    pub request_count: usize,
    pub pool_size: usize,
}

impl Display for DispatchStarted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatching {} request(s) for execution {} with pool_size={}",
            self.request_count, self.execution_id, self.pool_size
        )
    }
}

impl StructuredLog for DispatchStarted<'_> {
    fn log(&self) {
        tracing::info!(
            execution_id = self.execution_id,
            request_count = self.request_count,
            pool_size = self.pool_size,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "dispatch",
            span_name = name,
            execution_id = self.execution_id,
            request_count = self.request_count,
            pool_size = self.pool_size,
        )
    }
}

/// The hop diverged into several countable transitions and pushed a branch id.
///
/// # Log Level
/// `debug!` - Lineage detail
pub struct BranchOpened<'a> {
    pub execution_id: &'a str,
    pub branch_id: &'a str,
    pub countable: usize,
}

impl Display for BranchOpened<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Opened branch {} across {} transitions",
            self.branch_id, self.countable
        )
    }
}

impl StructuredLog for BranchOpened<'_> {
    fn log(&self) {
        tracing::debug!(
            execution_id = self.execution_id,
            branch_id = self.branch_id,
            countable = self.countable,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "branch",
            span_name = name,
            execution_id = self.execution_id,
            branch_id = self.branch_id,
        )
    }
}

/// Large payloads were parked in the store in one round trip.
///
/// # Log Level
/// `debug!` - Detailed diagnostic information
pub struct PayloadsParked<'a> {
    pub execution_id: &'a str,
    pub count: usize,
    pub bytes: usize,
}

impl Display for PayloadsParked<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Parked {} payload(s) totalling {} bytes in the coordination store",
            self.count, self.bytes
        )
    }
}

impl StructuredLog for PayloadsParked<'_> {
    fn log(&self) {
        tracing::debug!(
            execution_id = self.execution_id,
            count = self.count,
            bytes = self.bytes,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "park",
            span_name = name,
            execution_id = self.execution_id,
            count = self.count,
        )
    }
}

/// One outgoing request failed. Not retried; the platform redelivers.
///
/// # Log Level
/// `error!` - Failure requiring attention
pub struct DispatchFailed<'a> {
    pub target: &'a str,
    pub error: &'a dyn std::error::Error,
}

impl Display for DispatchFailed<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Dispatch to {} failed: {}", self.target, self.error)
    }
}

impl StructuredLog for DispatchFailed<'_> {
    fn log(&self) {
        tracing::error!(
            destination = self.target,
            error = %self.error,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::error_span!(
            "dispatch_failed",
            span_name = name,
            destination = self.target,
            error = %self.error,
        )
    }
}

pub struct DispatchCompleted<'a> {
    pub execution_id: &'a str,
    pub dispatched: usize,
    pub failed: usize,
    pub duration: std::time::Duration,
}

impl Display for DispatchCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Dispatch for execution {} finished: dispatched={}, failed={}, duration={:?}",
            self.execution_id, self.dispatched, self.failed, self.duration
        )
    }
}

impl StructuredLog for DispatchCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            execution_id = self.execution_id,
            dispatched = self.dispatched,
            failed = self.failed,
            duration_ms = self.duration.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "dispatch_completed",
            span_name = name,
            execution_id = self.execution_id,
            dispatched = self.dispatched,
            failed = self.failed,
        )
    }
}
