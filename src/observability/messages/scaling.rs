// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for self-continuing helpers: spawners, queue drains and the API poller.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use std::time::Duration;
use tracing::Span;

/// # Log Level
/// `debug!` - One spawner batch went out
pub struct SpawnerRound<'a> {
    pub invocation_id: &'a str,
    pub dispatched: usize,
}

impl Display for SpawnerRound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Spawner for {} dispatched {} buffered invocation(s)",
            self.invocation_id, self.dispatched
        )
    }
}

impl StructuredLog for SpawnerRound<'_> {
    fn log(&self) {
        tracing::debug!(
            invocation_id = self.invocation_id,
            dispatched = self.dispatched,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "spawner",
            span_name = name,
            invocation_id = self.invocation_id,
        )
    }
}

/// A helper ran low on time and handed its work to a fresh invocation.
///
/// # Log Level
/// `info!` - Important operational event
///
/// # Example
/// ```
/// use std::time::Duration;
/// use the_switchyard::observability::messages::scaling::ContinuationScheduled;
///
/// let msg = ContinuationScheduled {
///     kind: "queue_drain",
///     reference: "drain:3f2a",
///     remaining: Duration::from_secs(8),
/// };
///
/// tracing::info!("{}", msg);
/// ```
pub struct ContinuationScheduled<'a> {
    pub kind: &'a str,
    pub reference: &'a str,
    pub remaining: Duration,
}

impl Display for ContinuationScheduled<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{} for {} continuing in a new invocation with {:?} left",
            self.kind, self.reference, self.remaining
        )
    }
}

impl StructuredLog for ContinuationScheduled<'_> {
    fn log(&self) {
        tracing::info!(
            kind = self.kind,
            reference = self.reference,
            remaining_ms = self.remaining.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "continuation",
            span_name = name,
            kind = self.kind,
            reference = self.reference,
        )
    }
}

pub struct QueueJobBuffered<'a> {
    pub queue_insert_id: &'a str,
    pub queue: &'a str,
    pub items: usize,
    pub workers: usize,
}

impl Display for QueueJobBuffered<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Buffered {} item(s) for queue '{}' as {}, spawning {} drain worker(s)",
            self.items, self.queue, self.queue_insert_id, self.workers
        )
    }
}

impl StructuredLog for QueueJobBuffered<'_> {
    fn log(&self) {
        tracing::info!(
            queue_insert_id = self.queue_insert_id,
            queue = self.queue,
            items = self.items,
            workers = self.workers,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "queue_job",
            span_name = name,
            queue_insert_id = self.queue_insert_id,
            queue = self.queue,
        )
    }
}

pub struct QueueDrainRound<'a> {
    pub queue_insert_id: &'a str,
    pub sent: usize,
    pub exhausted: bool,
}

impl Display for QueueDrainRound<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Drain worker for {} sent {} message(s), exhausted={}",
            self.queue_insert_id, self.sent, self.exhausted
        )
    }
}

impl StructuredLog for QueueDrainRound<'_> {
    fn log(&self) {
        tracing::debug!(
            queue_insert_id = self.queue_insert_id,
            sent = self.sent,
            exhausted = self.exhausted,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "queue_drain",
            span_name = name,
            queue_insert_id = self.queue_insert_id,
        )
    }
}

/// # Log Level
/// `warn!` - The synchronous caller receives a 504
pub struct ApiResponseTimedOut<'a> {
    pub execution_id: &'a str,
    pub waited: Duration,
}

impl Display for ApiResponseTimedOut<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "No response for execution {} after {:?}, returning timeout",
            self.execution_id, self.waited
        )
    }
}

impl StructuredLog for ApiResponseTimedOut<'_> {
    fn log(&self) {
        tracing::warn!(
            execution_id = self.execution_id,
            waited_ms = self.waited.as_millis() as u64,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "api_timeout",
            span_name = name,
            execution_id = self.execution_id,
        )
    }
}

/// A buffered entry could not be read back and was dropped.
///
/// # Log Level
/// `warn!` - Data loss for one item
pub struct CorruptBufferedEntry<'a> {
    pub key: &'a str,
    pub reason: &'a str,
}

impl Display for CorruptBufferedEntry<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "Dropping unreadable entry from '{}': {}", self.key, self.reason)
    }
}

impl StructuredLog for CorruptBufferedEntry<'_> {
    fn log(&self) {
        tracing::warn!(key = self.key, reason = self.reason, "{}", self);
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!("corrupt_entry", span_name = name, key = self.key)
    }
}
