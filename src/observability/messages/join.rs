// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for join barriers.
//!
//! This module contains message types for logging events related to:
//! * Fan-out seeding and spawner sizing
//! * Fan-in arrivals and completion
//! * Merge arrivals and completion

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A fan-out buffered its items and seeded the join counter.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FanOutSeeded<'a> {
    pub fan_out_id: &'a str,
    pub items: usize,
    pub spawners: usize,
}

impl Display for FanOutSeeded<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-out {} seeded with {} item(s) across {} spawner(s)",
            self.fan_out_id, self.items, self.spawners
        )
    }
}

impl StructuredLog for FanOutSeeded<'_> {
    fn log(&self) {
        tracing::info!(
            fan_out_id = self.fan_out_id,
            items = self.items,
            spawners = self.spawners,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fan_out",
            span_name = name,
            fan_out_id = self.fan_out_id,
            items = self.items,
            spawners = self.spawners,
        )
    }
}

/// # Log Level
/// `debug!` - One branch reported, more are outstanding
pub struct FanInArrived<'a> {
    pub fan_out_id: &'a str,
    pub remaining: i64,
}

impl Display for FanInArrived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-in {} received a result, {} outstanding",
            self.fan_out_id, self.remaining
        )
    }
}

impl StructuredLog for FanInArrived<'_> {
    fn log(&self) {
        tracing::debug!(
            fan_out_id = self.fan_out_id,
            remaining = self.remaining,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "fan_in",
            span_name = name,
            fan_out_id = self.fan_out_id,
            remaining = self.remaining,
        )
    }
}

/// The last branch of a fan-out reported; the continuation is being dispatched.
///
/// # Log Level
/// `info!` - Important operational event
pub struct FanInCompleted<'a> {
    pub fan_out_id: &'a str,
    pub target: &'a str,
}

impl Display for FanInCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-in {} complete, continuing to {}",
            self.fan_out_id, self.target
        )
    }
}

impl StructuredLog for FanInCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            fan_out_id = self.fan_out_id,
            destination = self.target,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "fan_in_completed",
            span_name = name,
            fan_out_id = self.fan_out_id,
            destination = self.target,
        )
    }
}

/// The counter went below zero: a redelivery after completion, or an expired record.
///
/// # Log Level
/// `warn!` - Suspicious but harmless
pub struct FanInCounterUnderflow<'a> {
    pub fan_out_id: &'a str,
    pub counter: i64,
}

impl Display for FanInCounterUnderflow<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Fan-in {} counter is {} after decrement, ignoring arrival",
            self.fan_out_id, self.counter
        )
    }
}

impl StructuredLog for FanInCounterUnderflow<'_> {
    fn log(&self) {
        tracing::warn!(
            fan_out_id = self.fan_out_id,
            counter = self.counter,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "fan_in_underflow",
            span_name = name,
            fan_out_id = self.fan_out_id,
            counter = self.counter,
        )
    }
}

pub struct MergeArrived<'a> {
    pub record: &'a str,
    pub arrived: usize,
    pub expected: usize,
}

impl Display for MergeArrived<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Merge {} has {}/{} predecessors",
            self.record, self.arrived, self.expected
        )
    }
}

impl StructuredLog for MergeArrived<'_> {
    fn log(&self) {
        tracing::debug!(
            record = self.record,
            arrived = self.arrived,
            expected = self.expected,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::debug_span!(
            "merge",
            span_name = name,
            record = self.record,
            arrived = self.arrived,
            expected = self.expected,
        )
    }
}

/// # Log Level
/// `info!` - Important operational event
pub struct MergeCompleted<'a> {
    pub record: &'a str,
    pub target: &'a str,
    pub predecessors: usize,
}

impl Display for MergeCompleted<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Merge {} complete with {} predecessors, continuing to {}",
            self.record, self.predecessors, self.target
        )
    }
}

impl StructuredLog for MergeCompleted<'_> {
    fn log(&self) {
        tracing::info!(
            record = self.record,
            destination = self.target,
            predecessors = self.predecessors,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::info_span!(
            "merge_completed",
            span_name = name,
            record = self.record,
            destination = self.target,
        )
    }
}
