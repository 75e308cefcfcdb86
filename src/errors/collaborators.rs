// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Failures reported by the out-of-process collaborators.
//!
//! None of these are retried here. The invocation platform redelivers the
//! whole hop, so every caller must stay idempotent.

use thiserror::Error;

/// Coordination store failure.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The store could not be reached or rejected the command.
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("Coordination store value is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Invocation channel failure.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Invocation channel unavailable for '{target}': {reason}")]
    Unavailable { target: String, reason: String },

    #[error("Invocation of '{target}' was rejected: {reason}")]
    Rejected { target: String, reason: String },
}

/// Message queue failure.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Message queue '{queue}' unavailable: {reason}")]
    Unavailable { queue: String, reason: String },

    #[error("Batch of {size} exceeds the queue limit of {limit}")]
    BatchTooLarge { size: usize, limit: usize },
}
