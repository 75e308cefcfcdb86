// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use super::{ChannelError, QueueError, StoreError};
use thiserror::Error;

/// The inbound invocation payload could not be turned into an envelope.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Invocation payload is not a valid envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Stored payload under '{key}' is not valid: {reason}")]
    CorruptIndirect { key: String, reason: String },
}

/// Errors that abort a hop. The platform's redelivery is the retry mechanism.
#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Unknown node '{0}'")]
    UnknownNode(String),

    #[error("Node '{node_id}' has no {collaborator} configured")]
    MissingCollaborator {
        node_id: String,
        collaborator: &'static str,
    },

    #[error("Node '{node_id}' names unknown worker '{worker}'")]
    UnknownWorker { node_id: String, worker: String },

    #[error("Failed to encode outgoing payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
