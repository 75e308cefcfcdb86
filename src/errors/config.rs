// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Two nodes share the same id
    DuplicateNodeId {
        node_id: String,
    },
    /// An edge points at a node that is not declared in the graph
    UnknownNode {
        /// The node declaring the edge
        node_id: String,
        /// The missing target
        target: String,
    },
    /// An edge publishes to a topic that is not declared
    UnknownTopic {
        node_id: String,
        topic: String,
    },
    /// An edge enqueues to a queue that is not declared
    UnknownQueue {
        node_id: String,
        queue: String,
    },
    /// Fan-out, fan-in and merge edges can only continue into a worker node
    JoinTargetNotNode {
        node_id: String,
        edge: &'static str,
    },
    /// An edge or the default handler invokes an API endpoint, which only
    /// accepts HTTP requests
    TargetIsApiEndpoint {
        node_id: String,
        target: String,
    },
    /// A merge edge declares no sibling predecessors, or one that does not exist
    InvalidMergeSiblings {
        node_id: String,
        reason: String,
    },
    /// The graph-wide default exception handler does not resolve
    UnknownExceptionHandler {
        target: String,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DuplicateNodeId { node_id } => {
                write!(f, "Duplicate node ID: '{}'", node_id)
            }
            ValidationError::UnknownNode { node_id, target } => {
                write!(
                    f,
                    "Node '{}' transitions to '{}' which does not exist",
                    node_id, target
                )
            }
            ValidationError::UnknownTopic { node_id, topic } => {
                write!(
                    f,
                    "Node '{}' publishes to undeclared topic '{}'",
                    node_id, topic
                )
            }
            ValidationError::UnknownQueue { node_id, queue } => {
                write!(
                    f,
                    "Node '{}' enqueues to undeclared queue '{}'",
                    node_id, queue
                )
            }
            ValidationError::JoinTargetNotNode { node_id, edge } => {
                write!(
                    f,
                    "Node '{}' has a {} edge whose target is not a worker node",
                    node_id, edge
                )
            }
            ValidationError::TargetIsApiEndpoint { node_id, target } => {
                write!(
                    f,
                    "Node '{}' invokes '{}' which is an api_endpoint, not a worker node",
                    node_id, target
                )
            }
            ValidationError::InvalidMergeSiblings { node_id, reason } => {
                write!(f, "Node '{}' has an invalid merge edge: {}", node_id, reason)
            }
            ValidationError::UnknownExceptionHandler { target } => {
                write!(f, "Default exception handler '{}' does not exist", target)
            }
        }
    }
}

impl std::error::Error for ValidationError {}
