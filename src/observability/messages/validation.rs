// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Message types for graph validation warnings.

use crate::observability::messages::StructuredLog;
use std::fmt::{Display, Formatter};
use tracing::Span;

/// A merge sibling never declares the matching merge edge, so the barrier cannot fire.
///
/// # Log Level
/// `warn!` - The graph loads, but the merge target will never run
pub struct MergeSiblingNeverArrives<'a> {
    pub node_id: &'a str,
    pub sibling: &'a str,
    pub target: &'a str,
}

impl Display for MergeSiblingNeverArrives<'_> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "Node '{}' merges into {} with sibling '{}', which has no merge edge to that target",
            self.node_id, self.target, self.sibling
        )
    }
}

impl StructuredLog for MergeSiblingNeverArrives<'_> {
    fn log(&self) {
        tracing::warn!(
            node_id = self.node_id,
            sibling = self.sibling,
            destination = self.target,
            "{}", self
        );
    }

    fn span(&self, name: &str) -> Span {
        tracing::warn_span!(
            "validation",
            span_name = name,
            node_id = self.node_id,
            sibling = self.sibling,
            destination = self.target,
        )
    }
}
