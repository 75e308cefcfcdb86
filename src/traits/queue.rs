// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::errors::QueueError;
use async_trait::async_trait;
use serde_json::Value;

/// Largest batch a single `send_batch` call accepts.
pub const MAX_QUEUE_BATCH: usize = 10;

/// Message queue service with at-least-once delivery.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Inserts up to [`MAX_QUEUE_BATCH`] messages in one call.
    async fn send_batch(&self, queue: &str, messages: Vec<Value>) -> Result<(), QueueError>;
}
