// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! In-process invocation channel and message queue.
//!
//! Asynchronous invocations become tokio tasks running the target node's
//! coordinator; synchronous ones are awaited inline. Every spawned task is
//! tracked so the platform can wait for the graph to go quiet.

use crate::engine::{Coordinator, HopOutcome};
use crate::envelope::{Control, Invocation, QueueMessage};
use crate::errors::{ChannelError, QueueError};
use crate::observability::messages::coordinator::HopErrored;
use crate::observability::messages::StructuredLog;
use crate::traits::{InvocationChannel, MessageQueue, MAX_QUEUE_BATCH};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryKind {
    Async,
    Sync,
    Publish,
    QueueBatch,
}

/// One message the local platform carried.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub kind: DeliveryKind,
    /// Node, topic or queue name.
    pub target: String,
    pub payload: Value,
}

pub struct InProcessChannel {
    coordinators: RwLock<HashMap<String, Weak<Coordinator>>>,
    subscriptions: HashMap<String, Vec<String>>,
    tasks: Mutex<Vec<(String, JoinHandle<()>)>>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl InProcessChannel {
    /// `subscriptions` maps each topic to its subscribing nodes.
    pub fn new(subscriptions: HashMap<String, Vec<String>>) -> Self {
        Self {
            coordinators: RwLock::new(HashMap::new()),
            subscriptions,
            tasks: Mutex::new(Vec::new()),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub async fn register(&self, coordinator: &Arc<Coordinator>) {
        self.coordinators
            .write()
            .await
            .insert(coordinator.node_id().to_string(), Arc::downgrade(coordinator));
    }

    /// Waits until no spawned invocation is left running, including the ones
    /// spawned while waiting.
    pub async fn wait_idle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.tasks.lock().await);
            if pending.is_empty() {
                return;
            }
            for (target, handle) in pending {
                if let Err(err) = handle.await {
                    HopErrored {
                        node_id: &target,
                        error: &err,
                    }
                    .log();
                }
            }
        }
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().await.clone()
    }

    async fn record(&self, kind: DeliveryKind, target: &str, payload: &Value) {
        self.deliveries.lock().await.push(Delivery {
            kind,
            target: target.to_string(),
            payload: payload.clone(),
        });
    }

    async fn lookup(&self, target: &str) -> Result<Arc<Coordinator>, ChannelError> {
        self.coordinators
            .read()
            .await
            .get(target)
            .and_then(Weak::upgrade)
            .ok_or_else(|| ChannelError::Unavailable {
                target: target.to_string(),
                reason: "no such function".to_string(),
            })
    }

    async fn spawn(&self, coordinator: Arc<Coordinator>, payload: Value) {
        let target = coordinator.node_id().to_string();
        let handle = tokio::spawn(async move {
            let ctx = coordinator.context();
            if let Err(err) = coordinator.handle(payload, &ctx).await {
                HopErrored {
                    node_id: coordinator.node_id(),
                    error: &err,
                }
                .log();
            }
        });
        self.tasks.lock().await.push((target, handle));
    }
}

#[async_trait]
impl InvocationChannel for InProcessChannel {
    async fn invoke_async(&self, target: &str, payload: Value) -> Result<(), ChannelError> {
        let coordinator = self.lookup(target).await?;
        self.record(DeliveryKind::Async, target, &payload).await;
        self.spawn(coordinator, payload).await;
        Ok(())
    }

    async fn invoke_sync(&self, target: &str, payload: Value) -> Result<Value, ChannelError> {
        let coordinator = self.lookup(target).await?;
        self.record(DeliveryKind::Sync, target, &payload).await;
        let rejected = |reason: String| ChannelError::Rejected {
            target: target.to_string(),
            reason,
        };
        let ctx = coordinator.context();
        let outcome: HopOutcome = coordinator
            .handle(payload, &ctx)
            .await
            .map_err(|e| rejected(e.to_string()))?;
        outcome.into_response().map_err(rejected)
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        self.record(DeliveryKind::Publish, topic, &payload).await;
        let subscribers = self.subscriptions.get(topic).cloned().unwrap_or_default();
        for subscriber in subscribers {
            let coordinator = self.lookup(&subscriber).await?;
            self.spawn(coordinator, payload.clone()).await;
        }
        Ok(())
    }
}

/// Hands each batch to the queue's consumer node as a `queue_messages`
/// invocation.
pub struct MemoryQueue {
    channel: Arc<InProcessChannel>,
    consumers: HashMap<String, String>,
}

impl MemoryQueue {
    /// `consumers` maps each queue to the node that receives its batches.
    pub fn new(channel: Arc<InProcessChannel>, consumers: HashMap<String, String>) -> Self {
        Self { channel, consumers }
    }
}

#[async_trait]
impl MessageQueue for MemoryQueue {
    async fn send_batch(&self, queue: &str, messages: Vec<Value>) -> Result<(), QueueError> {
        if messages.len() > MAX_QUEUE_BATCH {
            return Err(QueueError::BatchTooLarge {
                size: messages.len(),
                limit: MAX_QUEUE_BATCH,
            });
        }
        let unavailable = |reason: String| QueueError::Unavailable {
            queue: queue.to_string(),
            reason,
        };

        let batch = Value::Array(messages);
        self.channel
            .record(DeliveryKind::QueueBatch, queue, &batch)
            .await;
        let Some(consumer) = self.consumers.get(queue) else {
            return Ok(());
        };

        let messages: Vec<QueueMessage> =
            serde_json::from_value(batch).map_err(|e| unavailable(e.to_string()))?;
        let wire = Invocation::control(Control::QueueMessages(messages))
            .to_value()
            .map_err(|e| unavailable(e.to_string()))?;
        self.channel
            .invoke_async(consumer, wire)
            .await
            .map_err(|e| unavailable(e.to_string()))
    }
}
