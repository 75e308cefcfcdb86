// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Test doubles for coordinator tests: recording collaborators and stub workers.

use crate::engine::InvocationContext;
use crate::errors::{ChannelError, QueueError};
use crate::traits::{
    InvocationChannel, MessageQueue, Worker, WorkerFailure, WorkerInput, WorkerOutput,
    MAX_QUEUE_BATCH,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Async,
    Sync,
    Publish,
}

#[derive(Debug, Clone)]
pub struct Call {
    pub kind: CallKind,
    pub target: String,
    pub payload: Value,
}

/// Records every call and delivers nothing.
#[derive(Default)]
pub struct RecordingChannel {
    calls: Mutex<Vec<Call>>,
    failing: HashSet<String>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls to `target` fail with [`ChannelError::Unavailable`].
    pub fn failing(mut self, target: &str) -> Self {
        self.failing.insert(target.to_string());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn of_kind(&self, kind: CallKind, target: &str) -> Vec<Value> {
        self.calls()
            .into_iter()
            .filter(|c| c.kind == kind && c.target == target)
            .map(|c| c.payload)
            .collect()
    }

    pub fn invocations_for(&self, target: &str) -> Vec<Value> {
        self.of_kind(CallKind::Async, target)
    }

    pub fn sync_invocations_for(&self, target: &str) -> Vec<Value> {
        self.of_kind(CallKind::Sync, target)
    }

    pub fn published_to(&self, topic: &str) -> Vec<Value> {
        self.of_kind(CallKind::Publish, topic)
    }

    pub fn total(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Removes and returns everything recorded so far.
    pub fn drain(&self) -> Vec<Call> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    fn record(&self, kind: CallKind, target: &str, payload: Value) -> Result<(), ChannelError> {
        if self.failing.contains(target) {
            return Err(ChannelError::Unavailable {
                target: target.to_string(),
                reason: "stubbed failure".to_string(),
            });
        }
        self.calls.lock().unwrap().push(Call {
            kind,
            target: target.to_string(),
            payload,
        });
        Ok(())
    }
}

#[async_trait]
impl InvocationChannel for RecordingChannel {
    async fn invoke_async(&self, target: &str, payload: Value) -> Result<(), ChannelError> {
        self.record(CallKind::Async, target, payload)
    }

    async fn invoke_sync(&self, target: &str, payload: Value) -> Result<Value, ChannelError> {
        self.record(CallKind::Sync, target, payload)?;
        Ok(Value::Null)
    }

    async fn publish(&self, topic: &str, payload: Value) -> Result<(), ChannelError> {
        self.record(CallKind::Publish, topic, payload)
    }
}

#[derive(Default)]
pub struct RecordingQueue {
    batches: Mutex<HashMap<String, Vec<Vec<Value>>>>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self, queue: &str) -> Vec<Vec<Value>> {
        self.batches
            .lock()
            .unwrap()
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl MessageQueue for RecordingQueue {
    async fn send_batch(&self, queue: &str, messages: Vec<Value>) -> Result<(), QueueError> {
        if messages.len() > MAX_QUEUE_BATCH {
            return Err(QueueError::BatchTooLarge {
                size: messages.len(),
                limit: MAX_QUEUE_BATCH,
            });
        }
        self.batches
            .lock()
            .unwrap()
            .entry(queue.to_string())
            .or_default()
            .push(messages);
        Ok(())
    }
}

/// Returns its input unchanged.
pub struct EchoWorker;

#[async_trait]
impl Worker for EchoWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Ok(WorkerOutput {
            value: input.payload,
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// Always raises.
pub struct FailingWorker {
    message: String,
}

impl FailingWorker {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl Worker for FailingWorker {
    async fn run(
        &self,
        _input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Err(WorkerFailure::new(self.message.clone()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}

/// Echoes its input after writing one backpack entry.
pub struct BackpackWorker {
    key: String,
    value: Value,
}

impl BackpackWorker {
    pub fn new(key: &str, value: Value) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

#[async_trait]
impl Worker for BackpackWorker {
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let mut backpack = input.backpack;
        backpack.insert(self.key.clone(), self.value.clone());
        Ok(WorkerOutput {
            value: input.payload,
            backpack,
        })
    }

    fn name(&self) -> &str {
        "backpack"
    }
}

/// Maps its input through a closure.
pub struct FnWorker<F> {
    f: F,
}

impl<F> FnWorker<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F> Worker for FnWorker<F>
where
    F: Fn(Value) -> Value + Send + Sync,
{
    async fn run(
        &self,
        input: WorkerInput,
        _ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        Ok(WorkerOutput {
            value: (self.f)(input.payload),
            backpack: input.backpack,
        })
    }

    fn name(&self) -> &str {
        "fn"
    }
}
