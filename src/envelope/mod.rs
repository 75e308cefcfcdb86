// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The execution envelope and its wire form.
//!
//! Every hop receives an [`Invocation`]: the lineage of the pipeline run
//! (execution id, branch stack, fan-out stack, backpack), an optional control
//! directive, and a payload that is either inline or a reference to a value
//! parked in the coordination store. The [`decoder`] turns it into a
//! [`ControlMode`](decoder::ControlMode).
//!
//! # Wire format
//!
//! ```json
//! {
//!   "control": {"warmup": 3},
//!   "execution_id": "7d1c...",
//!   "branch_ids": ["b1"],
//!   "fan_out_ids": [],
//!   "backpack": {"user": "ada"},
//!   "payload": {"indirect": {"key": "payload:...", "kind": "single"}}
//! }
//! ```

pub mod backpack;
pub mod decoder;

pub use backpack::{merge_backpacks, Backpack};
pub use decoder::{decode, ControlMode, Hop};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Causal identity carried on every hop.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionEnvelope {
    pub execution_id: String,
    #[serde(default)]
    pub branch_ids: Vec<String>,
    #[serde(default)]
    pub fan_out_ids: Vec<String>,
    #[serde(default)]
    pub backpack: Backpack,
}

impl ExecutionEnvelope {
    /// Fresh lineage for a new pipeline run.
    pub fn new_execution() -> Self {
        Self {
            execution_id: uuid::Uuid::new_v4().to_string(),
            ..Self::default()
        }
    }

    /// Top of the branch stack, the marker a merge keys on.
    pub fn current_branch(&self) -> Option<&str> {
        self.branch_ids.last().map(String::as_str)
    }
}

/// How a stored payload must be read back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndirectKind {
    /// One value, consumed with get-and-delete.
    Single,
    /// A fan-in results list, consumed with read-and-delete.
    FanInAggregate,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndirectReference {
    pub key: String,
    pub kind: IndirectKind,
}

/// Inline value or a pointer into the coordination store.
///
/// An object whose only field is `indirect` is always read as a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Indirect(IndirectPayload),
    Inline(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IndirectPayload {
    pub indirect: IndirectReference,
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Inline(Value::Null)
    }
}

impl Payload {
    pub fn indirect(key: impl Into<String>, kind: IndirectKind) -> Self {
        Payload::Indirect(IndirectPayload {
            indirect: IndirectReference {
                key: key.into(),
                kind,
            },
        })
    }
}

/// Control directives that replace normal execution for one invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Warmup(i64),
    QueueDrain(QueueDrainDirective),
    Spawner(SpawnerDirective),
    QueueMessages(Vec<QueueMessage>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueDrainDirective {
    pub queue_insert_id: String,
    pub execution_id: String,
    #[serde(default)]
    pub branch_ids: Vec<String>,
    #[serde(default)]
    pub fan_out_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnerDirective {
    pub invocation_id: String,
    /// Single-use token; a consumed token marks a duplicate delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

/// One message produced by a queue drain worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueMessage {
    pub queue_insert_id: String,
    pub execution_id: String,
    #[serde(default)]
    pub branch_ids: Vec<String>,
    #[serde(default)]
    pub fan_out_ids: Vec<String>,
    pub item: Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugFlags {
    /// Run the worker and hand the result straight back, dispatching nothing.
    #[serde(default)]
    pub temporary: bool,
    /// Surface unhandled worker failures on the channel's error path.
    #[serde(default)]
    pub propagate_failure: bool,
}

/// The inbound invocation payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control: Option<Control>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DebugFlags>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub branch_ids: Vec<String>,
    #[serde(default)]
    pub fan_out_ids: Vec<String>,
    #[serde(default)]
    pub backpack: Backpack,
    #[serde(default)]
    pub payload: Payload,
}

impl Invocation {
    /// Builds the wire form for a next hop.
    pub fn for_hop(envelope: &ExecutionEnvelope, payload: Payload) -> Self {
        Self {
            control: None,
            debug: None,
            execution_id: Some(envelope.execution_id.clone()),
            branch_ids: envelope.branch_ids.clone(),
            fan_out_ids: envelope.fan_out_ids.clone(),
            backpack: envelope.backpack.clone(),
            payload,
        }
    }

    pub fn control(control: Control) -> Self {
        Self {
            control: Some(control),
            ..Self::default()
        }
    }

    /// Splits off the lineage, creating a fresh execution id on first entry.
    pub fn envelope(&self) -> ExecutionEnvelope {
        ExecutionEnvelope {
            execution_id: self
                .execution_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            branch_ids: self.branch_ids.clone(),
            fan_out_ids: self.fan_out_ids.clone(),
            backpack: self.backpack.clone(),
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}
