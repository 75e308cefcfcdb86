// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turns an inbound [`Invocation`] into the mode this hop runs in.
//!
//! Precedence, first match wins:
//!
//! 1. `warmup` control
//! 2. `queue_drain` control
//! 3. `spawner` control (its idempotency token is consumed here)
//! 4. `queue_messages` control, a batch delivered by a message queue
//! 5. indirect payload, `single` or `fan_in_aggregate`
//! 6. inline payload
//!
//! Steps 5 and 6 yield [`ControlMode::Temporary`] instead of
//! [`ControlMode::Execute`] when the caller asked for a temporary run.
//!
//! A missing stored payload means an earlier delivery already consumed it.
//! That is reported as [`ControlMode::AlreadyConsumed`], never as an error.

use super::backpack::merge_backpacks;
use super::{
    Backpack, Control, DebugFlags, ExecutionEnvelope, IndirectKind, IndirectReference, Invocation,
    Payload, QueueDrainDirective, QueueMessage, SpawnerDirective,
};
use crate::engine::keys;
use crate::errors::{CoordinatorError, DecodeError};
use crate::traits::CoordinationStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A decoded hop ready for the worker.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub envelope: ExecutionEnvelope,
    pub input: Value,
    pub debug: DebugFlags,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ControlMode {
    Warmup {
        counter: i64,
    },
    QueueDrain(QueueDrainDirective),
    Spawner {
        directive: SpawnerDirective,
        branch_ids: Vec<String>,
        execution_id: String,
    },
    /// Run the worker and hand back its result without dispatching.
    Temporary(Hop),
    Execute(Hop),
    AlreadyConsumed {
        key: String,
    },
}

impl ControlMode {
    pub fn label(&self) -> &'static str {
        match self {
            ControlMode::Warmup { .. } => "warmup",
            ControlMode::QueueDrain(_) => "queue_drain",
            ControlMode::Spawner { .. } => "spawner",
            ControlMode::Temporary(_) => "temporary",
            ControlMode::Execute(_) => "execute",
            ControlMode::AlreadyConsumed { .. } => "already_consumed",
        }
    }
}

/// One entry of a fan-in results list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FanInEntry {
    pub output: Value,
    #[serde(default)]
    pub backpack: Backpack,
}

pub async fn decode(
    invocation: Invocation,
    store: &dyn CoordinationStore,
) -> Result<ControlMode, CoordinatorError> {
    match invocation.control.clone() {
        Some(Control::Warmup(counter)) => return Ok(ControlMode::Warmup { counter }),
        Some(Control::QueueDrain(directive)) => return Ok(ControlMode::QueueDrain(directive)),
        Some(Control::Spawner(directive)) => {
            if let Some(token) = &directive.idempotency_key {
                if store.get_and_delete(token).await?.is_none() {
                    return Ok(ControlMode::AlreadyConsumed { key: token.clone() });
                }
            }
            return Ok(ControlMode::Spawner {
                directive,
                branch_ids: invocation.branch_ids,
                execution_id: invocation.execution_id.unwrap_or_default(),
            });
        }
        Some(Control::QueueMessages(messages)) => {
            let hop = decode_queue_batch(&invocation, messages, store).await?;
            return Ok(ControlMode::Execute(hop));
        }
        None => {}
    }

    let debug = invocation.debug.unwrap_or_default();
    let mut envelope = invocation.envelope();

    let input = match invocation.payload {
        Payload::Inline(value) => value,
        Payload::Indirect(indirect) => {
            let IndirectReference { key, kind } = indirect.indirect;
            let resolved = match kind {
                IndirectKind::Single => load_single(store, &key).await?,
                IndirectKind::FanInAggregate => {
                    load_fan_in(store, &key, &mut envelope.backpack).await?
                }
            };
            match resolved {
                Some(value) => value,
                None => return Ok(ControlMode::AlreadyConsumed { key }),
            }
        }
    };

    let hop = Hop {
        envelope,
        input,
        debug,
    };
    if debug.temporary {
        Ok(ControlMode::Temporary(hop))
    } else {
        Ok(ControlMode::Execute(hop))
    }
}

async fn load_single(
    store: &dyn CoordinationStore,
    key: &str,
) -> Result<Option<Value>, CoordinatorError> {
    match store.get_and_delete(key).await? {
        None => Ok(None),
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| corrupt(key, e).into()),
    }
}

/// Reads and deletes a join's results list, folding each entry's backpack
/// into `backpack` in arrival order.
async fn load_fan_in(
    store: &dyn CoordinationStore,
    key: &str,
    backpack: &mut Backpack,
) -> Result<Option<Value>, CoordinatorError> {
    let Some(raw_entries) = store.take_list(key).await? else {
        return Ok(None);
    };

    let mut outputs = Vec::with_capacity(raw_entries.len());
    for raw in raw_entries {
        let entry: FanInEntry = serde_json::from_str(&raw).map_err(|e| corrupt(key, e))?;
        merge_backpacks(backpack, &entry.backpack);
        outputs.push(entry.output);
    }
    Ok(Some(Value::Array(outputs)))
}

async fn decode_queue_batch(
    invocation: &Invocation,
    messages: Vec<QueueMessage>,
    store: &dyn CoordinationStore,
) -> Result<Hop, CoordinatorError> {
    let debug = invocation.debug.unwrap_or_default();
    let Some(first) = messages.first() else {
        return Ok(Hop {
            envelope: invocation.envelope(),
            input: Value::Array(Vec::new()),
            debug,
        });
    };

    let backpack_key = keys::queue_backpack(&first.queue_insert_id);
    let backpack = match store.get(&backpack_key).await? {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| corrupt(&backpack_key, e))?,
        None => Backpack::new(),
    };

    let envelope = ExecutionEnvelope {
        execution_id: first.execution_id.clone(),
        branch_ids: first.branch_ids.clone(),
        fan_out_ids: first.fan_out_ids.clone(),
        backpack,
    };
    let input = Value::Array(messages.into_iter().map(|m| m.item).collect());

    Ok(Hop {
        envelope,
        input,
        debug,
    })
}

fn corrupt(key: &str, err: serde_json::Error) -> DecodeError {
    DecodeError::CorruptIndirect {
        key: key.to_string(),
        reason: err.to_string(),
    }
}
