// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Bounded-concurrency delivery of one hop's next-hop requests.
//!
//! ## Delivery
//!
//! Requests run through a [`JoinSet`] capped at the pool size. When the set is
//! full the dispatcher waits for whichever call finishes first and starts the
//! next request in its slot, so one slow target never holds back a batch.
//!
//! ## Payload parking
//!
//! Inline payloads for `invoke` and `fan_out_item` that serialize above the
//! inline limit are parked in the coordination store and replaced with an
//! [`IndirectKind::Single`] reference. Every parked payload of the hop, plus
//! every spawner idempotency token, goes to the store in one bulk write.
//!
//! ## Failures
//!
//! Channel and queue failures are logged and counted, never retried; the
//! platform's own redelivery of this hop is the retry. Store failures abort
//! the hop once the in-flight calls have settled.

use super::context::InvocationContext;
use super::{keys, merge, queue_drain};
use crate::config::CoordinatorOptions;
use crate::envelope::{
    Control, ExecutionEnvelope, IndirectKind, Invocation, Payload, SpawnerDirective,
};
use crate::errors::CoordinatorError;
use crate::observability::messages::dispatch::{
    BranchOpened, DispatchCompleted, DispatchFailed, DispatchStarted, PayloadsParked,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{CoordinationStore, InvocationChannel};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinSet};

/// One next-hop request produced while resolving transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchRequest {
    pub envelope: ExecutionEnvelope,
    pub action: DispatchAction,
}

impl DispatchRequest {
    pub fn new(envelope: ExecutionEnvelope, action: DispatchAction) -> Self {
        Self { envelope, action }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchAction {
    /// Invoke a worker node.
    Invoke { node: String, payload: Payload },
    /// One item of a fan-out, emitted by a spawner.
    FanOutItem { node: String, payload: Payload },
    /// Report this node's result to a merge barrier.
    Merge {
        node: String,
        siblings: Vec<String>,
        from: String,
        value: Value,
    },
    /// Start a spawner over a buffered invocation list.
    Spawner { invocation_id: String },
    Publish { topic: String, value: Value },
    Enqueue { queue: String, value: Value },
    ApiResponse { value: Value },
}

impl DispatchAction {
    /// Whether this request counts towards branch divergence.
    pub fn is_countable(&self) -> bool {
        matches!(
            self,
            DispatchAction::Invoke { .. }
                | DispatchAction::Publish { .. }
                | DispatchAction::Enqueue { .. }
                | DispatchAction::Merge { .. }
        )
    }

    pub fn label(&self) -> String {
        match self {
            DispatchAction::Invoke { node, .. } => format!("node:{}", node),
            DispatchAction::FanOutItem { node, .. } => format!("fan_out_item:{}", node),
            DispatchAction::Merge { node, .. } => format!("merge:{}", node),
            DispatchAction::Spawner { invocation_id } => format!("spawner:{}", invocation_id),
            DispatchAction::Publish { topic, .. } => format!("topic:{}", topic),
            DispatchAction::Enqueue { queue, .. } => format!("queue:{}", queue),
            DispatchAction::ApiResponse { .. } => "api_response".to_string(),
        }
    }
}

/// Outcome counts for one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub failed: usize,
}

impl DispatchReport {
    pub fn absorb(&mut self, other: DispatchReport) {
        self.dispatched += other.dispatched;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub pool_size: usize,
    pub inline_limit_bytes: usize,
    pub return_ttl: Duration,
    pub queue_ttl: Duration,
}

impl From<&CoordinatorOptions> for DispatchSettings {
    fn from(options: &CoordinatorOptions) -> Self {
        Self {
            pool_size: options.dispatch_pool_size(),
            inline_limit_bytes: options.inline_payload_limit_bytes(),
            return_ttl: options.return_data_ttl(),
            queue_ttl: options.queue_metadata_ttl(),
        }
    }
}

/// A request with its payload settled, ready to leave the process.
enum Outbound {
    Invoke { target: String, payload: Value },
    Publish { topic: String, payload: Value },
    Enqueue {
        queue: String,
        envelope: ExecutionEnvelope,
        value: Value,
    },
    ApiResponse { execution_id: String, body: String },
}

impl Outbound {
    fn label(&self) -> String {
        match self {
            Outbound::Invoke { target, .. } => format!("node:{}", target),
            Outbound::Publish { topic, .. } => format!("topic:{}", topic),
            Outbound::Enqueue { queue, .. } => format!("queue:{}", queue),
            Outbound::ApiResponse { execution_id, .. } => format!("response:{}", execution_id),
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn CoordinationStore>,
    channel: Arc<dyn InvocationChannel>,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        channel: Arc<dyn InvocationChannel>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            channel,
            settings,
        }
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Delivers every request and waits until each has been handed off.
    ///
    /// Merge requests are resolved against their barrier first, using the
    /// branch stack they arrived with. When more than one countable request
    /// remains, a fresh branch id is pushed onto each of them.
    pub async fn dispatch(
        &self,
        requests: Vec<DispatchRequest>,
        ctx: &InvocationContext,
    ) -> Result<DispatchReport, CoordinatorError> {
        let Some(first) = requests.first() else {
            return Ok(DispatchReport::default());
        };
        let execution_id = first.envelope.execution_id.clone();
        let started = Instant::now();
        let countable = requests.iter().filter(|r| r.action.is_countable()).count();

        let mut pending = Vec::with_capacity(requests.len());
        for request in requests {
            match request.action {
                DispatchAction::Merge {
                    node,
                    siblings,
                    from,
                    value,
                } => {
                    let fired = merge::arrive(
                        self.store.as_ref(),
                        &request.envelope,
                        &from,
                        &node,
                        &siblings,
                        value,
                        self.settings.queue_ttl,
                    )
                    .await?;
                    pending.extend(fired.map(|next| (next, false)));
                }
                _ => pending.push((request, true)),
            }
        }

        if countable > 1 {
            let branch_id = uuid::Uuid::new_v4().to_string();
            BranchOpened {
                execution_id: &execution_id,
                branch_id: &branch_id,
                countable,
            }
            .log();
            for (request, diverges) in pending.iter_mut() {
                if *diverges && request.action.is_countable() {
                    request.envelope.branch_ids.push(branch_id.clone());
                }
            }
        }

        let outbound = self
            .settle_payloads(pending.into_iter().map(|(r, _)| r).collect(), ctx, &execution_id)
            .await?;

        DispatchStarted {
            execution_id: &execution_id,
            request_count: outbound.len(),
            pool_size: self.settings.pool_size,
        }
        .log();

        let mut report = DispatchReport::default();
        let mut fatal = None;
        let mut tasks = JoinSet::new();
        for request in outbound {
            if tasks.len() >= self.settings.pool_size.max(1) {
                if let Some(joined) = tasks.join_next().await {
                    settle(joined, &mut report, &mut fatal);
                }
            }
            let dispatcher = self.clone();
            let ctx = ctx.clone();
            tasks.spawn(async move {
                let label = request.label();
                (label, dispatcher.deliver(request, &ctx).await)
            });
        }
        while let Some(joined) = tasks.join_next().await {
            settle(joined, &mut report, &mut fatal);
        }

        DispatchCompleted {
            execution_id: &execution_id,
            dispatched: report.dispatched,
            failed: report.failed,
            duration: started.elapsed(),
        }
        .log();

        match fatal {
            Some(err) => Err(err),
            None => Ok(report),
        }
    }

    /// Chooses inline or indirect delivery and mints spawner tokens, writing
    /// everything that must be parked in one store round trip.
    async fn settle_payloads(
        &self,
        requests: Vec<DispatchRequest>,
        ctx: &InvocationContext,
        execution_id: &str,
    ) -> Result<Vec<Outbound>, CoordinatorError> {
        let mut parked: Vec<(String, String)> = Vec::new();
        let mut outbound = Vec::with_capacity(requests.len());

        for DispatchRequest { envelope, action } in requests {
            match action {
                DispatchAction::Invoke { node, payload }
                | DispatchAction::FanOutItem { node, payload } => {
                    let payload = self.park_if_large(payload, &mut parked)?;
                    outbound.push(Outbound::Invoke {
                        target: node,
                        payload: Invocation::for_hop(&envelope, payload).to_value()?,
                    });
                }
                DispatchAction::Spawner { invocation_id } => {
                    let token = keys::payload();
                    parked.push((token.clone(), "1".to_string()));
                    let mut invocation = Invocation::control(Control::Spawner(SpawnerDirective {
                        invocation_id,
                        idempotency_key: Some(token),
                    }));
                    invocation.execution_id = Some(envelope.execution_id.clone());
                    invocation.branch_ids = envelope.branch_ids.clone();
                    outbound.push(Outbound::Invoke {
                        target: ctx.function().to_string(),
                        payload: invocation.to_value()?,
                    });
                }
                DispatchAction::Publish { topic, value } => {
                    outbound.push(Outbound::Publish {
                        topic,
                        payload: Invocation::for_hop(&envelope, Payload::Inline(value))
                            .to_value()?,
                    });
                }
                DispatchAction::Enqueue { queue, value } => {
                    outbound.push(Outbound::Enqueue {
                        queue,
                        envelope,
                        value,
                    });
                }
                DispatchAction::ApiResponse { value } => {
                    outbound.push(Outbound::ApiResponse {
                        execution_id: envelope.execution_id.clone(),
                        body: serde_json::to_string(&value)?,
                    });
                }
                // Resolved before settling; a stray one is delivered as-is.
                DispatchAction::Merge { node, value, .. } => {
                    outbound.push(Outbound::Invoke {
                        target: node,
                        payload: Invocation::for_hop(&envelope, Payload::Inline(value))
                            .to_value()?,
                    });
                }
            }
        }

        if !parked.is_empty() {
            PayloadsParked {
                execution_id,
                count: parked.len(),
                bytes: parked.iter().map(|(_, v)| v.len()).sum(),
            }
            .log();
            self.store
                .set_many_with_ttl(&parked, self.settings.return_ttl)
                .await?;
        }

        Ok(outbound)
    }

    fn park_if_large(
        &self,
        payload: Payload,
        parked: &mut Vec<(String, String)>,
    ) -> Result<Payload, CoordinatorError> {
        let Payload::Inline(value) = payload else {
            return Ok(payload);
        };
        let serialized = serde_json::to_string(&value)?;
        if serialized.len() <= self.settings.inline_limit_bytes {
            return Ok(Payload::Inline(value));
        }
        let key = keys::payload();
        parked.push((key.clone(), serialized));
        Ok(Payload::indirect(key, IndirectKind::Single))
    }

    async fn deliver(
        &self,
        request: Outbound,
        ctx: &InvocationContext,
    ) -> Result<(), CoordinatorError> {
        match request {
            Outbound::Invoke { target, payload } => {
                self.channel.invoke_async(&target, payload).await?;
            }
            Outbound::Publish { topic, payload } => {
                self.channel.publish(&topic, payload).await?;
            }
            Outbound::Enqueue {
                queue,
                envelope,
                value,
            } => {
                queue_drain::buffer_job(
                    self.store.as_ref(),
                    self.channel.as_ref(),
                    &envelope,
                    &queue,
                    value,
                    ctx,
                    self.settings.queue_ttl,
                )
                .await?;
            }
            Outbound::ApiResponse { execution_id, body } => {
                self.store
                    .set_with_ttl(
                        &keys::api_response(&execution_id),
                        &body,
                        self.settings.return_ttl,
                    )
                    .await?;
            }
        }
        Ok(())
    }
}

fn settle(
    joined: Result<(String, Result<(), CoordinatorError>), JoinError>,
    report: &mut DispatchReport,
    fatal: &mut Option<CoordinatorError>,
) {
    match joined {
        Ok((_, Ok(()))) => report.dispatched += 1,
        Ok((label, Err(err))) => {
            report.failed += 1;
            DispatchFailed {
                target: &label,
                error: &err,
            }
            .log();
            if matches!(err, CoordinatorError::Store(_)) && fatal.is_none() {
                *fatal = Some(err);
            }
        }
        Err(join_error) => {
            report.failed += 1;
            DispatchFailed {
                target: "dispatch task",
                error: &join_error,
            }
            .log();
        }
    }
}
