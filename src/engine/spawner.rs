// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Spawner mode: drain a buffered invocation list in fixed-size batches.
//!
//! Several spawners pop from the same list concurrently; the atomic pop is
//! what splits the work between them. A spawner that runs low on time hands
//! the list to a fresh invocation of itself and exits.

use super::context::InvocationContext;
use super::dispatcher::{DispatchAction, DispatchReport, DispatchRequest, Dispatcher};
use crate::config::consts::{CONTINUATION_THRESHOLD_SECONDS, SPAWNER_BATCH_SIZE};
use crate::envelope::{ExecutionEnvelope, SpawnerDirective};
use crate::errors::CoordinatorError;
use crate::observability::messages::scaling::{
    ContinuationScheduled, CorruptBufferedEntry, SpawnerRound,
};
use crate::observability::messages::StructuredLog;
use crate::traits::CoordinationStore;
use std::time::Duration;

pub async fn run(
    store: &dyn CoordinationStore,
    dispatcher: &Dispatcher,
    directive: &SpawnerDirective,
    lineage: ExecutionEnvelope,
    ctx: &InvocationContext,
) -> Result<DispatchReport, CoordinatorError> {
    let threshold = Duration::from_secs(CONTINUATION_THRESHOLD_SECONDS);
    let mut report = DispatchReport::default();

    loop {
        let remaining = ctx.remaining_time();
        if remaining <= threshold {
            let continuation = DispatchRequest::new(
                lineage.clone(),
                DispatchAction::Spawner {
                    invocation_id: directive.invocation_id.clone(),
                },
            );
            dispatcher.dispatch(vec![continuation], ctx).await?;
            ContinuationScheduled {
                kind: "spawner",
                reference: &directive.invocation_id,
                remaining,
            }
            .log();
            break;
        }

        let popped = store
            .list_pop_n(&directive.invocation_id, SPAWNER_BATCH_SIZE)
            .await?;
        if popped.is_empty() {
            break;
        }
        let exhausted = popped.len() < SPAWNER_BATCH_SIZE;

        let mut batch = Vec::with_capacity(popped.len());
        for raw in &popped {
            match serde_json::from_str::<DispatchRequest>(raw) {
                Ok(request) => batch.push(request),
                Err(e) => CorruptBufferedEntry {
                    key: &directive.invocation_id,
                    reason: &e.to_string(),
                }
                .log(),
            }
        }

        let round = dispatcher.dispatch(batch, ctx).await?;
        SpawnerRound {
            invocation_id: &directive.invocation_id,
            dispatched: round.dispatched,
        }
        .log();
        report.absorb(round);

        if exhausted {
            break;
        }
    }

    Ok(report)
}
