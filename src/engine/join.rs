// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fan-out seeding and fan-in arrival.
//!
//! A fan-out of `N` items seeds a join record (counter `N` plus an empty
//! results list) and buffers one `fan_out_item` request per item under a
//! spawn queue. It then returns `S` spawner requests that drain the buffer
//! concurrently. Each item runs with the fan-out id pushed on its stack.
//!
//! Each arrival at the fan-in pushes its result and decrements the counter
//! in one atomic store call. The arrival that takes the counter to zero is
//! the only one that continues.

use super::context::InvocationContext;
use super::dispatcher::{DispatchAction, DispatchRequest};
use super::keys;
use crate::config::consts::SPAWNER_OVERHEAD_SECONDS;
use crate::envelope::decoder::FanInEntry;
use crate::envelope::{ExecutionEnvelope, IndirectKind, Payload};
use crate::errors::CoordinatorError;
use crate::observability::messages::join::{
    FanInArrived, FanInCompleted, FanInCounterUnderflow, FanOutSeeded,
};
use crate::observability::messages::StructuredLog;
use crate::traits::CoordinationStore;
use serde_json::Value;
use std::time::Duration;

/// Invocations per second a spawner sustains at a given memory tier.
pub fn spawn_rate_for_memory(memory_mb: u32) -> u64 {
    match memory_mb {
        0..=256 => 2,
        257..=576 => 10,
        _ => 13,
    }
}

/// How many spawners to start for `items` buffered invocations.
///
/// Starts from the fewest spawners that could emit everything within one
/// invocation's budget, then adds spawners one at a time until the items
/// would be emitted within `target_secs`, never exceeding what the current
/// invocation can itself spawn in its remaining time. Always at least one.
pub fn compute_spawner_count(
    items: usize,
    rate: u64,
    total_secs: u64,
    remaining_secs: u64,
    target_secs: u64,
) -> usize {
    let items = items as u64;
    let rate = rate.max(1);
    let max_spawns = rate.saturating_mul(remaining_secs).max(1);

    let per_run = rate.saturating_mul(total_secs.saturating_sub(SPAWNER_OVERHEAD_SECONDS).max(1));
    let runs_needed = items.div_ceil(per_run);

    let mut spawners = runs_needed.min(max_spawns).max(1);
    while items > target_secs.saturating_mul(rate).saturating_mul(spawners) {
        if spawners + 1 > max_spawns {
            break;
        }
        spawners += 1;
    }
    spawners as usize
}

#[derive(Debug, Clone)]
pub struct FanOutSettings {
    pub memory_mb: u32,
    pub spawn_target: Duration,
    pub ttl: Duration,
}

/// Seeds the join for `items` and returns the spawner requests that will emit them.
pub async fn fan_out(
    store: &dyn CoordinationStore,
    envelope: &ExecutionEnvelope,
    target: &str,
    items: Vec<Value>,
    settings: &FanOutSettings,
    ctx: &InvocationContext,
) -> Result<Vec<DispatchRequest>, CoordinatorError> {
    let fan_out_id = uuid::Uuid::new_v4().to_string();
    let invocation_id = keys::spawn_queue();
    let count = items.len();

    let mut item_envelope = envelope.clone();
    item_envelope.fan_out_ids.push(fan_out_id.clone());

    let buffered = items
        .into_iter()
        .map(|item| {
            serde_json::to_string(&DispatchRequest::new(
                item_envelope.clone(),
                DispatchAction::FanOutItem {
                    node: target.to_string(),
                    payload: Payload::Inline(item),
                },
            ))
        })
        .collect::<Result<Vec<_>, _>>()?;

    store
        .seed_join(
            &keys::join_counter(&fan_out_id),
            count as i64,
            &invocation_id,
            &buffered,
            settings.ttl,
        )
        .await?;

    let spawners = compute_spawner_count(
        count,
        spawn_rate_for_memory(settings.memory_mb),
        ctx.total_budget().as_secs(),
        ctx.remaining_time().as_secs(),
        settings.spawn_target.as_secs(),
    );

    FanOutSeeded {
        fan_out_id: &fan_out_id,
        items: count,
        spawners,
    }
    .log();

    Ok((0..spawners)
        .map(|_| {
            DispatchRequest::new(
                envelope.clone(),
                DispatchAction::Spawner {
                    invocation_id: invocation_id.clone(),
                },
            )
        })
        .collect())
}

/// Records one fan-out item's result and returns the continuation when it
/// was the last item to arrive. A no-op outside any fan-out.
pub async fn fan_in_arrive(
    store: &dyn CoordinationStore,
    envelope: &ExecutionEnvelope,
    output: &Value,
    target: &str,
    ttl: Duration,
) -> Result<Option<DispatchRequest>, CoordinatorError> {
    let mut continuing = envelope.clone();
    let Some(fan_out_id) = continuing.fan_out_ids.pop() else {
        return Ok(None);
    };

    let counter_key = keys::join_counter(&fan_out_id);
    let results_key = keys::join_results(&fan_out_id);
    let entry = FanInEntry {
        output: output.clone(),
        backpack: envelope.backpack.clone(),
    };

    let remaining = store
        .push_and_decrement(&results_key, &serde_json::to_string(&entry)?, &counter_key, ttl)
        .await?;

    if remaining > 0 {
        FanInArrived {
            fan_out_id: &fan_out_id,
            remaining,
        }
        .log();
        return Ok(None);
    }
    if remaining < 0 {
        FanInCounterUnderflow {
            fan_out_id: &fan_out_id,
            counter: remaining,
        }
        .log();
        return Ok(None);
    }

    store.delete(&counter_key).await?;
    FanInCompleted {
        fan_out_id: &fan_out_id,
        target,
    }
    .log();

    Ok(Some(DispatchRequest::new(
        continuing,
        DispatchAction::Invoke {
            node: target.to_string(),
            payload: Payload::indirect(results_key, IndirectKind::FanInAggregate),
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    #[test]
    fn test_spawner_count_meets_target() {
        let spawners = compute_spawner_count(10_000, 10, 300, 300, 10);
        assert_eq!(spawners, 100);
        assert!(10_000 / (10 * spawners) <= 10);
        assert!(10_000 > 10 * 10 * (spawners - 1));
    }

    #[test]
    fn test_spawner_count_is_capped_by_remaining_budget() {
        assert_eq!(compute_spawner_count(10_000, 2, 300, 3, 10), 6);
    }

    #[test]
    fn test_spawner_count_small_fan_out() {
        assert_eq!(compute_spawner_count(3, 13, 300, 300, 10), 1);
        assert_eq!(compute_spawner_count(1, 10, 0, 0, 10), 1);
    }

    #[test]
    fn test_rate_tiers() {
        assert_eq!(spawn_rate_for_memory(128), 2);
        assert_eq!(spawn_rate_for_memory(256), 2);
        assert_eq!(spawn_rate_for_memory(512), 10);
        assert_eq!(spawn_rate_for_memory(576), 10);
        assert_eq!(spawn_rate_for_memory(3008), 13);
    }

    #[tokio::test]
    async fn test_fan_out_seeds_join_and_buffers_items() {
        let store = MemoryStore::new();
        let envelope = ExecutionEnvelope {
            execution_id: "e1".into(),
            ..ExecutionEnvelope::default()
        };
        let settings = FanOutSettings {
            memory_mb: 768,
            spawn_target: Duration::from_secs(10),
            ttl: TTL,
        };
        let ctx = InvocationContext::new("splitter", Duration::from_secs(300), 768);

        let spawners = fan_out(
            &store,
            &envelope,
            "worker",
            vec![json!(1), json!(2), json!(3)],
            &settings,
            &ctx,
        )
        .await
        .unwrap();

        assert_eq!(spawners.len(), 1);
        let DispatchAction::Spawner { invocation_id } = &spawners[0].action else {
            panic!("expected a spawner request");
        };
        let buffered = store.list_pop_n(invocation_id, 10).await.unwrap();
        assert_eq!(buffered.len(), 3);

        let first: DispatchRequest = serde_json::from_str(&buffered[0]).unwrap();
        assert_eq!(first.envelope.fan_out_ids.len(), 1);
        let counter = keys::join_counter(&first.envelope.fan_out_ids[0]);
        assert_eq!(store.incr_by(&counter, 0).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_only_last_arrival_continues() {
        let store = MemoryStore::new();
        store
            .seed_join(&keys::join_counter("f1"), 2, "spawn:x", &[], TTL)
            .await
            .unwrap();
        let envelope = ExecutionEnvelope {
            execution_id: "e1".into(),
            fan_out_ids: vec!["outer".into(), "f1".into()],
            ..ExecutionEnvelope::default()
        };

        let first = fan_in_arrive(&store, &envelope, &json!(1), "collect", TTL)
            .await
            .unwrap();
        let last = fan_in_arrive(&store, &envelope, &json!(2), "collect", TTL)
            .await
            .unwrap()
            .unwrap();

        assert!(first.is_none());
        assert_eq!(last.envelope.fan_out_ids, vec!["outer"]);
        assert_eq!(
            last.action,
            DispatchAction::Invoke {
                node: "collect".into(),
                payload: Payload::indirect("join:f1:results", IndirectKind::FanInAggregate),
            }
        );
        assert!(!store.contains("join:f1:counter"));
        assert!(store.contains("join:f1:results"));
    }

    #[tokio::test]
    async fn test_fan_in_without_fan_out_is_a_no_op() {
        let store = MemoryStore::new();
        let envelope = ExecutionEnvelope::new_execution();

        let fired = fan_in_arrive(&store, &envelope, &json!(1), "collect", TTL)
            .await
            .unwrap();

        assert!(fired.is_none());
        assert!(store.is_empty());
    }
}
