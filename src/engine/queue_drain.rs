// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Queue-backed edges.
//!
//! Enqueueing never talks to the message queue directly. The items are
//! buffered as a drain job in the coordination store, and drain workers
//! (fresh invocations of the current function with a `queue_drain` control)
//! move them into the queue in batches, each worker re-invoking itself
//! before its deadline until the buffer is empty.

use super::context::InvocationContext;
use super::dispatcher::DispatchReport;
use super::keys;
use crate::config::consts::{
    CONTINUATION_THRESHOLD_SECONDS, MAX_QUEUE_DRAIN_WORKERS, QUEUE_DRAIN_CONCURRENCY,
    QUEUE_DRAIN_POP_SIZE, QUEUE_SPAWN_CUTOFF_SECONDS, QUEUE_WORKER_RATE_PER_SECOND,
    QUEUE_WORKER_TARGET_SECONDS,
};
use crate::envelope::{Control, ExecutionEnvelope, Invocation, QueueDrainDirective, QueueMessage};
use crate::errors::CoordinatorError;
use crate::observability::messages::dispatch::DispatchFailed;
use crate::observability::messages::scaling::{
    ContinuationScheduled, CorruptBufferedEntry, QueueDrainRound, QueueJobBuffered,
};
use crate::observability::messages::StructuredLog;
use crate::traits::{CoordinationStore, InvocationChannel, MessageQueue, MAX_QUEUE_BATCH};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;

/// Drain workers needed to move `items` messages in about a minute.
pub fn drain_worker_count(items: usize) -> usize {
    items
        .div_ceil(QUEUE_WORKER_RATE_PER_SECOND * QUEUE_WORKER_TARGET_SECONDS)
        .clamp(1, MAX_QUEUE_DRAIN_WORKERS)
}

/// Buffers `value` as a drain job for `queue` and starts its drain workers.
///
/// A list enqueues one message per element; anything else is one message.
/// Returns the number of workers started.
pub async fn buffer_job(
    store: &dyn CoordinationStore,
    channel: &dyn InvocationChannel,
    envelope: &ExecutionEnvelope,
    queue: &str,
    value: Value,
    ctx: &InvocationContext,
    ttl: Duration,
) -> Result<usize, CoordinatorError> {
    let items = match value {
        Value::Array(items) => items,
        other => vec![other],
    };
    let serialized = items
        .iter()
        .map(serde_json::to_string)
        .collect::<Result<Vec<_>, _>>()?;

    let queue_insert_id = uuid::Uuid::new_v4().to_string();
    store
        .set_many_with_ttl(
            &[
                (keys::queue_target(&queue_insert_id), queue.to_string()),
                (
                    keys::queue_backpack(&queue_insert_id),
                    serde_json::to_string(&envelope.backpack)?,
                ),
            ],
            ttl,
        )
        .await?;
    if !serialized.is_empty() {
        store
            .list_push(&keys::queue_items(&queue_insert_id), &serialized, ttl)
            .await?;
    }

    let directive = QueueDrainDirective {
        queue_insert_id: queue_insert_id.clone(),
        execution_id: envelope.execution_id.clone(),
        branch_ids: envelope.branch_ids.clone(),
        fan_out_ids: envelope.fan_out_ids.clone(),
    };
    let wire = Invocation::control(Control::QueueDrain(directive)).to_value()?;

    let planned = drain_worker_count(serialized.len());
    let cutoff = Duration::from_secs(QUEUE_SPAWN_CUTOFF_SECONDS);
    let mut started = 0;
    for _ in 0..planned {
        if started > 0 && ctx.remaining_time() <= cutoff {
            break;
        }
        channel.invoke_async(ctx.function(), wire.clone()).await?;
        started += 1;
    }

    QueueJobBuffered {
        queue_insert_id: &queue_insert_id,
        queue,
        items: serialized.len(),
        workers: started,
    }
    .log();

    Ok(started)
}

/// One drain worker's run over a buffered job.
pub async fn drain(
    store: Arc<dyn CoordinationStore>,
    channel: &dyn InvocationChannel,
    queue: Arc<dyn MessageQueue>,
    directive: &QueueDrainDirective,
    ctx: &InvocationContext,
) -> Result<DispatchReport, CoordinatorError> {
    let mut report = DispatchReport::default();
    let Some(target) = store
        .get(&keys::queue_target(&directive.queue_insert_id))
        .await?
    else {
        return Ok(report);
    };
    let items_key = keys::queue_items(&directive.queue_insert_id);
    let threshold = Duration::from_secs(CONTINUATION_THRESHOLD_SECONDS);

    loop {
        let (popped, exhausted) = pop_round(store.clone(), &items_key).await?;
        let mut messages = Vec::with_capacity(popped.len());
        for raw in popped {
            match serde_json::from_str::<Value>(&raw) {
                Ok(item) => messages.push(serde_json::to_value(QueueMessage {
                    queue_insert_id: directive.queue_insert_id.clone(),
                    execution_id: directive.execution_id.clone(),
                    branch_ids: directive.branch_ids.clone(),
                    fan_out_ids: directive.fan_out_ids.clone(),
                    item,
                })?),
                Err(e) => CorruptBufferedEntry {
                    key: &items_key,
                    reason: &e.to_string(),
                }
                .log(),
            }
        }

        let round = send_all(queue.clone(), &target, messages).await;
        QueueDrainRound {
            queue_insert_id: &directive.queue_insert_id,
            sent: round.dispatched,
            exhausted,
        }
        .log();
        report.absorb(round);

        if exhausted {
            break;
        }
        let remaining = ctx.remaining_time();
        if remaining <= threshold {
            let wire = Invocation::control(Control::QueueDrain(directive.clone())).to_value()?;
            channel.invoke_async(ctx.function(), wire).await?;
            ContinuationScheduled {
                kind: "queue_drain",
                reference: &directive.queue_insert_id,
                remaining,
            }
            .log();
            break;
        }
    }

    Ok(report)
}

/// Runs [`QUEUE_DRAIN_CONCURRENCY`] pops of [`QUEUE_DRAIN_POP_SIZE`] at once.
/// The buffer is exhausted once any pop comes back short.
async fn pop_round(
    store: Arc<dyn CoordinationStore>,
    items_key: &str,
) -> Result<(Vec<String>, bool), CoordinatorError> {
    let mut pops = JoinSet::new();
    for _ in 0..QUEUE_DRAIN_CONCURRENCY {
        let store = store.clone();
        let key = items_key.to_string();
        pops.spawn(async move { store.list_pop_n(&key, QUEUE_DRAIN_POP_SIZE).await });
    }

    let mut popped = Vec::new();
    let mut exhausted = false;
    while let Some(joined) = pops.join_next().await {
        let batch = joined??;
        exhausted |= batch.len() < QUEUE_DRAIN_POP_SIZE;
        popped.extend(batch);
    }
    Ok((popped, exhausted))
}

/// Sends `messages` in concurrent batches of at most [`MAX_QUEUE_BATCH`].
/// Counts are per message.
async fn send_all(queue: Arc<dyn MessageQueue>, target: &str, messages: Vec<Value>) -> DispatchReport {
    let mut report = DispatchReport::default();
    let mut tasks = JoinSet::new();
    let mut messages = messages.into_iter().peekable();
    while messages.peek().is_some() {
        let batch: Vec<Value> = messages.by_ref().take(MAX_QUEUE_BATCH).collect();
        let queue = queue.clone();
        let target = target.to_string();
        tasks.spawn(async move {
            let size = batch.len();
            (size, queue.send_batch(&target, batch).await)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((size, Ok(()))) => report.dispatched += size,
            Ok((size, Err(err))) => {
                report.failed += size;
                DispatchFailed {
                    target,
                    error: &err,
                }
                .log();
            }
            Err(join_error) => {
                report.failed += 1;
                DispatchFailed {
                    target,
                    error: &join_error,
                }
                .log();
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::backends::stub::{RecordingChannel, RecordingQueue};
    use serde_json::json;

    const TTL: Duration = Duration::from_secs(60);

    fn envelope() -> ExecutionEnvelope {
        ExecutionEnvelope {
            execution_id: "e1".into(),
            branch_ids: vec!["b1".into()],
            fan_out_ids: vec![],
            backpack: json!({"who": "drain"}).as_object().cloned().unwrap(),
        }
    }

    #[test]
    fn test_worker_count_is_clamped() {
        assert_eq!(drain_worker_count(0), 1);
        assert_eq!(drain_worker_count(24_000), 1);
        assert_eq!(drain_worker_count(24_001), 2);
        assert_eq!(drain_worker_count(10_000_000), 20);
    }

    #[tokio::test]
    async fn test_buffer_then_drain_delivers_every_item() {
        let store = Arc::new(MemoryStore::new());
        let channel = RecordingChannel::new();
        let queue = Arc::new(RecordingQueue::new());
        let ctx = InvocationContext::new("producer", Duration::from_secs(300), 512);
        let items: Vec<Value> = (0..2_345).map(|i| json!(i)).collect();

        let workers = buffer_job(store.as_ref(), &channel, &envelope(), "jobs", Value::Array(items), &ctx, TTL)
            .await
            .unwrap();
        assert_eq!(workers, 1);

        let started = channel.invocations_for("producer");
        let directive: QueueDrainDirective =
            serde_json::from_value(started[0]["control"]["queue_drain"].clone()).unwrap();
        assert_eq!(directive.branch_ids, vec!["b1"]);

        let first = drain(store.clone(), &channel, queue.clone(), &directive, &ctx).await.unwrap();
        let second = drain(store.clone(), &channel, queue.clone(), &directive, &ctx).await.unwrap();

        assert_eq!(first.dispatched + second.dispatched, 2_345);
        let batches = queue.batches("jobs");
        assert!(batches.iter().all(|b| b.len() <= MAX_QUEUE_BATCH));
        let sent: usize = batches.iter().map(Vec::len).sum();
        assert_eq!(sent, 2_345);
        assert_eq!(batches[0][0]["execution_id"], "e1");
        assert_eq!(second, DispatchReport::default());
        assert!(store
            .get(&keys::queue_backpack(&directive.queue_insert_id))
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_scalar_enqueues_one_message() {
        let store = Arc::new(MemoryStore::new());
        let channel = RecordingChannel::new();
        let queue = Arc::new(RecordingQueue::new());
        let ctx = InvocationContext::new("producer", Duration::from_secs(300), 512);

        buffer_job(store.as_ref(), &channel, &envelope(), "jobs", json!({"one": 1}), &ctx, TTL)
            .await
            .unwrap();
        let directive: QueueDrainDirective = serde_json::from_value(
            channel.invocations_for("producer")[0]["control"]["queue_drain"].clone(),
        )
        .unwrap();
        drain(store.clone(), &channel, queue.clone(), &directive, &ctx).await.unwrap();

        let batches = queue.batches("jobs");
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0]["item"], json!({"one": 1}));
    }

    #[tokio::test]
    async fn test_unknown_job_drains_nothing() {
        let store = Arc::new(MemoryStore::new());
        let queue = Arc::new(RecordingQueue::new());
        let ctx = InvocationContext::new("producer", Duration::from_secs(300), 512);
        let directive = QueueDrainDirective {
            queue_insert_id: "missing".into(),
            execution_id: "e1".into(),
            branch_ids: vec![],
            fan_out_ids: vec![],
        };

        let report = drain(store.clone(), &RecordingChannel::new(), queue.clone(), &directive, &ctx)
            .await
            .unwrap();

        assert_eq!(report, DispatchReport::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_budget_hands_off_between_rounds() {
        let store = Arc::new(MemoryStore::new());
        let channel = RecordingChannel::new();
        let queue = Arc::new(RecordingQueue::new());
        let ctx = InvocationContext::new("producer", Duration::from_secs(9), 512);
        let items: Vec<Value> = (0..(QUEUE_DRAIN_CONCURRENCY * QUEUE_DRAIN_POP_SIZE + 1))
            .map(|i| json!(i))
            .collect();

        buffer_job(store.as_ref(), &channel, &envelope(), "jobs", Value::Array(items), &ctx, TTL)
            .await
            .unwrap();
        let directive: QueueDrainDirective = serde_json::from_value(
            channel.invocations_for("producer")[0]["control"]["queue_drain"].clone(),
        )
        .unwrap();

        let report = drain(store.clone(), &channel, queue, &directive, &ctx).await.unwrap();

        assert_eq!(report.dispatched, QUEUE_DRAIN_CONCURRENCY * QUEUE_DRAIN_POP_SIZE);
        assert_eq!(channel.invocations_for("producer").len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_round_pops_concurrently_until_short() {
        let store = Arc::new(MemoryStore::new());
        let channel = RecordingChannel::new();
        let queue = Arc::new(RecordingQueue::new());
        let ctx = InvocationContext::new("producer", Duration::from_secs(9), 512);
        let total = QUEUE_DRAIN_CONCURRENCY * QUEUE_DRAIN_POP_SIZE - 1;
        let items: Vec<Value> = (0..total).map(|i| json!(i)).collect();

        buffer_job(store.as_ref(), &channel, &envelope(), "jobs", Value::Array(items), &ctx, TTL)
            .await
            .unwrap();
        let directive: QueueDrainDirective = serde_json::from_value(
            channel.invocations_for("producer")[0]["control"]["queue_drain"].clone(),
        )
        .unwrap();

        let report = drain(store.clone(), &channel, queue.clone(), &directive, &ctx).await.unwrap();

        assert_eq!(report.dispatched, total);
        // One round drained it all, so no continuation despite the short budget.
        assert_eq!(channel.invocations_for("producer").len(), 1);
        let mut sent: Vec<i64> = queue
            .batches("jobs")
            .iter()
            .flatten()
            .map(|m| m["item"].as_i64().unwrap())
            .collect();
        sent.sort();
        assert_eq!(sent, (0..total as i64).collect::<Vec<_>>());
    }
}
