// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Fixed-arity join over a statically declared predecessor set.
//!
//! Each predecessor upserts its contribution into the merge record for
//! `(execution_id, target, branch)` and reads back the field count in the same
//! round trip. Only the arrival that completes the set reads the record out
//! and continues to the target; every other arrival stops.

use super::dispatcher::{DispatchAction, DispatchRequest};
use super::keys;
use crate::envelope::backpack::merge_all;
use crate::envelope::{Backpack, ExecutionEnvelope, Payload};
use crate::errors::CoordinatorError;
use crate::observability::messages::join::{MergeArrived, MergeCompleted};
use crate::observability::messages::scaling::CorruptBufferedEntry;
use crate::observability::messages::StructuredLog;
use crate::traits::CoordinationStore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

/// What one predecessor leaves in the merge record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeContribution {
    pub result: Value,
    #[serde(default)]
    pub backpack: Backpack,
    #[serde(default)]
    pub branch_ids: Vec<String>,
}

/// Records `from`'s result and returns the continuation when it was the last
/// predecessor to arrive.
pub async fn arrive(
    store: &dyn CoordinationStore,
    envelope: &ExecutionEnvelope,
    from: &str,
    target: &str,
    siblings: &[String],
    value: Value,
    ttl: Duration,
) -> Result<Option<DispatchRequest>, CoordinatorError> {
    let expected = siblings.iter().collect::<BTreeSet<_>>().len();
    let record = keys::merge(&envelope.execution_id, target, envelope.current_branch());

    let contribution = MergeContribution {
        result: value,
        backpack: envelope.backpack.clone(),
        branch_ids: envelope.branch_ids.clone(),
    };
    let arrived = store
        .hash_upsert_and_count(&record, from, &serde_json::to_string(&contribution)?, ttl)
        .await?;

    if arrived != expected {
        MergeArrived {
            record: &record,
            arrived,
            expected,
        }
        .log();
        return Ok(None);
    }

    let fields = store.take_hash(&record).await?;
    if fields.len() < expected {
        // Another arrival already read the record out.
        return Ok(None);
    }

    let mut contributions = Vec::with_capacity(fields.len());
    for (field, raw) in fields {
        match serde_json::from_str::<MergeContribution>(&raw) {
            Ok(contribution) => contributions.push(contribution),
            Err(e) => CorruptBufferedEntry {
                key: &format!("{}#{}", record, field),
                reason: &e.to_string(),
            }
            .log(),
        }
    }

    let continuing = converge(envelope, &contributions);
    let results = contributions.into_iter().map(|c| c.result).collect();

    MergeCompleted {
        record: &record,
        target,
        predecessors: expected,
    }
    .log();

    Ok(Some(DispatchRequest::new(
        continuing,
        DispatchAction::Invoke {
            node: target.to_string(),
            payload: Payload::Inline(Value::Array(results)),
        },
    )))
}

/// The envelope that continues past the barrier.
///
/// Backpacks merge in arrival order. Branch ids seen by a predecessor but not
/// by the continuing envelope go to the bottom of its stack; then the branch
/// the merge closes is popped.
fn converge(envelope: &ExecutionEnvelope, contributions: &[MergeContribution]) -> ExecutionEnvelope {
    let mut continuing = envelope.clone();
    continuing.backpack = merge_all(contributions.iter().map(|c| &c.backpack));

    for contribution in contributions {
        for id in &contribution.branch_ids {
            if !continuing.branch_ids.contains(id) {
                continuing.branch_ids.insert(0, id.clone());
            }
        }
    }
    continuing.branch_ids.pop();
    continuing
}
