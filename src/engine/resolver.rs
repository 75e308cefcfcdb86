// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Turns a node's result into next-hop requests.
//!
//! Resolution runs in two phases. [`plan`] is pure: it evaluates every `if`
//! expression and checks fan-out values are lists, so a bad expression or a
//! malformed fan-out becomes a worker failure before anything is written.
//! [`Resolver::resolve`] then performs the join bookkeeping and produces the
//! requests for the dispatcher.

use super::api;
use super::context::InvocationContext;
use super::dispatcher::{DispatchAction, DispatchRequest};
use super::join::{self, FanOutSettings};
use crate::config::{Target, TransitionSet};
use crate::envelope::{Backpack, ExecutionEnvelope, Payload};
use crate::errors::CoordinatorError;
use crate::observability::messages::coordinator::EmptyFanOutSkipped;
use crate::observability::messages::StructuredLog;
use crate::traits::{CoordinationStore, WorkerFailure};
use serde_json::{json, Value};

const EXCEPTION_INPUT_VERSION: &str = "1.0.0";

/// Which edges fire for one successful result.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    /// `then` edges followed by the matching `if` edges, or the `else` edges.
    pub direct: Vec<Target>,
    pub fan_outs: Vec<(Target, Vec<Value>)>,
    pub fan_ins: Vec<Target>,
    pub merges: Vec<(Target, Vec<String>)>,
}

pub fn plan(
    transitions: &TransitionSet,
    value: &Value,
    backpack: &Backpack,
) -> Result<Plan, WorkerFailure> {
    let mut matched = Vec::new();
    for (expression, target) in &transitions.conditional {
        let hit = expression.evaluate(value, backpack).map_err(|e| {
            WorkerFailure::new(format!("condition '{}' failed: {}", expression, e))
        })?;
        if hit {
            matched.push(target.clone());
        }
    }
    if matched.is_empty() {
        matched = transitions.otherwise.clone();
    }

    let mut fan_outs = Vec::with_capacity(transitions.fan_out.len());
    for target in &transitions.fan_out {
        let Value::Array(items) = value else {
            return Err(WorkerFailure::new(format!(
                "fan-out to {} needs a list result",
                target.label()
            )));
        };
        fan_outs.push((target.clone(), items.clone()));
    }

    let mut direct = transitions.then.clone();
    direct.extend(matched);

    Ok(Plan {
        direct,
        fan_outs,
        fan_ins: transitions.fan_in.clone(),
        merges: transitions.merge.clone(),
    })
}

/// The request that delivers `value` to `target`.
pub fn request_for(target: &Target, envelope: &ExecutionEnvelope, value: Value) -> DispatchRequest {
    let action = match target {
        Target::Node(node) => DispatchAction::Invoke {
            node: node.clone(),
            payload: Payload::Inline(value),
        },
        Target::Topic(topic) => DispatchAction::Publish {
            topic: topic.clone(),
            value,
        },
        Target::Queue(queue) => DispatchAction::Enqueue {
            queue: queue.clone(),
            value,
        },
        Target::ApiResponse => DispatchAction::ApiResponse { value },
    };
    DispatchRequest::new(envelope.clone(), action)
}

pub struct Resolver<'a> {
    pub node_id: &'a str,
    pub store: &'a dyn CoordinationStore,
    pub fan_out: &'a FanOutSettings,
}

impl Resolver<'_> {
    pub async fn resolve(
        &self,
        plan: Plan,
        envelope: &ExecutionEnvelope,
        value: &Value,
        ctx: &InvocationContext,
    ) -> Result<Vec<DispatchRequest>, CoordinatorError> {
        let mut requests = Vec::new();

        for (target, items) in plan.fan_outs {
            let node = join_node(&target)?;
            if items.is_empty() {
                EmptyFanOutSkipped {
                    node_id: self.node_id,
                    target: node,
                }
                .log();
                continue;
            }
            requests.extend(
                join::fan_out(self.store, envelope, node, items, self.fan_out, ctx).await?,
            );
        }

        for target in &plan.fan_ins {
            let fired = join::fan_in_arrive(
                self.store,
                envelope,
                value,
                join_node(target)?,
                self.fan_out.ttl,
            )
            .await?;
            requests.extend(fired);
        }

        for target in &plan.direct {
            requests.push(request_for(target, envelope, value.clone()));
        }

        for (target, siblings) in plan.merges {
            requests.push(DispatchRequest::new(
                envelope.clone(),
                DispatchAction::Merge {
                    node: join_node(&target)?.to_string(),
                    siblings,
                    from: self.node_id.to_string(),
                    value: value.clone(),
                },
            ));
        }

        Ok(requests)
    }
}

fn join_node(target: &Target) -> Result<&str, CoordinatorError> {
    target
        .node_id()
        .ok_or_else(|| CoordinatorError::UnknownNode(target.label()))
}

/// Where a failure goes.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRouting {
    pub requests: Vec<DispatchRequest>,
    /// Exception handlers that received the failure.
    pub handlers: usize,
}

/// Routes a worker failure to the node's exception edges, or to the graph's
/// default handler when the node declares none. A node with an API-response
/// edge also answers its synchronous caller with an error body.
pub fn route_failure(
    node_id: &str,
    transitions: &TransitionSet,
    default_handler: Option<&Target>,
    envelope: &ExecutionEnvelope,
    failure: &WorkerFailure,
    input: &Value,
) -> FailureRouting {
    let mut envelope = envelope.clone();
    if let Some(backpack) = &failure.backpack {
        envelope.backpack = backpack.clone();
    }

    let handlers: Vec<&Target> = if transitions.exception.is_empty() {
        default_handler
            .filter(|handler| handler.node_id() != Some(node_id))
            .into_iter()
            .collect()
    } else {
        transitions.exception.iter().collect()
    };

    let exception_input = json!({
        "version": EXCEPTION_INPUT_VERSION,
        "exception_text": failure.message,
        "input_data": input,
    });
    let mut requests: Vec<DispatchRequest> = handlers
        .iter()
        .map(|target| request_for(target, &envelope, exception_input.clone()))
        .collect();

    let answers_api = transitions.has_api_response();
    if answers_api && !handlers.contains(&&Target::ApiResponse) {
        requests.push(request_for(&Target::ApiResponse, &envelope, api::exception_body()));
    }

    FailureRouting {
        requests,
        handlers: handlers.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::config::Edge;
    use crate::expression::Expression;
    use serde_json::json;
    use std::time::Duration;

    fn transitions(edges: Vec<Edge>) -> TransitionSet {
        TransitionSet::from_edges(&edges)
    }

    fn node(id: &str) -> Target {
        Target::Node(id.to_string())
    }

    fn when(source: &str, target: Target) -> Edge {
        Edge::If {
            expression: Expression::parse(source).unwrap(),
            target,
        }
    }

    #[test]
    fn test_matching_ifs_suppress_else() {
        let set = transitions(vec![
            Edge::Then { target: node("log") },
            when("value > 5", node("big")),
            when("value > 50", node("huge")),
            Edge::Else { target: node("small") },
        ]);

        let planned = plan(&set, &json!(10), &Backpack::new()).unwrap();
        assert_eq!(planned.direct, vec![node("log"), node("big")]);

        let planned = plan(&set, &json!(1), &Backpack::new()).unwrap();
        assert_eq!(planned.direct, vec![node("log"), node("small")]);
    }

    #[test]
    fn test_conditions_see_the_backpack() {
        let set = transitions(vec![when("backpack.tier == 'gold'", node("vip"))]);
        let mut backpack = Backpack::new();
        backpack.insert("tier".into(), json!("gold"));

        let planned = plan(&set, &json!(null), &backpack).unwrap();
        assert_eq!(planned.direct, vec![node("vip")]);
    }

    #[test]
    fn test_failing_condition_is_a_worker_failure() {
        let set = transitions(vec![when("value < 3", node("x"))]);
        let failure = plan(&set, &json!("text"), &Backpack::new()).unwrap_err();
        assert!(failure.message.contains("value < 3"));
    }

    #[test]
    fn test_fan_out_of_non_list_is_a_worker_failure() {
        let set = transitions(vec![Edge::FanOut { target: node("each") }]);
        assert!(plan(&set, &json!({"not": "a list"}), &Backpack::new()).is_err());
    }

    #[tokio::test]
    async fn test_empty_fan_out_dispatches_nothing() {
        let store = MemoryStore::new();
        let set = transitions(vec![Edge::FanOut { target: node("each") }]);
        let settings = FanOutSettings {
            memory_mb: 768,
            spawn_target: Duration::from_secs(10),
            ttl: Duration::from_secs(60),
        };
        let resolver = Resolver {
            node_id: "split",
            store: &store,
            fan_out: &settings,
        };
        let ctx = InvocationContext::new("split", Duration::from_secs(300), 768);
        let value = json!([]);

        let planned = plan(&set, &value, &Backpack::new()).unwrap();
        let requests = resolver
            .resolve(planned, &ExecutionEnvelope::new_execution(), &value, &ctx)
            .await
            .unwrap();

        assert!(requests.is_empty());
        assert!(store.is_empty());
    }

    #[test]
    fn test_failure_goes_to_exception_edges_with_context() {
        let set = transitions(vec![
            Edge::Then { target: node("next") },
            Edge::Exception { target: node("alert") },
        ]);
        let envelope = ExecutionEnvelope::new_execution();

        let routing = route_failure(
            "score",
            &set,
            Some(&node("fallback")),
            &envelope,
            &WorkerFailure::new("boom"),
            &json!({"id": 7}),
        );

        assert_eq!(routing.handlers, 1);
        assert_eq!(routing.requests.len(), 1);
        assert_eq!(
            routing.requests[0].action,
            DispatchAction::Invoke {
                node: "alert".into(),
                payload: Payload::Inline(json!({
                    "version": "1.0.0",
                    "exception_text": "boom",
                    "input_data": {"id": 7},
                })),
            }
        );
    }

    #[test]
    fn test_default_handler_stands_in_but_never_for_itself() {
        let set = TransitionSet::default();
        let envelope = ExecutionEnvelope::new_execution();
        let failure = WorkerFailure::new("boom");

        let routed = route_failure("score", &set, Some(&node("fallback")), &envelope, &failure, &json!(1));
        assert_eq!(routed.handlers, 1);

        let own = route_failure("fallback", &set, Some(&node("fallback")), &envelope, &failure, &json!(1));
        assert_eq!(own.handlers, 0);
        assert!(own.requests.is_empty());
    }

    #[test]
    fn test_api_nodes_answer_with_error_body() {
        let set = transitions(vec![Edge::Then {
            target: Target::ApiResponse,
        }]);

        let routing = route_failure(
            "api",
            &set,
            None,
            &ExecutionEnvelope::new_execution(),
            &WorkerFailure::new("boom"),
            &json!(null),
        );

        assert_eq!(routing.handlers, 0);
        assert_eq!(
            routing.requests[0].action,
            DispatchAction::ApiResponse {
                value: api::exception_body()
            }
        );
    }
}
