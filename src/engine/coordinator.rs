// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! The per-node coordinator.
//!
//! One [`Coordinator`] is built per graph node and process, holding the
//! node's static transitions and its collaborators. Every inbound invocation
//! goes through [`Coordinator::handle`]:
//!
//! ```text
//! RECEIVED -> control mode -> EXECUTING -> RESOLVING -> DISPATCHED (0..n)
//! ```
//!
//! Control modes other than execution (warmup, spawner, queue drain,
//! duplicate delivery) never run the worker.

use super::api::{self, PollSettings};
use super::context::InvocationContext;
use super::dispatcher::{DispatchReport, DispatchSettings, Dispatcher};
use super::join::FanOutSettings;
use super::resolver::{self, Resolver};
use super::{queue_drain, spawner};
use crate::config::{
    Config, CoordinatorOptions, NodeConfig, NodeMode, PipelineLogging, Target, TransitionSet,
};
use crate::envelope::{
    decode, Control, ControlMode, DebugFlags, ExecutionEnvelope, Hop, Invocation,
};
use crate::errors::{CoordinatorError, DecodeError};
use crate::observability::messages::coordinator::{
    CaughtException, DuplicateDelivery, HopReturned, HopStarted, UncaughtException,
    WarmupRelayed,
};
use crate::observability::messages::dispatch::DispatchFailed;
use crate::observability::messages::StructuredLog;
use crate::traits::{
    CoordinationStore, InvocationChannel, MessageQueue, Worker, WorkerFailure, WorkerInput,
    WorkerOutput,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// How one invocation ended.
#[derive(Debug, Clone, PartialEq)]
pub enum HopOutcome {
    /// A control invocation or duplicate delivery; nothing ran.
    Acknowledged,
    Dispatched(DispatchReport),
    /// A temporary run's result, returned instead of dispatched.
    Temporary { result: Value, failed: bool },
    /// An API endpoint's HTTP response.
    Response(Value),
    /// An unhandled failure the caller asked to see.
    Failed(String),
}

impl HopOutcome {
    /// The value a synchronous caller receives, or the failure it should see.
    pub fn into_response(self) -> Result<Value, String> {
        match self {
            HopOutcome::Response(value) => Ok(value),
            HopOutcome::Temporary { result, failed } => {
                Ok(json!({"result": result, "failed": failed}))
            }
            HopOutcome::Failed(message) => Err(message),
            HopOutcome::Acknowledged | HopOutcome::Dispatched(_) => Ok(Value::Null),
        }
    }
}

pub struct Coordinator {
    node_id: String,
    mode: NodeMode,
    transitions: TransitionSet,
    default_exception_handler: Option<Target>,
    pipeline_logging: PipelineLogging,
    memory_mb: u32,
    timeout: Duration,
    fan_out: FanOutSettings,
    poll: PollSettings,
    worker: Option<Arc<dyn Worker>>,
    store: Arc<dyn CoordinationStore>,
    channel: Arc<dyn InvocationChannel>,
    queue: Arc<dyn MessageQueue>,
    dispatcher: Dispatcher,
}

impl Coordinator {
    pub fn builder(config: &Config, node_id: &str) -> Result<CoordinatorBuilder, CoordinatorError> {
        CoordinatorBuilder::new(config, node_id)
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn mode(&self) -> NodeMode {
        self.mode
    }

    /// A fresh context with this node's deadline and memory tier.
    pub fn context(&self) -> InvocationContext {
        InvocationContext::new(self.node_id.clone(), self.timeout, self.memory_mb)
    }

    /// Handles one raw inbound payload.
    ///
    /// API endpoint nodes treat anything without a `control` field as an HTTP
    /// request; every other payload is an [`Invocation`].
    pub async fn handle(
        &self,
        raw: Value,
        ctx: &InvocationContext,
    ) -> Result<HopOutcome, CoordinatorError> {
        if self.mode == NodeMode::ApiEndpoint && raw.get("control").is_none() {
            return self.serve_request(raw, ctx).await;
        }
        let invocation: Invocation = serde_json::from_value(raw).map_err(DecodeError::from)?;
        self.handle_invocation(invocation, ctx).await
    }

    pub async fn handle_invocation(
        &self,
        invocation: Invocation,
        ctx: &InvocationContext,
    ) -> Result<HopOutcome, CoordinatorError> {
        let mode = decode(invocation, self.store.as_ref()).await?;
        let execution_id = match &mode {
            ControlMode::Execute(hop) | ControlMode::Temporary(hop) => {
                hop.envelope.execution_id.as_str()
            }
            ControlMode::QueueDrain(directive) => directive.execution_id.as_str(),
            ControlMode::Spawner { execution_id, .. } => execution_id.as_str(),
            ControlMode::Warmup { .. } | ControlMode::AlreadyConsumed { .. } => "",
        };
        HopStarted {
            node_id: &self.node_id,
            execution_id,
            mode: mode.label(),
        }
        .log();

        match mode {
            ControlMode::Warmup { counter } => {
                self.relay_warmup(counter, ctx).await?;
                Ok(HopOutcome::Acknowledged)
            }
            ControlMode::QueueDrain(directive) => {
                let ctx = ctx.clone().with_execution_id(&directive.execution_id);
                let report = queue_drain::drain(
                    self.store.clone(),
                    self.channel.as_ref(),
                    self.queue.clone(),
                    &directive,
                    &ctx,
                )
                .await?;
                Ok(HopOutcome::Dispatched(report))
            }
            ControlMode::Spawner {
                directive,
                branch_ids,
                execution_id,
            } => {
                let ctx = ctx.clone().with_execution_id(&execution_id);
                let lineage = ExecutionEnvelope {
                    execution_id,
                    branch_ids,
                    ..ExecutionEnvelope::default()
                };
                let report =
                    spawner::run(self.store.as_ref(), &self.dispatcher, &directive, lineage, &ctx)
                        .await?;
                Ok(HopOutcome::Dispatched(report))
            }
            ControlMode::AlreadyConsumed { key } => {
                DuplicateDelivery {
                    node_id: &self.node_id,
                    key: &key,
                }
                .log();
                Ok(HopOutcome::Acknowledged)
            }
            ControlMode::Temporary(hop) => {
                let ctx = ctx.clone().with_execution_id(&hop.envelope.execution_id);
                let outcome = match self.run_worker(&hop, &ctx).await {
                    Ok(output) => HopOutcome::Temporary {
                        result: output.value,
                        failed: false,
                    },
                    Err(failure) => HopOutcome::Temporary {
                        result: Value::String(failure.message),
                        failed: true,
                    },
                };
                Ok(outcome)
            }
            ControlMode::Execute(hop) => self.execute(hop, ctx).await,
        }
    }

    /// Keeps the chain of warm instances going: `n` becomes `n - 1` until one is left.
    async fn relay_warmup(&self, counter: i64, ctx: &InvocationContext) -> Result<(), CoordinatorError> {
        let next = counter.saturating_sub(1);
        if next <= 0 {
            return Ok(());
        }
        WarmupRelayed {
            node_id: &self.node_id,
            remaining: next,
        }
        .log();
        let wire = Invocation::control(Control::Warmup(next)).to_value()?;
        if let Err(err) = self.channel.invoke_sync(ctx.function(), wire).await {
            DispatchFailed {
                target: ctx.function(),
                error: &err,
            }
            .log();
        }
        Ok(())
    }

    async fn run_worker(
        &self,
        hop: &Hop,
        ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure> {
        let input = WorkerInput {
            payload: hop.input.clone(),
            backpack: hop.envelope.backpack.clone(),
        };
        match &self.worker {
            Some(worker) => worker.run(input, ctx).await,
            None => Ok(WorkerOutput {
                value: input.payload,
                backpack: input.backpack,
            }),
        }
    }

    async fn execute(&self, hop: Hop, ctx: &InvocationContext) -> Result<HopOutcome, CoordinatorError> {
        let ctx = ctx.clone().with_execution_id(&hop.envelope.execution_id);

        let output = match self.run_worker(&hop, &ctx).await {
            Ok(output) => output,
            Err(failure) => {
                return self
                    .fail(&hop.envelope, &hop.input, failure, hop.debug, &ctx)
                    .await
            }
        };
        let plan = match resolver::plan(&self.transitions, &output.value, &output.backpack) {
            Ok(plan) => plan,
            Err(mut failure) => {
                failure.backpack = Some(output.backpack);
                return self
                    .fail(&hop.envelope, &hop.input, failure, hop.debug, &ctx)
                    .await;
            }
        };

        if self.pipeline_logging.logs_returns() {
            HopReturned {
                node_id: &self.node_id,
                execution_id: ctx.execution_id(),
                input: &hop.input,
                output: &output.value,
                backpack: &Value::Object(output.backpack.clone()),
            }
            .log();
        }

        let mut envelope = hop.envelope;
        envelope.backpack = output.backpack;
        let requests = self
            .resolver()
            .resolve(plan, &envelope, &output.value, &ctx)
            .await?;
        let report = self.dispatcher.dispatch(requests, &ctx).await?;
        Ok(HopOutcome::Dispatched(report))
    }

    async fn fail(
        &self,
        envelope: &ExecutionEnvelope,
        input: &Value,
        failure: WorkerFailure,
        debug: DebugFlags,
        ctx: &InvocationContext,
    ) -> Result<HopOutcome, CoordinatorError> {
        let routing = resolver::route_failure(
            &self.node_id,
            &self.transitions,
            self.default_exception_handler.as_ref(),
            envelope,
            &failure,
            input,
        );

        if self.pipeline_logging.logs_errors() {
            if routing.handlers > 0 {
                CaughtException {
                    node_id: &self.node_id,
                    execution_id: ctx.execution_id(),
                    error: &failure.message,
                    handlers: routing.handlers,
                }
                .log();
            } else {
                UncaughtException {
                    node_id: &self.node_id,
                    execution_id: ctx.execution_id(),
                    error: &failure.message,
                    propagated: debug.propagate_failure,
                }
                .log();
            }
        }

        let report = self.dispatcher.dispatch(routing.requests, ctx).await?;
        if routing.handlers == 0 && debug.propagate_failure {
            return Ok(HopOutcome::Failed(failure.message));
        }
        Ok(HopOutcome::Dispatched(report))
    }

    /// Runs an API endpoint: the enriched request is the node's value.
    async fn serve_request(
        &self,
        request: Value,
        ctx: &InvocationContext,
    ) -> Result<HopOutcome, CoordinatorError> {
        let envelope = ExecutionEnvelope::new_execution();
        let ctx = ctx.clone().with_execution_id(&envelope.execution_id);
        HopStarted {
            node_id: &self.node_id,
            execution_id: &envelope.execution_id,
            mode: "api_request",
        }
        .log();

        let value = api::enrich_request(request);
        match resolver::plan(&self.transitions, &value, &envelope.backpack) {
            Ok(plan) => {
                let requests = self.resolver().resolve(plan, &envelope, &value, &ctx).await?;
                self.dispatcher.dispatch(requests, &ctx).await?;
            }
            Err(failure) => {
                self.fail(&envelope, &value, failure, DebugFlags::default(), &ctx)
                    .await?;
            }
        }

        let response =
            api::await_response(self.store.as_ref(), &envelope.execution_id, self.poll, &ctx)
                .await?;
        Ok(HopOutcome::Response(response))
    }

    fn resolver(&self) -> Resolver<'_> {
        Resolver {
            node_id: &self.node_id,
            store: self.store.as_ref(),
            fan_out: &self.fan_out,
        }
    }
}

/// Assembles a [`Coordinator`] from graph config plus its collaborators.
pub struct CoordinatorBuilder {
    node: NodeConfig,
    options: CoordinatorOptions,
    default_exception_handler: Option<Target>,
    worker: Option<Arc<dyn Worker>>,
    store: Option<Arc<dyn CoordinationStore>>,
    channel: Option<Arc<dyn InvocationChannel>>,
    queue: Option<Arc<dyn MessageQueue>>,
}

impl CoordinatorBuilder {
    pub fn new(config: &Config, node_id: &str) -> Result<Self, CoordinatorError> {
        let node = config
            .node(node_id)
            .cloned()
            .ok_or_else(|| CoordinatorError::UnknownNode(node_id.to_string()))?;
        Ok(Self {
            node,
            options: config.coordinator.clone(),
            default_exception_handler: config.default_exception_handler.clone(),
            worker: None,
            store: None,
            channel: None,
            queue: None,
        })
    }

    pub fn worker(mut self, worker: Arc<dyn Worker>) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn store(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn channel(mut self, channel: Arc<dyn InvocationChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn queue(mut self, queue: Arc<dyn MessageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn build(self) -> Result<Coordinator, CoordinatorError> {
        let missing = |collaborator| CoordinatorError::MissingCollaborator {
            node_id: self.node.id.clone(),
            collaborator,
        };
        let store = self.store.clone().ok_or_else(|| missing("store"))?;
        let channel = self.channel.clone().ok_or_else(|| missing("channel"))?;
        let queue = self.queue.clone().ok_or_else(|| missing("queue"))?;
        if self.node.mode == NodeMode::Worker && self.worker.is_none() {
            return Err(missing("worker"));
        }

        let memory_mb = self.node.memory_mb();
        Ok(Coordinator {
            node_id: self.node.id.clone(),
            mode: self.node.mode,
            transitions: self.node.transition_set(),
            default_exception_handler: self.default_exception_handler,
            pipeline_logging: self.options.pipeline_logging,
            memory_mb,
            timeout: self.node.timeout(),
            fan_out: FanOutSettings {
                memory_mb,
                spawn_target: self.options.spawn_target(),
                ttl: self.options.return_data_ttl(),
            },
            poll: PollSettings {
                interval: self.options.api_poll_interval(),
                safety_margin: self.options.api_safety_margin(),
            },
            worker: self.worker,
            dispatcher: Dispatcher::new(
                store.clone(),
                channel.clone(),
                DispatchSettings::from(&self.options),
            ),
            store,
            channel,
            queue,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use crate::backends::stub::{EchoWorker, FailingWorker, RecordingChannel, RecordingQueue};
    use serde_json::json;

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn build(
        config: &Config,
        node: &str,
        worker: Arc<dyn Worker>,
        channel: Arc<RecordingChannel>,
    ) -> Coordinator {
        Coordinator::builder(config, node)
            .unwrap()
            .worker(worker)
            .store(Arc::new(MemoryStore::new()))
            .channel(channel)
            .queue(Arc::new(RecordingQueue::new()))
            .build()
            .unwrap()
    }

    const GRAPH: &str = r#"
nodes:
  - id: score
    transitions:
      - type: then
        target: { node: store }
      - type: exception
        target: { node: alert }
  - id: store
  - id: alert
"#;

    #[tokio::test]
    async fn test_success_dispatches_then_edges() {
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(&config(GRAPH), "score", Arc::new(EchoWorker), channel.clone());

        let outcome = coordinator
            .handle(json!({"execution_id": "e1", "payload": 5}), &coordinator.context())
            .await
            .unwrap();

        assert_eq!(outcome, HopOutcome::Dispatched(DispatchReport { dispatched: 1, failed: 0 }));
        let sent = channel.invocations_for("store");
        assert_eq!(sent[0]["payload"], json!(5));
        assert_eq!(sent[0]["execution_id"], "e1");
        assert!(channel.invocations_for("alert").is_empty());
    }

    #[tokio::test]
    async fn test_failure_runs_only_exception_edges() {
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(
            &config(GRAPH),
            "score",
            Arc::new(FailingWorker::new("bad input")),
            channel.clone(),
        );

        coordinator
            .handle(json!({"payload": {"id": 1}}), &coordinator.context())
            .await
            .unwrap();

        assert!(channel.invocations_for("store").is_empty());
        let alert = channel.invocations_for("alert");
        assert_eq!(alert[0]["payload"]["exception_text"], "bad input");
        assert_eq!(alert[0]["payload"]["input_data"], json!({"id": 1}));
    }

    #[tokio::test]
    async fn test_unhandled_failure_propagates_only_when_asked() {
        let graph = config("nodes:\n  - id: lonely\n");
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(
            &graph,
            "lonely",
            Arc::new(FailingWorker::new("boom")),
            channel.clone(),
        );

        let quiet = coordinator
            .handle(json!({"payload": 1}), &coordinator.context())
            .await
            .unwrap();
        let loud = coordinator
            .handle(
                json!({"payload": 1, "debug": {"propagate_failure": true}}),
                &coordinator.context(),
            )
            .await
            .unwrap();

        assert_eq!(quiet, HopOutcome::Dispatched(DispatchReport::default()));
        assert_eq!(loud, HopOutcome::Failed("boom".into()));
        assert_eq!(loud.into_response(), Err("boom".to_string()));
    }

    #[tokio::test]
    async fn test_temporary_run_returns_result_without_dispatch() {
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(&config(GRAPH), "score", Arc::new(EchoWorker), channel.clone());

        let outcome = coordinator
            .handle(
                json!({"payload": "hi", "debug": {"temporary": true}}),
                &coordinator.context(),
            )
            .await
            .unwrap();

        assert_eq!(
            outcome,
            HopOutcome::Temporary {
                result: json!("hi"),
                failed: false
            }
        );
        assert_eq!(channel.total(), 0);
    }

    #[tokio::test]
    async fn test_warmup_relays_decremented_counter_to_self() {
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(&config(GRAPH), "score", Arc::new(EchoWorker), channel.clone());

        coordinator
            .handle(json!({"control": {"warmup": 3}}), &coordinator.context())
            .await
            .unwrap();
        coordinator
            .handle(json!({"control": {"warmup": 1}}), &coordinator.context())
            .await
            .unwrap();

        assert_eq!(
            channel.sync_invocations_for("score"),
            vec![json!({"control": {"warmup": 2}, "branch_ids": [], "fan_out_ids": [], "backpack": {}, "payload": null})]
        );
    }

    #[tokio::test]
    async fn test_worker_nodes_need_a_worker() {
        let result = Coordinator::builder(&config(GRAPH), "score")
            .unwrap()
            .store(Arc::new(MemoryStore::new()))
            .channel(Arc::new(RecordingChannel::new()))
            .queue(Arc::new(RecordingQueue::new()))
            .build();

        assert!(matches!(
            result,
            Err(CoordinatorError::MissingCollaborator {
                collaborator: "worker",
                ..
            })
        ));
        assert!(matches!(
            Coordinator::builder(&config(GRAPH), "nope"),
            Err(CoordinatorError::UnknownNode(_))
        ));
    }

    #[tokio::test]
    async fn test_worker_backpack_travels_with_next_hop() {
        let channel = Arc::new(RecordingChannel::new());
        let coordinator = build(
            &config(GRAPH),
            "score",
            Arc::new(crate::backends::stub::BackpackWorker::new("seen", json!(true))),
            channel.clone(),
        );

        coordinator
            .handle(
                json!({"payload": 1, "backpack": {"user": "ada"}}),
                &coordinator.context(),
            )
            .await
            .unwrap();

        let sent = channel.invocations_for("store");
        assert_eq!(sent[0]["backpack"], json!({"user": "ada", "seen": true}));
    }
}
