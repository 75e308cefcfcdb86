// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Runs a whole graph inside one process.
//!
//! Every node gets its own [`Coordinator`], all sharing one store, one
//! [`InProcessChannel`] and one [`MemoryQueue`]. Used by the `switchyard`
//! binary and by the end-to-end tests.

use super::channel::{Delivery, InProcessChannel, MemoryQueue};
use super::workers::BuiltinWorkerFactory;
use crate::backends::memory::MemoryStore;
use crate::backends::redis::RedisStore;
use crate::config::{Config, NodeMode, StoreBackend};
use crate::engine::{Coordinator, HopOutcome};
use crate::errors::{CoordinatorError, DecodeError};
use crate::traits::{CoordinationStore, InvocationChannel, MessageQueue, Worker};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

pub struct LocalPlatform {
    store: Arc<dyn CoordinationStore>,
    channel: Arc<InProcessChannel>,
    coordinators: HashMap<String, Arc<Coordinator>>,
}

impl LocalPlatform {
    pub fn builder(config: Config) -> LocalPlatformBuilder {
        LocalPlatformBuilder {
            config,
            workers: HashMap::new(),
            store: None,
        }
    }

    pub fn coordinator(&self, node_id: &str) -> Result<&Arc<Coordinator>, CoordinatorError> {
        self.coordinators
            .get(node_id)
            .ok_or_else(|| CoordinatorError::UnknownNode(node_id.to_string()))
    }

    /// Delivers a raw payload to `node_id` and waits for that one hop.
    pub async fn invoke(&self, node_id: &str, raw: Value) -> Result<HopOutcome, CoordinatorError> {
        let coordinator = self.coordinator(node_id)?;
        coordinator.handle(raw, &coordinator.context()).await
    }

    /// Starts a fresh execution at `node_id`. API endpoints take `input` as
    /// the HTTP request; worker nodes take it as their payload.
    pub async fn start(&self, node_id: &str, input: Value) -> Result<HopOutcome, CoordinatorError> {
        let raw = match self.coordinator(node_id)?.mode() {
            NodeMode::ApiEndpoint => input,
            NodeMode::Worker => json!({ "payload": input }),
        };
        self.invoke(node_id, raw).await
    }

    /// Waits for every in-flight invocation, including the ones they spawn.
    pub async fn run_until_idle(&self) {
        self.channel.wait_idle().await;
    }

    pub fn store(&self) -> &Arc<dyn CoordinationStore> {
        &self.store
    }

    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.channel.deliveries().await
    }
}

pub struct LocalPlatformBuilder {
    config: Config,
    workers: HashMap<String, Arc<dyn Worker>>,
    store: Option<Arc<dyn CoordinationStore>>,
}

impl LocalPlatformBuilder {
    /// Runs `worker` for `node_id` instead of its configured built-in.
    pub fn worker(mut self, node_id: &str, worker: Arc<dyn Worker>) -> Self {
        self.workers.insert(node_id.to_string(), worker);
        self
    }

    pub fn store(mut self, store: Arc<dyn CoordinationStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub async fn build(mut self) -> Result<LocalPlatform, CoordinatorError> {
        let store: Arc<dyn CoordinationStore> = match self.store.take() {
            Some(store) => store,
            None => match self.config.store.backend {
                StoreBackend::Memory => Arc::new(MemoryStore::new()),
                StoreBackend::Redis => Arc::new(RedisStore::connect(self.config.store.url()).await?),
            },
        };

        let channel = Arc::new(InProcessChannel::new(self.config.topics.clone()));
        let consumers = self
            .config
            .queues
            .iter()
            .filter_map(|(queue, cfg)| Some((queue.clone(), cfg.consumer.clone()?)))
            .collect();
        let queue: Arc<dyn MessageQueue> = Arc::new(MemoryQueue::new(channel.clone(), consumers));

        let mut coordinators = HashMap::new();
        for node in &self.config.nodes {
            let mut builder = Coordinator::builder(&self.config, &node.id)?
                .store(store.clone())
                .channel(channel.clone() as Arc<dyn InvocationChannel>)
                .queue(queue.clone());
            if node.mode == NodeMode::Worker {
                builder = builder.worker(self.resolve_worker(&node.id, node.worker.as_deref())?);
            }
            let coordinator = Arc::new(builder.build()?);
            channel.register(&coordinator).await;
            coordinators.insert(node.id.clone(), coordinator);
        }

        Ok(LocalPlatform {
            store,
            channel,
            coordinators,
        })
    }

    fn resolve_worker(
        &self,
        node_id: &str,
        name: Option<&str>,
    ) -> Result<Arc<dyn Worker>, CoordinatorError> {
        if let Some(worker) = self.workers.get(node_id) {
            return Ok(worker.clone());
        }
        let name = name.unwrap_or("passthrough");
        BuiltinWorkerFactory::create_worker(name).map_err(|_| CoordinatorError::UnknownWorker {
            node_id: node_id.to_string(),
            worker: name.to_string(),
        })
    }
}

/// Parses a JSON document given on the command line or read from a file.
pub fn parse_input(raw: &str) -> Result<Value, CoordinatorError> {
    serde_json::from_str(raw).map_err(|e| CoordinatorError::Decode(DecodeError::Malformed(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::local::channel::DeliveryKind;
    use crate::backends::stub::FnWorker;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn config(yaml: &str) -> Config {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn counting(hits: &Arc<AtomicUsize>) -> Arc<dyn Worker> {
        let hits = hits.clone();
        Arc::new(FnWorker::new(move |value| {
            hits.fetch_add(1, Ordering::SeqCst);
            value
        }))
    }

    #[tokio::test]
    async fn test_pipeline_runs_to_completion() {
        let platform = LocalPlatform::builder(config(
            r#"
nodes:
  - id: shout
    worker: uppercase
    transitions:
      - type: then
        target: { node: measure }
  - id: measure
    worker: count
"#,
        ))
        .build()
        .await
        .unwrap();

        platform.start("shout", json!("abc")).await.unwrap();
        platform.run_until_idle().await;

        let deliveries = platform.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].target, "measure");
        assert_eq!(deliveries[0].payload["payload"], json!("ABC"));
    }

    #[tokio::test]
    async fn test_overrides_take_precedence_over_builtins() {
        let platform = LocalPlatform::builder(config(
            "nodes:\n  - id: a\n    worker: count\n    transitions:\n      - type: then\n        target: { node: b }\n  - id: b\n",
        ))
        .worker("a", Arc::new(FnWorker::new(|_| json!("overridden"))))
        .build()
        .await
        .unwrap();

        platform.start("a", json!([1, 2])).await.unwrap();
        platform.run_until_idle().await;

        assert_eq!(platform.deliveries().await[0].payload["payload"], "overridden");
    }

    #[tokio::test]
    async fn test_unknown_builtin_is_rejected() {
        let result = LocalPlatform::builder(config("nodes:\n  - id: a\n    worker: teleport\n"))
            .build()
            .await;

        assert!(matches!(result, Err(CoordinatorError::UnknownWorker { .. })));
    }

    #[tokio::test]
    async fn test_topics_reach_every_subscriber() {
        let hits = Arc::new(AtomicUsize::new(0));
        let platform = LocalPlatform::builder(config(
            r#"
nodes:
  - id: source
    transitions:
      - type: then
        target: { topic: audit }
  - id: left
  - id: right
topics:
  audit: [left, right]
"#,
        ))
        .worker("left", counting(&hits))
        .worker("right", counting(&hits))
        .build()
        .await
        .unwrap();

        platform.start("source", json!(1)).await.unwrap();
        platform.run_until_idle().await;

        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let deliveries = platform.deliveries().await;
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].kind, DeliveryKind::Publish);
        assert_eq!(deliveries[0].target, "audit");
    }

    #[test]
    fn test_parse_input_reports_malformed_json() {
        assert_eq!(parse_input("[1, 2]").unwrap(), json!([1, 2]));
        assert!(matches!(parse_input("{oops"), Err(CoordinatorError::Decode(_))));
    }
}
