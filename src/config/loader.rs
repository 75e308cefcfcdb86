// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use crate::config::consts::{
    DEFAULT_API_POLL_INTERVAL_MS, DEFAULT_API_SAFETY_MARGIN_MS, DEFAULT_DISPATCH_POOL_SIZE,
    DEFAULT_INLINE_PAYLOAD_LIMIT_BYTES, DEFAULT_NODE_MEMORY_MB, DEFAULT_NODE_TIMEOUT_SECONDS,
    DEFAULT_QUEUE_METADATA_TTL_SECONDS, DEFAULT_RETURN_DATA_TTL_SECONDS,
    DEFAULT_SPAWN_TARGET_SECONDS,
};
use crate::config::transitions::{optional_target, Edge, Target, TransitionSet};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// A deployed graph and the coordinator settings shared by all its nodes.
///
/// The coordinator never mutates this; it is supplied at deploy time and
/// every invocation of every node reads the same document.
///
/// # Example
/// ```yaml
/// coordinator:
///   dispatch_pool_size: 50
///   pipeline_logging: all
/// store:
///   backend: redis
///   url: redis://cache:6379
/// default_exception_handler: { node: alert }
/// nodes:
///   - id: split
///     memory_mb: 512
///     transitions:
///       - type: fan_out
///         target: { node: score }
///   - id: score
///     transitions:
///       - type: fan_in
///         target: { node: summarize }
///   - id: summarize
///   - id: alert
/// topics:
///   audit: [summarize]
/// queues:
///   review: { consumer: summarize }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorOptions,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default, deserialize_with = "optional_target")]
    pub default_exception_handler: Option<Target>,
    pub nodes: Vec<NodeConfig>,
    /// Topic name to subscribing nodes
    #[serde(default)]
    pub topics: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub queues: HashMap<String, QueueConfig>,
}

impl Config {
    pub fn node(&self, id: &str) -> Option<&NodeConfig> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// Gates the pipeline observability events.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineLogging {
    None,
    #[default]
    Errors,
    All,
}

impl PipelineLogging {
    pub fn logs_errors(self) -> bool {
        matches!(self, PipelineLogging::Errors | PipelineLogging::All)
    }

    pub fn logs_returns(self) -> bool {
        self == PipelineLogging::All
    }
}

/// Coordinator tuning. Every field is optional; getters fall back to `consts`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CoordinatorOptions {
    pub dispatch_pool_size: Option<usize>,
    pub inline_payload_limit_bytes: Option<usize>,
    pub spawn_target_seconds: Option<u64>,
    #[serde(default)]
    pub pipeline_logging: PipelineLogging,
    pub return_data_ttl_seconds: Option<u64>,
    pub queue_metadata_ttl_seconds: Option<u64>,
    pub api_poll_interval_ms: Option<u64>,
    pub api_safety_margin_ms: Option<u64>,
}

impl CoordinatorOptions {
    pub fn dispatch_pool_size(&self) -> usize {
        self.dispatch_pool_size
            .unwrap_or(DEFAULT_DISPATCH_POOL_SIZE)
            .max(1)
    }

    pub fn inline_payload_limit_bytes(&self) -> usize {
        self.inline_payload_limit_bytes
            .unwrap_or(DEFAULT_INLINE_PAYLOAD_LIMIT_BYTES)
    }

    pub fn spawn_target(&self) -> Duration {
        Duration::from_secs(
            self.spawn_target_seconds
                .unwrap_or(DEFAULT_SPAWN_TARGET_SECONDS),
        )
    }

    pub fn return_data_ttl(&self) -> Duration {
        Duration::from_secs(
            self.return_data_ttl_seconds
                .unwrap_or(DEFAULT_RETURN_DATA_TTL_SECONDS),
        )
    }

    pub fn queue_metadata_ttl(&self) -> Duration {
        Duration::from_secs(
            self.queue_metadata_ttl_seconds
                .unwrap_or(DEFAULT_QUEUE_METADATA_TTL_SECONDS),
        )
    }

    pub fn api_poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.api_poll_interval_ms
                .unwrap_or(DEFAULT_API_POLL_INTERVAL_MS),
        )
    }

    pub fn api_safety_margin(&self) -> Duration {
        Duration::from_millis(
            self.api_safety_margin_ms
                .unwrap_or(DEFAULT_API_SAFETY_MARGIN_MS),
        )
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    pub url: Option<String>,
}

impl StoreConfig {
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("redis://127.0.0.1:6379")
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueueConfig {
    /// Node that receives this queue's message batches.
    pub consumer: Option<String>,
}

/// How a node treats its inbound payload.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeMode {
    /// Runs a worker on the payload.
    #[default]
    Worker,
    /// Receives an HTTP request and waits for a response from downstream.
    ApiEndpoint,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    pub id: String,
    #[serde(default)]
    pub mode: NodeMode,
    pub memory_mb: Option<u32>,
    pub timeout_seconds: Option<u64>,
    /// Built-in worker the local platform runs for this node.
    pub worker: Option<String>,
    #[serde(default)]
    pub transitions: Vec<Edge>,
}

impl NodeConfig {
    pub fn memory_mb(&self) -> u32 {
        self.memory_mb.unwrap_or(DEFAULT_NODE_MEMORY_MB)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds.unwrap_or(DEFAULT_NODE_TIMEOUT_SECONDS))
    }

    pub fn transition_set(&self) -> TransitionSet {
        TransitionSet::from_edges(&self.transitions)
    }
}

/// Loads a graph from YAML, or TOML when the path ends in `.toml`.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, Box<dyn std::error::Error>> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg: Config = if is_toml {
        toml::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(cfg)
}

pub fn load_and_validate_config<P: AsRef<Path>>(
    path: P,
) -> Result<Config, Box<dyn std::error::Error>> {
    let cfg = load_config(path)?;

    if let Err(validation_errors) = crate::config::validate_graph(&cfg) {
        let error_messages: Vec<String> = validation_errors.iter().map(|e| e.to_string()).collect();
        let combined_error = format!(
            "Configuration validation failed:\n{}",
            error_messages.join("\n")
        );
        return Err(combined_error.into());
    }

    Ok(cfg)
}
