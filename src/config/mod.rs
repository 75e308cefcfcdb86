// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod loader;
mod transitions;
mod validation;

pub mod consts;

pub use loader::{
    load_and_validate_config, load_config, Config, CoordinatorOptions, NodeConfig, NodeMode,
    PipelineLogging, QueueConfig, StoreBackend, StoreConfig,
};
pub use transitions::{Edge, Target, TransitionSet};
pub use validation::validate_graph;
