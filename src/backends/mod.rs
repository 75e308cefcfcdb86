// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Collaborator implementations.
//!
//! # Available Backends
//!
//! ## Coordination stores
//! - **memory**: in-process store with lazy expiry, for local runs and tests
//! - **redis**: the production store; composite operations are atomic pipelines
//!
//! ## Local platform
//! Runs every node of a graph in one process: an in-process invocation
//! channel, a memory queue and the built-in workers.
//!
//! ## Stub Backend (Test-Only)
//! Recording channels and queues plus canned workers for coordinator tests.

pub mod local;
pub mod memory;
pub mod redis;

#[cfg(test)]
pub mod stub;
