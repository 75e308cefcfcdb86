// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Observability module for structured logging and tracing.
//!
//! Every diagnostic and operational event the coordinator emits is a message
//! struct with a `Display` implementation, so call sites never build log
//! strings by hand and each event carries typed fields.
//!
//! # Architecture
//!
//! Messages are organized by subsystem:
//! * `messages::coordinator` - hop lifecycle, control modes and failures
//! * `messages::dispatch` - outgoing invocations and payload parking
//! * `messages::join` - fan-out, fan-in and merge barriers
//! * `messages::scaling` - spawners, queue drains and the API poller
//! * `messages::validation` - graph validation warnings
//!
//! # Usage
//!
//! ```rust
//! use the_switchyard::observability::messages::coordinator::DuplicateDelivery;
//! use the_switchyard::observability::messages::StructuredLog;
//!
//! DuplicateDelivery {
//!     node_id: "score",
//!     key: "payload:5f0c",
//! }
//! .log();
//! ```

pub mod messages;
