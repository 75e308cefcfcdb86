// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

pub mod backends;   // stores, local platform, test stubs
pub mod config;     // graph config + validation
pub mod engine;     // per-node coordinator
pub mod envelope;   // wire format and control modes
pub mod errors;     // error handling
pub mod expression; // `if` edge conditions
pub mod observability;
pub mod traits;     // collaborator abstractions
