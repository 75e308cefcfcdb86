// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Local backend: the whole graph in one process.

pub mod channel;
pub mod platform;
pub mod workers;

pub use channel::{Delivery, DeliveryKind, InProcessChannel, MemoryQueue};
pub use platform::{parse_input, LocalPlatform, LocalPlatformBuilder};
pub use workers::BuiltinWorkerFactory;
