// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

mod collaborators;
mod config;
mod execution;
mod expression;

pub use collaborators::{ChannelError, QueueError, StoreError};
pub use config::ValidationError;
pub use execution::{CoordinatorError, DecodeError};
pub use expression::ExpressionError;
