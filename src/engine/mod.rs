//! The execution coordinator that runs inside every worker invocation.
//!
//! - [`coordinator`]: decode, execute, resolve, dispatch
//! - [`resolver`]: transitions to next-hop requests
//! - [`dispatcher`]: bounded-concurrency delivery with payload parking
//! - [`join`] and [`merge`]: the two join barriers
//! - [`spawner`] and [`queue_drain`]: self-continuing throughput helpers
//! - [`api`]: synchronous endpoints and the response poller

pub mod api;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod join;
pub mod keys;
pub mod merge;
pub mod queue_drain;
pub mod resolver;
pub mod spawner;
#[cfg(test)]
mod integration_tests;

pub use context::InvocationContext;
pub use coordinator::{Coordinator, CoordinatorBuilder, HopOutcome};
pub use dispatcher::{DispatchAction, DispatchReport, DispatchRequest, Dispatcher};
