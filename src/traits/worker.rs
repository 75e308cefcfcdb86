use crate::engine::InvocationContext;
use crate::envelope::Backpack;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// What the business logic receives for one hop.
#[derive(Debug, Clone, Default)]
pub struct WorkerInput {
    pub payload: Value,
    pub backpack: Backpack,
}

/// A successful return. The worker may have updated the backpack.
#[derive(Debug, Clone, Default)]
pub struct WorkerOutput {
    pub value: Value,
    pub backpack: Backpack,
}

/// An exception raised by business logic.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerFailure {
    pub message: String,
    /// Backpack as it stood when the worker failed, if it reported one.
    pub backpack: Option<Backpack>,
}

impl WorkerFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            backpack: None,
        }
    }
}

impl fmt::Display for WorkerFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// The user's function for one graph node.
#[async_trait]
pub trait Worker: Send + Sync {
    async fn run(
        &self,
        input: WorkerInput,
        ctx: &InvocationContext,
    ) -> Result<WorkerOutput, WorkerFailure>;

    fn name(&self) -> &str;
}
