use std::time::Duration;
use tokio::time::Instant;

/// What the platform tells one invocation about itself.
///
/// The deadline is the platform's hard limit. Every loop in the coordinator
/// checks [`remaining_time`](Self::remaining_time) and hands its work to a
/// fresh invocation instead of running past it.
#[derive(Debug, Clone)]
pub struct InvocationContext {
    function: String,
    memory_mb: u32,
    started_at: Instant,
    deadline: Instant,
    execution_id: Option<String>,
}

impl InvocationContext {
    /// `function` is the invocation target that reaches this same node.
    pub fn new(function: impl Into<String>, timeout: Duration, memory_mb: u32) -> Self {
        let started_at = Instant::now();
        Self {
            function: function.into(),
            memory_mb,
            started_at,
            deadline: started_at + timeout,
            execution_id: None,
        }
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn function(&self) -> &str {
        &self.function
    }

    pub fn memory_mb(&self) -> u32 {
        self.memory_mb
    }

    /// Empty until the envelope has been decoded.
    pub fn execution_id(&self) -> &str {
        self.execution_id.as_deref().unwrap_or("")
    }

    pub fn remaining_time(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Elapsed plus remaining: the invocation's whole budget.
    pub fn total_budget(&self) -> Duration {
        self.deadline.saturating_duration_since(self.started_at)
    }
}
