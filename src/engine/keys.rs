//! Coordination store key layout.

use uuid::Uuid;

/// Fresh key for a parked payload or idempotency token.
pub fn payload() -> String {
    format!("payload:{}", Uuid::new_v4())
}

/// Fresh key for a fan-out's buffered invocation list.
pub fn spawn_queue() -> String {
    format!("spawn:{}", Uuid::new_v4())
}

pub fn join_counter(fan_out_id: &str) -> String {
    format!("join:{}:counter", fan_out_id)
}

pub fn join_results(fan_out_id: &str) -> String {
    format!("join:{}:results", fan_out_id)
}

/// Record for one merge barrier. The root branch, before any divergence, is `root`.
pub fn merge(execution_id: &str, target: &str, branch_id: Option<&str>) -> String {
    format!(
        "merge:{}:{}:{}",
        execution_id,
        target,
        branch_id.unwrap_or("root")
    )
}

pub fn queue_items(queue_insert_id: &str) -> String {
    format!("drain:{}:items", queue_insert_id)
}

pub fn queue_target(queue_insert_id: &str) -> String {
    format!("drain:{}:target", queue_insert_id)
}

pub fn queue_backpack(queue_insert_id: &str) -> String {
    format!("drain:{}:backpack", queue_insert_id)
}

/// Where an API-response edge leaves the value for the synchronous poller.
pub fn api_response(execution_id: &str) -> String {
    format!("response:{}", execution_id)
}
