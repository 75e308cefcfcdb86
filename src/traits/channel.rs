use crate::errors::ChannelError;
use async_trait::async_trait;
use serde_json::Value;

/// The platform's function invocation service.
///
/// `invoke_async` is fire-and-forget; the platform retries it at least once,
/// so receivers must tolerate duplicates. `invoke_sync` waits for the
/// callee's response.
#[async_trait]
pub trait InvocationChannel: Send + Sync {
    async fn invoke_async(&self, target: &str, payload: Value) -> Result<(), ChannelError>;

    async fn invoke_sync(&self, target: &str, payload: Value) -> Result<Value, ChannelError>;

    /// Publishes to a notification topic. Subscribers receive the payload inline.
    async fn publish(&self, topic: &str, payload: Value) -> Result<(), ChannelError>;
}
