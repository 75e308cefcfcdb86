pub mod channel;
pub mod queue;
pub mod store;
pub mod worker;

pub use channel::InvocationChannel;
pub use queue::{MessageQueue, MAX_QUEUE_BATCH};
pub use store::CoordinationStore;
pub use worker::{Worker, WorkerFailure, WorkerInput, WorkerOutput};
