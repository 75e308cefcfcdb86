/// Concurrent outgoing invocations per hop
pub const DEFAULT_DISPATCH_POOL_SIZE: usize = 50;
/// Payloads serializing to more bytes than this are parked in the store
pub const DEFAULT_INLINE_PAYLOAD_LIMIT_BYTES: usize = 200_000;
/// Fan-out spawners are sized to emit every item within this many seconds
pub const DEFAULT_SPAWN_TARGET_SECONDS: u64 = 10;
/// Indirect payloads, join records and API responses (6 hours)
pub const DEFAULT_RETURN_DATA_TTL_SECONDS: u64 = 21_600;
/// Queue drain jobs and merge records (1 day)
pub const DEFAULT_QUEUE_METADATA_TTL_SECONDS: u64 = 86_400;
pub const DEFAULT_API_POLL_INTERVAL_MS: u64 = 10;
/// The API poller gives up with a 504 once less than this remains
pub const DEFAULT_API_SAFETY_MARGIN_MS: u64 = 2_000;

pub const DEFAULT_NODE_MEMORY_MB: u32 = 768;
pub const DEFAULT_NODE_TIMEOUT_SECONDS: u64 = 300;

/// Buffered invocations a spawner pops per round
pub const SPAWNER_BATCH_SIZE: usize = 15;
/// Spawners and drain workers hand off to a fresh invocation below this
pub const CONTINUATION_THRESHOLD_SECONDS: u64 = 10;
/// Seconds of a spawner's budget reserved for start-up and hand-off
pub const SPAWNER_OVERHEAD_SECONDS: u64 = 2;

/// Queue items each drain task pops per round
pub const QUEUE_DRAIN_POP_SIZE: usize = 100;
/// Concurrent drain tasks per round
pub const QUEUE_DRAIN_CONCURRENCY: usize = 15;
/// Messages one drain worker inserts per second
pub const QUEUE_WORKER_RATE_PER_SECOND: usize = 400;
/// Drain workers are sized to empty the buffer in about a minute
pub const QUEUE_WORKER_TARGET_SECONDS: usize = 60;
pub const MAX_QUEUE_DRAIN_WORKERS: usize = 20;
/// Stop spawning drain workers once less than this remains
pub const QUEUE_SPAWN_CUTOFF_SECONDS: u64 = 5;

/// Items per RPUSH when buffering large lists
pub const STORE_BULK_CHUNK_SIZE: usize = 10_000;
