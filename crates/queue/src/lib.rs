pub mod backend;
pub mod error;
pub mod job;
pub mod memory;
pub mod periodic;
pub mod pool;
#[cfg(feature = "queue-redis")]
pub mod redis_queue;

pub use backend::{Enqueuer, JobBackend};
pub use error::QueueError;
pub use job::{unique_key, Job, JobArgs};
pub use memory::MemoryQueue;
pub use periodic::PeriodicEnqueuer;
pub use pool::{HandlerError, PoolConfig, WorkerPool};
#[cfg(feature = "queue-redis")]
pub use redis_queue::{RedisKeys, RedisQueue};
