//! Queue error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("job serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("missing job argument: {0}")]
    MissingArgument(String),

    #[error("invalid job argument {name}: {reason}")]
    InvalidArgument { name: String, reason: String },

    #[error("invalid cron expression {expression}: {reason}")]
    InvalidSchedule { expression: String, reason: String },

    #[error("queue closed")]
    Closed,

    #[error("provider error: {0}")]
    Provider(String),
}

#[cfg(feature = "queue-redis")]
impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout() {
            QueueError::Connection(err.to_string())
        } else {
            QueueError::Provider(err.to_string())
        }
    }
}
