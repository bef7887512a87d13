/// Error type shared by every queue adapter.
///
/// Adapters never swallow a backend failure: the root cause text is carried
/// in the variant. An empty queue, an unknown id on finalize, and a reached
/// ephemeral cap are *not* errors; those surface through the contract's
/// return values instead.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Transient backend failure (connection drop, pool timeout, lock wait).
    /// The caller may retry the same operation.
    #[error("transient backend error: {0}")]
    Transient(String),

    /// Non-transient backend failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// A payload could not be encoded or decoded. Other messages are
    /// unaffected.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Unusable adapter configuration (bad structure/table name, bad URL).
    /// Raised at construction time only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl QueueError {
    /// Whether retrying the failed call is reasonable.
    pub fn is_retriable(&self) -> bool {
        matches!(self, QueueError::Transient(_))
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        QueueError::Serialization(err.to_string())
    }
}

impl From<redis::RedisError> for QueueError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_timeout()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
        {
            QueueError::Transient(err.to_string())
        } else {
            QueueError::Backend(err.to_string())
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed => QueueError::Transient(err.to_string()),
            other => QueueError::Backend(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, QueueError>;
