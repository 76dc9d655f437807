use std::fmt;

/// Construction or submission failures for [`crate::queue::ShardedUnboundedQueue`].
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("invalid queue configuration: {reason}")]
    InvalidConfig { reason: String },
}

/// Construction or submission failures for [`crate::pool::WorkerPool`].
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {reason}")]
    InvalidConfig { reason: String },
    #[error("pool is paused or closed and cannot accept new tasks")]
    Unavailable,
}

/// Resolution of a [`crate::pool::JobHandle`], covering every way a task can
/// fail to hand back a plain `T`.
#[derive(Debug, thiserror::Error)]
pub enum FutureError<E> {
    /// The task was dropped by the pool (e.g. at shutdown) before it ran.
    #[error("task was cancelled before it ran")]
    Cancelled,
    /// The task's function returned `Err`; the payload is forwarded as-is.
    #[error("task returned an error")]
    UserError(E),
    /// The task's function panicked.
    #[error("task panicked: {0}")]
    Panicked(String),
    /// `get()` was called a second time after a first successful call.
    #[error("job result was already taken")]
    AlreadyTaken,
}

impl<E: fmt::Debug> FutureError<E> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FutureError::Cancelled)
    }
}
