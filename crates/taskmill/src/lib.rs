//! # taskmill
//!
//! An exploratory library of concurrency primitives built around two tightly
//! coupled subsystems:
//!
//! - [`queue`]: a multi-producer/multi-consumer sharded unbounded queue, each
//!   shard a singly-linked free-list mutated through a per-node atomic "hold"
//!   reservation rather than a shard-wide lock.
//! - [`pool`]: an elastic worker pool that drains submitted work through that
//!   queue, with pause/resume and cooperative shutdown.
//!
//! [`sync`] holds the supporting `SaturatingSemaphore` and spin-then-block
//! waiting helpers the queue's blocking slots are built from.
//!
//! This is a primitives crate: lock-light, not lock-free (the algorithms may
//! spin), and it makes no attempt at strict cross-shard FIFO, fairness
//! between waiters, or persistence.

pub mod error;
pub mod pool;
pub mod queue;
pub mod sync;
mod task;

pub use error::{FutureError, PoolError, QueueError};
pub use pool::{PoolConfig, WorkerPool};
pub use queue::{QueueConfig, ShardedUnboundedQueue};
pub use task::JobHandle;
