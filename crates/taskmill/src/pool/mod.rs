//! An elastic worker pool that drains submitted work from a
//! [`crate::queue::ShardedUnboundedQueue`].
//!
//! Each worker is a dedicated OS thread parked in `queue.dequeue()` when
//! idle. A single background scheduler thread watches the backlog and grows
//! the worker fleet up to `max_workers` when the ratio of queued items to
//! workers crosses `launch_new_by_task_rate`. Shutdown pushes one
//! [`WorkItem::Shutdown`] sentinel per live worker through the same queue
//! workers already block on — the queue itself has no notion of "closed", so
//! this is the pool's own mechanism for waking every parked worker exactly
//! once (plain semaphore posts wake parked threads but don't hand them
//! anything to act on; a sentinel does).

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::error::PoolError;
use crate::queue::ShardedUnboundedQueue;
use crate::task::{make_job, Job, JobHandle};

enum WorkItem {
    Run(Job),
    Shutdown,
}

/// Tunables for [`WorkerPool`]. Mirrors [`crate::queue::QueueConfig`]'s shape:
/// a `Copy` value type with a `Default` matching the documented defaults and
/// `with_*` builder setters.
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    max_workers: usize,
    core_workers: usize,
    launch_new_by_task_rate: usize,
    scheduler_idle_sleep: Duration,
}

impl PoolConfig {
    pub const DEFAULT_THRESHOLD_FACTOR: f64 = 1.5;
    pub const DEFAULT_LAUNCH_NEW_BY_TASK_RATE: usize = 3;
    pub const DEFAULT_SCHEDULER_IDLE_SLEEP: Duration = Duration::from_millis(1);

    /// `max_workers` defaults to `round(1.5 * available_parallelism)`,
    /// clamped to at least 1; `core_workers` defaults to half that.
    pub fn new() -> Self {
        let parallelism = num_cpus::get().max(1) as f64;
        let max_workers = (parallelism * Self::DEFAULT_THRESHOLD_FACTOR).round() as usize;
        let max_workers = max_workers.max(1);
        Self {
            max_workers,
            core_workers: (max_workers / 2).max(1).min(max_workers),
            launch_new_by_task_rate: Self::DEFAULT_LAUNCH_NEW_BY_TASK_RATE,
            scheduler_idle_sleep: Self::DEFAULT_SCHEDULER_IDLE_SLEEP,
        }
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn with_core_workers(mut self, core_workers: usize) -> Self {
        self.core_workers = core_workers;
        self
    }

    pub fn with_launch_new_by_task_rate(mut self, rate: usize) -> Self {
        self.launch_new_by_task_rate = rate.max(1);
        self
    }

    pub fn with_scheduler_idle_sleep(mut self, sleep: Duration) -> Self {
        self.scheduler_idle_sleep = sleep;
        self
    }

    fn validate(&self) -> Result<(), PoolError> {
        if self.max_workers == 0 {
            return Err(PoolError::InvalidConfig {
                reason: "max_workers must be nonzero".to_string(),
            });
        }
        if self.core_workers > self.max_workers {
            return Err(PoolError::InvalidConfig {
                reason: format!(
                    "core_workers ({}) exceeds max_workers ({})",
                    self.core_workers, self.max_workers
                ),
            });
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// The condvar workers and the scheduler block on while the pool is paused,
/// and that `close`/`unpause` broadcast on to wake them.
struct PauseGate {
    mutex: Mutex<()>,
    condvar: Condvar,
}

struct Worker {
    id: usize,
    handle: Option<JoinHandle<()>>,
}

struct PoolState {
    queue: ShardedUnboundedQueue<WorkItem>,
    max_workers: usize,
    launch_new_by_task_rate: usize,
    scheduler_idle_sleep: Duration,
    paused: AtomicBool,
    closed: AtomicBool,
    pause_gate: PauseGate,
    workers: Mutex<Vec<Worker>>,
    next_worker_id: AtomicUsize,
}

/// A fleet of worker threads draining a shared [`ShardedUnboundedQueue`],
/// with elastic growth, pause/resume, and cooperative shutdown.
pub struct WorkerPool {
    state: Arc<PoolState>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Build a pool with `max_workers` as the upper bound and every other
    /// tunable at its default (see [`PoolConfig::new`]).
    pub fn new(max_workers: usize) -> Result<Self, PoolError> {
        let core_workers = (max_workers / 2).max(1).min(max_workers.max(1));
        let cfg = PoolConfig::new()
            .with_max_workers(max_workers)
            .with_core_workers(core_workers);
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: PoolConfig) -> Result<Self, PoolError> {
        cfg.validate()?;

        let state = Arc::new(PoolState {
            queue: ShardedUnboundedQueue::new(),
            max_workers: cfg.max_workers,
            launch_new_by_task_rate: cfg.launch_new_by_task_rate,
            scheduler_idle_sleep: cfg.scheduler_idle_sleep,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            pause_gate: PauseGate {
                mutex: Mutex::new(()),
                condvar: Condvar::new(),
            },
            workers: Mutex::new(Vec::with_capacity(cfg.core_workers)),
            next_worker_id: AtomicUsize::new(0),
        });

        {
            let mut workers = state.workers.lock();
            for _ in 0..cfg.core_workers {
                if let Some(worker) = spawn_worker(&state) {
                    workers.push(worker);
                }
            }
        }

        let scheduler_state = Arc::clone(&state);
        let scheduler = thread::Builder::new()
            .name("taskmill-scheduler".to_string())
            .spawn(move || scheduler_loop(scheduler_state))
            .expect("failed to spawn taskmill scheduler thread");

        Ok(Self {
            state,
            scheduler: Mutex::new(Some(scheduler)),
        })
    }

    /// Submit `f` for execution, returning a handle to its eventual result.
    /// Fails with `PoolError::Unavailable` (without enqueuing) if the pool
    /// is paused or closed.
    pub fn submit<F, T, E>(&self, f: F) -> Result<JobHandle<T, E>, PoolError>
    where
        F: FnOnce() -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        if self.state.closed.load(Ordering::Acquire) || self.state.paused.load(Ordering::Acquire) {
            return Err(PoolError::Unavailable);
        }
        let (job, handle) = make_job(f);
        self.state.queue.enqueue(WorkItem::Run(job));
        Ok(handle)
    }

    /// Stop dispatching queued tasks. In-flight tasks run to completion;
    /// workers then block on the pause gate instead of dequeuing more work.
    pub fn pause(&self) {
        self.state.paused.store(true, Ordering::Release);
    }

    /// Resume dispatching and wake every worker/scheduler parked on the
    /// pause gate.
    pub fn unpause(&self) {
        self.state.paused.store(false, Ordering::Release);
        let _guard = self.state.pause_gate.mutex.lock();
        self.state.pause_gate.condvar.notify_all();
    }

    pub fn is_paused(&self) -> bool {
        self.state.paused.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::Acquire)
    }

    pub fn worker_count(&self) -> usize {
        self.state.workers.lock().len()
    }

    /// Idempotent, orderly shutdown: stop accepting new tasks, wake every
    /// worker (queued tasks still in flight are dropped, resolving their
    /// handles to `FutureError::Cancelled`), and join every worker and the
    /// scheduler thread.
    pub fn close(&self) {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        log::debug!("taskmill: pool closing");

        let pending_workers = self.state.workers.lock().len();
        for _ in 0..pending_workers {
            self.state.queue.enqueue(WorkItem::Shutdown);
        }

        // Wake anything parked on the pause gate (workers waiting for
        // unpause, or the scheduler) so it observes `closed` and exits.
        {
            let _guard = self.state.pause_gate.mutex.lock();
            self.state.pause_gate.condvar.notify_all();
        }

        let mut workers = self.state.workers.lock();
        for worker in workers.iter_mut() {
            if let Some(handle) = worker.handle.take() {
                if handle.join().is_err() {
                    log::warn!("taskmill: worker {} panicked while exiting", worker.id);
                }
            }
        }
        workers.clear();
        drop(workers);

        if let Some(handle) = self.scheduler.lock().take() {
            let _ = handle.join();
        }
        log::debug!("taskmill: pool closed");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_worker(state: &Arc<PoolState>) -> Option<Worker> {
    let id = state.next_worker_id.fetch_add(1, Ordering::Relaxed);
    let worker_state = Arc::clone(state);
    match thread::Builder::new()
        .name(format!("taskmill-worker-{id}"))
        .spawn(move || worker_loop(id, worker_state))
    {
        Ok(handle) => {
            log::debug!("taskmill: spawned worker {id}");
            Some(Worker {
                id,
                handle: Some(handle),
            })
        }
        Err(err) => {
            log::warn!("taskmill: failed to spawn worker {id}: {err}");
            None
        }
    }
}

fn wait_out_pause(state: &PoolState) {
    let mut guard = state.pause_gate.mutex.lock();
    while state.paused.load(Ordering::Acquire) && !state.closed.load(Ordering::Acquire) {
        state.pause_gate.condvar.wait(&mut guard);
    }
}

fn worker_loop(id: usize, state: Arc<PoolState>) {
    loop {
        wait_out_pause(&state);
        if state.closed.load(Ordering::Acquire) {
            break;
        }
        match state.queue.dequeue() {
            WorkItem::Run(job) => job(),
            WorkItem::Shutdown => break,
        }
    }
    log::debug!("taskmill: worker {id} exiting");
}

fn scheduler_loop(state: Arc<PoolState>) {
    loop {
        if state.closed.load(Ordering::Acquire) {
            return;
        }
        if state.paused.load(Ordering::Acquire) {
            wait_out_pause(&state);
            continue;
        }

        let queue_len = state.queue.len();
        let mut workers = state.workers.lock();
        // Re-check under the same lock `close()` takes to snapshot worker
        // count: if closed flipped true since the check above, `close()` may
        // already be mid-shutdown and must see a worker count it actually
        // sent a Shutdown sentinel to, not one grown out from under it.
        if state.closed.load(Ordering::Acquire) {
            return;
        }
        let worker_count = workers.len();
        if worker_count * state.launch_new_by_task_rate < queue_len && worker_count < state.max_workers
        {
            if let Some(worker) = spawn_worker(&state) {
                workers.push(worker);
            }
            drop(workers);
        } else {
            drop(workers);
            thread::sleep(state.scheduler_idle_sleep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[test]
    fn rejects_zero_max_workers() {
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn hundred_tasks_round_trip_on_two_workers() {
        let pool = WorkerPool::new(2).unwrap();
        let handles: Vec<_> = (0..100)
            .map(|i| pool.submit(move || Ok::<_, ()>(i)).unwrap())
            .collect();
        let mut results: Vec<i32> = handles.into_iter().map(|h| h.get().unwrap()).collect();
        results.sort_unstable();
        assert_eq!(results, (0..100).collect::<Vec<_>>());
        pool.close();
        assert!(pool.is_closed());
    }

    #[test]
    fn submit_after_close_is_unavailable() {
        let pool = WorkerPool::new(2).unwrap();
        pool.close();
        assert!(matches!(pool.submit(|| Ok::<_, ()>(1)), Err(PoolError::Unavailable)));
    }

    #[test]
    fn pause_blocks_new_dispatch_until_unpause() {
        let pool = WorkerPool::new(4).unwrap();
        let in_flight = pool
            .submit(|| {
                std::thread::sleep(Duration::from_millis(200));
                Ok::<_, ()>(())
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        pool.pause();

        assert!(matches!(
            pool.submit(|| Ok::<_, ()>(42)),
            Err(PoolError::Unavailable)
        ));

        in_flight.get().unwrap();
        pool.unpause();
        let handle = pool.submit(|| Ok::<_, ()>(42)).unwrap();
        assert_eq!(handle.get().unwrap(), 42);
    }

    #[test]
    fn panicking_task_resolves_to_panicked_and_pool_stays_usable() {
        let pool = WorkerPool::new(2).unwrap();
        let bad = pool.submit(|| -> Result<i32, ()> { panic!("kaboom") }).unwrap();
        assert!(bad.get().is_err());
        let good = pool.submit(|| Ok::<_, ()>(7)).unwrap();
        assert_eq!(good.get().unwrap(), 7);
    }

    #[test]
    fn close_cancels_tasks_that_never_ran() {
        let pool = WorkerPool::with_config(
            PoolConfig::new()
                .with_max_workers(1)
                .with_core_workers(1)
                .with_launch_new_by_task_rate(usize::MAX),
        )
        .unwrap();
        let blocker = pool
            .submit(|| {
                std::thread::sleep(Duration::from_millis(300));
                Ok::<_, ()>(())
            })
            .unwrap();
        let queued = pool.submit(|| Ok::<_, ()>(())).unwrap();
        pool.close();
        blocker.get().unwrap();
        assert!(matches!(
            queued.get(),
            Err(crate::error::FutureError::Cancelled)
        ));
    }

    #[test]
    fn scheduler_grows_pool_under_backlog() {
        let pool = WorkerPool::with_config(
            PoolConfig::new()
                .with_max_workers(4)
                .with_core_workers(1)
                .with_launch_new_by_task_rate(1)
                .with_scheduler_idle_sleep(Duration::from_millis(1)),
        )
        .unwrap();
        let counter = Arc::new(AtomicU32::new(0));
        let handles: Vec<_> = (0..20)
            .map(|_| {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    Ok::<_, ()>(())
                })
                .unwrap()
            })
            .collect();
        for h in handles {
            h.get().unwrap();
        }
        assert!(pool.worker_count() > 1);
        assert_eq!(counter.load(Ordering::SeqCst), 20);
    }
}
