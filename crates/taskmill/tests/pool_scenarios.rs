//! End-to-end scenarios from the pool's contract: submission round-trips,
//! pause/resume gating, panicking tasks, and shutdown semantics, all driven
//! through the public `WorkerPool` API only.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use taskmill::error::{FutureError, PoolError};
use taskmill::pool::{PoolConfig, WorkerPool};

/// S1: 100 tasks on a 2-worker pool, collected in submission order, resolve
/// to exactly `{0, .., 99}`; `close()` returns promptly afterward.
#[test]
fn s1_hundred_tasks_on_two_workers_round_trip() {
    let pool = WorkerPool::new(2).unwrap();
    let handles: Vec<_> = (0..100)
        .map(|i| pool.submit(move || Ok::<_, ()>(i)).unwrap())
        .collect();

    let mut results: Vec<i32> = handles.into_iter().map(|h| h.get().unwrap()).collect();
    results.sort_unstable();
    assert_eq!(results, (0..100).collect::<Vec<_>>());

    let start = Instant::now();
    pool.close();
    assert!(start.elapsed() < Duration::from_secs(1));
}

/// S2: submitting while paused fails fast; the in-flight task still
/// finishes; after `unpause()` the same submission succeeds.
#[test]
fn s2_pause_rejects_submission_then_unpause_resumes() {
    let pool = WorkerPool::new(4).unwrap();
    let sleeper = pool
        .submit(|| {
            std::thread::sleep(Duration::from_millis(500));
            Ok::<_, ()>(())
        })
        .unwrap();

    std::thread::sleep(Duration::from_millis(20));
    pool.pause();

    assert!(matches!(
        pool.submit(|| Ok::<_, ()>(42)),
        Err(PoolError::Unavailable)
    ));

    sleeper.get().unwrap();
    pool.unpause();

    let handle = pool.submit(|| Ok::<_, ()>(42)).unwrap();
    assert_eq!(handle.get().unwrap(), 42);
}

/// S4 analogue at the pool level: a large single-thread submission batch,
/// order-independent but loss/duplicate-free.
#[test]
fn s4_large_batch_every_result_present_exactly_once() {
    let pool = WorkerPool::new(4).unwrap();
    let handles: Vec<_> = (0..2_000)
        .map(|i| pool.submit(move || Ok::<_, ()>(i)).unwrap())
        .collect();
    let mut results: Vec<i32> = handles.into_iter().map(|h| h.get().unwrap()).collect();
    results.sort_unstable();
    assert_eq!(results, (0..2_000).collect::<Vec<_>>());
}

/// S5 analogue: many producers submitting concurrently onto a bounded
/// worker fleet, all futures eventually resolving successfully.
#[test]
fn s5_concurrent_submitters_all_resolve() {
    let pool = Arc::new(WorkerPool::new(8).unwrap());
    let completed = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..8)
        .map(|p| {
            let pool = Arc::clone(&pool);
            let completed = Arc::clone(&completed);
            std::thread::spawn(move || {
                let handles: Vec<_> = (0..500)
                    .map(|i| pool.submit(move || Ok::<_, ()>(p * 500 + i)).unwrap())
                    .collect();
                for h in handles {
                    h.get().unwrap();
                    completed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    for s in submitters {
        s.join().unwrap();
    }
    assert_eq!(completed.load(Ordering::SeqCst), 8 * 500);
}

/// S6: a panicking task resolves its handle to an error without poisoning
/// the pool; subsequent submissions still run normally.
#[test]
fn s6_panicking_task_does_not_take_down_the_pool() {
    let pool = WorkerPool::new(2).unwrap();
    let bad = pool
        .submit(|| -> Result<i32, ()> { panic!("deliberate test panic") })
        .unwrap();

    match bad.get() {
        Err(FutureError::Panicked(msg)) => assert!(msg.contains("deliberate test panic")),
        other => panic!("expected Panicked, got {other:?}"),
    }

    let good = pool.submit(|| Ok::<_, ()>(99)).unwrap();
    assert_eq!(good.get().unwrap(), 99);
}

/// Close cancels work that never got to run, resolving those handles to
/// `Cancelled` rather than hanging forever.
#[test]
fn close_resolves_unstarted_tasks_to_cancelled() {
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
    let never_runs = pool.submit(|| Ok::<_, ()>(())).unwrap();

    pool.close();
    blocker.get().unwrap();
    assert!(matches!(never_runs.get(), Err(FutureError::Cancelled)));
}

/// `close()` is idempotent and a dropped pool closes itself.
#[test]
fn close_is_idempotent_and_drop_closes() {
    let pool = WorkerPool::new(2).unwrap();
    pool.close();
    pool.close();
    assert!(pool.is_closed());
    drop(pool);

    let pool = WorkerPool::new(2).unwrap();
    let handle = pool.submit(|| Ok::<_, ()>(1)).unwrap();
    handle.get().unwrap();
    drop(pool); // must not hang
}
