//! Worker pool integration tests
//!
//! Exercises the dispatcher contract from outside the crate:
//! - Worker identity inside and outside jobs
//! - Reentrant broadcasts
//! - Configuration from the environment-style override source

use std::sync::Arc;

use crossbeam::channel;
use vecta_rts_pool::{
    current_worker_id, DispatchError, Dispatcher, PoolConfig, WorkerId, WorkerPool, ENV_WORKERS,
};

#[test]
fn test_worker_id_visible_only_inside_jobs() {
    let pool = WorkerPool::new(3).unwrap();
    assert_eq!(current_worker_id(), None);

    let (tx, rx) = channel::unbounded();
    for key in 0..30 {
        let tx = tx.clone();
        pool.run_keyed_task(
            key,
            Box::new(move |worker: WorkerId| {
                tx.send((worker, current_worker_id())).unwrap();
            }),
        )
        .unwrap();
    }

    for _ in 0..30 {
        let (worker, seen) = rx.recv().unwrap();
        assert_eq!(seen, Some(worker));
        assert!(worker.index() < 3);
    }
    assert_eq!(pool.stats().tasks_submitted, 30);
    pool.shutdown();
}

#[test]
fn test_broadcast_from_worker_is_rejected() {
    let pool = Arc::new(WorkerPool::new(2).unwrap());
    let (tx, rx) = channel::bounded(1);

    let inner = Arc::clone(&pool);
    pool.run_keyed_task(
        1,
        Box::new(move |_: WorkerId| {
            let result = inner.run_on_every_worker(Arc::new(|_: WorkerId| {}));
            tx.send(result).unwrap();
        }),
    )
    .unwrap();

    let result = rx.recv().unwrap();
    assert!(matches!(result, Err(DispatchError::Reentrant { .. })));

    // Broadcasts from outside the pool still work.
    pool.run_on_every_worker(Arc::new(|_: WorkerId| {})).unwrap();
    assert_eq!(pool.stats().broadcasts, 1);
}

#[test]
fn test_pool_from_overrides() {
    let config = PoolConfig::default()
        .with_overrides(|name| (name == ENV_WORKERS).then(|| "2".to_string()))
        .unwrap();
    let pool = WorkerPool::with_config(config).unwrap();
    assert_eq!(pool.worker_count(), 2);
    assert_eq!(pool.config().num_workers, 2);
}
