//! Fixed worker pool for the Vecta numeric runtime.
//!
//! The numeric core never creates threads. It consumes two primitives
//! from a [`Dispatcher`]:
//!
//! - **Broadcast** ([`Dispatcher::run_on_every_worker`]) - run a job once
//!   on every worker and wait for all of them. Used to register per-worker
//!   state.
//! - **Keyed task** ([`Dispatcher::run_keyed_task`]) - submit one unit of
//!   work associated with an integer key and return immediately.
//!   Completion is observed by the caller through its own counter.
//!
//! Two dispatchers are provided:
//!
//! - [`WorkerPool`] - a fixed set of OS threads. Keyed tasks are routed to
//!   the inbox of worker `key % num_workers`; idle workers may steal from
//!   other inboxes. Broadcast jobs go to per-worker pinned queues that are
//!   never stolen from.
//! - [`InlineDispatcher`] - runs everything on the calling thread while
//!   reporting `key % num_workers` as the executing worker. Useful for
//!   reproducing parallel schedules deterministically.
//!
//! # Worker lifecycle
//!
//! ```text
//!            submit                 shutdown
//!              |                       |
//!              v                       v
//! +-------+  +------+  +---------+  +----------+  +--------+
//! | Spawn |->| Idle |<>| Running |->| Draining |->| Exited |
//! +-------+  +------+  +---------+  +----------+  +--------+
//! ```
//!
//! Workers drain every queued job before exiting, so a job submitted before
//! shutdown always runs.

#![warn(missing_docs)]

mod config;

pub use config::{PoolConfig, ENV_STACK_SIZE, ENV_WORKERS, ENV_WORK_STEALING};

use crossbeam::deque::{Injector, Steal};
use crossbeam::utils::Backoff;
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::cell::Cell;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// How long an idle worker parks before polling its queues again.
const IDLE_PARK: Duration = Duration::from_millis(1);

// ============================================================================
// Errors
// ============================================================================

/// Errors reported by a dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The pool has been shut down and accepts no more work.
    #[error("worker pool is shut down")]
    ShutDown,

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread {worker}: {reason}")]
    SpawnFailed {
        /// Worker index.
        worker: usize,
        /// OS error text.
        reason: String,
    },

    /// A broadcast job panicked on one or more workers.
    #[error("broadcast job panicked on worker {worker}: {message}")]
    BroadcastPanicked {
        /// First worker that reported a panic.
        worker: usize,
        /// Panic payload, if it was a string.
        message: String,
    },

    /// A broadcast was issued from one of the pool's own workers.
    #[error("broadcast issued from worker {worker} of the same pool")]
    Reentrant {
        /// Calling worker.
        worker: usize,
    },

    /// A configuration value was rejected.
    #[error("invalid configuration value for {name}: {value:?}")]
    InvalidConfig {
        /// Field or environment variable name.
        name: &'static str,
        /// Rejected value.
        value: String,
    },
}

// ============================================================================
// Worker IDs and Dispatcher Contract
// ============================================================================

/// Stable identifier of a worker, in `0..worker_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerId(usize);

impl WorkerId {
    /// Wrap a raw worker index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw worker index.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Worker({})", self.0)
    }
}

/// A unit of keyed work. Receives the id of the worker running it.
pub type KeyedTask = Box<dyn FnOnce(WorkerId) + Send + 'static>;

/// A job run once on every worker.
pub type BroadcastJob = Arc<dyn Fn(WorkerId) + Send + Sync + 'static>;

/// The work-dispatch substrate consumed by the numeric core.
pub trait Dispatcher: Send + Sync {
    /// Number of workers. Worker ids are `0..worker_count()`.
    fn worker_count(&self) -> usize;

    /// Run `job` once on every worker and block until all runs finished.
    fn run_on_every_worker(&self, job: BroadcastJob) -> Result<(), DispatchError>;

    /// Submit `task` keyed by `key` and return without waiting.
    fn run_keyed_task(&self, key: usize, task: KeyedTask) -> Result<(), DispatchError>;
}

/// Statistics for a dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Keyed tasks submitted.
    pub tasks_submitted: u64,
    /// Keyed tasks and broadcast runs completed.
    pub tasks_completed: u64,
    /// Jobs that panicked.
    pub tasks_panicked: u64,
    /// Broadcasts issued.
    pub broadcasts: u64,
    /// Keyed tasks taken from another worker's inbox.
    pub steals: u64,
}

#[derive(Default)]
struct StatCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    broadcasts: AtomicU64,
    steals: AtomicU64,
}

impl StatCounters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            tasks_submitted: self.submitted.load(Ordering::Relaxed),
            tasks_completed: self.completed.load(Ordering::Relaxed),
            tasks_panicked: self.panicked.load(Ordering::Relaxed),
            broadcasts: self.broadcasts.load(Ordering::Relaxed),
            steals: self.steals.load(Ordering::Relaxed),
        }
    }
}

/// Render a panic payload as text.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ============================================================================
// Broadcast Latch
// ============================================================================

/// Counts outstanding broadcast runs and remembers the first panic.
struct Latch {
    state: Mutex<LatchState>,
    condvar: Condvar,
}

struct LatchState {
    remaining: usize,
    failure: Option<(usize, String)>,
}

impl Latch {
    fn new(count: usize) -> Self {
        Self {
            state: Mutex::new(LatchState {
                remaining: count,
                failure: None,
            }),
            condvar: Condvar::new(),
        }
    }

    fn count_down(&self, failure: Option<(usize, String)>) {
        let mut state = self.state.lock();
        state.remaining -= 1;
        if state.failure.is_none() {
            state.failure = failure;
        }
        if state.remaining == 0 {
            self.condvar.notify_all();
        }
    }

    fn wait(&self) -> Result<(), DispatchError> {
        let mut state = self.state.lock();
        while state.remaining > 0 {
            self.condvar.wait(&mut state);
        }
        match state.failure.take() {
            Some((worker, message)) => Err(DispatchError::BroadcastPanicked { worker, message }),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Worker Pool
// ============================================================================

type Job = Box<dyn FnOnce(WorkerId) + Send>;

/// State shared between the pool handle and its workers.
struct Shared {
    pool_id: u64,
    /// Keyed tasks, one inbox per worker. Stealable.
    inboxes: Vec<Injector<Job>>,
    /// Broadcast runs, one queue per worker. Never stolen.
    pinned: Vec<Injector<Job>>,
    work_stealing: bool,
    shutdown: AtomicBool,
    stats: StatCounters,
}

/// A fixed pool of worker threads.
pub struct WorkerPool {
    config: PoolConfig,
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Create a pool with `num_workers` threads and default settings.
    pub fn new(num_workers: usize) -> Result<Self, DispatchError> {
        Self::with_config(PoolConfig {
            num_workers,
            ..Default::default()
        })
    }

    /// Create a pool from an explicit configuration.
    pub fn with_config(config: PoolConfig) -> Result<Self, DispatchError> {
        config.validate()?;

        static POOL_COUNTER: AtomicU64 = AtomicU64::new(0);
        let pool_id = POOL_COUNTER.fetch_add(1, Ordering::Relaxed);

        let shared = Arc::new(Shared {
            pool_id,
            inboxes: (0..config.num_workers).map(|_| Injector::new()).collect(),
            pinned: (0..config.num_workers).map(|_| Injector::new()).collect(),
            work_stealing: config.work_stealing,
            shutdown: AtomicBool::new(false),
            stats: StatCounters::default(),
        });

        let mut workers = Vec::with_capacity(config.num_workers);
        for id in 0..config.num_workers {
            let shared_for_worker = Arc::clone(&shared);
            let spawned = thread::Builder::new()
                .name(format!("{}-{id}", config.thread_name))
                .stack_size(config.stack_size)
                .spawn(move || worker_loop(id, &shared_for_worker));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(err) => {
                    // Stop the workers that did start before reporting.
                    shared.shutdown.store(true, Ordering::Release);
                    for handle in workers {
                        handle.thread().unpark();
                        let _ = handle.join();
                    }
                    return Err(DispatchError::SpawnFailed {
                        worker: id,
                        reason: err.to_string(),
                    });
                }
            }
        }

        info!(
            pool = pool_id,
            workers = config.num_workers,
            work_stealing = config.work_stealing,
            "worker pool started"
        );

        Ok(Self {
            config,
            shared,
            workers,
        })
    }

    /// Create a pool configured from the environment.
    pub fn from_env() -> Result<Self, DispatchError> {
        Self::with_config(PoolConfig::from_env()?)
    }

    /// Get the pool configuration.
    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Get pool statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.shared.stats.snapshot()
    }

    /// Shut down the pool and wait for all workers to drain and exit.
    pub fn shutdown(mut self) {
        self.stop();
        for worker in std::mem::take(&mut self.workers) {
            let _ = worker.join();
        }
        debug!(pool = self.shared.pool_id, "worker pool joined");
    }

    fn stop(&self) {
        self.shared.shutdown.store(true, Ordering::Release);
        for worker in &self.workers {
            worker.thread().unpark();
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shared.shutdown.load(Ordering::Acquire)
    }

    fn wake(&self, worker: usize) {
        if let Some(handle) = self.workers.get(worker) {
            handle.thread().unpark();
        }
    }
}

impl Dispatcher for WorkerPool {
    fn worker_count(&self) -> usize {
        self.config.num_workers
    }

    fn run_on_every_worker(&self, job: BroadcastJob) -> Result<(), DispatchError> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        if let Some((pool, worker)) = current_worker() {
            if pool == self.shared.pool_id {
                return Err(DispatchError::Reentrant { worker });
            }
        }

        self.shared.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        let latch = Arc::new(Latch::new(self.config.num_workers));

        for id in 0..self.config.num_workers {
            let job = Arc::clone(&job);
            let latch = Arc::clone(&latch);
            self.shared.pinned[id].push(Box::new(move |worker: WorkerId| {
                let outcome = catch_unwind(AssertUnwindSafe(|| job(worker)));
                let failure = outcome
                    .err()
                    .map(|payload| (worker.index(), panic_message(&*payload)));
                latch.count_down(failure);
            }));
            self.wake(id);
        }

        latch.wait()
    }

    fn run_keyed_task(&self, key: usize, task: KeyedTask) -> Result<(), DispatchError> {
        if self.is_shut_down() {
            return Err(DispatchError::ShutDown);
        }
        let target = key % self.config.num_workers;
        self.shared.stats.submitted.fetch_add(1, Ordering::Relaxed);
        self.shared.inboxes[target].push(task);
        self.wake(target);
        Ok(())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("pool_id", &self.shared.pool_id)
            .field("num_workers", &self.config.num_workers)
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

fn steal_from(queue: &Injector<Job>) -> Option<Job> {
    loop {
        match queue.steal() {
            Steal::Success(job) => return Some(job),
            Steal::Empty => return None,
            Steal::Retry => continue,
        }
    }
}

fn next_job(id: usize, shared: &Shared) -> Option<Job> {
    // Broadcast runs first: a registration must not wait behind a long
    // backlog of keyed tasks.
    if let Some(job) = steal_from(&shared.pinned[id]) {
        return Some(job);
    }
    if let Some(job) = steal_from(&shared.inboxes[id]) {
        return Some(job);
    }
    if !shared.work_stealing {
        return None;
    }
    let count = shared.inboxes.len();
    for offset in 1..count {
        let victim = (id + offset) % count;
        if let Some(job) = steal_from(&shared.inboxes[victim]) {
            shared.stats.steals.fetch_add(1, Ordering::Relaxed);
            return Some(job);
        }
    }
    None
}

fn run_job(id: usize, job: Job, shared: &Shared) {
    let worker = WorkerId(id);
    match catch_unwind(AssertUnwindSafe(|| job(worker))) {
        Ok(()) => {}
        Err(payload) => {
            shared.stats.panicked.fetch_add(1, Ordering::Relaxed);
            warn!(
                pool = shared.pool_id,
                worker = id,
                message = %panic_message(&*payload),
                "job panicked"
            );
        }
    }
    shared.stats.completed.fetch_add(1, Ordering::Relaxed);
}

fn worker_loop(id: usize, shared: &Shared) {
    CURRENT_WORKER.with(|w| w.set(Some((shared.pool_id, id))));
    debug!(pool = shared.pool_id, worker = id, "worker started");

    let backoff = Backoff::new();
    loop {
        if let Some(job) = next_job(id, shared) {
            run_job(id, job, shared);
            backoff.reset();
            continue;
        }

        if shared.shutdown.load(Ordering::Acquire) {
            break;
        }

        if backoff.is_completed() {
            thread::park_timeout(IDLE_PARK);
        } else {
            backoff.snooze();
        }
    }

    debug!(pool = shared.pool_id, worker = id, "worker exited");
    CURRENT_WORKER.with(|w| w.set(None));
}

// ============================================================================
// Inline Dispatcher
// ============================================================================

/// Runs every job on the calling thread.
///
/// Keyed tasks execute immediately as worker `key % worker_count`, and a
/// broadcast runs the job for each worker id in order. The schedule is
/// fully deterministic.
#[derive(Debug)]
pub struct InlineDispatcher {
    workers: usize,
    stats: Arc<StatCounters>,
}

impl InlineDispatcher {
    /// Simulate `workers` workers. Zero is treated as one.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
            stats: Arc::new(StatCounters::default()),
        }
    }

    /// Get dispatcher statistics.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.stats.snapshot()
    }
}

impl fmt::Debug for StatCounters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.snapshot().fmt(f)
    }
}

impl Dispatcher for InlineDispatcher {
    fn worker_count(&self) -> usize {
        self.workers
    }

    fn run_on_every_worker(&self, job: BroadcastJob) -> Result<(), DispatchError> {
        self.stats.broadcasts.fetch_add(1, Ordering::Relaxed);
        for id in 0..self.workers {
            let outcome = catch_unwind(AssertUnwindSafe(|| job(WorkerId(id))));
            self.stats.completed.fetch_add(1, Ordering::Relaxed);
            if let Err(payload) = outcome {
                self.stats.panicked.fetch_add(1, Ordering::Relaxed);
                return Err(DispatchError::BroadcastPanicked {
                    worker: id,
                    message: panic_message(&*payload),
                });
            }
        }
        Ok(())
    }

    fn run_keyed_task(&self, key: usize, task: KeyedTask) -> Result<(), DispatchError> {
        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        let worker = WorkerId(key % self.workers);
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| task(worker))) {
            self.stats.panicked.fetch_add(1, Ordering::Relaxed);
            warn!(worker = worker.index(), message = %panic_message(&*payload), "job panicked");
        }
        self.stats.completed.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Thread-Local Storage
// ============================================================================

thread_local! {
    /// Pool and worker index of the current thread, if it is a worker.
    static CURRENT_WORKER: Cell<Option<(u64, usize)>> = const { Cell::new(None) };
}

fn current_worker() -> Option<(u64, usize)> {
    CURRENT_WORKER.with(|c| c.get())
}

/// Get the id of the current worker thread, if any.
#[must_use]
pub fn current_worker_id() -> Option<WorkerId> {
    current_worker().map(|(_, id)| WorkerId(id))
}

// ============================================================================
// Tests
// ============================================================================
