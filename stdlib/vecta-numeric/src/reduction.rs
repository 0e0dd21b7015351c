//! Per-worker scratch accumulators and the completion counter.
//!
//! # Protocol
//!
//! ```text
//!  orchestrator                       worker w (one per key)
//!  ------------                       ----------------------
//!  registry = register(dispatcher)    (broadcast: slot w created)
//!  template = shared.detach()
//!  submit N keyed tasks  ---------->  private = registry.detach(w, template)
//!                                     ... accumulate into private ...
//!                                     permit dropped -> counter.release()
//!  counter.acquire(N)    <----------
//!  registry.attach(shared)            (slot w merged and cleared)
//! ```
//!
//! A slot is touched only by the worker it belongs to while a barrier is
//! open, and only by the orchestrator after the barrier closes, so its
//! mutex is never contended. Repeated `detach` calls from one worker
//! within one barrier reuse the same private accumulator.

use parking_lot::{Condvar, MappedMutexGuard, Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use vecta_rts_pool::{Dispatcher, WorkerId};

use crate::error::{VectorError, VectorResult};
use crate::message::Message;

// ============================================================================
// Message Registry
// ============================================================================

/// One worker's scratch slot. `Some` means in use.
struct Slot<M> {
    message: Option<M>,
}

/// Per-worker private accumulators for one message type.
pub struct MessageRegistry<M: Message> {
    slots: Box<[Mutex<Slot<M>>]>,
}

impl<M: Message> MessageRegistry<M> {
    /// Build a registry by broadcasting a registration to every worker.
    ///
    /// Each worker creates its own empty slot; the collected slots are then
    /// frozen into an array indexed by worker id. Fails if any worker id in
    /// `0..worker_count` did not register.
    pub fn register(dispatcher: &dyn Dispatcher) -> VectorResult<Self> {
        let count = dispatcher.worker_count();
        let registered: Arc<Mutex<Vec<(WorkerId, Mutex<Slot<M>>)>>> =
            Arc::new(Mutex::new(Vec::with_capacity(count)));

        let sink = Arc::clone(&registered);
        dispatcher.run_on_every_worker(Arc::new(move |worker: WorkerId| {
            sink.lock()
                .push((worker, Mutex::new(Slot { message: None })));
        }))?;

        let mut entries = std::mem::take(&mut *registered.lock());
        entries.sort_by_key(|(worker, _)| *worker);
        entries.dedup_by_key(|(worker, _)| *worker);

        for expected in 0..count {
            match entries.get(expected) {
                Some((worker, _)) if worker.index() == expected => {}
                _ => return Err(VectorError::RegistrationIncomplete { missing: expected }),
            }
        }

        debug!(
            message = std::any::type_name::<M>(),
            workers = count,
            "message registry built"
        );

        Ok(Self {
            slots: entries
                .into_iter()
                .take(count)
                .map(|(_, slot)| slot)
                .collect(),
        })
    }

    /// Build a registry with `workers` slots without a dispatcher.
    #[must_use]
    pub fn with_workers(workers: usize) -> Self {
        Self {
            slots: (0..workers)
                .map(|_| Mutex::new(Slot { message: None }))
                .collect(),
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.slots.len()
    }

    /// Get the private accumulator of `worker`.
    ///
    /// The first call within a barrier stores `template.detach()` in the
    /// worker's slot; later calls return the same accumulator.
    pub fn detach(
        &self,
        worker: WorkerId,
        template: &M,
    ) -> VectorResult<MappedMutexGuard<'_, M>> {
        let slot = self
            .slots
            .get(worker.index())
            .ok_or(VectorError::UnknownWorker {
                worker: worker.index(),
                registered: self.slots.len(),
            })?;

        Ok(MutexGuard::map(slot.lock(), |slot| {
            slot.message.get_or_insert_with(|| template.detach())
        }))
    }

    /// Merge every in-use slot into `shared` and clear it.
    ///
    /// Returns the number of slots merged.
    pub fn attach(&self, shared: &mut M) -> usize {
        let mut merged = 0;
        for slot in self.slots.iter() {
            if let Some(private) = slot.lock().message.take() {
                shared.attach(private);
                merged += 1;
            }
        }
        merged
    }

    /// Discard every private accumulator without merging.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            slot.lock().message = None;
        }
    }

    /// Number of slots currently holding a private accumulator.
    #[must_use]
    pub fn in_use(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.lock().message.is_some())
            .count()
    }
}

impl<M: Message> fmt::Debug for MessageRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageRegistry")
            .field("message", &std::any::type_name::<M>())
            .field("slots", &self.slots.len())
            .field("in_use", &self.in_use())
            .finish()
    }
}

// ============================================================================
// Completion Counter
// ============================================================================

struct CounterState {
    permits: usize,
    failure: Option<VectorError>,
}

/// Counting barrier joined by the orchestrator of a parallel operation.
///
/// Tasks release one permit each; the orchestrator acquires as many
/// permits as it dispatched units. The first failure a task records is
/// returned by [`CompletionCounter::acquire`] once the barrier closes.
/// Only the orchestrator waits, so one waiter is woken per release.
pub struct CompletionCounter {
    state: Mutex<CounterState>,
    condvar: Condvar,
}

impl CompletionCounter {
    /// Create a counter with no permits.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(CounterState {
                permits: 0,
                failure: None,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Release one permit.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.permits += 1;
        self.condvar.notify_one();
    }

    /// Record a failure. Only the first one is kept.
    pub fn record_failure(&self, error: VectorError) {
        let mut state = self.state.lock();
        if state.failure.is_none() {
            state.failure = Some(error);
        }
    }

    /// Take a permit guard that releases on drop, including during unwinding.
    #[must_use]
    pub fn permit(&self) -> Permit<'_> {
        Permit { counter: self }
    }

    /// Block until `count` permits are available and consume them.
    pub fn acquire(&self, count: usize) -> VectorResult<()> {
        let mut state = self.state.lock();
        while state.permits < count {
            self.condvar.wait(&mut state);
        }
        state.permits -= count;
        match state.failure.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Permits released but not yet acquired.
    #[must_use]
    pub fn available(&self) -> usize {
        self.state.lock().permits
    }
}

impl Default for CompletionCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CompletionCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CompletionCounter")
            .field("permits", &state.permits)
            .field("failed", &state.failure.is_some())
            .finish()
    }
}

/// Releases one permit of its counter when dropped.
#[must_use = "dropping the permit releases it immediately"]
pub struct Permit<'a> {
    counter: &'a CompletionCounter,
}

impl Permit<'_> {
    /// Record a failure before the permit is released.
    pub fn fail(&self, error: VectorError) {
        self.counter.record_failure(error);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        self.counter.release();
    }
}
