//! Serial/parallel execution of per-position work.
//!
//! Both entry points take the work as a shared closure over a [`Cursor`].
//! In serial mode one cursor walks `0..element_size`. In parallel mode
//! each position becomes one keyed task that builds its own cursor over a
//! shared handle of the vector, and the caller blocks on a
//! [`CompletionCounter`] until every submitted task has released its
//! permit.
//!
//! Parallel mode gives no ordering between positions. Work that is not
//! independent per position must run serially.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{trace, warn};
use vecta_rts_pool::{panic_message, KeyedTask, WorkerId};

use crate::cursor::Cursor;
use crate::error::{VectorError, VectorResult};
use crate::message::Message;
use crate::reduction::CompletionCounter;
use crate::session::{Mode, Session};
use crate::vector::MathVector;

/// Work applied at one position.
pub type Work = Arc<dyn Fn(&mut Cursor<'_>) + Send + Sync>;

/// Work applied at one position, accumulating into a message.
pub type ReductionWork<M> = Arc<dyn Fn(&mut Cursor<'_>, &mut M) + Send + Sync>;

/// Run `work` at every position of `vector`.
pub fn execute(vector: &dyn MathVector, mode: Mode<'_>, work: Work) -> VectorResult<()> {
    match mode {
        Mode::Serial => {
            let size = vector.element_size();
            let mut cursor = Cursor::new(vector, 0);
            for position in 0..size {
                cursor.update(position);
                work(&mut cursor);
            }
            Ok(())
        }
        Mode::Parallel(session) => fan_out(
            session,
            vector.share(),
            Arc::new(move |_worker: WorkerId, cursor: &mut Cursor<'_>| -> VectorResult<()> {
                work(cursor);
                Ok(())
            }),
        ),
    }
}

/// Run `work` at every position of `vector`, folding into `message`.
///
/// Serial mode accumulates into `message` directly. Parallel mode gives
/// each worker a private copy detached from `message` and attaches the
/// copies after the join. If the join fails, private copies are discarded
/// and `message` is left untouched.
pub fn execute_reduction<M: Message>(
    vector: &dyn MathVector,
    mode: Mode<'_>,
    message: &mut M,
    work: ReductionWork<M>,
) -> VectorResult<()> {
    match mode {
        Mode::Serial => {
            let size = vector.element_size();
            let mut cursor = Cursor::new(vector, 0);
            for position in 0..size {
                cursor.update(position);
                work(&mut cursor, message);
            }
            Ok(())
        }
        Mode::Parallel(session) => {
            let registry = session.take_registry::<M>()?;
            let template = Arc::new(message.detach());

            let task_registry = Arc::clone(&registry);
            let joined = fan_out(
                session,
                vector.share(),
                Arc::new(move |worker: WorkerId, cursor: &mut Cursor<'_>| -> VectorResult<()> {
                    let mut private = task_registry.detach(worker, &template)?;
                    work(cursor, &mut *private);
                    Ok(())
                }),
            );

            match joined {
                Ok(()) => {
                    let merged = registry.attach(message);
                    trace!(merged, "reduction attached");
                }
                Err(_) => registry.reset(),
            }
            session.restore_registry(registry);
            joined
        }
    }
}

/// Submit one keyed task per position and join on a completion counter.
fn fan_out<F>(session: &Session, vector: Arc<dyn MathVector>, body: Arc<F>) -> VectorResult<()>
where
    F: Fn(WorkerId, &mut Cursor<'_>) -> VectorResult<()> + Send + Sync + 'static,
{
    let size = vector.element_size();
    let counter = Arc::new(CompletionCounter::new());
    let dispatcher = session.dispatcher();

    trace!(positions = size, workers = dispatcher.worker_count(), "parallel dispatch");

    let mut submitted = 0;
    let mut rejected = None;
    for position in 0..size {
        let counter = Arc::clone(&counter);
        let vector = Arc::clone(&vector);
        let body = Arc::clone(&body);
        let task: KeyedTask = Box::new(move |worker| {
            let permit = counter.permit();
            let outcome = catch_unwind(AssertUnwindSafe(|| {
                let mut cursor = Cursor::new(&*vector, position);
                body(worker, &mut cursor)
            }));
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(error)) => permit.fail(error),
                Err(payload) => {
                    let message = panic_message(&*payload);
                    warn!(position, worker = worker.index(), %message, "vector task panicked");
                    permit.fail(VectorError::TaskFailed {
                        key: position,
                        message,
                    });
                }
            }
        });

        match dispatcher.run_keyed_task(position, task) {
            Ok(()) => submitted += 1,
            Err(error) => {
                rejected = Some(error);
                break;
            }
        }
    }

    // Join what was accepted before reporting a rejected submission, so no
    // task is still running when the caller sees the error.
    let joined = counter.acquire(submitted);
    match rejected {
        Some(error) => Err(error.into()),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::SumMessage;
    use crate::vector::DenseVector;
    use vecta_rts_pool::{Dispatcher, DispatchError, InlineDispatcher, WorkerPool};

    /// Accepts a fixed number of tasks, then reports shutdown.
    struct Flaky {
        inner: InlineDispatcher,
        accept: usize,
        accepted: parking_lot::Mutex<usize>,
    }

    impl Dispatcher for Flaky {
        fn worker_count(&self) -> usize {
            self.inner.worker_count()
        }

        fn run_on_every_worker(
            &self,
            job: vecta_rts_pool::BroadcastJob,
        ) -> Result<(), DispatchError> {
            self.inner.run_on_every_worker(job)
        }

        fn run_keyed_task(&self, key: usize, task: KeyedTask) -> Result<(), DispatchError> {
            let mut accepted = self.accepted.lock();
            if *accepted == self.accept {
                return Err(DispatchError::ShutDown);
            }
            *accepted += 1;
            self.inner.run_keyed_task(key, task)
        }
    }

    #[test]
    fn test_serial_and_parallel_sum_agree() {
        let vector = DenseVector::from_fn(1000, |i| (i % 17) as f32);
        let pool = Arc::new(WorkerPool::new(4).unwrap());
        let session = Session::new(pool);

        let work: ReductionWork<SumMessage> =
            Arc::new(|cursor: &mut Cursor<'_>, sum: &mut SumMessage| sum.accumulate(cursor.value()));

        let mut serial = SumMessage::new(false);
        execute_reduction(&vector, Mode::Serial, &mut serial, Arc::clone(&work)).unwrap();
        let mut parallel = SumMessage::new(false);
        execute_reduction(&vector, session.parallel(), &mut parallel, work).unwrap();

        assert!((serial.value() - parallel.value()).abs() < 1e-3);
    }

    #[test]
    fn test_panicking_task_reported_and_joined() {
        let vector = DenseVector::zeros(16);
        let session = Session::new(Arc::new(WorkerPool::new(3).unwrap()));

        let err = execute(
            &vector,
            session.parallel(),
            Arc::new(|cursor: &mut Cursor<'_>| {
                if cursor.position() == 7 {
                    panic!("bad position");
                }
                cursor.set_value(1.0);
            }),
        )
        .unwrap_err();

        assert_eq!(
            err,
            VectorError::TaskFailed {
                key: 7,
                message: "bad position".to_string()
            }
        );
        // Every other position still ran before the error surfaced.
        assert_eq!(vector.get_sum(false), 15.0);
    }

    #[test]
    fn test_failed_reduction_leaves_message_untouched() {
        let vector = DenseVector::from_fn(8, |_| 1.0);
        let session = Session::new(Arc::new(InlineDispatcher::new(2)));
        let mut sum = SumMessage::new(false);
        sum.accumulate(100.0);

        let result = execute_reduction(
            &vector,
            session.parallel(),
            &mut sum,
            Arc::new(|cursor: &mut Cursor<'_>, sum: &mut SumMessage| {
                sum.accumulate(cursor.value());
                if cursor.position() == 3 {
                    panic!("stop");
                }
            }),
        );

        assert!(result.is_err());
        assert_eq!(sum.value(), 100.0);
    }

    #[test]
    fn test_rejected_submission_joins_accepted_tasks() {
        let vector = DenseVector::zeros(10);
        let session = Session::new(Arc::new(Flaky {
            inner: InlineDispatcher::new(2),
            accept: 4,
            accepted: parking_lot::Mutex::new(0),
        }));

        let err = execute(
            &vector,
            session.parallel(),
            Arc::new(|cursor: &mut Cursor<'_>| cursor.set_value(1.0)),
        )
        .unwrap_err();

        assert_eq!(err, VectorError::Dispatch(DispatchError::ShutDown));
        assert_eq!(vector.get_sum(false), 4.0);
    }
}
