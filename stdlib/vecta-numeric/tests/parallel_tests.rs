//! Parallel execution tests
//!
//! Runs bulk operations on a threaded pool and on the inline dispatcher
//! and checks they agree with serial execution.

use std::sync::Arc;

use vecta_numeric::{
    Accessor, ArrayVector, Cursor, DenseMatrix, DenseVector, MathVector, MaximumMessage,
    MeanMessage, Mode, Session, SparseMatrix, SparseVector, SumMessage, VectorError,
};
use vecta_rts_pool::{InlineDispatcher, PoolConfig, WorkerPool};

fn pool(workers: usize) -> Session {
    let config = PoolConfig {
        num_workers: workers,
        ..PoolConfig::default()
    };
    Session::new(Arc::new(WorkerPool::with_config(config).unwrap()))
}

#[test]
fn test_parallel_sum_over_thousand_positions() {
    let session = pool(4);
    let vector = DenseVector::from_fn(1000, |i| (i % 10) as f32 * 0.5);

    let mut serial = SumMessage::new(false);
    vector
        .collect_values(
            |sum: &mut SumMessage, _, value| sum.accumulate(value),
            &mut serial,
            Mode::Serial,
        )
        .unwrap();

    let mut parallel = SumMessage::new(false);
    vector
        .collect_values(
            |sum: &mut SumMessage, _, value| sum.accumulate(value),
            &mut parallel,
            session.parallel(),
        )
        .unwrap();

    assert!((serial.value() - parallel.value()).abs() < 1e-2);
    assert!((parallel.value() - 2250.0).abs() < 1e-2);
}

#[test]
fn test_map_values_matches_serial() {
    let session = pool(3);
    let serial = DenseVector::from_fn(257, |i| (i % 17) as f32);
    let parallel = DenseVector::from_values(&serial.to_vec());

    let mapper = |sum: &mut SumMessage, index: usize, value: f32| {
        sum.accumulate(value);
        value * 2.0 + index as f32
    };

    let mut serial_sum = SumMessage::new(false);
    serial
        .map_values(mapper, &mut serial_sum, Mode::Serial)
        .unwrap();
    let mut parallel_sum = SumMessage::new(false);
    parallel
        .map_values(mapper, &mut parallel_sum, session.parallel())
        .unwrap();

    assert_eq!(serial, parallel);
    // Small integer values: every accumulation order is exact.
    assert_eq!(serial_sum.value(), parallel_sum.value());
}

#[test]
fn test_session_reuses_registry_across_operations() {
    let dispatcher = Arc::new(InlineDispatcher::new(4));
    let session = Session::new(dispatcher.clone());
    let vector = SparseVector::new(100, (0..50).map(|i| i * 2).collect(), vec![1.0; 50]).unwrap();

    for _ in 0..3 {
        let mut max = MaximumMessage::new(false);
        vector
            .collect_values(
                |max: &mut MaximumMessage, index, _| max.accumulate(index as f32),
                &mut max,
                session.parallel(),
            )
            .unwrap();
        assert_eq!(max.value(), Some(98.0));
    }

    assert_eq!(dispatcher.stats().broadcasts, 1);
    assert_eq!(dispatcher.stats().tasks_submitted, 150);
}

#[test]
fn test_mean_over_array_vector() {
    let session = pool(2);
    let vector =
        ArrayVector::from_fn(64, (0..64).step_by(4).collect(), |index| index as f32).unwrap();
    let mut mean = MeanMessage::new();
    vector
        .collect_values(
            |mean: &mut MeanMessage, _, value| mean.accumulate(value),
            &mut mean,
            session.parallel(),
        )
        .unwrap();
    assert_eq!(mean.count(), 16);
    assert_eq!(mean.value(), Some(30.0));
}

#[test]
fn test_parallel_iterate_and_bulk_updates() {
    let session = pool(4);
    let vector = DenseVector::zeros(128);
    vector
        .iterate(
            session.parallel(),
            vec![Arc::new(|cursor: &mut Cursor<'_>| {
                let index = cursor.index() as f32;
                cursor.set_value(index);
            }) as Accessor],
        )
        .unwrap();
    assert_eq!(vector.get_sum(false), (0..128).sum::<usize>() as f32);
}

fn check_bulk_setters<V: MathVector>(make: impl Fn() -> V) {
    let dispatcher = Arc::new(InlineDispatcher::new(3));
    let session = Session::new(dispatcher.clone());
    let serial = make();
    let parallel = make();
    let size = parallel.element_size();

    serial.scale_values(3.0, Mode::Serial).unwrap();
    parallel.scale_values(3.0, session.parallel()).unwrap();
    assert_eq!(serial.to_entries(), parallel.to_entries());
    assert_eq!(dispatcher.stats().tasks_submitted, size as u64);

    serial.shift_values(-1.5, Mode::Serial).unwrap();
    parallel.shift_values(-1.5, session.parallel()).unwrap();
    assert_eq!(serial.to_entries(), parallel.to_entries());
    assert_eq!(dispatcher.stats().tasks_submitted, 2 * size as u64);

    serial.set_values(0.25, Mode::Serial).unwrap();
    parallel.set_values(0.25, session.parallel()).unwrap();
    assert_eq!(serial.to_entries(), parallel.to_entries());
    assert_eq!(dispatcher.stats().tasks_submitted, 3 * size as u64);
    assert_eq!(parallel.get_sum(false), 0.25 * size as f32);
}

#[test]
fn test_bulk_setters_run_one_task_per_position() {
    check_bulk_setters(|| DenseVector::from_fn(40, |i| i as f32));
    check_bulk_setters(|| {
        let indexes = (0..10).map(|i| i * 3).collect();
        SparseVector::new(30, indexes, (0..10).map(|i| i as f32).collect()).unwrap()
    });
    check_bulk_setters(|| {
        ArrayVector::from_fn(50, vec![1, 7, 20, 49], |index| index as f32).unwrap()
    });
}

#[test]
fn test_bulk_setters_on_threaded_pool() {
    let session = pool(4);
    let vector = DenseVector::zeros(500);
    vector.shift_values(2.0, session.parallel()).unwrap();
    vector.scale_values(1.5, session.parallel()).unwrap();
    assert_eq!(vector.to_vec(), vec![3.0; 500]);
}

#[test]
fn test_parallel_dot_product_matches_serial() {
    let session = pool(4);
    let dense = DenseMatrix::zeros(16, 8);
    let mut triples = Vec::new();
    for row in 0..16 {
        for column in 0..8 {
            if (row + column) % 3 == 0 {
                let value = (row * 8 + column) as f32 * 0.5;
                dense.set_value(row, column, value);
                triples.push((row, column, value));
            }
        }
    }
    let sparse = SparseMatrix::from_triples(16, 8, &triples).unwrap();
    let input = DenseVector::from_fn(8, |i| i as f32 - 3.0);

    let serial = DenseVector::zeros(16);
    serial
        .dot_product(&dense, false, &input, Mode::Serial)
        .unwrap();
    let parallel = DenseVector::zeros(16);
    parallel
        .dot_product(&sparse, false, &input, session.parallel())
        .unwrap();
    assert_eq!(serial, parallel);

    let back_input = DenseVector::from_fn(16, |i| (i % 4) as f32);
    let serial_back = DenseVector::zeros(8);
    serial_back
        .dot_product(&sparse, true, &back_input, Mode::Serial)
        .unwrap();
    let parallel_back = DenseVector::zeros(8);
    parallel_back
        .dot_product(&dense, true, &back_input, session.parallel())
        .unwrap();
    assert_eq!(serial_back, parallel_back);

    parallel_back
        .accumulate_product(&dense, true, &back_input, session.parallel())
        .unwrap();
    serial_back.scale_values(2.0, Mode::Serial).unwrap();
    assert_eq!(serial_back, parallel_back);
}

#[test]
fn test_panicking_mapper_surfaces_one_failure() {
    let session = pool(4);
    let vector = DenseVector::zeros(64);
    let mut sum = SumMessage::new(false);

    let err = vector
        .map_values(
            |_: &mut SumMessage, index, value| {
                assert!(index != 40, "position 40 rejected");
                value + 1.0
            },
            &mut sum,
            session.parallel(),
        )
        .unwrap_err();

    assert!(matches!(err, VectorError::TaskFailed { key: 40, .. }));
    assert_eq!(vector.get_sum(false), 63.0);

    // The session is still usable afterwards.
    vector
        .map_values(|_: &mut SumMessage, _, _| 0.0, &mut sum, session.parallel())
        .unwrap();
    assert_eq!(vector.get_sum(false), 0.0);
}

#[test]
fn test_concurrent_reductions_on_one_session() {
    let session = Arc::new(pool(4));
    let handles: Vec<_> = (0..4)
        .map(|round| {
            let session = Arc::clone(&session);
            std::thread::spawn(move || {
                let vector = DenseVector::from_fn(200, move |_| round as f32);
                let mut sum = SumMessage::new(false);
                vector
                    .collect_values(
                        |sum: &mut SumMessage, _, value| sum.accumulate(value),
                        &mut sum,
                        session.parallel(),
                    )
                    .unwrap();
                sum.value()
            })
        })
        .collect();

    let totals: Vec<f32> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(totals, vec![0.0, 200.0, 400.0, 600.0]);
}
