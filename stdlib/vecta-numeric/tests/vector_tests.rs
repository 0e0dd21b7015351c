//! Vector layout tests
//!
//! Tests for the three vector layouts through the shared contract:
//! - Size characteristics (capacity, element, known, unknown)
//! - Window aliasing across matrix rows and columns
//! - Array re-indexing and monitor notifications
//! - Default algebra across layouts

use std::sync::Arc;

use parking_lot::Mutex;
use vecta_numeric::{
    ArrayVector, DenseMatrix, DenseVector, MathVector, Mode, SharedBuffer, SizeChange,
    SparseMatrix, SparseVector, VectorError,
};

// ============================================================
// Sparse Window Tests
// ============================================================

mod sparse_tests {
    use super::*;

    #[test]
    fn test_sparse_scenario() {
        let vector = SparseVector::new(10, vec![2, 5, 7], vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(vector.element_size(), 3);
        assert_eq!(vector.get_sum(false), 6.0);
        assert_eq!(vector.get_index(1), 5);
        assert_eq!(vector.capacity(), 10);
        assert_eq!(vector.known_size(), 3);
        assert_eq!(vector.unknown_size(), 7);
    }

    #[test]
    fn test_disjoint_windows_over_one_structure() {
        let points: Arc<[usize]> = (0..6).collect();
        let indexes: Arc<[usize]> = vec![0, 2, 4, 1, 3, 5].into();
        let values = SharedBuffer::from_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

        let even =
            SparseVector::window(6, points.clone(), indexes.clone(), values.clone(), 0, 3).unwrap();
        let odd = SparseVector::window(6, points, indexes, values.clone(), 3, 6).unwrap();

        assert_eq!(even.get_sum(false), 6.0);
        assert_eq!(odd.get_sum(false), 15.0);

        even.add_vector(&odd).unwrap(); // no shared index: untouched
        assert_eq!(even.get_sum(false), 6.0);

        odd.scale_values(2.0, Mode::Serial).unwrap();
        assert_eq!(values.to_vec(), vec![1.0, 2.0, 3.0, 8.0, 10.0, 12.0]);
    }
}

// ============================================================
// Array Vector Tests
// ============================================================

mod array_tests {
    use super::*;

    #[test]
    fn test_modify_indexes_scenario() {
        let mut vector = ArrayVector::new(10, vec![0, 3, 4], vec![1.0, 2.0, 3.0]).unwrap();
        let changes = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&changes);
        vector.attach_monitor(Arc::new(move |change: &SizeChange| sink.lock().push(*change)));

        vector
            .modify_indexes(|_: &mut (), _, _| 1.0, &mut (), &[1, 2])
            .unwrap();

        assert_eq!(vector.element_size(), 2);
        assert_eq!(vector.get_index(0), 1);
        assert_eq!(vector.get_index(1), 2);

        let changes = changes.lock();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].old_element_size, 3);
        assert_eq!(changes[0].new_element_size, 2);
        assert_eq!(changes[0].old_unknown_size, 7);
        assert_eq!(changes[0].new_unknown_size, 8);
    }

    #[test]
    fn test_every_monitor_notified_once() {
        let mut vector = ArrayVector::new(5, vec![0], vec![1.0]).unwrap();
        let counts: Vec<Arc<Mutex<usize>>> = (0..3).map(|_| Arc::new(Mutex::new(0))).collect();
        for count in &counts {
            let count = Arc::clone(count);
            vector.attach_monitor(Arc::new(move |_: &SizeChange| *count.lock() += 1));
        }

        vector
            .modify_indexes(|_: &mut (), _, value| value, &mut (), &[0, 1, 2, 3, 4])
            .unwrap();

        assert!(counts.iter().all(|count| *count.lock() == 1));
        assert_eq!(vector.unknown_size(), 0);
    }

    #[test]
    fn test_modify_indexes_rejects_bad_sequences() {
        let mut vector = ArrayVector::new(10, vec![0, 3, 4], vec![1.0, 2.0, 3.0]).unwrap();

        for bad in [&[2, 2][..], &[5, 1][..], &[1, 10][..]] {
            let err = vector
                .modify_indexes(|_: &mut (), _, value| value, &mut (), bad)
                .unwrap_err();
            assert!(matches!(
                err,
                VectorError::NonIncreasingIndex { .. } | VectorError::IndexOutOfCapacity { .. }
            ));
        }
        assert_eq!(vector.indexes(), &[0, 3, 4]);
        assert_eq!(vector.get_sum(false), 6.0);
    }

    #[test]
    fn test_message_threads_through_modify_indexes() {
        let mut vector = ArrayVector::new(8, vec![1, 2], vec![5.0, 6.0]).unwrap();
        let kept = vector.clone();
        let mut fresh = 0_usize;

        vector
            .modify_indexes(
                |fresh: &mut usize, index, value| {
                    if index == 2 {
                        value
                    } else {
                        *fresh += 1;
                        -1.0
                    }
                },
                &mut fresh,
                &[0, 2],
            )
            .unwrap();
        assert_eq!(fresh, 1);
        assert_eq!(vector.to_entries(), vec![(0, -1.0), (2, 6.0)]);
        assert_eq!(kept.to_entries(), vec![(1, 5.0), (2, 6.0)]);
    }
}

// ============================================================
// Matrix View Tests
// ============================================================

mod matrix_view_tests {
    use super::*;

    #[test]
    fn test_sparse_row_and_column_products() {
        // [2 0]
        // [1 3]
        let matrix = SparseMatrix::from_triples(2, 2, &[(0, 0, 2.0), (1, 0, 1.0), (1, 1, 3.0)])
            .unwrap();
        let input = DenseVector::from_values(&[1.0, 2.0]);
        let output = DenseVector::zeros(2);

        output
            .dot_product(&matrix, false, &input, Mode::Serial)
            .unwrap();
        assert_eq!(output.to_vec(), vec![2.0, 7.0]);

        output
            .dot_product(&matrix, true, &input, Mode::Serial)
            .unwrap();
        assert_eq!(output.to_vec(), vec![4.0, 6.0]);
    }

    #[test]
    fn test_row_view_feeds_array_copy() {
        let matrix = SparseMatrix::from_triples(2, 4, &[(1, 3, 1.5), (1, 0, 0.5)]).unwrap();
        let row = matrix.row_vector(1).unwrap();
        let copy = ArrayVector::from_sparse_with(&row, |index, value| value * index as f32);
        assert_eq!(copy.to_entries(), vec![(0, 0.0), (3, 4.5)]);
        assert_eq!(copy.capacity(), 4);
    }

    #[test]
    fn test_dense_column_algebra_updates_matrix() {
        let matrix = DenseMatrix::zeros(3, 2);
        let column = matrix.column_vector(1).unwrap();
        column.copy_vector(&DenseVector::from_values(&[1.0, 2.0, 3.0])).unwrap();
        assert_eq!(matrix.row_vector(2).unwrap().to_vec(), vec![0.0, 3.0]);
    }
}
