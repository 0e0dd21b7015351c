//! Array-owned vectors with replaceable index tables.

use std::fmt;
use std::sync::Arc;
use tracing::trace;

use super::{check_indexes, MathVector, SparseVector};
use crate::error::{VectorError, VectorResult};
use crate::monitor::{MonitorKey, MonitorRegistry, SizeChange, VectorMonitor};
use crate::storage::SharedBuffer;

/// One immutable index table and the values stored against it.
#[derive(Clone)]
struct ArrayTable {
    capacity: usize,
    indexes: Arc<[usize]>,
    values: SharedBuffer,
}

impl ArrayTable {
    #[inline]
    fn check(&self, position: usize) -> usize {
        assert!(
            position < self.indexes.len(),
            "position {position} out of range for array vector of size {}",
            self.indexes.len()
        );
        position
    }
}

impl MathVector for ArrayTable {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn element_size(&self) -> usize {
        self.indexes.len()
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn get_index(&self, position: usize) -> usize {
        self.indexes[self.check(position)]
    }

    fn get_value(&self, position: usize) -> f32 {
        self.values.get(self.check(position))
    }

    fn set_value(&self, position: usize, value: f32) {
        self.values.set(self.check(position), value);
    }

    fn scale_value(&self, position: usize, value: f32) {
        self.values.scale(self.check(position), value);
    }

    fn shift_value(&self, position: usize, value: f32) {
        self.values.shift(self.check(position), value);
    }

    fn share(&self) -> Arc<dyn MathVector> {
        Arc::new(self.clone())
    }
}

/// A vector owning a strictly increasing index table and its values.
///
/// [`ArrayVector::modify_indexes`] is the only way to change the set of
/// materialized indexes. It swaps in a new table and notifies every
/// attached monitor. Handles obtained from [`MathVector::share`] before
/// the swap keep addressing the old table.
pub struct ArrayVector {
    table: Arc<ArrayTable>,
    monitors: MonitorRegistry,
}

impl ArrayVector {
    /// Create a vector from paired `indexes` and `values`.
    pub fn new(capacity: usize, indexes: Vec<usize>, values: Vec<f32>) -> VectorResult<Self> {
        if indexes.len() != values.len() {
            return Err(VectorError::LengthMismatch {
                indexes: indexes.len(),
                values: values.len(),
            });
        }
        check_indexes(indexes.iter().copied(), capacity)?;
        Ok(Self::from_table(ArrayTable {
            capacity,
            indexes: indexes.into(),
            values: values.into(),
        }))
    }

    /// Create a vector whose value at each index is `generator(index)`.
    pub fn from_fn<F>(capacity: usize, indexes: Vec<usize>, mut generator: F) -> VectorResult<Self>
    where
        F: FnMut(usize) -> f32,
    {
        let values = indexes.iter().map(|&index| generator(index)).collect();
        Self::new(capacity, indexes, values)
    }

    /// Copy the entries of a sparse window.
    #[must_use]
    pub fn from_sparse(vector: &SparseVector) -> Self {
        Self::from_sparse_with(vector, |_, value| value)
    }

    /// Copy the entries of a sparse window, remapping each value through
    /// `mapper(index, value)`.
    pub fn from_sparse_with<F>(vector: &SparseVector, mut mapper: F) -> Self
    where
        F: FnMut(usize, f32) -> f32,
    {
        let (indexes, values): (Vec<usize>, Vec<f32>) = vector
            .to_entries()
            .into_iter()
            .map(|(index, value)| (index, mapper(index, value)))
            .unzip();
        // A valid window already has strictly increasing indexes below its
        // capacity.
        Self::from_table(ArrayTable {
            capacity: vector.capacity(),
            indexes: indexes.into(),
            values: values.into(),
        })
    }

    fn from_table(table: ArrayTable) -> Self {
        Self {
            table: Arc::new(table),
            monitors: MonitorRegistry::new(),
        }
    }

    /// The current index table.
    #[must_use]
    pub fn indexes(&self) -> &[usize] {
        &self.table.indexes
    }

    /// Register a monitor for re-indexing notifications.
    pub fn attach_monitor(&self, monitor: Arc<dyn VectorMonitor>) -> MonitorKey {
        self.monitors.attach(monitor)
    }

    /// Unregister a monitor. Returns false for unknown keys.
    pub fn detach_monitor(&self, key: MonitorKey) -> bool {
        self.monitors.detach(key)
    }

    /// Number of attached monitors.
    #[must_use]
    pub fn monitor_count(&self) -> usize {
        self.monitors.len()
    }

    /// Replace the index table with `indexes`.
    ///
    /// The value at each new index is `mapper(message, index, old)`, where
    /// `old` is the value previously stored at that index, or `0.0` if the
    /// index was not materialized. `indexes` is validated before anything
    /// changes; on success every monitor receives one [`SizeChange`].
    pub fn modify_indexes<M, F>(
        &mut self,
        mut mapper: F,
        message: &mut M,
        indexes: &[usize],
    ) -> VectorResult<()>
    where
        F: FnMut(&mut M, usize, f32) -> f32,
    {
        let capacity = self.table.capacity;
        check_indexes(indexes.iter().copied(), capacity)?;

        let old = &self.table;
        let mut cursor = 0;
        let values: Vec<f32> = indexes
            .iter()
            .map(|&index| {
                while cursor < old.indexes.len() && old.indexes[cursor] < index {
                    cursor += 1;
                }
                let base = if cursor < old.indexes.len() && old.indexes[cursor] == index {
                    old.values.get(cursor)
                } else {
                    0.0
                };
                mapper(message, index, base)
            })
            .collect();

        let change = SizeChange {
            old_element_size: self.element_size(),
            new_element_size: indexes.len(),
            old_known_size: self.known_size(),
            new_known_size: indexes.len(),
            old_unknown_size: self.unknown_size(),
            new_unknown_size: capacity - indexes.len(),
        };

        self.table = Arc::new(ArrayTable {
            capacity,
            indexes: indexes.into(),
            values: values.into(),
        });
        trace!(
            old_size = change.old_element_size,
            new_size = change.new_element_size,
            monitors = self.monitors.len(),
            "index table replaced"
        );
        self.monitors.notify(&change);
        Ok(())
    }
}

impl MathVector for ArrayVector {
    fn capacity(&self) -> usize {
        self.table.capacity()
    }

    fn element_size(&self) -> usize {
        self.table.element_size()
    }

    fn is_constant(&self) -> bool {
        false
    }

    fn get_index(&self, position: usize) -> usize {
        self.table.get_index(position)
    }

    fn get_value(&self, position: usize) -> f32 {
        self.table.get_value(position)
    }

    fn set_value(&self, position: usize, value: f32) {
        self.table.set_value(position, value);
    }

    fn scale_value(&self, position: usize, value: f32) {
        self.table.scale_value(position, value);
    }

    fn shift_value(&self, position: usize, value: f32) {
        self.table.shift_value(position, value);
    }

    fn share(&self) -> Arc<dyn MathVector> {
        self.table.clone()
    }
}

/// Deep copy of the entries. Monitors are not carried over.
impl Clone for ArrayVector {
    fn clone(&self) -> Self {
        Self::from_table(ArrayTable {
            capacity: self.table.capacity,
            indexes: Arc::clone(&self.table.indexes),
            values: self.table.values.to_vec().into(),
        })
    }
}

impl fmt::Debug for ArrayVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayVector")
            .field("capacity", &self.capacity())
            .field("entries", &self.to_entries())
            .field("monitors", &self.monitors.len())
            .finish()
    }
}
