//! Shared backing storage for vectors and matrices.
//!
//! A [`SharedBuffer`] is a fixed-length run of `f32` cells behind an
//! `Arc`. Cloning the buffer clones the handle, not the cells, so several
//! views (dense strides, sparse windows, matrix rows and columns) can
//! address the same values. A write through any view is visible to every
//! other view sharing the slot.
//!
//! Cells are stored as `AtomicU32` bit patterns. `get` and `set` are single
//! atomic accesses; `scale` and `shift` are atomic read-modify-write loops,
//! so concurrent updates of one slot are never lost.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Reference-counted `f32` cells with interior mutability.
#[derive(Clone)]
pub struct SharedBuffer {
    cells: Arc<[AtomicU32]>,
}

impl SharedBuffer {
    /// Create a buffer of `len` zeros.
    #[must_use]
    pub fn zeros(len: usize) -> Self {
        Self::filled(len, 0.0)
    }

    /// Create a buffer with every cell set to `value`.
    #[must_use]
    pub fn filled(len: usize, value: f32) -> Self {
        let bits = value.to_bits();
        Self {
            cells: (0..len).map(|_| AtomicU32::new(bits)).collect(),
        }
    }

    /// Create a buffer holding a copy of `values`.
    #[must_use]
    pub fn from_slice(values: &[f32]) -> Self {
        Self {
            cells: values.iter().map(|v| AtomicU32::new(v.to_bits())).collect(),
        }
    }

    /// Number of cells.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Check if the buffer has no cells.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Read one cell.
    #[inline]
    #[must_use]
    pub fn get(&self, slot: usize) -> f32 {
        f32::from_bits(self.cells[slot].load(Ordering::Acquire))
    }

    /// Overwrite one cell.
    #[inline]
    pub fn set(&self, slot: usize, value: f32) {
        self.cells[slot].store(value.to_bits(), Ordering::Release);
    }

    /// Multiply one cell by `factor`.
    #[inline]
    pub fn scale(&self, slot: usize, factor: f32) {
        self.update(slot, |value| value * factor);
    }

    /// Add `delta` to one cell.
    #[inline]
    pub fn shift(&self, slot: usize, delta: f32) {
        self.update(slot, |value| value + delta);
    }

    fn update(&self, slot: usize, f: impl Fn(f32) -> f32) {
        let mut current = self.cells[slot].load(Ordering::Acquire);
        loop {
            let next = f(f32::from_bits(current)).to_bits();
            match self.cells[slot].compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return,
                Err(actual) => current = actual,
            }
        }
    }

    /// Copy every cell out.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.len()).map(|slot| self.get(slot)).collect()
    }

    /// Check whether two handles address the same cells.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cells, &other.cells)
    }
}

impl From<Vec<f32>> for SharedBuffer {
    fn from(values: Vec<f32>) -> Self {
        Self::from_slice(&values)
    }
}

impl From<&[f32]> for SharedBuffer {
    fn from(values: &[f32]) -> Self {
        Self::from_slice(values)
    }
}

impl fmt::Debug for SharedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedBuffer({:?})", self.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clone_aliases_cells() {
        let a = SharedBuffer::from_slice(&[1.0, 2.0, 3.0]);
        let b = a.clone();
        b.set(1, 5.0);
        assert_eq!(a.get(1), 5.0);
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn test_scale_and_shift() {
        let buffer = SharedBuffer::filled(2, 2.0);
        buffer.scale(0, 3.0);
        buffer.shift(1, -0.5);
        assert_eq!(buffer.to_vec(), vec![6.0, 1.5]);
    }

    #[test]
    fn test_concurrent_shifts_of_one_slot() {
        let buffer = SharedBuffer::zeros(1);
        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..1000 {
                        buffer.shift(0, 1.0);
                    }
                });
            }
        });
        assert_eq!(buffer.get(0), 8000.0);
    }

    #[test]
    fn test_independent_buffers() {
        let a = SharedBuffer::zeros(3);
        let b = SharedBuffer::zeros(3);
        assert!(!a.ptr_eq(&b));
        assert_eq!(a.len(), 3);
        assert!(SharedBuffer::zeros(0).is_empty());
    }
}
