//! Sparse windowed vectors.

use std::fmt;
use std::sync::Arc;

use super::{check_indexes, MathVector};
use crate::error::{VectorError, VectorResult};
use crate::storage::SharedBuffer;

/// A `[begin, end)` window over shared point, index and value arrays.
///
/// Position `p` resolves to slot `points[begin + p]`; `indexes[slot]` is
/// the visible index and `values[slot]` the value. Windows carved from one
/// structure share all three arrays, so a write through one window is
/// visible in every window addressing the same slot.
#[derive(Clone)]
pub struct SparseVector {
    points: Arc<[usize]>,
    indexes: Arc<[usize]>,
    values: SharedBuffer,
    capacity: usize,
    begin: usize,
    end: usize,
}

impl SparseVector {
    /// Create a standalone sparse vector from `(index, value)` columns.
    pub fn new(capacity: usize, indexes: Vec<usize>, values: Vec<f32>) -> VectorResult<Self> {
        if indexes.len() != values.len() {
            return Err(VectorError::LengthMismatch {
                indexes: indexes.len(),
                values: values.len(),
            });
        }
        let size = indexes.len();
        Self::window(
            capacity,
            (0..size).collect(),
            indexes.into(),
            values.into(),
            0,
            size,
        )
    }

    /// Create a window over shared arrays.
    ///
    /// Validates the window bounds, that every point addresses a slot of
    /// both arrays, and that the window's indexes are strictly increasing
    /// and below `capacity`.
    pub fn window(
        capacity: usize,
        points: Arc<[usize]>,
        indexes: Arc<[usize]>,
        values: SharedBuffer,
        begin: usize,
        end: usize,
    ) -> VectorResult<Self> {
        if begin > end || end > points.len() {
            return Err(VectorError::InvalidWindow {
                begin,
                end,
                available: points.len(),
            });
        }
        let size = end - begin;
        if size > capacity {
            return Err(VectorError::SizeExceedsCapacity { size, capacity });
        }
        let length = indexes.len().min(values.len());
        for (position, &point) in points[begin..end].iter().enumerate() {
            if point >= length {
                return Err(VectorError::PointOutOfBounds {
                    position,
                    point,
                    length,
                });
            }
        }
        check_indexes(points[begin..end].iter().map(|&point| indexes[point]), capacity)?;

        Ok(Self::window_unchecked(
            capacity, points, indexes, values, begin, end,
        ))
    }

    /// Create a window whose invariants the caller already holds.
    pub(crate) fn window_unchecked(
        capacity: usize,
        points: Arc<[usize]>,
        indexes: Arc<[usize]>,
        values: SharedBuffer,
        begin: usize,
        end: usize,
    ) -> Self {
        debug_assert!(begin <= end && end <= points.len());
        Self {
            points,
            indexes,
            values,
            capacity,
            begin,
            end,
        }
    }

    /// Window start within the point array.
    #[must_use]
    pub fn begin(&self) -> usize {
        self.begin
    }

    /// Window end within the point array.
    #[must_use]
    pub fn end(&self) -> usize {
        self.end
    }

    /// The shared value buffer.
    #[must_use]
    pub fn values(&self) -> &SharedBuffer {
        &self.values
    }

    /// Check whether two windows share their value buffer.
    #[must_use]
    pub fn shares_storage(&self, other: &SparseVector) -> bool {
        self.values.ptr_eq(&other.values)
    }

    #[inline]
    fn slot(&self, position: usize) -> usize {
        assert!(
            position < self.end - self.begin,
            "position {position} out of range for sparse window of size {}",
            self.end - self.begin
        );
        self.points[self.begin + position]
    }
}

impl MathVector for SparseVector {
    fn capacity(&self) -> usize {
        self.capacity
    }

    fn element_size(&self) -> usize {
        self.end - self.begin
    }

    fn is_constant(&self) -> bool {
        false
    }

    #[inline]
    fn get_index(&self, position: usize) -> usize {
        self.indexes[self.slot(position)]
    }

    #[inline]
    fn get_value(&self, position: usize) -> f32 {
        self.values.get(self.slot(position))
    }

    #[inline]
    fn set_value(&self, position: usize, value: f32) {
        self.values.set(self.slot(position), value);
    }

    #[inline]
    fn scale_value(&self, position: usize, value: f32) {
        self.values.scale(self.slot(position), value);
    }

    #[inline]
    fn shift_value(&self, position: usize, value: f32) {
        self.values.shift(self.slot(position), value);
    }

    fn share(&self) -> Arc<dyn MathVector> {
        Arc::new(self.clone())
    }
}

impl fmt::Debug for SparseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseVector")
            .field("capacity", &self.capacity)
            .field("begin", &self.begin)
            .field("end", &self.end)
            .field("entries", &self.to_entries())
            .finish()
    }
}
