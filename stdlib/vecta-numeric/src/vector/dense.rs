//! Dense strided vectors.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::MathVector;
use crate::error::{VectorError, VectorResult};
use crate::storage::SharedBuffer;

/// A strided view into a shared buffer.
///
/// Position `p` lives in slot `offset + p * stride`. Every index in
/// `0..length` holds a value, so the vector is constant and
/// `capacity == element_size == length`.
#[derive(Clone)]
pub struct DenseVector {
    buffer: SharedBuffer,
    offset: usize,
    stride: usize,
    length: usize,
}

impl DenseVector {
    /// Create a view over `buffer`.
    ///
    /// Fails if the last addressed slot is outside the buffer, or if a zero
    /// stride would map several positions to one slot.
    pub fn new(
        buffer: SharedBuffer,
        offset: usize,
        stride: usize,
        length: usize,
    ) -> VectorResult<Self> {
        let overrun = || VectorError::StrideOverrun {
            offset,
            stride,
            length,
            buffer: buffer.len(),
        };
        if stride == 0 && length > 1 {
            return Err(overrun());
        }
        if length > 0 {
            let last = (length - 1)
                .checked_mul(stride)
                .and_then(|span| span.checked_add(offset))
                .ok_or_else(overrun)?;
            if last >= buffer.len() {
                return Err(overrun());
            }
        }
        Ok(Self {
            buffer,
            offset,
            stride,
            length,
        })
    }

    /// Create a vector of `length` zeros over a fresh buffer.
    #[must_use]
    pub fn zeros(length: usize) -> Self {
        Self::contiguous(SharedBuffer::zeros(length))
    }

    /// Create a vector holding a copy of `values`.
    #[must_use]
    pub fn from_values(values: &[f32]) -> Self {
        Self::contiguous(SharedBuffer::from_slice(values))
    }

    /// Create a vector of `length` values produced by `generator(index)`.
    pub fn from_fn<F>(length: usize, generator: F) -> Self
    where
        F: FnMut(usize) -> f32,
    {
        let values: Vec<f32> = (0..length).map(generator).collect();
        Self::contiguous(values.into())
    }

    fn contiguous(buffer: SharedBuffer) -> Self {
        let length = buffer.len();
        Self {
            buffer,
            offset: 0,
            stride: 1,
            length,
        }
    }

    /// The backing buffer.
    #[must_use]
    pub fn buffer(&self) -> &SharedBuffer {
        &self.buffer
    }

    /// First slot.
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Distance between consecutive slots.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Copy the values out in position order.
    #[must_use]
    pub fn to_vec(&self) -> Vec<f32> {
        (0..self.length).map(|position| self.get_value(position)).collect()
    }

    #[inline]
    fn slot(&self, position: usize) -> usize {
        assert!(
            position < self.length,
            "position {position} out of range for dense vector of length {}",
            self.length
        );
        self.offset + position * self.stride
    }
}

impl MathVector for DenseVector {
    fn capacity(&self) -> usize {
        self.length
    }

    fn element_size(&self) -> usize {
        self.length
    }

    fn is_constant(&self) -> bool {
        true
    }

    #[inline]
    fn get_index(&self, position: usize) -> usize {
        self.slot(position);
        position
    }

    #[inline]
    fn get_value(&self, position: usize) -> f32 {
        self.buffer.get(self.slot(position))
    }

    #[inline]
    fn set_value(&self, position: usize, value: f32) {
        self.buffer.set(self.slot(position), value);
    }

    #[inline]
    fn scale_value(&self, position: usize, value: f32) {
        self.buffer.scale(self.slot(position), value);
    }

    #[inline]
    fn shift_value(&self, position: usize, value: f32) {
        self.buffer.shift(self.slot(position), value);
    }

    fn share(&self) -> Arc<dyn MathVector> {
        Arc::new(self.clone())
    }
}

/// Equal when the materialized values are equal bit for bit.
impl PartialEq for DenseVector {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length
            && (0..self.length)
                .all(|p| self.get_value(p).to_bits() == other.get_value(p).to_bits())
    }
}

impl Eq for DenseVector {}

impl Hash for DenseVector {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.length.hash(state);
        for position in 0..self.length {
            self.get_value(position).to_bits().hash(state);
        }
    }
}

impl fmt::Debug for DenseVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseVector")
            .field("offset", &self.offset)
            .field("stride", &self.stride)
            .field("values", &self.to_vec())
            .finish()
    }
}
