//! The vector contract and its default algebra.
//!
//! # Overview
//!
//! [`MathVector`] unifies three storage layouts:
//!
//! | Layout | Type | `is_constant` | Indexes |
//! |--------|------|---------------|---------|
//! | Dense strided | [`DenseVector`] | yes | `position` |
//! | Sparse window | [`SparseVector`] | no | shared index array |
//! | Array owned | [`ArrayVector`] | no | private index table |
//!
//! Positions address materialized entries (`0..element_size`); indexes are
//! the externally visible ids (`0..capacity`). Within one vector the index
//! sequence is strictly increasing.
//!
//! All mutators take `&self`: values live in a [`SharedBuffer`] and are
//! written through it, so every view sharing the buffer sees the write.
//!
//! # Algebra
//!
//! `add_vector`, `subtract_vector`, `multiply_vector`, `divide_vector`
//! and `copy_vector` pair entries of the receiver with entries of the
//! operand:
//!
//! - both constant: pair by position, element sizes must match;
//! - otherwise: pair by index with a merge join, capacities must match.
//!   Receiver entries whose index the operand lacks are left untouched.
//!
//! [`SharedBuffer`]: crate::storage::SharedBuffer

mod array;
mod dense;
mod sparse;

pub use array::ArrayVector;
pub use dense::DenseVector;
pub use sparse::SparseVector;

use std::cmp::Ordering;
use std::sync::Arc;

use crate::cursor::Cursor;
use crate::dispatch::{execute, execute_reduction, Work};
use crate::error::{VectorError, VectorResult};
use crate::matrix::MathMatrix;
use crate::message::Message;
use crate::session::Mode;

/// Per-position callback used by [`MathVector::iterate`].
pub type Accessor = Work;

/// A 1-D vector of `f32` values addressed by position.
///
/// Accessors panic on positions outside `0..element_size`, like slice
/// indexing.
pub trait MathVector: Send + Sync {
    /// Size of the index space.
    fn capacity(&self) -> usize;

    /// Number of materialized entries.
    fn element_size(&self) -> usize;

    /// Entries holding a concrete value.
    fn known_size(&self) -> usize {
        self.element_size()
    }

    /// `capacity - known_size`.
    fn unknown_size(&self) -> usize {
        self.capacity() - self.known_size()
    }

    /// True when `get_index(p) == p` and every index holds a value.
    fn is_constant(&self) -> bool;

    /// Externally visible index at `position`.
    fn get_index(&self, position: usize) -> usize;

    /// Value at `position`.
    fn get_value(&self, position: usize) -> f32;

    /// Overwrite the value at `position`.
    fn set_value(&self, position: usize, value: f32);

    /// Multiply the value at `position` by `value`.
    fn scale_value(&self, position: usize, value: f32);

    /// Add `value` to the value at `position`.
    fn shift_value(&self, position: usize, value: f32);

    /// An owned handle addressing the same storage.
    ///
    /// Parallel execution hands this handle to worker tasks.
    fn share(&self) -> Arc<dyn MathVector>;

    /// Set every value to `value`.
    fn set_values(&self, value: f32, mode: Mode<'_>) -> VectorResult<()>
    where
        Self: Sized,
    {
        execute(
            self,
            mode,
            Arc::new(move |cursor: &mut Cursor<'_>| cursor.set_value(value)),
        )
    }

    /// Multiply every value by `value`.
    fn scale_values(&self, value: f32, mode: Mode<'_>) -> VectorResult<()>
    where
        Self: Sized,
    {
        execute(
            self,
            mode,
            Arc::new(move |cursor: &mut Cursor<'_>| cursor.scale_value(value)),
        )
    }

    /// Add `value` to every value.
    fn shift_values(&self, value: f32, mode: Mode<'_>) -> VectorResult<()>
    where
        Self: Sized,
    {
        execute(
            self,
            mode,
            Arc::new(move |cursor: &mut Cursor<'_>| cursor.shift_value(value)),
        )
    }

    /// Sum of the materialized values, optionally of their absolute values.
    fn get_sum(&self, absolute: bool) -> f32 {
        (0..self.element_size())
            .map(|position| {
                let value = self.get_value(position);
                if absolute {
                    value.abs()
                } else {
                    value
                }
            })
            .sum()
    }

    /// Snapshot of `(index, value)` pairs in position order.
    fn to_entries(&self) -> Vec<(usize, f32)> {
        (0..self.element_size())
            .map(|position| (self.get_index(position), self.get_value(position)))
            .collect()
    }

    /// Run every accessor, in order, at every position.
    fn iterate(&self, mode: Mode<'_>, accessors: Vec<Accessor>) -> VectorResult<()>
    where
        Self: Sized,
    {
        let accessors: Arc<[Accessor]> = accessors.into();
        execute(
            self,
            mode,
            Arc::new(move |cursor: &mut Cursor<'_>| {
                for accessor in accessors.iter() {
                    accessor(cursor);
                }
            }),
        )
    }

    /// Replace every value with `mapper(message, index, value)`.
    fn map_values<M, F>(&self, mapper: F, message: &mut M, mode: Mode<'_>) -> VectorResult<()>
    where
        Self: Sized,
        M: Message,
        F: Fn(&mut M, usize, f32) -> f32 + Send + Sync + 'static,
    {
        execute_reduction(
            self,
            mode,
            message,
            Arc::new(move |cursor: &mut Cursor<'_>, message: &mut M| {
                let value = mapper(message, cursor.index(), cursor.value());
                cursor.set_value(value);
            }),
        )
    }

    /// Feed every `(index, value)` to `collector` without changing values.
    fn collect_values<M, F>(&self, collector: F, message: &mut M, mode: Mode<'_>) -> VectorResult<()>
    where
        Self: Sized,
        M: Message,
        F: Fn(&mut M, usize, f32) + Send + Sync + 'static,
    {
        execute_reduction(
            self,
            mode,
            message,
            Arc::new(move |cursor: &mut Cursor<'_>, message: &mut M| {
                collector(message, cursor.index(), cursor.value());
            }),
        )
    }

    /// `self += vector`.
    fn add_vector(&self, vector: &dyn MathVector) -> VectorResult<()> {
        combine(self, vector, Operation::Add)
    }

    /// `self -= vector`.
    fn subtract_vector(&self, vector: &dyn MathVector) -> VectorResult<()> {
        combine(self, vector, Operation::Subtract)
    }

    /// `self *= vector`, elementwise.
    fn multiply_vector(&self, vector: &dyn MathVector) -> VectorResult<()> {
        combine(self, vector, Operation::Multiply)
    }

    /// `self /= vector`, elementwise.
    fn divide_vector(&self, vector: &dyn MathVector) -> VectorResult<()> {
        combine(self, vector, Operation::Divide)
    }

    /// `self = vector` on the paired entries.
    fn copy_vector(&self, vector: &dyn MathVector) -> VectorResult<()> {
        combine(self, vector, Operation::Copy)
    }

    /// `self = matrix * vector` (or `matrixᵀ * vector`) on the indexes
    /// `self` materializes.
    fn dot_product(
        &self,
        matrix: &dyn MathMatrix,
        transpose: bool,
        vector: &dyn MathVector,
        mode: Mode<'_>,
    ) -> VectorResult<()>
    where
        Self: Sized,
    {
        product(self, matrix, transpose, vector, mode, "dot_product", false)
    }

    /// `self += matrix * vector` (or `matrixᵀ * vector`).
    fn accumulate_product(
        &self,
        matrix: &dyn MathMatrix,
        transpose: bool,
        vector: &dyn MathVector,
        mode: Mode<'_>,
    ) -> VectorResult<()>
    where
        Self: Sized,
    {
        product(self, matrix, transpose, vector, mode, "accumulate_product", true)
    }
}

/// Check that `indexes` is strictly increasing and below `capacity`.
pub(crate) fn check_indexes<I>(indexes: I, capacity: usize) -> VectorResult<()>
where
    I: IntoIterator<Item = usize>,
{
    let mut previous: Option<usize> = None;
    for (position, index) in indexes.into_iter().enumerate() {
        if let Some(previous) = previous {
            if index <= previous {
                return Err(VectorError::NonIncreasingIndex {
                    position,
                    previous,
                    index,
                });
            }
        }
        if index >= capacity {
            return Err(VectorError::IndexOutOfCapacity { index, capacity });
        }
        previous = Some(index);
    }
    Ok(())
}

// ============================================================
// Algebra
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Add,
    Subtract,
    Multiply,
    Divide,
    Copy,
}

impl Operation {
    fn name(self) -> &'static str {
        match self {
            Operation::Add => "add_vector",
            Operation::Subtract => "subtract_vector",
            Operation::Multiply => "multiply_vector",
            Operation::Divide => "divide_vector",
            Operation::Copy => "copy_vector",
        }
    }

    #[inline]
    fn apply(self, left: f32, right: f32) -> f32 {
        match self {
            Operation::Add => left + right,
            Operation::Subtract => left - right,
            Operation::Multiply => left * right,
            Operation::Divide => left / right,
            Operation::Copy => right,
        }
    }
}

fn combine<V>(this: &V, other: &dyn MathVector, operation: Operation) -> VectorResult<()>
where
    V: MathVector + ?Sized,
{
    if this.is_constant() && other.is_constant() {
        let size = this.element_size();
        if other.element_size() != size {
            return Err(VectorError::ShapeMismatch {
                operation: operation.name(),
                expected: size,
                actual: other.element_size(),
            });
        }
        for position in 0..size {
            let value = operation.apply(this.get_value(position), other.get_value(position));
            this.set_value(position, value);
        }
        return Ok(());
    }

    if other.capacity() != this.capacity() {
        return Err(VectorError::ShapeMismatch {
            operation: operation.name(),
            expected: this.capacity(),
            actual: other.capacity(),
        });
    }

    let (this_size, other_size) = (this.element_size(), other.element_size());
    let (mut left, mut right) = (0, 0);
    while left < this_size && right < other_size {
        match this.get_index(left).cmp(&other.get_index(right)) {
            Ordering::Less => left += 1,
            Ordering::Greater => right += 1,
            Ordering::Equal => {
                let value = operation.apply(this.get_value(left), other.get_value(right));
                this.set_value(left, value);
                left += 1;
                right += 1;
            }
        }
    }
    Ok(())
}

// ============================================================
// Matrix products
// ============================================================

fn product<V>(
    this: &V,
    matrix: &dyn MathMatrix,
    transpose: bool,
    vector: &dyn MathVector,
    mode: Mode<'_>,
    operation: &'static str,
    accumulate: bool,
) -> VectorResult<()>
where
    V: MathVector,
{
    let (rows, columns) = if transpose {
        (matrix.column_size(), matrix.row_size())
    } else {
        (matrix.row_size(), matrix.column_size())
    };
    if this.capacity() != rows {
        return Err(VectorError::ShapeMismatch {
            operation,
            expected: rows,
            actual: this.capacity(),
        });
    }
    if vector.capacity() != columns {
        return Err(VectorError::ShapeMismatch {
            operation,
            expected: columns,
            actual: vector.capacity(),
        });
    }

    let matrix = matrix.share();
    let vector = vector.share();
    execute(
        this,
        mode,
        Arc::new(move |cursor: &mut Cursor<'_>| {
            let row = cursor.index();
            let mut sum = 0.0;
            for position in 0..vector.element_size() {
                let column = vector.get_index(position);
                let weight = if transpose {
                    matrix.get_value(column, row)
                } else {
                    matrix.get_value(row, column)
                };
                sum += weight * vector.get_value(position);
            }
            if accumulate {
                cursor.shift_value(sum);
            } else {
                cursor.set_value(sum);
            }
        }),
    )
}
