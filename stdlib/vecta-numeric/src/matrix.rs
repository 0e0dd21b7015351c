//! Matrices exposing their rows and columns as vectors.
//!
//! # Overview
//!
//! [`MathMatrix`] is the call shape vector products read through. The two
//! implementations expose rows and columns as vector views over the
//! matrix's own storage, so writing through a view updates the matrix:
//!
//! - [`DenseMatrix`]: row-major buffer; rows are stride-1 [`DenseVector`]s
//!   and columns are stride-`columns` [`DenseVector`]s.
//! - [`SparseMatrix`]: CSR layout plus a column permutation over the same
//!   value slots; rows and columns are [`SparseVector`] windows.

use std::fmt;
use std::sync::Arc;

use crate::error::{VectorError, VectorResult};
use crate::storage::SharedBuffer;
use crate::vector::{DenseVector, SparseVector};

/// Read access to a 2-D matrix of `f32` values.
pub trait MathMatrix: Send + Sync {
    /// Number of rows.
    fn row_size(&self) -> usize;

    /// Number of columns.
    fn column_size(&self) -> usize;

    /// Value at `(row, column)`. Panics when out of range.
    fn get_value(&self, row: usize, column: usize) -> f32;

    /// An owned handle addressing the same storage.
    fn share(&self) -> Arc<dyn MathMatrix>;
}

fn check_bound(index: usize, bound: usize) -> VectorResult<()> {
    if index >= bound {
        return Err(VectorError::IndexOutOfCapacity {
            index,
            capacity: bound,
        });
    }
    Ok(())
}

// ============================================================
// Dense
// ============================================================

/// A row-major dense matrix.
#[derive(Clone)]
pub struct DenseMatrix {
    rows: usize,
    columns: usize,
    buffer: SharedBuffer,
}

impl DenseMatrix {
    /// Create a `rows x columns` matrix of zeros.
    ///
    /// # Panics
    ///
    /// Panics if `rows * columns` overflows `usize`.
    #[must_use]
    pub fn zeros(rows: usize, columns: usize) -> Self {
        let Some(len) = rows.checked_mul(columns) else {
            panic!("{rows}x{columns} matrix is too large");
        };
        Self {
            rows,
            columns,
            buffer: SharedBuffer::zeros(len),
        }
    }

    /// Create a matrix from row-major `values`.
    ///
    /// A shape whose cell count overflows `usize` is reported as a
    /// mismatch against `usize::MAX`.
    pub fn from_rows(rows: usize, columns: usize, values: &[f32]) -> VectorResult<Self> {
        let expected = rows.checked_mul(columns);
        if expected != Some(values.len()) {
            return Err(VectorError::ShapeMismatch {
                operation: "from_rows",
                expected: expected.unwrap_or(usize::MAX),
                actual: values.len(),
            });
        }
        Ok(Self {
            rows,
            columns,
            buffer: SharedBuffer::from_slice(values),
        })
    }

    /// Overwrite the value at `(row, column)`.
    pub fn set_value(&self, row: usize, column: usize, value: f32) {
        self.buffer.set(self.slot(row, column), value);
    }

    /// Row `row` as a view.
    pub fn row_vector(&self, row: usize) -> VectorResult<DenseVector> {
        check_bound(row, self.rows)?;
        DenseVector::new(self.buffer.clone(), row * self.columns, 1, self.columns)
    }

    /// Column `column` as a view.
    pub fn column_vector(&self, column: usize) -> VectorResult<DenseVector> {
        check_bound(column, self.columns)?;
        DenseVector::new(self.buffer.clone(), column, self.columns, self.rows)
    }

    #[inline]
    fn slot(&self, row: usize, column: usize) -> usize {
        assert!(
            row < self.rows && column < self.columns,
            "({row}, {column}) out of range for {}x{} matrix",
            self.rows,
            self.columns
        );
        row * self.columns + column
    }
}

impl MathMatrix for DenseMatrix {
    fn row_size(&self) -> usize {
        self.rows
    }

    fn column_size(&self) -> usize {
        self.columns
    }

    fn get_value(&self, row: usize, column: usize) -> f32 {
        self.buffer.get(self.slot(row, column))
    }

    fn share(&self) -> Arc<dyn MathMatrix> {
        Arc::new(self.clone())
    }
}

impl fmt::Debug for DenseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseMatrix")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .finish()
    }
}

// ============================================================
// Sparse
// ============================================================

/// A sparse matrix with row and column access.
///
/// Memory layout (`nnz` stored entries, sorted by row then column):
/// - `row_points`: `[rows + 1]` offsets of each row's slots
/// - `slot_columns`, `slot_rows`: `[nnz]` coordinates of each slot
/// - `values`: `[nnz]` shared values
/// - `column_permutation`: `[nnz]` slots sorted by column then row
/// - `column_points`: `[columns + 1]` offsets into `column_permutation`
#[derive(Clone)]
pub struct SparseMatrix {
    rows: usize,
    columns: usize,
    row_points: Arc<[usize]>,
    column_points: Arc<[usize]>,
    slot_columns: Arc<[usize]>,
    slot_rows: Arc<[usize]>,
    identity: Arc<[usize]>,
    column_permutation: Arc<[usize]>,
    values: SharedBuffer,
}

impl SparseMatrix {
    /// Build from `(row, column, value)` triples in any order.
    ///
    /// Repeated coordinates are summed.
    pub fn from_triples(
        rows: usize,
        columns: usize,
        triples: &[(usize, usize, f32)],
    ) -> VectorResult<Self> {
        for &(row, column, _) in triples {
            check_bound(row, rows)?;
            check_bound(column, columns)?;
        }

        let mut sorted = triples.to_vec();
        sorted.sort_by_key(|&(row, column, _)| (row, column));

        let mut entries: Vec<(usize, usize, f32)> = Vec::with_capacity(sorted.len());
        for (row, column, value) in sorted {
            match entries.last_mut() {
                Some(last) if last.0 == row && last.1 == column => last.2 += value,
                _ => entries.push((row, column, value)),
            }
        }

        let nnz = entries.len();
        let mut row_points = vec![0; rows + 1];
        let mut column_points = vec![0; columns + 1];
        for &(row, column, _) in &entries {
            row_points[row + 1] += 1;
            column_points[column + 1] += 1;
        }
        for i in 0..rows {
            row_points[i + 1] += row_points[i];
        }
        for i in 0..columns {
            column_points[i + 1] += column_points[i];
        }

        let mut column_permutation: Vec<usize> = (0..nnz).collect();
        column_permutation.sort_by_key(|&slot| (entries[slot].1, entries[slot].0));

        Ok(Self {
            rows,
            columns,
            row_points: row_points.into(),
            column_points: column_points.into(),
            slot_columns: entries.iter().map(|entry| entry.1).collect(),
            slot_rows: entries.iter().map(|entry| entry.0).collect(),
            identity: (0..nnz).collect(),
            column_permutation: column_permutation.into(),
            values: entries
                .iter()
                .map(|entry| entry.2)
                .collect::<Vec<_>>()
                .into(),
        })
    }

    /// Number of stored entries.
    #[must_use]
    pub fn nnz(&self) -> usize {
        self.identity.len()
    }

    /// Row `row` as a window over the matrix storage.
    pub fn row_vector(&self, row: usize) -> VectorResult<SparseVector> {
        check_bound(row, self.rows)?;
        Ok(SparseVector::window_unchecked(
            self.columns,
            Arc::clone(&self.identity),
            Arc::clone(&self.slot_columns),
            self.values.clone(),
            self.row_points[row],
            self.row_points[row + 1],
        ))
    }

    /// Column `column` as a window over the matrix storage.
    pub fn column_vector(&self, column: usize) -> VectorResult<SparseVector> {
        check_bound(column, self.columns)?;
        Ok(SparseVector::window_unchecked(
            self.rows,
            Arc::clone(&self.column_permutation),
            Arc::clone(&self.slot_rows),
            self.values.clone(),
            self.column_points[column],
            self.column_points[column + 1],
        ))
    }
}

impl MathMatrix for SparseMatrix {
    fn row_size(&self) -> usize {
        self.rows
    }

    fn column_size(&self) -> usize {
        self.columns
    }

    fn get_value(&self, row: usize, column: usize) -> f32 {
        assert!(
            row < self.rows && column < self.columns,
            "({row}, {column}) out of range for {}x{} matrix",
            self.rows,
            self.columns
        );
        let (begin, end) = (self.row_points[row], self.row_points[row + 1]);
        match self.slot_columns[begin..end].binary_search(&column) {
            Ok(offset) => self.values.get(begin + offset),
            Err(_) => 0.0,
        }
    }

    fn share(&self) -> Arc<dyn MathMatrix> {
        Arc::new(self.clone())
    }
}

impl fmt::Debug for SparseMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrix")
            .field("rows", &self.rows)
            .field("columns", &self.columns)
            .field("nnz", &self.nnz())
            .finish()
    }
}
