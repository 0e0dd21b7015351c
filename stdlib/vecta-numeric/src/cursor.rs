//! Reusable scalar view over one position of a vector.

use std::fmt;

use crate::vector::MathVector;

/// A mutable view over one `(index, value)` pair of a vector.
///
/// A cursor is repositioned with [`Cursor::update`] instead of being
/// rebuilt per element. Writes go straight into the vector's backing
/// storage.
pub struct Cursor<'a> {
    vector: &'a dyn MathVector,
    position: usize,
}

impl<'a> Cursor<'a> {
    /// Create a cursor at `position`.
    pub fn new(vector: &'a dyn MathVector, position: usize) -> Self {
        Self { vector, position }
    }

    /// Move the cursor to `position`.
    #[inline]
    pub fn update(&mut self, position: usize) -> &mut Self {
        self.position = position;
        self
    }

    /// Logical position within the vector.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Externally visible index at the current position.
    #[inline]
    #[must_use]
    pub fn index(&self) -> usize {
        self.vector.get_index(self.position)
    }

    /// Value at the current position.
    #[inline]
    #[must_use]
    pub fn value(&self) -> f32 {
        self.vector.get_value(self.position)
    }

    /// Overwrite the value.
    #[inline]
    pub fn set_value(&mut self, value: f32) {
        self.vector.set_value(self.position, value);
    }

    /// Multiply the value by `value`.
    #[inline]
    pub fn scale_value(&mut self, value: f32) {
        self.vector.scale_value(self.position, value);
    }

    /// Add `value` to the value.
    #[inline]
    pub fn shift_value(&mut self, value: f32) {
        self.vector.shift_value(self.position, value);
    }
}

impl fmt::Debug for Cursor<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("position", &self.position)
            .field("index", &self.index())
            .field("value", &self.value())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::SparseVector;

    #[test]
    fn test_cursor_reads_and_writes_through() {
        let vector = SparseVector::new(10, vec![2, 5, 7], vec![1.0, 2.0, 3.0]).unwrap();
        let mut cursor = Cursor::new(&vector, 0);
        assert_eq!(cursor.index(), 2);

        cursor.update(1);
        assert_eq!(cursor.index(), 5);
        assert_eq!(cursor.value(), 2.0);

        cursor.scale_value(3.0);
        cursor.shift_value(1.0);
        assert_eq!(vector.get_value(1), 7.0);

        cursor.update(2).set_value(-1.0);
        assert_eq!(vector.get_value(2), -1.0);
    }
}
