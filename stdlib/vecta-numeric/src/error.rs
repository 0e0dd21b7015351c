//! Error types for vector construction, algebra and parallel execution.

use thiserror::Error;
use vecta_rts_pool::DispatchError;

/// Result alias used throughout the crate.
pub type VectorResult<T> = Result<T, VectorError>;

/// Errors raised by vector operations.
///
/// Construction and re-indexing errors are reported before any state is
/// changed. Join errors are reported after every dispatched task has
/// finished, so no task still touches the vector when the caller sees them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VectorError {
    /// An index sequence is not strictly increasing.
    #[error("indices must be strictly increasing: index {index} at position {position} follows {previous}")]
    NonIncreasingIndex {
        /// Position of the offending index.
        position: usize,
        /// Index before it.
        previous: usize,
        /// Offending index.
        index: usize,
    },

    /// An index does not fit in the vector's capacity.
    #[error("index {index} is out of capacity {capacity}")]
    IndexOutOfCapacity {
        /// Offending index.
        index: usize,
        /// Vector capacity.
        capacity: usize,
    },

    /// Paired arrays have different lengths.
    #[error("length mismatch: {indexes} indexes but {values} values")]
    LengthMismatch {
        /// Number of indexes.
        indexes: usize,
        /// Number of values.
        values: usize,
    },

    /// More elements than the capacity can address.
    #[error("element size {size} exceeds capacity {capacity}")]
    SizeExceedsCapacity {
        /// Number of elements.
        size: usize,
        /// Vector capacity.
        capacity: usize,
    },

    /// A window does not lie inside its backing arrays.
    #[error("window [{begin}, {end}) is invalid for {available} points")]
    InvalidWindow {
        /// Window start.
        begin: usize,
        /// Window end.
        end: usize,
        /// Length of the point array.
        available: usize,
    },

    /// A point refers to a slot outside the index or value array.
    #[error("point {point} at position {position} is outside backing arrays of length {length}")]
    PointOutOfBounds {
        /// Logical position within the window.
        position: usize,
        /// Offending slot.
        point: usize,
        /// Shorter of the index and value array lengths.
        length: usize,
    },

    /// A strided view runs past the end of its buffer.
    #[error("strided view (offset {offset}, stride {stride}, length {length}) overruns buffer of length {buffer}")]
    StrideOverrun {
        /// First slot.
        offset: usize,
        /// Distance between slots.
        stride: usize,
        /// Number of positions.
        length: usize,
        /// Buffer length.
        buffer: usize,
    },

    /// Operands do not have compatible shapes.
    #[error("shape mismatch in {operation}: expected {expected}, got {actual}")]
    ShapeMismatch {
        /// Operation name.
        operation: &'static str,
        /// Size required by the receiver.
        expected: usize,
        /// Size supplied by the operand.
        actual: usize,
    },

    /// A task reported a worker id outside the registered range.
    #[error("worker {worker} is outside the {registered} registered slots")]
    UnknownWorker {
        /// Reported worker.
        worker: usize,
        /// Number of registered slots.
        registered: usize,
    },

    /// Not every worker answered the registration broadcast.
    #[error("message registration incomplete: worker {missing} did not register")]
    RegistrationIncomplete {
        /// First worker without a slot.
        missing: usize,
    },

    /// A dispatched task failed before completing its position.
    #[error("task for position {key} failed: {message}")]
    TaskFailed {
        /// Position the task was keyed by.
        key: usize,
        /// Panic message.
        message: String,
    },

    /// The dispatcher rejected work.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = VectorError::NonIncreasingIndex {
            position: 2,
            previous: 5,
            index: 5,
        };
        assert_eq!(
            err.to_string(),
            "indices must be strictly increasing: index 5 at position 2 follows 5"
        );

        let err = VectorError::ShapeMismatch {
            operation: "multiply_vector",
            expected: 3,
            actual: 4,
        };
        assert!(err.to_string().contains("multiply_vector"));
    }

    #[test]
    fn test_dispatch_error_converts() {
        let err: VectorError = DispatchError::ShutDown.into();
        assert_eq!(err.to_string(), "worker pool is shut down");
    }
}
