//! Vecta Numeric
//!
//! Dense, sparse and array-owned vectors behind one contract, with serial
//! and parallel bulk operations.
//!
//! # Architecture
//!
//! ```text
//! cursor -> vector layouts -> reduction protocol -> dispatch -> algebra
//! ```
//!
//! - [`storage`]: shared `f32` buffers every view writes through
//! - [`vector`]: the [`MathVector`] contract, its three layouts and the
//!   default algebra
//! - [`matrix`]: dense and sparse matrices with row/column vector views
//! - [`message`] and [`reduction`]: per-worker accumulators merged after a
//!   barrier join
//! - [`session`] and [`dispatch`]: the serial/parallel switch every bulk
//!   operation routes through
//! - [`monitor`]: observers of array vector re-indexing
//!
//! # Parallel execution
//!
//! Worker threads belong to a [`vecta_rts_pool::Dispatcher`]. This crate
//! never spawns threads; it submits one keyed task per position and blocks
//! on a completion counter until every task has finished.
//!
//! ```ignore
//! use std::sync::Arc;
//! use vecta_numeric::{DenseVector, MathVector, Session, SumMessage};
//! use vecta_rts_pool::WorkerPool;
//!
//! let session = Session::new(Arc::new(WorkerPool::new(4)?));
//! let vector = DenseVector::from_fn(1000, |i| i as f32);
//! let mut sum = SumMessage::new(false);
//! vector.collect_values(|sum: &mut SumMessage, _, v| sum.accumulate(v), &mut sum, session.parallel())?;
//! ```

#![warn(missing_docs)]

pub mod cursor;
pub mod dispatch;
pub mod error;
pub mod matrix;
pub mod message;
pub mod monitor;
pub mod reduction;
pub mod session;
pub mod storage;
pub mod vector;

pub use cursor::Cursor;
pub use error::{VectorError, VectorResult};
pub use matrix::{DenseMatrix, MathMatrix, SparseMatrix};
pub use message::{MaximumMessage, MeanMessage, Message, MinimumMessage, NormMessage, SumMessage};
pub use monitor::{MonitorKey, SizeChange, VectorMonitor};
pub use session::{Mode, Session};
pub use storage::SharedBuffer;
pub use vector::{Accessor, ArrayVector, DenseVector, MathVector, SparseVector};

