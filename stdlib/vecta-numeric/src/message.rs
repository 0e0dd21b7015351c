//! Reduction messages.
//!
//! A message is the accumulator a bulk operation folds into. Parallel
//! execution never touches the caller's message from a worker: each worker
//! gets a private copy from [`Message::detach`] and the copies are folded
//! back with [`Message::attach`] after the barrier.
//!
//! Implementations must satisfy two laws:
//!
//! - **Identity**: `m.attach(m.detach())` leaves `m` unchanged.
//! - **Associativity/commutativity**: attaching partial results in any
//!   grouping and order yields the same state.

/// An accumulator usable in parallel reductions.
pub trait Message: Sized + Send + Sync + 'static {
    /// Produce an independent accumulator in identity state.
    ///
    /// Settings (such as whether absolute values are summed) carry over;
    /// accumulated state does not.
    #[must_use]
    fn detach(&self) -> Self;

    /// Merge `other`'s accumulated state into `self`.
    fn attach(&mut self, other: Self);
}

/// No accumulation.
impl Message for () {
    fn detach(&self) -> Self {}

    fn attach(&mut self, _other: Self) {}
}

// ============================================================
// Stock messages
// ============================================================

/// Running sum, optionally of absolute values.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SumMessage {
    absolute: bool,
    value: f32,
}

impl SumMessage {
    /// Create an empty sum.
    #[must_use]
    pub fn new(absolute: bool) -> Self {
        Self {
            absolute,
            value: 0.0,
        }
    }

    /// Add one value.
    pub fn accumulate(&mut self, value: f32) {
        self.value += if self.absolute { value.abs() } else { value };
    }

    /// Current sum.
    #[must_use]
    pub fn value(&self) -> f32 {
        self.value
    }
}

impl Message for SumMessage {
    fn detach(&self) -> Self {
        Self::new(self.absolute)
    }

    fn attach(&mut self, other: Self) {
        self.value += other.value;
    }
}

/// Running maximum, optionally of absolute values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaximumMessage {
    absolute: bool,
    value: f32,
}

impl MaximumMessage {
    /// Create an empty maximum (negative infinity).
    #[must_use]
    pub fn new(absolute: bool) -> Self {
        Self {
            absolute,
            value: f32::NEG_INFINITY,
        }
    }

    /// Observe one value.
    pub fn accumulate(&mut self, value: f32) {
        let value = if self.absolute { value.abs() } else { value };
        self.value = self.value.max(value);
    }

    /// Current maximum, `None` if nothing was observed.
    #[must_use]
    pub fn value(&self) -> Option<f32> {
        (self.value != f32::NEG_INFINITY).then_some(self.value)
    }
}

impl Message for MaximumMessage {
    fn detach(&self) -> Self {
        Self::new(self.absolute)
    }

    fn attach(&mut self, other: Self) {
        self.value = self.value.max(other.value);
    }
}

/// Running minimum, optionally of absolute values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinimumMessage {
    absolute: bool,
    value: f32,
}

impl MinimumMessage {
    /// Create an empty minimum (positive infinity).
    #[must_use]
    pub fn new(absolute: bool) -> Self {
        Self {
            absolute,
            value: f32::INFINITY,
        }
    }

    /// Observe one value.
    pub fn accumulate(&mut self, value: f32) {
        let value = if self.absolute { value.abs() } else { value };
        self.value = self.value.min(value);
    }

    /// Current minimum, `None` if nothing was observed.
    #[must_use]
    pub fn value(&self) -> Option<f32> {
        (self.value != f32::INFINITY).then_some(self.value)
    }
}

impl Message for MinimumMessage {
    fn detach(&self) -> Self {
        Self::new(self.absolute)
    }

    fn attach(&mut self, other: Self) {
        self.value = self.value.min(other.value);
    }
}

/// Running mean as (sum, count).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MeanMessage {
    sum: f64,
    count: usize,
}

impl MeanMessage {
    /// Create an empty mean.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe one value.
    pub fn accumulate(&mut self, value: f32) {
        self.sum += f64::from(value);
        self.count += 1;
    }

    /// Number of observed values.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count
    }

    /// Mean of observed values, `None` if nothing was observed.
    #[must_use]
    pub fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| (self.sum / self.count as f64) as f32)
    }
}

impl Message for MeanMessage {
    fn detach(&self) -> Self {
        Self::new()
    }

    fn attach(&mut self, other: Self) {
        self.sum += other.sum;
        self.count += other.count;
    }
}

/// Running L-p norm, kept as the sum of `|v|^p`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormMessage {
    power: i32,
    value: f32,
}

impl NormMessage {
    /// Create an empty norm of order `power` (clamped to at least 1).
    #[must_use]
    pub fn new(power: i32) -> Self {
        Self {
            power: power.max(1),
            value: 0.0,
        }
    }

    /// Observe one value.
    pub fn accumulate(&mut self, value: f32) {
        self.value += value.abs().powi(self.power);
    }

    /// Sum of `|v|^p`.
    #[must_use]
    pub fn power_sum(&self) -> f32 {
        self.value
    }

    /// The norm itself.
    #[must_use]
    pub fn value(&self) -> f32 {
        if self.power == 1 {
            self.value
        } else {
            self.value.powf(1.0 / self.power as f32)
        }
    }
}

impl Message for NormMessage {
    fn detach(&self) -> Self {
        Self::new(self.power)
    }

    fn attach(&mut self, other: Self) {
        self.value += other.value;
    }
}
