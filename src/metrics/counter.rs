//! Monotonic counters.

use crate::combiner::{AddTo, InverseOp, MinusFrom, ReduceOp};
use crate::metrics::reducer::{reducer_wrapper, Numeric, Reducer};
use crate::sampler::ReducerSampler;
use crate::variable::{Exposable, VariableKind};
use std::sync::Arc;

/// Sum of values added from any thread, reported as a counter.
///
/// ```
/// use tally::Counter;
///
/// let requests: Counter = Counter::new();
/// requests.increment();
/// requests.increment_by(4);
/// assert_eq!(requests.get_value(), 5);
/// ```
pub struct Counter<T = i64>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    reducer: Reducer<T, AddTo, MinusFrom>,
}

reducer_wrapper!(Counter, Numeric, AddTo, MinusFrom);

impl<T> Counter<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    /// Unexposed counter at zero.
    pub fn new() -> Self {
        Self {
            reducer: Reducer::with_kind(T::ZERO, AddTo, MinusFrom, VariableKind::Counter),
        }
    }

    /// Counter exposed as `name`. A failed exposure is logged, or panics
    /// when `variable.crash_on_expose_fail` is set.
    pub fn with_name(name: &str, help: &str) -> Self {
        let counter = Self::new();
        // the error is already logged by expose
        let _ = counter.expose(name, help);
        counter
    }

    /// Add `value` on the calling thread.
    #[inline]
    pub fn add(&self, value: T) {
        self.reducer.update(value);
    }

    /// Same as [`Counter::add`].
    #[inline]
    pub fn increment_by(&self, value: T) {
        self.reducer.update(value);
    }

    /// Sum over every thread.
    pub fn get_value(&self) -> T {
        self.reducer.get_value()
    }

    /// Current value, restarting from zero.
    pub fn reset(&self) -> T {
        self.reducer.reset()
    }

    /// Shared window sampler, scheduled on first use.
    pub fn get_sampler(&self) -> Arc<ReducerSampler<T, AddTo, MinusFrom>> {
        self.reducer.get_sampler()
    }

    /// The underlying reducer.
    pub fn reducer(&self) -> &Reducer<T, AddTo, MinusFrom> {
        &self.reducer
    }
}

impl Counter<i64> {
    /// Add one.
    #[inline]
    pub fn increment(&self) {
        self.reducer.update(1);
    }
}

impl Counter<u64> {
    /// Add one.
    #[inline]
    pub fn increment(&self) {
        self.reducer.update(1);
    }
}

impl<T> Default for Counter<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    fn default() -> Self {
        Self::new()
    }
}
