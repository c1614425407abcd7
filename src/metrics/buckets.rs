//! Histogram bucket layouts.

use crate::core::{Result, TallyError};
use std::time::Duration;

/// Strictly increasing upper bounds. An implicit `+Inf` bucket follows the
/// last one. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Buckets {
    bounds: Vec<f64>,
}

impl Buckets {
    /// `start, start + width, ..., start + (num - 1) * width`
    pub fn linear_values(start: f64, width: f64, num: usize) -> Result<Self> {
        if width <= 0.0 || !width.is_finite() {
            return Err(TallyError::invalid_argument(format!(
                "bucket width must be positive, got {}",
                width
            )));
        }
        if num == 0 {
            return Err(TallyError::invalid_argument("bucket count must be positive"));
        }
        let bounds = (0..num)
            .map(|i| start + width * index_f64(i))
            .collect();
        Self::checked(bounds)
    }

    /// `start, start * factor, ..., start * factor^(num - 1)`
    pub fn exponential_values(start: f64, factor: f64, num: usize) -> Result<Self> {
        if factor <= 1.0 || !factor.is_finite() {
            return Err(TallyError::invalid_argument(format!(
                "bucket factor must be greater than 1, got {}",
                factor
            )));
        }
        if start <= 0.0 {
            return Err(TallyError::invalid_argument(format!(
                "bucket start must be positive, got {}",
                start
            )));
        }
        if num == 0 {
            return Err(TallyError::invalid_argument("bucket count must be positive"));
        }
        let mut bounds = Vec::with_capacity(num);
        let mut bound = start;
        for _ in 0..num {
            bounds.push(bound);
            bound *= factor;
        }
        Self::checked(bounds)
    }

    /// Linear buckets of durations, stored in seconds.
    pub fn linear_durations(start: Duration, width: Duration, num: usize) -> Result<Self> {
        Self::linear_values(start.as_secs_f64(), width.as_secs_f64(), num)
    }

    /// Exponential buckets of durations, stored in seconds.
    pub fn exponential_durations(start: Duration, factor: f64, num: usize) -> Result<Self> {
        Self::exponential_values(start.as_secs_f64(), factor, num)
    }

    /// Caller-supplied bounds; must be non-empty and strictly increasing.
    pub fn custom(bounds: Vec<f64>) -> Result<Self> {
        if bounds.is_empty() {
            return Err(TallyError::invalid_argument("buckets must not be empty"));
        }
        Self::checked(bounds)
    }

    fn checked(bounds: Vec<f64>) -> Result<Self> {
        if bounds.iter().any(|b| b.is_nan()) {
            return Err(TallyError::invalid_argument("bucket bound is NaN"));
        }
        if let Some(pair) = bounds.windows(2).find(|pair| pair[0] >= pair[1]) {
            return Err(TallyError::invalid_argument(format!(
                "bucket bounds must be strictly increasing: {} >= {}",
                pair[0], pair[1]
            )));
        }
        Ok(Self { bounds })
    }

    /// Index of the bucket `value` falls in; `len()` is the `+Inf` bucket.
    ///
    /// Upper bounds are inclusive.
    #[inline]
    pub fn bucket_index(&self, value: f64) -> usize {
        self.bounds.partition_point(|&bound| bound < value)
    }

    /// Bounds in increasing order.
    pub fn as_slice(&self) -> &[f64] {
        &self.bounds
    }

    /// Explicit buckets, not counting `+Inf`.
    pub fn len(&self) -> usize {
        self.bounds.len()
    }

    /// Never true for a constructed layout.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }

    /// Bounds in increasing order.
    pub fn iter(&self) -> std::iter::Copied<std::slice::Iter<'_, f64>> {
        self.bounds.iter().copied()
    }
}

impl<'a> IntoIterator for &'a Buckets {
    type Item = f64;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, f64>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[allow(clippy::cast_precision_loss)]
fn index_f64(i: usize) -> f64 {
    i as f64
}
