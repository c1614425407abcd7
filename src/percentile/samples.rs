//! Mergeable bucketed sample storage.

use crate::combiner::{AddTo, ReduceOp};
use hdrhistogram::Histogram;
use std::fmt;

/// Highest value kept exactly; larger values saturate.
pub const MAX_TRACKABLE_VALUE: u64 = 1 << 36;

const SIGNIFICANT_DIGITS: u8 = 2;

/// Recorded values of one thread, one period, or a merge of many.
///
/// Buckets have a fixed layout, so merging two sets is exact addition of
/// bucket counts and the result does not depend on merge order.
#[derive(Clone)]
pub struct PercentileSamples {
    histogram: Histogram<u64>,
}

impl PercentileSamples {
    /// Empty set tracking values up to [`MAX_TRACKABLE_VALUE`].
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new_with_bounds(1, MAX_TRACKABLE_VALUE, SIGNIFICANT_DIGITS)
                .expect("percentile histogram bounds are valid"),
        }
    }

    /// Record `value`. Negative values count as 0.
    #[inline]
    pub fn add(&mut self, value: i64) {
        let value = u64::try_from(value).unwrap_or(0);
        self.histogram.saturating_record(value);
    }

    /// Add every bucket of `other` into this set.
    pub fn merge(&mut self, other: &PercentileSamples) {
        if other.histogram.is_empty() {
            return;
        }
        if let Err(e) = self.histogram.add(&other.histogram) {
            tracing::warn!(error = ?e, "failed to merge percentile samples");
        }
    }

    /// Value at quantile `q`.
    ///
    /// `q` is clamped into `[0, 1]` and NaN reads as 0. Quantile 0 is the
    /// smallest recorded value. An empty set answers 0.
    pub fn get_number(&self, q: f64) -> i64 {
        if self.histogram.is_empty() {
            return 0;
        }
        let q = if q.is_nan() { 0.0 } else { q.clamp(0.0, 1.0) };
        let value = if q <= 0.0 {
            self.histogram.min()
        } else {
            self.histogram.value_at_quantile(q)
        };
        clamp_to_i64(value)
    }

    /// Number of recorded values.
    pub fn count(&self) -> u64 {
        self.histogram.len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Forget every value, keeping the bucket layout.
    pub fn clear(&mut self) {
        self.histogram.reset();
    }

    /// Smallest recorded value, 0 when empty.
    pub fn min(&self) -> i64 {
        if self.histogram.is_empty() {
            0
        } else {
            clamp_to_i64(self.histogram.min())
        }
    }

    /// Largest recorded value, 0 when empty.
    pub fn max(&self) -> i64 {
        clamp_to_i64(self.histogram.max())
    }

    /// Mean of recorded values, 0.0 when empty.
    pub fn mean(&self) -> f64 {
        if self.histogram.is_empty() {
            0.0
        } else {
            self.histogram.mean()
        }
    }
}

fn clamp_to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl Default for PercentileSamples {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PercentileSamples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PercentileSamples")
            .field("count", &self.count())
            .field("min", &self.min())
            .field("max", &self.max())
            .finish()
    }
}

impl fmt::Display for PercentileSamples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{\"count\":{},\"p50\":{},\"p99\":{}}}",
            self.count(),
            self.get_number(0.5),
            self.get_number(0.99)
        )
    }
}

impl ReduceOp<PercentileSamples> for AddTo {
    fn apply(&self, lhs: &mut PercentileSamples, rhs: &PercentileSamples) {
        lhs.merge(rhs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(range: std::ops::Range<i64>) -> PercentileSamples {
        let mut samples = PercentileSamples::new();
        for v in range {
            samples.add(v);
        }
        samples
    }

    #[test]
    fn test_empty_answers_zero() {
        let samples = PercentileSamples::new();
        assert!(samples.is_empty());
        assert_eq!(samples.get_number(0.5), 0);
        assert_eq!(samples.min(), 0);
        assert_eq!(samples.mean(), 0.0);
    }

    #[test]
    fn test_quantiles_within_precision() {
        let samples = filled(1..10_001);
        assert_eq!(samples.count(), 10_000);
        let p50 = samples.get_number(0.5);
        assert!((4_950..=5_050).contains(&p50), "p50 = {}", p50);
        let p99 = samples.get_number(0.99);
        assert!((9_800..=10_000).contains(&p99), "p99 = {}", p99);
        assert_eq!(samples.get_number(0.0), 1);
    }

    #[test]
    fn test_quantile_is_clamped() {
        let samples = filled(1..101);
        assert_eq!(samples.get_number(-1.0), samples.get_number(0.0));
        assert_eq!(samples.get_number(f64::NAN), samples.get_number(0.0));
        assert_eq!(samples.get_number(7.0), samples.get_number(1.0));
    }

    #[test]
    fn test_merge_is_order_independent() {
        let a = filled(1..500);
        let b = filled(400..2_000);
        let c = filled(1_500..3_000);

        let mut left = a.clone();
        left.merge(&b);
        left.merge(&c);
        let mut right = c.clone();
        right.merge(&a);
        right.merge(&b);

        assert_eq!(left.count(), right.count());
        for q in [0.1, 0.5, 0.9, 0.99, 1.0] {
            assert_eq!(left.get_number(q), right.get_number(q));
        }
    }

    #[test]
    fn test_negative_and_huge_values() {
        let mut samples = PercentileSamples::new();
        samples.add(-5);
        samples.add(i64::MAX);
        assert_eq!(samples.count(), 2);
        assert_eq!(samples.get_number(0.0), 0);
        assert!(samples.get_number(1.0) >= 1 << 35);
    }
}
