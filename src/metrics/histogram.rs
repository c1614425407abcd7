//! Fixed-bucket histograms.

use crate::metrics::buckets::Buckets;
use crate::metrics::counter::Counter;
use crate::variable::{BucketSample, Exposable, ExposeSlot, HistogramSample, MetricSample, SampleValue, Variable, VariableKind};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, SystemTime};

struct HistogramInner {
    buckets: Buckets,
    /// One per bound plus `+Inf`
    counts: Vec<Counter<i64>>,
    sum: Counter<f64>,
    exposure: ExposeSlot,
}

impl HistogramInner {
    #[allow(clippy::cast_sign_loss)]
    fn snapshot(&self) -> HistogramSample {
        let mut cumulative = 0u64;
        let bounds = self.buckets.iter().chain(std::iter::once(f64::INFINITY));
        let buckets: Vec<BucketSample> = bounds
            .zip(&self.counts)
            .map(|(upper_bound, count)| {
                cumulative += count.get_value().max(0) as u64;
                BucketSample {
                    upper_bound,
                    cumulative_count: cumulative,
                }
            })
            .collect();
        HistogramSample {
            sum: self.sum.get_value(),
            count: cumulative,
            buckets,
        }
    }
}

/// Counts of recorded values per bucket, plus their sum.
///
/// A value lands in the first bucket whose upper bound is `>=` the value, or
/// in the implicit `+Inf` bucket.
pub struct Histogram {
    inner: Arc<HistogramInner>,
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Histogram {
    /// Unexposed histogram over `buckets`.
    pub fn new(buckets: Buckets) -> Self {
        let counts = (0..=buckets.len()).map(|_| Counter::new()).collect();
        Self {
            inner: Arc::new(HistogramInner {
                buckets,
                counts,
                sum: Counter::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Histogram exposed as `name`; failures are logged.
    pub fn with_name(name: &str, help: &str, buckets: Buckets) -> Self {
        let histogram = Self::new(buckets);
        let _ = histogram.expose(name, help);
        histogram
    }

    /// Count `value` into its bucket and add it to the sum.
    #[inline]
    pub fn record(&self, value: f64) {
        let index = self.inner.buckets.bucket_index(value);
        self.inner.counts[index].increment();
        self.inner.sum.add(value);
    }

    /// Record a duration in seconds.
    #[inline]
    pub fn record_duration(&self, duration: Duration) {
        self.record(duration.as_secs_f64());
    }

    /// Bucket layout, without `+Inf`.
    pub fn buckets(&self) -> &Buckets {
        &self.inner.buckets
    }

    /// Non-cumulative count per bucket, `+Inf` last.
    pub fn bucket_counts(&self) -> Vec<i64> {
        self.inner.counts.iter().map(Counter::get_value).collect()
    }

    /// Sum of recorded values.
    pub fn sum(&self) -> f64 {
        self.inner.sum.get_value()
    }

    /// Values recorded.
    pub fn count(&self) -> i64 {
        self.bucket_counts().iter().sum()
    }

    /// Cumulative view, as reported.
    pub fn snapshot(&self) -> HistogramSample {
        self.inner.snapshot()
    }
}

impl Variable for HistogramInner {
    fn kind(&self) -> VariableKind {
        VariableKind::Histogram
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        let snapshot = self.snapshot();
        write!(out, "{{\"count\":{},\"sum\":{},\"buckets\":[", snapshot.count, snapshot.sum)?;
        for (i, bucket) in snapshot.buckets.iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            if bucket.upper_bound.is_infinite() {
                write!(out, "[\"+Inf\",{}]", bucket.cumulative_count)?;
            } else {
                write!(out, "[{},{}]", bucket.upper_bound, bucket.cumulative_count)?;
            }
        }
        out.write_str("]}")
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample {
            kind: VariableKind::Histogram,
            value: SampleValue::Histogram(self.snapshot()),
            timestamp: stamp,
        }
    }
}

impl Exposable for Histogram {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<HistogramInner> = Arc::downgrade(&self.inner);
        weak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_land_in_inclusive_buckets() {
        let histogram = Histogram::new(Buckets::linear_values(4.0, 6.0, 3).unwrap());
        for v in [1.0, 4.0, 5.0, 10.0, 16.0, 17.0, 100.0] {
            histogram.record(v);
        }
        assert_eq!(histogram.bucket_counts(), vec![2, 2, 1, 2]);
        assert_eq!(histogram.count(), 7);
        assert_eq!(histogram.sum(), 153.0);
    }

    #[test]
    fn test_snapshot_is_cumulative() {
        let histogram = Histogram::new(Buckets::custom(vec![1.0, 2.0]).unwrap());
        histogram.record(0.5);
        histogram.record(1.5);
        histogram.record(3.0);
        let snapshot = histogram.snapshot();
        let cumulative: Vec<u64> = snapshot.buckets.iter().map(|b| b.cumulative_count).collect();
        assert_eq!(cumulative, vec![1, 2, 3]);
        assert!(snapshot.buckets[2].upper_bound.is_infinite());
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.sum, 5.0);
    }

    #[test]
    fn test_record_duration() {
        let histogram =
            Histogram::new(Buckets::linear_durations(Duration::from_millis(10), Duration::from_millis(10), 2).unwrap());
        histogram.record_duration(Duration::from_millis(15));
        assert_eq!(histogram.bucket_counts(), vec![0, 1, 0]);
    }

    #[test]
    fn test_describe() {
        let histogram = Histogram::new(Buckets::custom(vec![1.0]).unwrap());
        histogram.record(2.0);
        let mut out = String::new();
        histogram.inner.describe(&mut out, false).unwrap();
        assert_eq!(out, "{\"count\":1,\"sum\":2,\"buckets\":[[1,0],[\"+Inf\",1]]}");
    }
}
