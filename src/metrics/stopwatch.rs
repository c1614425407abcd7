//! Scoped timers that record into a metric.

use crate::metrics::{AverageGauge, Histogram, LatencyRecorder};
use std::time::{Duration, Instant};

/// A metric that accepts elapsed times.
pub trait StopwatchRecorder {
    /// Record one measured duration.
    fn record_elapsed(&self, elapsed: Duration);
}

fn micros(elapsed: Duration) -> i64 {
    i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX)
}

/// Records microseconds.
impl StopwatchRecorder for LatencyRecorder {
    fn record_elapsed(&self, elapsed: Duration) {
        self.record(micros(elapsed));
    }
}

/// Records microseconds.
impl StopwatchRecorder for AverageGauge {
    fn record_elapsed(&self, elapsed: Duration) {
        self.set(micros(elapsed));
    }
}

/// Records seconds, matching duration buckets.
impl StopwatchRecorder for Histogram {
    fn record_elapsed(&self, elapsed: Duration) {
        self.record_duration(elapsed);
    }
}

/// Measures from creation until [`Stopwatch::stop`] or drop, then records
/// the elapsed time once.
///
/// ```
/// use tally::metrics::Stopwatch;
/// use tally::LatencyRecorder;
///
/// let latency = LatencyRecorder::new();
/// {
///     let _timer = Stopwatch::start(&latency);
///     // timed work
/// }
/// assert_eq!(latency.count(), 1);
/// ```
#[must_use = "a stopwatch records when it is dropped"]
pub struct Stopwatch<'a, R: StopwatchRecorder + ?Sized> {
    start: Instant,
    recorder: Option<&'a R>,
}

impl<'a, R: StopwatchRecorder + ?Sized> Stopwatch<'a, R> {
    /// Start timing now.
    pub fn start(recorder: &'a R) -> Self {
        Self::started_at(Instant::now(), recorder)
    }

    /// Time from an earlier `start`, e.g. when a request was received.
    pub fn started_at(start: Instant, recorder: &'a R) -> Self {
        Self {
            start,
            recorder: Some(recorder),
        }
    }

    /// Time since start, without recording.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Record now and return what was recorded.
    pub fn stop(mut self) -> Duration {
        self.finish()
    }

    /// Drop without recording, e.g. for a failed operation.
    pub fn cancel(mut self) {
        self.recorder = None;
    }

    fn finish(&mut self) -> Duration {
        let elapsed = self.start.elapsed();
        if let Some(recorder) = self.recorder.take() {
            recorder.record_elapsed(elapsed);
        }
        elapsed
    }
}

impl<R: StopwatchRecorder + ?Sized> Drop for Stopwatch<'_, R> {
    fn drop(&mut self) {
        self.finish();
    }
}

impl LatencyRecorder {
    /// Stopwatch recording into this recorder.
    pub fn stopwatch(&self) -> Stopwatch<'_, LatencyRecorder> {
        Stopwatch::start(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Buckets;
    use std::thread;

    #[test]
    fn test_records_once_on_drop() {
        let gauge = AverageGauge::new();
        {
            let _timer = Stopwatch::start(&gauge);
            thread::sleep(Duration::from_millis(2));
        }
        let stat = gauge.get_value();
        assert_eq!(stat.num, 1);
        assert!(stat.sum >= 2_000);
    }

    #[test]
    fn test_stop_records_and_skips_drop() {
        let recorder = LatencyRecorder::with_window(1);
        let timer = recorder.stopwatch();
        let elapsed = timer.stop();
        assert_eq!(recorder.count(), 1);
        assert!(elapsed < Duration::from_secs(5));
    }

    #[test]
    fn test_cancel_records_nothing() {
        let gauge = AverageGauge::new();
        Stopwatch::start(&gauge).cancel();
        assert_eq!(gauge.get_value().num, 0);
    }

    #[test]
    fn test_started_at_and_histogram() {
        let histogram = Histogram::new(Buckets::custom(vec![0.001, 10.0]).unwrap());
        let earlier = Instant::now() - Duration::from_millis(20);
        let timer = Stopwatch::started_at(earlier, &histogram);
        assert!(timer.elapsed() >= Duration::from_millis(20));
        drop(timer);
        assert_eq!(histogram.bucket_counts(), vec![0, 1, 0]);
    }

    #[test]
    fn test_trait_object_recorder() {
        let gauge = AverageGauge::new();
        let recorder: &dyn StopwatchRecorder = &gauge;
        Stopwatch::start(recorder).stop();
        assert_eq!(gauge.get_value().num, 1);
    }
}
