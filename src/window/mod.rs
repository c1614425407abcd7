//! Values over the last N sampling periods.
//!
//! A [`Window`] never touches its base metric on the write path. It reads the
//! snapshots the sampler thread takes once per period and combines the two
//! that bound the window with the base's inverse operation, or folds the
//! per-period deltas when the base has none.

use crate::combiner::{InverseOp, ReduceOp};
use crate::core::{config, Result};
use crate::sampler::{ReducerSampler, Sample, SeriesOptions, SeriesSampler, SamplerHandle};
use crate::variable::{ExposeSlot, Exposable, MetricSample, Variable, VariableKind};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// A metric a [`Window`] can be built over.
pub trait Windowable: Clone + Send + Sync + 'static {
    /// What the base reports.
    type Value: Clone + Send + Sync + 'static;
    /// How two values combine.
    type Op: ReduceOp<Self::Value>;
    /// How a value is taken back out; `VoidOp` when it cannot be.
    type InvOp: InverseOp<Self::Value>;

    /// Current value of the base.
    fn get_value(&self) -> Self::Value;

    /// The base's shared sampler, created and scheduled on first call.
    fn get_sampler(&self) -> Arc<ReducerSampler<Self::Value, Self::Op, Self::InvOp>>;

    /// Numeric view of a value, used for series and reports.
    fn value_to_f64(value: &Self::Value) -> Option<f64> {
        let _ = value;
        None
    }
}

type SeriesSlot = OnceCell<(Arc<SeriesSampler>, SamplerHandle)>;

struct WindowInner<B: Windowable> {
    base: B,
    sampler: Arc<ReducerSampler<B::Value, B::Op, B::InvOp>>,
    window_size: usize,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

impl<B: Windowable> WindowInner<B> {
    fn get_span(&self, window: usize) -> Sample<B::Value> {
        self.sampler.get_span(window).unwrap_or_else(|| {
            // Not enough history yet: report the base as it is, plus the
            // period already drained from it when sampling resets the base.
            let mut data = self.base.get_value();
            if !<B::InvOp as InverseOp<B::Value>>::EXISTS {
                for sample in self.sampler.get_samples(window) {
                    self.sampler.op().apply(&mut data, &sample);
                }
            }
            Sample { data, time_us: 0 }
        })
    }
}

/// Value of a base metric over the last `window_size` sampling periods.
pub struct Window<B: Windowable> {
    inner: Arc<WindowInner<B>>,
}

impl<B: Windowable> Clone for Window<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Windowable> Window<B> {
    /// Window over `base`. A size of 0 is raised to 1.
    pub fn new(base: &B, window_size: usize) -> Self {
        let window_size = window_size.max(1);
        let sampler = base.get_sampler();
        sampler.set_window_size(window_size);
        Self {
            inner: Arc::new(WindowInner {
                base: base.clone(),
                sampler,
                window_size,
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Value over the whole window.
    ///
    /// Before two samples exist this is the base's current value.
    pub fn get_value(&self) -> B::Value {
        self.get_value_in(self.inner.window_size)
    }

    /// Value over the last `window` periods, at most the window size.
    pub fn get_value_in(&self, window: usize) -> B::Value {
        self.get_span(window).data
    }

    /// Value plus the measured time between the bounding samples.
    /// `time_us` is 0 on cold start.
    pub fn get_span(&self, window: usize) -> Sample<B::Value> {
        self.inner.get_span(window.min(self.inner.window_size))
    }

    /// Raw snapshots of the last `window` periods, oldest first.
    pub fn get_samples(&self, window: usize) -> Vec<B::Value> {
        self.inner.sampler.get_samples(window.min(self.inner.window_size))
    }

    /// Window length in sampling periods.
    pub fn window_size(&self) -> usize {
        self.inner.window_size
    }

    /// The windowed metric.
    pub fn base(&self) -> &B {
        &self.inner.base
    }
}

impl<B: Windowable> Variable for WindowInner<B>
where
    B::Value: fmt::Display,
{
    fn kind(&self) -> VariableKind {
        VariableKind::Gauge
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        write!(out, "{}", self.get_span(self.window_size).data)
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        let value = self.get_span(self.window_size).data;
        match B::value_to_f64(&value) {
            Some(v) => MetricSample::scalar(VariableKind::Gauge, v, stamp),
            None => MetricSample::empty(VariableKind::Gauge, stamp),
        }
    }
}

impl<B: Windowable> Exposable for Window<B>
where
    B::Value: fmt::Display,
{
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<WindowInner<B>> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        let weak = Arc::downgrade(&self.inner);
        attach_series(&self.inner.series, <B::Op as ReduceOp<B::Value>>::SERIES, move || {
            let inner = weak.upgrade()?;
            B::value_to_f64(&inner.get_span(inner.window_size).data)
        });
    }
}

/// Per-second rate of a base metric, using the measured time between samples.
pub struct PerSecond<B: Windowable> {
    inner: Arc<PerSecondInner<B>>,
}

struct PerSecondInner<B: Windowable> {
    window: Window<B>,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

impl<B: Windowable> PerSecondInner<B> {
    #[allow(clippy::cast_precision_loss)]
    fn rate(&self, window: usize) -> f64 {
        let span = self.window.get_span(window);
        if span.time_us <= 0 {
            return 0.0;
        }
        B::value_to_f64(&span.data).map_or(0.0, |data| data * 1_000_000.0 / span.time_us as f64)
    }
}

impl<B: Windowable> Clone for PerSecond<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: Windowable> PerSecond<B> {
    /// Rate of `base` averaged over up to `window_size` periods.
    pub fn new(base: &B, window_size: usize) -> Self {
        Self {
            inner: Arc::new(PerSecondInner {
                window: Window::new(base, window_size),
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Rate over the whole window, 0.0 until two samples exist.
    pub fn get_value(&self) -> f64 {
        self.inner.rate(self.inner.window.window_size())
    }

    /// Rate over the last `window` periods.
    pub fn get_value_in(&self, window: usize) -> f64 {
        self.inner.rate(window)
    }

    /// Window length in sampling periods.
    pub fn window_size(&self) -> usize {
        self.inner.window.window_size()
    }

    /// The underlying window of raw deltas.
    pub fn window(&self) -> &Window<B> {
        &self.inner.window
    }
}

impl<B: Windowable> Variable for PerSecondInner<B> {
    fn kind(&self) -> VariableKind {
        VariableKind::Gauge
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        write!(out, "{}", self.rate(self.window.window_size()))
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample::scalar(VariableKind::Gauge, self.rate(self.window.window_size()), stamp)
    }
}

impl<B: Windowable> Exposable for PerSecond<B> {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<PerSecondInner<B>> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        let weak = Arc::downgrade(&self.inner);
        attach_series(
            &self.inner.series,
            crate::combiner::SeriesFold::Average,
            move || weak.upgrade().map(|inner| inner.rate(inner.window.window_size())),
        );
    }
}

/// Schedule a series for an exposed variable when series are enabled.
pub(crate) fn attach_series<S>(slot: &SeriesSlot, fold: crate::combiner::SeriesFold, source: S)
where
    S: Fn() -> Option<f64> + Send + Sync + 'static,
{
    if !config::current().sampler.save_series {
        return;
    }
    slot.get_or_init(|| SeriesSampler::schedule(source, fold));
}

pub(crate) fn describe_series_slot(
    slot: &SeriesSlot,
    out: &mut dyn fmt::Write,
    options: &SeriesOptions,
) -> Result<()> {
    match slot.get() {
        Some((series, _)) => Ok(series.describe(out, options)?),
        None => Err(crate::core::TallyError::unavailable("variable has no series")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combiner::{AddTo, MaxTo, MinusFrom, VoidOp};
    use crate::sampler::Sampler;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// Base fed by hand; the sampler is never scheduled.
    #[derive(Clone)]
    struct ManualCounter {
        value: Arc<AtomicI64>,
        sampler: Arc<ReducerSampler<i64, AddTo, MinusFrom>>,
    }

    impl ManualCounter {
        fn new() -> Self {
            let value = Arc::new(AtomicI64::new(0));
            let source = Arc::clone(&value);
            Self {
                value,
                sampler: Arc::new(ReducerSampler::new(
                    move || Some(source.load(Ordering::Relaxed)),
                    AddTo,
                    MinusFrom,
                )),
            }
        }

        fn add(&self, v: i64) {
            self.value.fetch_add(v, Ordering::Relaxed);
        }

        fn tick(&self) {
            self.sampler.take_sample();
        }
    }

    impl Windowable for ManualCounter {
        type Value = i64;
        type Op = AddTo;
        type InvOp = MinusFrom;

        fn get_value(&self) -> i64 {
            self.value.load(Ordering::Relaxed)
        }

        fn get_sampler(&self) -> Arc<ReducerSampler<i64, AddTo, MinusFrom>> {
            Arc::clone(&self.sampler)
        }

        #[allow(clippy::cast_precision_loss)]
        fn value_to_f64(value: &i64) -> Option<f64> {
            Some(*value as f64)
        }
    }

    #[derive(Clone)]
    struct ManualMax {
        pending: Arc<Mutex<i64>>,
        sampler: Arc<ReducerSampler<i64, MaxTo, VoidOp>>,
    }

    impl ManualMax {
        fn new() -> Self {
            let pending = Arc::new(Mutex::new(i64::MIN));
            let source = Arc::clone(&pending);
            Self {
                pending,
                sampler: Arc::new(ReducerSampler::new(
                    move || Some(std::mem::replace(&mut *source.lock(), i64::MIN)),
                    MaxTo,
                    VoidOp,
                )),
            }
        }
    }

    impl Windowable for ManualMax {
        type Value = i64;
        type Op = MaxTo;
        type InvOp = VoidOp;

        fn get_value(&self) -> i64 {
            *self.pending.lock()
        }

        fn get_sampler(&self) -> Arc<ReducerSampler<i64, MaxTo, VoidOp>> {
            Arc::clone(&self.sampler)
        }
    }

    #[test]
    fn test_cold_start_returns_base_value() {
        let counter = ManualCounter::new();
        let window = Window::new(&counter, 5);
        counter.add(7);
        assert_eq!(window.get_value(), 7);
        assert_eq!(window.get_span(5).time_us, 0);

        counter.tick();
        counter.add(1);
        assert_eq!(window.get_value(), 8);
    }

    #[test]
    fn test_window_sums_recent_periods() {
        let counter = ManualCounter::new();
        let window = Window::new(&counter, 3);
        counter.tick();
        for inc in [1, 2, 3, 4] {
            counter.add(inc);
            counter.tick();
        }
        assert_eq!(window.get_value(), 9);
        assert_eq!(window.get_value_in(1), 4);
        assert_eq!(window.get_value_in(2), 7);
        // bound to the window size
        assert_eq!(window.get_value_in(10), 9);
        assert_eq!(window.get_samples(2), vec![6, 10]);
    }

    #[test]
    fn test_windows_share_the_sampler() {
        let counter = ManualCounter::new();
        let short = Window::new(&counter, 2);
        let long = Window::new(&counter, 6);
        assert_eq!(counter.sampler.window_size(), 6);
        assert_eq!(short.window_size(), 2);
        assert_eq!(long.window_size(), 6);
    }

    #[test]
    fn test_zero_window_is_one() {
        let counter = ManualCounter::new();
        let window = Window::new(&counter, 0);
        assert_eq!(window.window_size(), 1);
    }

    #[test]
    fn test_reset_based_window() {
        let maxer = ManualMax::new();
        let window = Window::new(&maxer, 2);
        for v in [9, 4, 6] {
            *maxer.pending.lock() = v;
            maxer.sampler.take_sample();
        }
        assert_eq!(window.get_value(), 6);
        assert_eq!(window.get_value_in(1), 6);
    }

    #[test]
    fn test_reset_based_cold_start_keeps_drained_period() {
        let maxer = ManualMax::new();
        let window = Window::new(&maxer, 3);
        *maxer.pending.lock() = 9;
        maxer.sampler.take_sample();
        *maxer.pending.lock() = 3;
        assert_eq!(window.get_value(), 9);
        assert_eq!(window.get_span(3).time_us, 0);
    }

    #[test]
    fn test_per_second_uses_measured_time() {
        let counter = ManualCounter::new();
        let rate = PerSecond::new(&counter, 1);
        assert_eq!(rate.get_value(), 0.0);

        counter.tick();
        counter.add(100);
        std::thread::sleep(std::time::Duration::from_millis(50));
        counter.tick();

        let span = rate.window().get_span(1);
        assert_eq!(span.data, 100);
        let expected = 100.0 * 1_000_000.0 / span.time_us as f64;
        assert!((rate.get_value() - expected).abs() < 1e-9);
        // 100 events in at least 50ms
        assert!(rate.get_value() <= 2_000.0);
        assert!(rate.get_value() > 0.0);
    }
}
