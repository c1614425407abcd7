//! Gauges: set cells, running extremes and computed values.

use crate::combiner::{AddTo, AtomicElement, ElementCell, InverseOp, MaxTo, MinTo, MinusFrom, ReduceOp, SeriesFold, VoidOp};
use crate::core::Result;
use crate::metrics::reducer::{reducer_wrapper, Numeric, Reducer};
use crate::sampler::{ReducerSampler, SamplerCell, SamplerHandle, SeriesOptions, SeriesSampler};
use crate::variable::{Exposable, ExposeSlot, MetricSample, Variable, VariableKind};
use crate::window::{attach_series, describe_series_slot, Windowable};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

type SeriesSlot = OnceCell<(Arc<SeriesSampler>, SamplerHandle)>;

struct GaugeInner<T: Numeric> {
    value: AtomicElement<T>,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

/// A value set directly, e.g. queue depth or pool size.
pub struct Gauge<T: Numeric = i64> {
    inner: Arc<GaugeInner<T>>,
}

impl<T: Numeric> Clone for Gauge<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Numeric> Gauge<T> {
    /// Unexposed gauge holding `initial`.
    pub fn new(initial: T) -> Self {
        Self {
            inner: Arc::new(GaugeInner {
                value: AtomicElement::new(initial),
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Gauge exposed as `name`; failures are logged.
    pub fn with_name(name: &str, help: &str, initial: T) -> Self {
        let gauge = Self::new(initial);
        let _ = gauge.expose(name, help);
        gauge
    }

    /// Replace the value.
    #[inline]
    pub fn set_value(&self, value: T) {
        self.inner.value.store(value);
    }

    /// Current value.
    #[inline]
    pub fn get_value(&self) -> T {
        self.inner.value.load()
    }

    /// Fold `delta` into the value with `op`, atomically.
    #[inline]
    pub fn update<O: ReduceOp<T>>(&self, op: &O, delta: T) {
        self.inner.value.modify(op, &delta);
    }
}

impl<T: Numeric> Variable for GaugeInner<T> {
    fn kind(&self) -> VariableKind {
        VariableKind::Gauge
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        write!(out, "{}", self.value.load())
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample::scalar(VariableKind::Gauge, self.value.load().to_f64(), stamp)
    }
}

impl<T: Numeric> Exposable for Gauge<T> {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<GaugeInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        let weak = Arc::downgrade(&self.inner);
        attach_series(&self.inner.series, SeriesFold::Average, move || {
            weak.upgrade().map(|inner| inner.value.load().to_f64())
        });
    }
}

/// Largest value seen since the last reset.
///
/// Windows over a maxer reset it once per sampling period, so once a window
/// exists the maxer itself only reflects the current period.
pub struct MaxerGauge<T = i64>
where
    T: Numeric,
    MaxTo: ReduceOp<T>,
    VoidOp: InverseOp<T>,
{
    reducer: Reducer<T, MaxTo, VoidOp>,
}

reducer_wrapper!(MaxerGauge, Numeric, MaxTo, VoidOp);

impl<T: Numeric> MaxerGauge<T> {
    /// Unexposed maxer.
    pub fn new() -> Self {
        Self {
            reducer: Reducer::new(T::MIN, MaxTo, VoidOp),
        }
    }

    /// Keep `value` if it is the largest so far.
    #[inline]
    pub fn update(&self, value: T) {
        self.reducer.update(value);
    }

    /// Largest value, or `T::MIN` when nothing was recorded.
    pub fn get_value(&self) -> T {
        self.reducer.get_value()
    }

    /// Largest value, restarting from `T::MIN`.
    pub fn reset(&self) -> T {
        self.reducer.reset()
    }

    /// Shared window sampler, scheduled on first use.
    pub fn get_sampler(&self) -> Arc<ReducerSampler<T, MaxTo, VoidOp>> {
        self.reducer.get_sampler()
    }
}

impl<T: Numeric> Default for MaxerGauge<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Smallest value seen since the last reset.
pub struct MinerGauge<T = i64>
where
    T: Numeric,
    MinTo: ReduceOp<T>,
    VoidOp: InverseOp<T>,
{
    reducer: Reducer<T, MinTo, VoidOp>,
}

reducer_wrapper!(MinerGauge, Numeric, MinTo, VoidOp);

impl<T: Numeric> MinerGauge<T> {
    /// Unexposed miner.
    pub fn new() -> Self {
        Self {
            reducer: Reducer::new(T::MAX, MinTo, VoidOp),
        }
    }

    /// Keep `value` if it is the smallest so far.
    #[inline]
    pub fn update(&self, value: T) {
        self.reducer.update(value);
    }

    /// Smallest value, or `T::MAX` when nothing was recorded.
    pub fn get_value(&self) -> T {
        self.reducer.get_value()
    }

    /// Smallest value, restarting from `T::MAX`.
    pub fn reset(&self) -> T {
        self.reducer.reset()
    }

    /// Shared window sampler, scheduled on first use.
    pub fn get_sampler(&self) -> Arc<ReducerSampler<T, MinTo, VoidOp>> {
        self.reducer.get_sampler()
    }
}

impl<T: Numeric> Default for MinerGauge<T> {
    fn default() -> Self {
        Self::new()
    }
}

type GaugeFn<T> = Box<dyn Fn() -> T + Send + Sync>;

struct FuncGaugeInner<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    func: GaugeFn<T>,
    kind: VariableKind,
    sampler: SamplerCell<T, AddTo, MinusFrom>,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

/// Gauge whose value is computed by a closure on every read.
pub struct FuncGauge<T = i64>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    inner: Arc<FuncGaugeInner<T>>,
}

impl<T> Clone for FuncGauge<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> FuncGauge<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    /// Gauge reading `func` on every access.
    pub fn new<F>(func: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self::with_kind(func, VariableKind::Gauge)
    }

    /// Computed value reported as `kind`, e.g. a counter kept elsewhere.
    pub fn with_kind<F>(func: F, kind: VariableKind) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(FuncGaugeInner {
                func: Box::new(func),
                kind,
                sampler: SamplerCell::default(),
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Call the function.
    pub fn get_value(&self) -> T {
        (self.inner.func)()
    }
}

impl<T> Variable for FuncGaugeInner<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    fn kind(&self) -> VariableKind {
        self.kind
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        write!(out, "{}", (self.func)())
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample::scalar(self.kind, (self.func)().to_f64(), stamp)
    }
}

impl<T> Exposable for FuncGauge<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<FuncGaugeInner<T>> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        let weak = Arc::downgrade(&self.inner);
        attach_series(&self.inner.series, SeriesFold::Average, move || {
            weak.upgrade().map(|inner| (inner.func)().to_f64())
        });
    }
}

impl<T> Windowable for FuncGauge<T>
where
    T: Numeric,
    AddTo: ReduceOp<T>,
    MinusFrom: InverseOp<T>,
{
    type Value = T;
    type Op = AddTo;
    type InvOp = MinusFrom;

    fn get_value(&self) -> T {
        (self.inner.func)()
    }

    fn get_sampler(&self) -> Arc<ReducerSampler<T, AddTo, MinusFrom>> {
        self.inner.sampler.get_or_schedule(|| {
            let weak = Arc::downgrade(&self.inner);
            ReducerSampler::new(
                move || weak.upgrade().map(|inner| (inner.func)()),
                AddTo,
                MinusFrom,
            )
        })
    }

    fn value_to_f64(value: &T) -> Option<f64> {
        Some(value.to_f64())
    }
}
