//! Generic thread-local reducer behind counters, maxers and miners.

use crate::combiner::{AgentCombiner, AtomicElement, ElementCell, Fold, InverseOp, LockedElement, ReduceOp, VoidOp};
use crate::core::Result;
use crate::sampler::{ReducerSampler, SamplerCell, SamplerHandle, SeriesOptions, SeriesSampler};
use crate::variable::{ExposeSlot, Exposable, MetricSample, Variable, VariableKind};
use crate::window::{attach_series, describe_series_slot};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// A value a [`Reducer`] can hold.
pub trait Reducible: Clone + Send + Sync + 'static {
    /// Per-thread storage for the value
    type Cell: ElementCell<Self>;

    /// Numeric view used by series and reporters.
    fn as_f64(&self) -> Option<f64> {
        None
    }
}

/// Reducible primitive number.
pub trait Numeric: Reducible + crate::combiner::Atomical + PartialOrd + fmt::Display {
    /// Smallest value of the type.
    const MIN: Self;
    /// Largest value of the type.
    const MAX: Self;
    /// Additive identity.
    const ZERO: Self;

    /// Lossy conversion for series and reports.
    fn to_f64(self) -> f64;
}

macro_rules! impl_numeric {
    ($($t:ty),*) => {
        $(
            impl Reducible for $t {
                type Cell = AtomicElement<$t>;

                #[inline]
                fn as_f64(&self) -> Option<f64> {
                    Some(Numeric::to_f64(*self))
                }
            }

            impl Numeric for $t {
                const MIN: Self = <$t>::MIN;
                const MAX: Self = <$t>::MAX;
                const ZERO: Self = 0 as $t;

                #[inline]
                #[allow(clippy::cast_precision_loss, clippy::cast_lossless)]
                fn to_f64(self) -> f64 {
                    self as f64
                }
            }
        )*
    };
}

impl_numeric!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl Reducible for String {
    type Cell = LockedElement<String>;
}

/// Folds per-thread cells of `T` with `Op`.
pub struct ValueFold<T, Op> {
    identity: T,
    op: Op,
}

impl<T: Reducible, Op: ReduceOp<T>> ValueFold<T, Op> {
    /// Fold starting each thread at `identity`.
    pub fn new(identity: T, op: Op) -> Self {
        Self { identity, op }
    }

    /// The combining operation.
    pub fn op(&self) -> &Op {
        &self.op
    }
}

impl<T: Reducible, Op: ReduceOp<T>> Fold for ValueFold<T, Op> {
    type Result = T;
    type Element = T::Cell;

    fn identity(&self) -> T {
        self.identity.clone()
    }

    fn new_element(&self) -> T::Cell {
        T::Cell::new(self.identity.clone())
    }

    fn fold(&self, acc: &mut T, element: &T::Cell) {
        self.op.apply(acc, &element.load());
    }

    fn take(&self, acc: &mut T, element: &T::Cell) {
        self.op.apply(acc, &element.exchange(self.identity.clone()));
    }
}

type SeriesSlot = OnceCell<(Arc<SeriesSampler>, SamplerHandle)>;

pub(crate) struct ReducerInner<T: Reducible, Op: ReduceOp<T>, InvOp: InverseOp<T>> {
    combiner: AgentCombiner<ValueFold<T, Op>>,
    inv_op: InvOp,
    kind: VariableKind,
    sampler: SamplerCell<T, Op, InvOp>,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

impl<T: Reducible, Op: ReduceOp<T>, InvOp: InverseOp<T>> ReducerInner<T, Op, InvOp> {
    /// Value fed to windows and series. Without an inverse, sampling resets.
    fn sample_value(&self) -> T {
        if InvOp::EXISTS {
            self.combiner.combine_agents()
        } else {
            self.combiner.reset_all_agents()
        }
    }
}

/// Reduces values written by many threads with `Op`.
///
/// Writes go to a thread-local agent and never contend. `InvOp` undoes `Op`
/// and lets windows subtract snapshots; reducers whose op has no inverse use
/// [`VoidOp`] and are reset by their sampler once per period instead.
pub struct Reducer<T: Reducible, Op: ReduceOp<T>, InvOp: InverseOp<T> = VoidOp> {
    inner: Arc<ReducerInner<T, Op, InvOp>>,
}

impl<T: Reducible, Op: ReduceOp<T>, InvOp: InverseOp<T>> Clone for Reducer<T, Op, InvOp> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Reducible, Op: ReduceOp<T>, InvOp: InverseOp<T>> Reducer<T, Op, InvOp> {
    /// Reducer starting at `identity`, reported as a gauge.
    pub fn new(identity: T, op: Op, inv_op: InvOp) -> Self {
        Self::with_kind(identity, op, inv_op, VariableKind::Gauge)
    }

    /// Reducer reported to exporters as `kind`.
    pub fn with_kind(identity: T, op: Op, inv_op: InvOp, kind: VariableKind) -> Self {
        Self {
            inner: Arc::new(ReducerInner {
                combiner: AgentCombiner::new(ValueFold::new(identity, op)),
                inv_op,
                kind,
                sampler: SamplerCell::default(),
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Fold `value` into the calling thread's agent.
    #[inline]
    pub fn update(&self, value: T) {
        let combiner = &self.inner.combiner;
        let op = combiner.fold().op();
        combiner.with_tls_agent(|agent| agent.element().modify(op, &value));
    }

    /// Combined value of every thread. Takes the combiner lock.
    pub fn get_value(&self) -> T {
        self.inner.combiner.combine_agents()
    }

    /// Combined value, resetting every thread to the identity.
    pub fn reset(&self) -> T {
        self.inner.combiner.reset_all_agents()
    }

    /// The combining operation.
    pub fn op(&self) -> &Op {
        self.inner.combiner.fold().op()
    }

    /// The operation undoing `op` over a window.
    pub fn inv_op(&self) -> &InvOp {
        &self.inner.inv_op
    }

    /// How exporters treat this reducer.
    pub fn kind(&self) -> VariableKind {
        self.inner.kind
    }

    /// Threads currently holding an agent.
    pub fn agent_count(&self) -> usize {
        self.inner.combiner.agent_count()
    }

    /// The sampler shared by every window on this reducer.
    pub fn get_sampler(&self) -> Arc<ReducerSampler<T, Op, InvOp>> {
        self.inner.sampler.get_or_schedule(|| {
            let weak = Arc::downgrade(&self.inner);
            ReducerSampler::new(
                move || weak.upgrade().map(|inner| inner.sample_value()),
                self.op().clone(),
                self.inner.inv_op.clone(),
            )
        })
    }
}

impl<T, Op, InvOp> Variable for ReducerInner<T, Op, InvOp>
where
    T: Reducible + fmt::Display,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    fn kind(&self) -> VariableKind {
        self.kind
    }

    fn describe(&self, out: &mut dyn fmt::Write, quote_string: bool) -> fmt::Result {
        let value = self.combiner.combine_agents();
        if quote_string && value.as_f64().is_none() {
            crate::variable::write_quoted(out, &value.to_string())
        } else {
            write!(out, "{}", value)
        }
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        match self.combiner.combine_agents().as_f64() {
            Some(v) => MetricSample::scalar(self.kind, v, stamp),
            None => MetricSample::empty(self.kind, stamp),
        }
    }
}

impl<T, Op, InvOp> Exposable for Reducer<T, Op, InvOp>
where
    T: Reducible + fmt::Display,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<ReducerInner<T, Op, InvOp>> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        if self.inner.combiner.fold().identity().as_f64().is_none() {
            return;
        }
        let weak = Arc::downgrade(&self.inner);
        attach_series(&self.inner.series, Op::SERIES, move || {
            weak.upgrade()
                .and_then(|inner| inner.combiner.combine_agents().as_f64())
        });
    }
}

impl<T, Op, InvOp> crate::window::Windowable for Reducer<T, Op, InvOp>
where
    T: Reducible,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    type Value = T;
    type Op = Op;
    type InvOp = InvOp;

    fn get_value(&self) -> T {
        Reducer::get_value(self)
    }

    fn get_sampler(&self) -> Arc<ReducerSampler<T, Op, InvOp>> {
        Reducer::get_sampler(self)
    }

    fn value_to_f64(value: &T) -> Option<f64> {
        value.as_f64()
    }
}

/// Implements `Clone`, `Windowable` and `Exposable` for a newtype over a
/// `reducer: Reducer<T, $op, $inv>` field, with `T: $bound`.
macro_rules! reducer_wrapper {
    ($wrapper:ident, $bound:path, $op:ty, $inv:ty) => {
        impl<T> Clone for $wrapper<T>
        where
            T: $bound,
            $op: $crate::combiner::ReduceOp<T>,
            $inv: $crate::combiner::InverseOp<T>,
        {
            fn clone(&self) -> Self {
                Self {
                    reducer: self.reducer.clone(),
                }
            }
        }

        impl<T> $crate::window::Windowable for $wrapper<T>
        where
            T: $bound,
            $op: $crate::combiner::ReduceOp<T>,
            $inv: $crate::combiner::InverseOp<T>,
        {
            type Value = T;
            type Op = $op;
            type InvOp = $inv;

            fn get_value(&self) -> T {
                self.reducer.get_value()
            }

            fn get_sampler(&self) -> ::std::sync::Arc<$crate::sampler::ReducerSampler<T, $op, $inv>> {
                self.reducer.get_sampler()
            }

            fn value_to_f64(value: &T) -> Option<f64> {
                $crate::metrics::Reducible::as_f64(value)
            }
        }

        impl<T> $crate::variable::Exposable for $wrapper<T>
        where
            T: $bound + ::std::fmt::Display,
            $op: $crate::combiner::ReduceOp<T>,
            $inv: $crate::combiner::InverseOp<T>,
        {
            fn expose_slot(&self) -> &$crate::variable::ExposeSlot {
                $crate::variable::Exposable::expose_slot(&self.reducer)
            }

            fn variable(&self) -> ::std::sync::Weak<dyn $crate::variable::Variable> {
                $crate::variable::Exposable::variable(&self.reducer)
            }

            fn on_exposed(&self) {
                $crate::variable::Exposable::on_exposed(&self.reducer);
            }
        }
    };
}

pub(crate) use reducer_wrapper;
