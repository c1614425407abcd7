//! Running average of recorded values.
//!
//! Each thread keeps its sum and count packed into one 64-bit word so that a
//! record is a single compare-and-swap:
//!
//! ```text
//! | num: 20 bits | sum: 44 bits, two's complement |
//! ```
//!
//! When either field would overflow, the thread commits its word into the
//! combiner and starts again from zero.

use crate::combiner::{AddTo, AgentCombiner, AtomicElement, ElementCell, Fold, InverseOp, MinusFrom, ReduceOp, SeriesFold};
use crate::core::Result;
use crate::sampler::{ReducerSampler, SamplerCell, SamplerHandle, SeriesOptions, SeriesSampler};
use crate::variable::{Exposable, ExposeSlot, MetricSample, Variable, VariableKind};
use crate::window::{attach_series, describe_series_slot, Windowable};
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// Sum and count of recorded values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stat {
    /// Total of recorded values.
    pub sum: i64,
    /// How many values were recorded.
    pub num: i64,
}

impl Stat {
    /// Stat from raw parts.
    pub fn new(sum: i64, num: i64) -> Self {
        Self { sum, num }
    }

    /// Integer average, 0 when empty.
    pub fn average_int(&self) -> i64 {
        if self.num == 0 {
            0
        } else {
            self.sum / self.num
        }
    }

    /// Average, 0.0 when empty.
    #[allow(clippy::cast_precision_loss)]
    pub fn average_double(&self) -> f64 {
        if self.num == 0 {
            0.0
        } else {
            self.sum as f64 / self.num as f64
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.average_int())
    }
}

impl ReduceOp<Stat> for AddTo {
    #[inline]
    fn apply(&self, lhs: &mut Stat, rhs: &Stat) {
        lhs.sum = lhs.sum.wrapping_add(rhs.sum);
        lhs.num = lhs.num.wrapping_add(rhs.num);
    }
}

impl InverseOp<Stat> for MinusFrom {
    #[inline]
    fn apply(&self, lhs: &mut Stat, rhs: &Stat) {
        lhs.sum = lhs.sum.wrapping_sub(rhs.sum);
        lhs.num = lhs.num.wrapping_sub(rhs.num);
    }
}

/// Packed per-thread word.
pub mod codec {
    /// Bits of the packed word holding the sum.
    pub const SUM_BIT_WIDTH: u32 = 44;
    /// Largest raw sum field.
    pub const MAX_SUM_PER_THREAD: u64 = (1 << SUM_BIT_WIDTH) - 1;
    /// Most values one thread packs before flushing.
    pub const MAX_NUM_PER_THREAD: u64 = (1 << (64 - SUM_BIT_WIDTH)) - 1;

    const SUM_SIGN_BIT: u64 = 1 << (SUM_BIT_WIDTH - 1);
    const SIGN_EXTENSION: u64 = (1 << (64 - SUM_BIT_WIDTH + 1)) - 1;
    #[allow(clippy::cast_possible_wrap)]
    const HALF_MAX_SUM: i64 = (MAX_SUM_PER_THREAD >> 1) as i64;

    /// Raw 44-bit sum field.
    #[inline]
    pub fn get_sum(n: u64) -> u64 {
        n & MAX_SUM_PER_THREAD
    }

    /// Count field.
    #[inline]
    pub fn get_num(n: u64) -> u64 {
        n >> SUM_BIT_WIDTH
    }

    /// Sign-extend a 44-bit two's complement field to 64 bits.
    #[inline]
    #[allow(clippy::cast_possible_wrap)]
    pub fn extend_sign_bit(sum: u64) -> i64 {
        ((SIGN_EXTENSION * (SUM_SIGN_BIT & sum)) | sum) as i64
    }

    /// Low 44 bits of `value`, its two's complement in the sum field.
    #[inline]
    #[allow(clippy::cast_sign_loss)]
    pub fn get_complement(value: i64) -> u64 {
        (value as u64) & MAX_SUM_PER_THREAD
    }

    /// Pack a count and a raw sum field.
    #[inline]
    pub fn compress(num: u64, sum: u64) -> u64 {
        (num << SUM_BIT_WIDTH) | (sum & MAX_SUM_PER_THREAD)
    }

    /// True when `lhs + rhs` leaves the range of the sum field.
    #[inline]
    pub fn will_overflow(lhs: i64, rhs: i64) -> bool {
        (lhs > 0 && rhs > 0 && lhs + rhs > HALF_MAX_SUM)
            || (lhs < 0 && rhs < 0 && lhs + rhs < -HALF_MAX_SUM - 1)
    }
}

use codec::{compress, extend_sign_bit, get_complement, get_num, get_sum, will_overflow, MAX_NUM_PER_THREAD};

struct StatFold;

impl Fold for StatFold {
    type Result = Stat;
    type Element = AtomicElement<u64>;

    fn identity(&self) -> Stat {
        Stat::default()
    }

    fn new_element(&self) -> AtomicElement<u64> {
        AtomicElement::new(0)
    }

    fn fold(&self, acc: &mut Stat, element: &AtomicElement<u64>) {
        add_packed(acc, element.load());
    }

    fn take(&self, acc: &mut Stat, element: &AtomicElement<u64>) {
        add_packed(acc, element.exchange(0));
    }
}

#[allow(clippy::cast_possible_wrap)]
fn add_packed(acc: &mut Stat, n: u64) {
    acc.sum += extend_sign_bit(get_sum(n));
    acc.num += get_num(n) as i64;
}

type SeriesSlot = OnceCell<(Arc<SeriesSampler>, SamplerHandle)>;

struct AverageInner {
    combiner: AgentCombiner<StatFold>,
    sampler: SamplerCell<Stat, AddTo, MinusFrom>,
    series: SeriesSlot,
    exposure: ExposeSlot,
}

/// Average of recorded integer values, e.g. latency in microseconds.
///
/// Values outside the `i32` range are clamped.
pub struct AverageGauge {
    inner: Arc<AverageInner>,
}

impl Clone for AverageGauge {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl AverageGauge {
    /// Unexposed gauge.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AverageInner {
                combiner: AgentCombiner::new(StatFold),
                sampler: SamplerCell::default(),
                series: OnceCell::new(),
                exposure: ExposeSlot::default(),
            }),
        }
    }

    /// Gauge exposed as `name`; failures are logged.
    pub fn with_name(name: &str, help: &str) -> Self {
        let gauge = Self::new();
        let _ = gauge.expose(name, help);
        gauge
    }

    /// Record one value.
    pub fn set(&self, sample: i64) {
        let sample = if sample > i64::from(i32::MAX) || sample < i64::from(i32::MIN) {
            let clamped = sample.clamp(i64::from(i32::MIN), i64::from(i32::MAX));
            tracing::warn!(sample, clamped, "average gauge input out of range");
            clamped
        } else {
            sample
        };
        self.inner.combiner.with_tls_agent(|agent| {
            let cell = agent.element();
            let complement = get_complement(sample);
            let mut n = cell.load();
            loop {
                let mut num = get_num(n);
                let mut sum = get_sum(n);
                if num + 1 > MAX_NUM_PER_THREAD || will_overflow(extend_sign_bit(sum), sample) {
                    // Flush what this thread has so far and start over.
                    agent.commit_and_clear();
                    n = 0;
                    num = 0;
                    sum = 0;
                }
                let next = compress(num + 1, sum.wrapping_add(complement));
                match cell.compare_exchange_weak(n, next) {
                    Ok(_) => break,
                    Err(actual) => n = actual,
                }
            }
        });
    }

    /// Sum and count over every thread.
    pub fn get_value(&self) -> Stat {
        self.inner.combiner.combine_agents()
    }

    /// Integer average over every thread.
    pub fn average(&self) -> i64 {
        self.get_value().average_int()
    }

    /// Average over every thread, as a float.
    pub fn average_double(&self) -> f64 {
        self.get_value().average_double()
    }

    /// Current sum and count, restarting from empty.
    pub fn reset(&self) -> Stat {
        self.inner.combiner.reset_all_agents()
    }
}

impl Default for AverageGauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Variable for AverageInner {
    fn kind(&self) -> VariableKind {
        VariableKind::Gauge
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        write!(out, "{}", self.combiner.combine_agents())
    }

    fn describe_series(&self, out: &mut dyn fmt::Write, options: &SeriesOptions) -> Result<()> {
        describe_series_slot(&self.series, out, options)
    }

    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample::scalar(
            VariableKind::Gauge,
            self.combiner.combine_agents().average_double(),
            stamp,
        )
    }
}

impl Exposable for AverageGauge {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<AverageInner> = Arc::downgrade(&self.inner);
        weak
    }

    fn on_exposed(&self) {
        let weak = Arc::downgrade(&self.inner);
        attach_series(&self.inner.series, SeriesFold::Average, move || {
            weak.upgrade()
                .map(|inner| inner.combiner.combine_agents().average_double())
        });
    }
}

impl Windowable for AverageGauge {
    type Value = Stat;
    type Op = AddTo;
    type InvOp = MinusFrom;

    fn get_value(&self) -> Stat {
        AverageGauge::get_value(self)
    }

    fn get_sampler(&self) -> Arc<ReducerSampler<Stat, AddTo, MinusFrom>> {
        self.inner.sampler.get_or_schedule(|| {
            let weak = Arc::downgrade(&self.inner);
            ReducerSampler::new(
                move || weak.upgrade().map(|inner| inner.combiner.combine_agents()),
                AddTo,
                MinusFrom,
            )
        })
    }

    fn value_to_f64(value: &Stat) -> Option<f64> {
        Some(value.average_double())
    }
}
