//! Quantile estimates over recent samples.
//!
//! Writers record into a per-thread [`PercentileSamples`]. Once a period the
//! sampler thread drains every thread into one snapshot, so a [`Window`] over
//! a [`Percentile`] merges the last N periods on read.
//!
//! [`Window`]: crate::window::Window

pub mod cdf;
pub mod samples;

pub use cdf::PercentileCdf;
pub use samples::{PercentileSamples, MAX_TRACKABLE_VALUE};

use crate::combiner::{AddTo, AgentCombiner, Fold, LockedElement, VoidOp};
use crate::sampler::{ReducerSampler, SamplerCell};
use crate::window::Windowable;
use std::sync::Arc;

/// Merges per-thread sample sets.
pub struct SamplesFold;

impl Fold for SamplesFold {
    type Result = PercentileSamples;
    type Element = LockedElement<PercentileSamples>;

    fn identity(&self) -> PercentileSamples {
        PercentileSamples::new()
    }

    fn new_element(&self) -> Self::Element {
        crate::combiner::ElementCell::new(PercentileSamples::new())
    }

    fn fold(&self, acc: &mut PercentileSamples, element: &Self::Element) {
        element.with(|samples| acc.merge(samples));
    }

    fn take(&self, acc: &mut PercentileSamples, element: &Self::Element) {
        element.with(|samples| {
            acc.merge(samples);
            samples.clear();
        });
    }
}

struct PercentileInner {
    combiner: AgentCombiner<SamplesFold>,
    sampler: SamplerCell<PercentileSamples, AddTo, VoidOp>,
}

/// Thread-local quantile recorder.
///
/// Reading it directly merges what was recorded since the sampler last
/// drained it; wrap it in a window for a fixed time span.
pub struct Percentile {
    inner: Arc<PercentileInner>,
}

impl Clone for Percentile {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Percentile {
    /// Unexposed, empty percentile.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(PercentileInner {
                combiner: AgentCombiner::new(SamplesFold),
                sampler: SamplerCell::default(),
            }),
        }
    }

    /// Record `value` on the calling thread.
    #[inline]
    pub fn record(&self, value: i64) {
        self.inner
            .combiner
            .with_tls_agent(|agent| agent.element().with(|samples| samples.add(value)));
    }

    /// Merge of every thread's pending samples.
    pub fn get_value(&self) -> PercentileSamples {
        self.inner.combiner.combine_agents()
    }

    /// Pending samples, emptying every thread.
    pub fn reset(&self) -> PercentileSamples {
        self.inner.combiner.reset_all_agents()
    }
}

impl Default for Percentile {
    fn default() -> Self {
        Self::new()
    }
}

impl Windowable for Percentile {
    type Value = PercentileSamples;
    type Op = AddTo;
    type InvOp = VoidOp;

    fn get_value(&self) -> PercentileSamples {
        Percentile::get_value(self)
    }

    fn get_sampler(&self) -> Arc<ReducerSampler<PercentileSamples, AddTo, VoidOp>> {
        self.inner.sampler.get_or_schedule(|| {
            let weak = Arc::downgrade(&self.inner);
            ReducerSampler::new(
                move || weak.upgrade().map(|inner| inner.combiner.reset_all_agents()),
                AddTo,
                VoidOp,
            )
        })
    }
}
