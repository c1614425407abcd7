//! Ring of periodic snapshots behind every window.

use crate::combiner::{InverseOp, ReduceOp};
use crate::core::clock::monotonic_us;
use crate::sampler::{schedule, Sampler, SamplerHandle};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// A value and the monotonic time it was taken at.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    /// Sampled value
    pub data: T,
    /// Microseconds on the process-monotonic clock
    pub time_us: i64,
}

type Source<T> = Box<dyn Fn() -> Option<T> + Send + Sync>;

/// Stores one snapshot of a base metric per sampling period.
///
/// With an inverse operation each snapshot is the cumulative value and a
/// window is `latest inv_op oldest`. Without one, the source resets the base
/// on every sample, so each snapshot is a per-period delta and a window folds
/// the most recent ones with `op`.
pub struct ReducerSampler<T, Op, InvOp> {
    source: Source<T>,
    op: Op,
    inv_op: InvOp,
    ring: Mutex<SampleRing<T>>,
}

struct SampleRing<T> {
    samples: VecDeque<Sample<T>>,
    capacity: usize,
}

impl<T, Op, InvOp> ReducerSampler<T, Op, InvOp>
where
    T: Clone + Send + Sync + 'static,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    /// Build a sampler fed by `source`. `None` from the source skips a period.
    pub fn new<S>(source: S, op: Op, inv_op: InvOp) -> Self
    where
        S: Fn() -> Option<T> + Send + Sync + 'static,
    {
        Self {
            source: Box::new(source),
            op,
            inv_op,
            ring: Mutex::new(SampleRing {
                samples: VecDeque::with_capacity(2),
                capacity: 2,
            }),
        }
    }

    /// Make room for windows up to `window` periods. Never shrinks.
    pub fn set_window_size(&self, window: usize) {
        let wanted = window.max(1) + 1;
        let mut ring = self.ring.lock();
        if wanted > ring.capacity {
            ring.capacity = wanted;
        }
    }

    /// Largest window this ring can answer.
    pub fn window_size(&self) -> usize {
        self.ring.lock().capacity - 1
    }

    /// Snapshots currently held.
    pub fn len(&self) -> usize {
        self.ring.lock().samples.len()
    }

    /// True before the first snapshot.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The combining operation.
    pub fn op(&self) -> &Op {
        &self.op
    }

    /// Value over the last `window` periods, `None` before two snapshots exist.
    pub fn get_value(&self, window: usize) -> Option<T> {
        self.get_span(window).map(|span| span.data)
    }

    /// Like [`ReducerSampler::get_value`], with the elapsed time between the
    /// snapshots that bound the window.
    pub fn get_span(&self, window: usize) -> Option<Sample<T>> {
        let ring = self.ring.lock();
        let len = ring.samples.len();
        if len < 2 {
            return None;
        }
        let window = window.clamp(1, ring.capacity - 1);
        let latest = &ring.samples[len - 1];
        // Entry `window` periods before the latest, or the oldest one held.
        let oldest_index = (len - 1).saturating_sub(window);
        let oldest = &ring.samples[oldest_index];

        let mut data = latest.data.clone();
        if InvOp::EXISTS {
            self.inv_op.apply(&mut data, &oldest.data);
        } else {
            // Each entry is a delta; fold every entry newer than the boundary,
            // or all of them when history is shorter than the window.
            let first = if len - 1 < window { 0 } else { oldest_index + 1 };
            for sample in ring.samples.range(first..len - 1) {
                self.op.apply(&mut data, &sample.data);
            }
        }
        Some(Sample {
            data,
            time_us: latest.time_us - oldest.time_us,
        })
    }

    /// The raw snapshots of the last `window` periods, oldest first.
    pub fn get_samples(&self, window: usize) -> Vec<T> {
        let ring = self.ring.lock();
        let len = ring.samples.len();
        let take = window.min(len);
        ring.samples
            .range(len - take..)
            .map(|sample| sample.data.clone())
            .collect()
    }
}

impl<T, Op, InvOp> Sampler for ReducerSampler<T, Op, InvOp>
where
    T: Clone + Send + Sync + 'static,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    fn take_sample(&self) {
        let Some(data) = (self.source)() else {
            return;
        };
        let sample = Sample {
            data,
            time_us: monotonic_us(),
        };
        let mut ring = self.ring.lock();
        ring.samples.push_back(sample);
        while ring.samples.len() > ring.capacity {
            ring.samples.pop_front();
        }
    }
}

/// Lazily scheduled sampler owned by a base metric.
///
/// All windows over the same base share the sampler created here. Dropping
/// the cell unschedules it.
pub struct SamplerCell<T, Op, InvOp> {
    cell: OnceCell<(Arc<ReducerSampler<T, Op, InvOp>>, SamplerHandle)>,
}

impl<T, Op, InvOp> Default for SamplerCell<T, Op, InvOp> {
    fn default() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }
}

impl<T, Op, InvOp> SamplerCell<T, Op, InvOp>
where
    T: Clone + Send + Sync + 'static,
    Op: ReduceOp<T>,
    InvOp: InverseOp<T>,
{
    /// The sampler, created by `make` and scheduled on first call.
    pub fn get_or_schedule(
        &self,
        make: impl FnOnce() -> ReducerSampler<T, Op, InvOp>,
    ) -> Arc<ReducerSampler<T, Op, InvOp>> {
        let (sampler, _) = self.cell.get_or_init(|| {
            let sampler = Arc::new(make());
            let handle = schedule(Arc::clone(&sampler) as Arc<dyn Sampler>);
            (sampler, handle)
        });
        Arc::clone(sampler)
    }

    /// True once a window asked for the sampler.
    pub fn is_scheduled(&self) -> bool {
        self.cell.get().is_some()
    }
}
