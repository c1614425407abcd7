//! Periodic sampling driven by one background thread.
//!
//! A metric that needs history implements [`Sampler`] and hands it to
//! [`schedule`]. Registration goes through a thread-local combiner and never
//! touches a global lock; the collector thread drains new registrations once
//! per period and calls [`Sampler::take_sample`] on every live sampler.
//!
//! Dropping the returned [`SamplerHandle`] only marks the sampler unused. The
//! collector thread is the one that lets go of it, so a `take_sample` in
//! flight never races with its owner going away.

pub mod collector;
pub mod reducer_sampler;
pub mod series;

pub use collector::{collector, SamplerCollector};
pub use reducer_sampler::{ReducerSampler, Sample, SamplerCell};
pub use series::{Series, SeriesOptions, SeriesSampler};

use crate::core::{config, Result};
use parking_lot::ReentrantMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Something the collector thread visits once per sampling period.
///
/// Implementations must not block for long: every sampler shares one thread.
/// A panic is caught and logged, and the sampler stays scheduled.
pub trait Sampler: Send + Sync + 'static {
    /// Record one snapshot.
    fn take_sample(&self);
}

/// Collector-side node wrapping a scheduled sampler.
///
/// `guard` is held for the whole of `take_sample`, so `destroy` from another
/// thread waits for a sample in flight. It is reentrant because the last
/// owner of a metric can go away inside `take_sample`, and the metric's drop
/// then destroys this slot from the collector thread itself.
pub(crate) struct SamplerSlot {
    guard: ReentrantMutex<()>,
    used: AtomicBool,
    sampler: Arc<dyn Sampler>,
}

impl SamplerSlot {
    fn new(sampler: Arc<dyn Sampler>) -> Self {
        Self {
            guard: ReentrantMutex::new(()),
            used: AtomicBool::new(true),
            sampler,
        }
    }

    /// Sample once; false means the slot was destroyed and should be reaped.
    pub(crate) fn sample(&self) -> bool {
        let _guard = self.guard.lock();
        if !self.used.load(Ordering::Acquire) {
            return false;
        }
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            self.sampler.take_sample();
        }));
        if let Err(panic) = outcome {
            tracing::error!(reason = %panic_message(panic.as_ref()), "sampler panicked, skipping");
        }
        true
    }

    fn destroy(&self) {
        let _guard = self.guard.lock();
        self.used.store(false, Ordering::Release);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Owner's side of a scheduled sampler. Dropping it requests destruction.
#[must_use = "dropping the handle unschedules the sampler"]
pub struct SamplerHandle {
    slot: Option<Arc<SamplerSlot>>,
}

impl SamplerHandle {
    /// Handle that was never scheduled, used when sampling is disabled.
    pub fn inert() -> Self {
        Self { slot: None }
    }

    /// True while the sampler is scheduled.
    pub fn is_scheduled(&self) -> bool {
        self.slot
            .as_ref()
            .map_or(false, |slot| slot.used.load(Ordering::Acquire))
    }

    /// Mark the sampler unused. The collector thread reaps it on its next pass.
    pub fn destroy(&mut self) {
        if let Some(slot) = self.slot.take() {
            slot.destroy();
        }
    }
}

impl Drop for SamplerHandle {
    fn drop(&mut self) {
        self.destroy();
    }
}

impl std::fmt::Debug for SamplerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SamplerHandle")
            .field("scheduled", &self.is_scheduled())
            .finish()
    }
}

/// Register `sampler` with the collector thread.
///
/// Returns an inert handle when sampling is disabled in the configuration.
pub fn schedule(sampler: Arc<dyn Sampler>) -> SamplerHandle {
    if !config::current().sampler.enable_sampling {
        tracing::debug!("sampling disabled, sampler not scheduled");
        return SamplerHandle::inert();
    }
    let slot = Arc::new(SamplerSlot::new(sampler));
    collector().register(Arc::clone(&slot));
    SamplerHandle { slot: Some(slot) }
}

/// Start the collector thread. Idempotent.
pub fn init() -> Result<()> {
    collector().start()
}

/// Stop and join the collector thread.
///
/// Scheduled samplers are kept; a later [`init`] resumes sampling them.
pub fn shutdown() {
    collector().shutdown();
}

/// Restart the collector in a forked child, where the worker thread is gone.
///
/// Meant to be called from an at-fork child handler.
pub fn reinit_after_fork() -> Result<()> {
    collector().reinit_after_fork()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct CountingSampler {
        calls: AtomicUsize,
    }

    impl Sampler for CountingSampler {
        fn take_sample(&self) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
    }

    struct PanickingSampler;

    impl Sampler for PanickingSampler {
        fn take_sample(&self) {
            panic!("boom");
        }
    }

    #[test]
    fn test_slot_samples_until_destroyed() {
        let sampler = Arc::new(CountingSampler {
            calls: AtomicUsize::new(0),
        });
        let slot = SamplerSlot::new(Arc::clone(&sampler) as Arc<dyn Sampler>);

        assert!(slot.sample());
        assert!(slot.sample());
        assert_eq!(sampler.calls.load(Ordering::Relaxed), 2);

        slot.destroy();
        assert!(!slot.sample());
        assert_eq!(sampler.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn test_panicking_sampler_stays_alive() {
        let slot = SamplerSlot::new(Arc::new(PanickingSampler));
        assert!(slot.sample());
        assert!(slot.sample());
    }

    #[test]
    fn test_handle_destroy_marks_slot() {
        let slot = Arc::new(SamplerSlot::new(Arc::new(PanickingSampler)));
        let mut handle = SamplerHandle {
            slot: Some(Arc::clone(&slot)),
        };
        assert!(handle.is_scheduled());
        handle.destroy();
        assert!(!handle.is_scheduled());
        assert!(!slot.sample());
    }

    struct SelfDestroying {
        slot: Mutex<Option<std::sync::Weak<SamplerSlot>>>,
        calls: AtomicUsize,
    }

    impl Sampler for SelfDestroying {
        fn take_sample(&self) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if let Some(slot) = self.slot.lock().take().and_then(|weak| weak.upgrade()) {
                slot.destroy();
            }
        }
    }

    #[test]
    fn test_destroy_from_inside_take_sample() {
        let sampler = Arc::new(SelfDestroying {
            slot: Mutex::new(None),
            calls: AtomicUsize::new(0),
        });
        let slot = Arc::new(SamplerSlot::new(Arc::clone(&sampler) as Arc<dyn Sampler>));
        *sampler.slot.lock() = Some(Arc::downgrade(&slot));

        assert!(slot.sample());
        assert!(!slot.sample());
        assert_eq!(sampler.calls.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_inert_handle() {
        let handle = SamplerHandle::inert();
        assert!(!handle.is_scheduled());
    }
}
