//! The process-wide sampler thread.

use crate::combiner::{AgentCombiner, Fold};
use crate::core::{config, Result, TallyError};
use crate::sampler::SamplerSlot;
use once_cell::sync::Lazy;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Concatenates per-thread lists of newly scheduled samplers.
pub(crate) struct SlotListFold;

impl Fold for SlotListFold {
    type Result = Vec<Arc<SamplerSlot>>;
    type Element = Mutex<Vec<Arc<SamplerSlot>>>;

    fn identity(&self) -> Self::Result {
        Vec::new()
    }

    fn new_element(&self) -> Self::Element {
        Mutex::new(Vec::new())
    }

    fn fold(&self, acc: &mut Self::Result, element: &Self::Element) {
        acc.extend(element.lock().iter().map(Arc::clone));
    }

    fn take(&self, acc: &mut Self::Result, element: &Self::Element) {
        acc.append(&mut element.lock());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Never started; the first registration starts the thread
    Idle,
    Running,
    /// Stop requested, or stopped by `shutdown`
    Stopped,
}

/// Owns the sampler thread and the queue of new registrations.
pub struct SamplerCollector {
    pending: AgentCombiner<SlotListFold>,
    phase: Mutex<Phase>,
    wakeup: Condvar,
    worker: Mutex<Option<JoinHandle<()>>>,
    live_samplers: AtomicUsize,
    cumulated_us: AtomicU64,
    rounds: AtomicU64,
}

static COLLECTOR: Lazy<SamplerCollector> = Lazy::new(SamplerCollector::new);

/// The process-wide collector.
pub fn collector() -> &'static SamplerCollector {
    &COLLECTOR
}

impl SamplerCollector {
    fn new() -> Self {
        Self {
            pending: AgentCombiner::new(SlotListFold),
            phase: Mutex::new(Phase::Idle),
            wakeup: Condvar::new(),
            worker: Mutex::new(None),
            live_samplers: AtomicUsize::new(0),
            cumulated_us: AtomicU64::new(0),
            rounds: AtomicU64::new(0),
        }
    }

    /// Queue `slot` for the next pass. Starts the thread on first use.
    pub(crate) fn register(&'static self, slot: Arc<SamplerSlot>) {
        self.pending
            .with_tls_agent(|agent| agent.element().lock().push(slot));
        if *self.phase.lock() == Phase::Idle {
            if let Err(e) = self.start() {
                tracing::error!(error = %e, "failed to start sampler thread");
            }
        }
    }

    /// Start the sampler thread if it is not running.
    pub fn start(&'static self) -> Result<()> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Ok(());
        }
        *self.phase.lock() = Phase::Running;
        let handle = std::thread::Builder::new()
            .name("tally_sampler".to_string())
            .spawn(move || self.run())
            .map_err(|e| {
                *self.phase.lock() = Phase::Stopped;
                TallyError::sampler(format!("failed to spawn sampler thread: {}", e))
            })?;
        *worker = Some(handle);
        tracing::info!("sampler thread started");
        Ok(())
    }

    /// Request a stop and join the thread.
    pub fn shutdown(&self) {
        let handle = self.worker.lock().take();
        *self.phase.lock() = Phase::Stopped;
        self.wakeup.notify_all();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("sampler thread panicked during shutdown");
            }
            tracing::info!("sampler thread stopped");
        }
    }

    /// Forget the worker inherited from the parent process and start anew.
    pub fn reinit_after_fork(&'static self) -> Result<()> {
        // The JoinHandle refers to a thread that does not exist in the child.
        drop(self.worker.lock().take());
        *self.phase.lock() = Phase::Idle;
        self.start()
    }

    /// True while the thread is running.
    pub fn is_running(&self) -> bool {
        let phase = *self.phase.lock();
        phase == Phase::Running && self.worker.lock().is_some()
    }

    /// Samplers visited on the last pass.
    pub fn sampler_count(&self) -> usize {
        self.live_samplers.load(Ordering::Relaxed)
    }

    /// Total time spent sampling since the process started.
    pub fn cumulated_time(&self) -> Duration {
        Duration::from_micros(self.cumulated_us.load(Ordering::Relaxed))
    }

    /// Completed sampling passes.
    pub fn rounds(&self) -> u64 {
        self.rounds.load(Ordering::Relaxed)
    }

    /// Sleep until `deadline` or a stop request. False means stop.
    fn wait_until(&self, deadline: Instant) -> bool {
        let mut phase = self.phase.lock();
        while *phase == Phase::Running {
            if self.wakeup.wait_until(&mut phase, deadline).timed_out() {
                break;
            }
        }
        *phase == Phase::Running
    }

    fn run(&self) {
        let start_delay = config::current().sampler.start_delay;
        if !self.wait_until(Instant::now() + start_delay) {
            return;
        }

        let mut samplers: Vec<Arc<SamplerSlot>> = Vec::new();
        let mut consecutive_nosleep = 0u32;
        let mut deadline = Instant::now();

        loop {
            let round_start = Instant::now();
            let mut fresh = self.pending.reset_all_agents();
            samplers.append(&mut fresh);
            samplers.retain(|slot| slot.sample());

            self.live_samplers.store(samplers.len(), Ordering::Relaxed);
            let spent = u64::try_from(round_start.elapsed().as_micros()).unwrap_or(u64::MAX);
            self.cumulated_us.fetch_add(spent, Ordering::Relaxed);
            self.rounds.fetch_add(1, Ordering::Relaxed);

            let interval = config::current().sampler.interval;
            deadline += interval;
            let now = Instant::now();
            if now >= deadline {
                consecutive_nosleep += 1;
                if consecutive_nosleep >= 2 {
                    consecutive_nosleep = 0;
                    tracing::warn!(
                        samplers = samplers.len(),
                        "sampler is busy, sampling takes longer than the interval"
                    );
                }
                deadline = now;
                if *self.phase.lock() != Phase::Running {
                    break;
                }
            } else {
                consecutive_nosleep = 0;
                if !self.wait_until(deadline) {
                    break;
                }
            }
        }
        tracing::debug!(samplers = samplers.len(), "sampler thread exiting");
        // Hand live samplers back so a restarted thread picks them up.
        self.pending
            .with_tls_agent(|agent| agent.element().lock().append(&mut samplers));
    }
}
