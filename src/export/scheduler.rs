//! Background thread that reports every exposed variable periodically.

use crate::core::{config, Result, TallyError};
use crate::export::StatsReporter;
use crate::variable::report;
use parking_lot::{Condvar, Mutex};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

type Sink = Box<dyn FnMut(String) + Send>;

struct StopSignal {
    stopped: Mutex<bool>,
    wakeup: Condvar,
}

/// Runs [`report`] every `report.dump_interval` and hands the output to a sink.
pub struct ReportScheduler {
    reporter: Option<Box<dyn StatsReporter + Send>>,
    sink: Option<Sink>,
    interval: Duration,
    signal: Arc<StopSignal>,
    worker: Option<JoinHandle<(Box<dyn StatsReporter + Send>, Sink)>>,
}

impl ReportScheduler {
    /// Scheduler using the configured dump interval.
    pub fn new<F>(reporter: Box<dyn StatsReporter + Send>, sink: F) -> Self
    where
        F: FnMut(String) + Send + 'static,
    {
        Self::with_interval(reporter, sink, config::current().report.dump_interval)
    }

    /// Scheduler reporting every `interval`.
    pub fn with_interval<F>(reporter: Box<dyn StatsReporter + Send>, sink: F, interval: Duration) -> Self
    where
        F: FnMut(String) + Send + 'static,
    {
        Self {
            reporter: Some(reporter),
            sink: Some(Box::new(sink)),
            interval,
            signal: Arc::new(StopSignal {
                stopped: Mutex::new(false),
                wakeup: Condvar::new(),
            }),
            worker: None,
        }
    }

    /// Whether the worker thread is up.
    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    /// Start the reporting thread.
    pub fn start(&mut self) -> Result<()> {
        if self.worker.is_some() {
            return Ok(());
        }
        if self.interval.is_zero() {
            return Err(TallyError::config("dump interval must be positive"));
        }
        let (Some(mut reporter), Some(mut sink)) = (self.reporter.take(), self.sink.take()) else {
            return Err(TallyError::unavailable("reporter already consumed"));
        };
        *self.signal.stopped.lock() = false;
        let signal = Arc::clone(&self.signal);
        let interval = self.interval;

        let handle = std::thread::Builder::new()
            .name("tally_reporter".to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    {
                        let mut stopped = signal.stopped.lock();
                        while !*stopped {
                            if signal.wakeup.wait_until(&mut stopped, deadline).timed_out() {
                                break;
                            }
                        }
                        if *stopped {
                            break;
                        }
                    }
                    let state = report(reporter.as_mut(), SystemTime::now());
                    tracing::debug!(total = state.total, "periodic report");
                    sink(reporter.take_output());
                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        deadline = now + interval;
                    }
                }
                (reporter, sink)
            })
            .map_err(|e| TallyError::sampler(format!("failed to spawn reporter thread: {}", e)))?;
        self.worker = Some(handle);
        tracing::info!(interval = ?self.interval, "report scheduler started");
        Ok(())
    }

    /// Stop and join the thread. The reporter is kept for a later `start`.
    pub fn stop(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        *self.signal.stopped.lock() = true;
        self.signal.wakeup.notify_all();
        match handle.join() {
            Ok((reporter, sink)) => {
                self.reporter = Some(reporter);
                self.sink = Some(sink);
            }
            Err(_) => tracing::error!("reporter thread panicked"),
        }
        tracing::info!("report scheduler stopped");
    }
}

impl Drop for ReportScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
