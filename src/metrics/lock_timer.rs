//! Mutex that records how long each acquisition waited.

use crate::metrics::stopwatch::{Stopwatch, StopwatchRecorder};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;

/// A [`parking_lot::Mutex`] paired with a recorder.
///
/// Every successful `lock` or `try_lock` records the time spent acquiring
/// it, so one sample lands per acquisition. With a [`LatencyRecorder`] the
/// recorder's qps is the acquisition rate and its latency is the wait.
///
/// [`LatencyRecorder`]: crate::metrics::LatencyRecorder
pub struct TimedMutex<T, R: StopwatchRecorder> {
    mutex: Mutex<T>,
    recorder: R,
}

impl<T, R: StopwatchRecorder> TimedMutex<T, R> {
    /// Unlocked mutex around `value`.
    pub fn new(value: T, recorder: R) -> Self {
        Self {
            mutex: Mutex::new(value),
            recorder,
        }
    }

    /// Block until locked, recording the wait.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        let timer = Stopwatch::start(&self.recorder);
        let guard = self.mutex.lock();
        timer.stop();
        guard
    }

    /// Records only when the lock was taken.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let timer = Stopwatch::start(&self.recorder);
        match self.mutex.try_lock() {
            Some(guard) => {
                timer.stop();
                Some(guard)
            }
            None => {
                timer.cancel();
                None
            }
        }
    }

    /// Where waits are recorded.
    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Mutable access needs no locking, so nothing is recorded.
    pub fn get_mut(&mut self) -> &mut T {
        self.mutex.get_mut()
    }

    /// Consume the mutex, returning the value.
    pub fn into_inner(self) -> T {
        self.mutex.into_inner()
    }
}

impl<T: fmt::Debug, R: StopwatchRecorder> fmt::Debug for TimedMutex<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedMutex").field("mutex", &self.mutex).finish()
    }
}
