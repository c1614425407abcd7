//! Common test utilities and fixtures.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Once;
use std::time::{Duration, Instant};
use tally::core::{config, ConfigBuilder};

/// Sampling period used by tests that need the real sampler thread.
pub const FAST_INTERVAL: Duration = Duration::from_millis(20);

static FAST_SAMPLING: Once = Once::new();

/// Switch this test binary to a short sampling period.
///
/// Must run before the first sampler is scheduled, so every test in a binary
/// that relies on real sampling calls it first.
pub fn fast_sampling() {
    FAST_SAMPLING.call_once(|| {
        let config = ConfigBuilder::new()
            .start_delay(Duration::from_millis(1))
            .sampling_interval(FAST_INTERVAL)
            .build()
            .unwrap();
        config::install(config).unwrap();
    });
}

/// Variable name unique within the test process.
pub fn unique_name(prefix: &str) -> String {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    format!("{}_{}", prefix, NEXT.fetch_add(1, Ordering::Relaxed))
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Sleep for `periods` sampling periods of [`FAST_INTERVAL`].
pub fn sleep_periods(periods: u32) {
    std::thread::sleep(FAST_INTERVAL * periods);
}
