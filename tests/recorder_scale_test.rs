//! Recorders keep the scale factor they were created with.

mod common;

use common::wait_for;
use std::time::Duration;
use tally::core::{config, ConfigBuilder};
use tally::LatencyRecorder;

// Installs process-wide configuration, so it lives alone in this binary.
#[test]
fn test_scale_factor_fixed_at_creation() {
    let nanos = ConfigBuilder::new()
        .sampling_interval(Duration::from_millis(20))
        .latency_scale_factor(1_000)
        .build()
        .unwrap();
    config::install(nanos).unwrap();
    let recorder = LatencyRecorder::with_window(50);

    let plain = ConfigBuilder::new()
        .sampling_interval(Duration::from_millis(20))
        .build()
        .unwrap();
    config::install(plain).unwrap();
    let unscaled = LatencyRecorder::with_window(50);

    recorder.record(5_000);
    recorder.record(7_000);
    unscaled.record(7_000);

    assert_eq!(recorder.count(), 2);
    // Reads are windowed; wait until the sampler has caught up with the writes.
    assert!(wait_for(Duration::from_secs(3), || {
        recorder.max_latency() == 7
            && recorder.latency_percentile(1.0) == 7
            && unscaled.max_latency() == 7_000
    }));
}
