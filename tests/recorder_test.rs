//! Latency recorder fed from several threads and sampled by the real thread.

mod common;

use common::{fast_sampling, unique_name, wait_for, FAST_INTERVAL};
use pretty_assertions::assert_eq;
use std::thread;
use std::time::{Duration, Instant};
use tally::variable::{describe_exposed, list_exposed};
use tally::LatencyRecorder;

#[test]
fn test_recorder_statistics() {
    fast_sampling();
    let recorder = LatencyRecorder::with_window(100);
    thread::scope(|s| {
        for t in 0..4 {
            let recorder = recorder.clone();
            s.spawn(move || {
                for v in 1..=250 {
                    recorder.record(t * 250 + v);
                }
            });
        }
    });
    assert_eq!(recorder.count(), 1_000);

    // Wait until the window holds what was recorded.
    assert!(wait_for(Duration::from_secs(3), || {
        recorder.latency_percentile(0.5) > 0 && recorder.max_latency() == 1_000
    }));
    // Averages are deltas of cumulative stats, so depending on when the
    // first sample was taken the window may have seen none of the records.
    assert!((0..=1_000).contains(&recorder.latency()));

    let p50 = recorder.latency_percentile(0.5);
    assert!((480..=520).contains(&p50), "p50 = {}", p50);
    let p99 = recorder.latency_percentile(0.99);
    assert!((970..=1_000).contains(&p99), "p99 = {}", p99);

    let [p80, p90, p99_cfg, p999, p9999] = recorder.latency_percentiles();
    assert!(p80 <= p90 && p90 <= p99_cfg && p99_cfg <= p999 && p999 <= p9999);

    let cdf = recorder.latency_cdf();
    assert_eq!(cdf.len(), 20);
    assert!(cdf.windows(2).all(|pair| pair[0].1 <= pair[1].1));
}

#[test]
fn test_recorder_qps_tracks_rate() {
    fast_sampling();
    let recorder = LatencyRecorder::with_window(10);
    assert_eq!(recorder.qps(), 0);

    // About 500 records per second for a little over one window.
    let started = Instant::now();
    while started.elapsed() < FAST_INTERVAL * 15 {
        recorder.record(100);
        thread::sleep(Duration::from_millis(2));
    }
    let qps = recorder.qps();
    assert!(qps > 50, "qps = {}", qps);
    assert!(qps < 1_000, "qps = {}", qps);
}

#[test]
fn test_recorder_exposed_names() {
    fast_sampling();
    let prefix = unique_name("recorder_api");
    let recorder = LatencyRecorder::new();
    recorder.expose(&format!("{}_latency", prefix), "rpc").unwrap();
    recorder.record(40);

    let names = list_exposed(Some(&format!("{}_*", prefix))).unwrap();
    let suffixes: Vec<&str> = names
        .iter()
        .map(|n| &n[prefix.len() + 1..])
        .collect();
    assert_eq!(
        suffixes,
        vec![
            "count",
            "latency",
            "latency_80",
            "latency_90",
            "latency_99",
            "latency_999",
            "latency_9999",
            "latency_cdf",
            "latency_percentiles",
            "max_latency",
            "qps",
        ]
    );
    assert_eq!(recorder.latency_name(), Some(format!("{}_latency", prefix)));
    assert_eq!(describe_exposed(&format!("{}_count", prefix), false).unwrap(), "1");

    recorder.hide();
    assert!(list_exposed(Some(&format!("{}_*", prefix))).unwrap().is_empty());
}
