//! Sampler collector lifecycle with a real background thread.

mod common;

use common::{fast_sampling, sleep_periods, wait_for};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tally::sampler::{self, Sampler};

#[derive(Default)]
struct CountingSampler {
    calls: AtomicUsize,
}

impl CountingSampler {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl Sampler for CountingSampler {
    fn take_sample(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

struct PanickingSampler;

impl Sampler for PanickingSampler {
    fn take_sample(&self) {
        panic!("sampler failure");
    }
}

// One test drives the whole lifecycle: shutdown is process-wide.
#[test]
fn test_collector_lifecycle() {
    fast_sampling();

    let counting = Arc::new(CountingSampler::default());
    let mut handle = sampler::schedule(Arc::clone(&counting) as Arc<dyn Sampler>);
    let _panicking = sampler::schedule(Arc::new(PanickingSampler));
    assert!(handle.is_scheduled());

    // Scheduled samplers are visited once per period, and a panicking
    // neighbour does not stop the scan.
    assert!(wait_for(Duration::from_secs(2), || counting.calls() >= 3));

    // Stopped collector: no more visits.
    sampler::shutdown();
    assert!(!sampler::collector().is_running());
    let frozen = counting.calls();
    sleep_periods(4);
    assert_eq!(counting.calls(), frozen);

    // Restarted collector resumes the samplers it already had.
    sampler::init().unwrap();
    sampler::init().unwrap();
    assert!(wait_for(Duration::from_secs(2), || counting.calls() > frozen));

    // Destroyed samplers are skipped and reaped.
    handle.destroy();
    assert!(!handle.is_scheduled());
    sleep_periods(2);
    let after_destroy = counting.calls();
    sleep_periods(4);
    assert_eq!(counting.calls(), after_destroy);

    let collector = sampler::collector();
    assert!(collector.is_running());
    assert!(collector.rounds() > 0);
}
