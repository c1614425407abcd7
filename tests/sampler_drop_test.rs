//! Metrics dropped while the sampler thread is visiting them.

mod common;

use common::{fast_sampling, sleep_periods, wait_for};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tally::sampler::{self, Sampler};
use tally::{FuncGauge, Window};

#[derive(Default)]
struct CountingSampler {
    calls: AtomicUsize,
}

impl Sampler for CountingSampler {
    fn take_sample(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }
}

#[test]
fn test_drop_last_handle_during_take_sample() {
    fast_sampling();

    let in_sample = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&in_sample);
    let gauge: FuncGauge = FuncGauge::new(move || {
        flag.store(true, Ordering::Release);
        thread::sleep(Duration::from_millis(100));
        1
    });
    let window = Window::new(&gauge, 2);

    // Drop every handle while the collector is inside the gauge's closure,
    // so the gauge is freed on the collector thread.
    assert!(wait_for(Duration::from_secs(3), || in_sample.load(Ordering::Acquire)));
    drop(window);
    drop(gauge);
    thread::sleep(Duration::from_millis(150));

    let collector = sampler::collector();
    let before = collector.rounds();
    sleep_periods(10);
    assert!(collector.rounds() > before, "collector stopped after the drop");

    // Samplers scheduled afterwards are still visited.
    let counting = Arc::new(CountingSampler::default());
    let _handle = sampler::schedule(Arc::clone(&counting) as Arc<dyn Sampler>);
    assert!(wait_for(Duration::from_secs(2), || {
        counting.calls.load(Ordering::Relaxed) >= 2
    }));
}

#[test]
fn test_drop_while_sampled_from_many_threads() {
    fast_sampling();
    let counting = Arc::new(CountingSampler::default());
    let _handle = sampler::schedule(Arc::clone(&counting) as Arc<dyn Sampler>);

    thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                for i in 0..20i64 {
                    let gauge: FuncGauge = FuncGauge::new(move || i);
                    let window = Window::new(&gauge, 3);
                    thread::sleep(Duration::from_millis(3));
                    drop(window);
                }
            });
        }
    });

    let seen = counting.calls.load(Ordering::Relaxed);
    assert!(wait_for(Duration::from_secs(2), || {
        counting.calls.load(Ordering::Relaxed) > seen + 2
    }));
}
