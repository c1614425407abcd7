//! Combiner-backed reducers under concurrent writers.

mod common;

use std::sync::{Arc, Barrier};
use std::thread;
use tally::combiner::{AddTo, MaxTo, MinTo, MinusFrom, VoidOp};
use tally::{Counter, MaxerGauge, MinerGauge, Reducer};

#[test]
fn test_counter_eight_threads() {
    let counter: Counter = Counter::new();
    thread::scope(|s| {
        for _ in 0..8 {
            let counter = counter.clone();
            s.spawn(move || {
                for _ in 0..10_000 {
                    counter.increment();
                }
            });
        }
    });
    assert_eq!(counter.get_value(), 80_000);
}

#[test]
fn test_values_survive_thread_exit() {
    let counter: Counter = Counter::new();
    let handles: Vec<_> = (0..6)
        .map(|i| {
            let counter = counter.clone();
            thread::spawn(move || counter.increment_by(i))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
    assert_eq!(counter.reducer().agent_count(), 0);
    assert_eq!(counter.get_value(), 15);
}

#[test]
fn test_order_independent_fold() {
    // Random values split across threads in random order fold to the same
    // sum, max and min as a sequential pass.
    let mut rng = fastrand::Rng::with_seed(0x7a11);
    let values: Vec<i64> = (0..4_000).map(|_| rng.i64(-1_000_000..1_000_000)).collect();
    let expected_sum: i64 = values.iter().sum();
    let expected_max = *values.iter().max().unwrap();
    let expected_min = *values.iter().min().unwrap();

    for round in 0..4 {
        let mut shuffled = values.clone();
        rng.shuffle(&mut shuffled);
        let threads = 2 + round;
        let adder: Reducer<i64, AddTo, MinusFrom> = Reducer::new(0, AddTo, MinusFrom);
        let maxer: MaxerGauge = MaxerGauge::new();
        let miner: MinerGauge = MinerGauge::new();

        thread::scope(|s| {
            for chunk in shuffled.chunks(shuffled.len() / threads + 1) {
                let (adder, maxer, miner) = (adder.clone(), maxer.clone(), miner.clone());
                s.spawn(move || {
                    for &v in chunk {
                        adder.update(v);
                        maxer.update(v);
                        miner.update(v);
                    }
                });
            }
        });

        assert_eq!(adder.get_value(), expected_sum);
        assert_eq!(maxer.get_value(), expected_max);
        assert_eq!(miner.get_value(), expected_min);
    }
}

#[test]
fn test_readers_see_monotonic_counts() {
    let counter: Counter = Counter::new();
    let barrier = Arc::new(Barrier::new(5));
    thread::scope(|s| {
        for _ in 0..4 {
            let counter = counter.clone();
            let barrier = Arc::clone(&barrier);
            s.spawn(move || {
                barrier.wait();
                for _ in 0..5_000 {
                    counter.increment();
                }
            });
        }
        barrier.wait();
        let mut last = 0;
        for _ in 0..200 {
            let now = counter.get_value();
            assert!(now >= last);
            last = now;
        }
    });
    assert_eq!(counter.get_value(), 20_000);
}

#[test]
fn test_reset_returns_everything_once() {
    let counter: Counter<u64> = Counter::new();
    thread::scope(|s| {
        for _ in 0..4 {
            let counter = counter.clone();
            s.spawn(move || {
                for _ in 0..1_000 {
                    counter.increment();
                }
            });
        }
    });
    assert_eq!(counter.reset(), 4_000);
    assert_eq!(counter.reset(), 0);
}

#[test]
fn test_integer_addition_wraps() {
    let adder: Reducer<u8, AddTo, MinusFrom> = Reducer::new(0, AddTo, MinusFrom);
    adder.update(200);
    adder.update(100);
    assert_eq!(adder.get_value(), 44);
}

#[test]
fn test_reducers_without_inverse() {
    let maxer: Reducer<f64, MaxTo, VoidOp> = Reducer::new(f64::MIN, MaxTo, VoidOp);
    let miner: Reducer<f64, MinTo, VoidOp> = Reducer::new(f64::MAX, MinTo, VoidOp);
    for v in [0.5, -2.25, 7.75] {
        maxer.update(v);
        miner.update(v);
    }
    assert_eq!(maxer.get_value(), 7.75);
    assert_eq!(miner.get_value(), -2.25);
}
