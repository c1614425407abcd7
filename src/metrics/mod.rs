//! Metric types built on the combiner.
//!
//! Write paths are thread-local and lock-free:
//! - counters, maxers and miners fold into a per-thread agent;
//! - averages pack sum and count into one atomic word per thread;
//! - histograms bump one combiner-backed counter per bucket.
//!
//! Reads combine every thread and take the combiner lock.

pub mod average;
pub mod buckets;
pub mod counter;
pub mod gauge;
pub mod histogram;
pub mod latency_recorder;
pub mod lock_timer;
pub mod reducer;
pub mod status;
pub mod stopwatch;

pub use average::{AverageGauge, Stat};
pub use buckets::Buckets;
pub use counter::Counter;
pub use gauge::{FuncGauge, Gauge, MaxerGauge, MinerGauge};
pub use histogram::Histogram;
pub use latency_recorder::LatencyRecorder;
pub use lock_timer::TimedMutex;
pub use reducer::{Numeric, Reducer, Reducible, ValueFold};
pub use status::{PassiveStatus, Status};
pub use stopwatch::{Stopwatch, StopwatchRecorder};
