//! Tally - in-process metrics for multi-threaded services.
//!
//! Tally records counters, gauges, averages, histograms and latency
//! percentiles from many threads at once without a shared lock on the write
//! path, and reads them back as current values, windowed values or rates.
//!
//! # Features
//!
//! - **Thread-local combiners**: every writer thread owns its slot; readers fold
//! - **Sampled windows**: one background thread snapshots bases once a second
//! - **Mergeable percentiles**: fixed bucket layout, exact merges
//! - **Variable registry**: named, scoped, tagged and filterable
//! - **Exporters**: Prometheus text and JSON, on demand or on a schedule
//! - **Timers**: scoped stopwatches and mutexes that record their lock wait
//!
//! # Architecture
//!
//! - `combiner`: thread-local agents and reducing operations
//! - `sampler`: background collector and per-base snapshot rings
//! - `window`: values and rates over the last N periods
//! - `percentile`: quantile samples and CDF
//! - `metrics`: user-facing metric types
//! - `variable`: registry, scopes and naming
//! - `export`: report formats and the report scheduler
//! - `core`: configuration, errors, logging and clocks
//!
//! # Example
//!
//! ```no_run
//! use tally::{Counter, Exposable, LatencyRecorder, Window};
//!
//! let requests: Counter = Counter::with_name("http_requests", "requests served");
//! let recent = Window::new(&requests, 60);
//! let latency = LatencyRecorder::with_name("http", "request latency in us");
//!
//! requests.increment();
//! latency.record(1_250);
//!
//! println!("{} in the last minute, p99 {}", recent.get_value(), latency.latency_percentile(0.99));
//! # let _ = recent.expose("http_requests_minute", "");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod combiner;
pub mod core;
pub mod export;
pub mod metrics;
pub mod percentile;
pub mod sampler;
pub mod variable;
pub mod window;

// Re-export the common surface for convenience
pub use crate::core::{Config, ConfigBuilder, Result, TallyError};
pub use crate::export::{ReportFormat, ReportOptions, ReportScheduler, StatsReporter};
pub use crate::metrics::{
    AverageGauge, Buckets, Counter, FuncGauge, Gauge, Histogram, LatencyRecorder, MaxerGauge,
    MinerGauge, PassiveStatus, Reducer, Stat, Status, Stopwatch, TimedMutex,
};
pub use crate::percentile::{Percentile, PercentileCdf, PercentileSamples};
pub use crate::variable::{Exposable, Scope, Variable, VariableKind};
pub use crate::window::{PerSecond, Window, Windowable};
