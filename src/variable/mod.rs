//! Named variables and the process-wide registry they are exposed in.
//!
//! Every metric handle shares an inner value that implements [`Variable`].
//! Exposing a handle inserts a weak reference to that value into the
//! registry, so the registry never keeps a metric alive. Dropping the last
//! handle hides the name.

pub mod filter;
pub mod name;
pub mod registry;
pub mod scope;

pub use filter::WildcardFilter;
pub use name::to_underscored_name;
pub use registry::{
    count_exposed, describe_exposed, describe_series_exposed, dump_exposed, find_exposed, help_of,
    list_exposed, report, ReportState,
};
pub use scope::{Scope, ScopeBuilder, ScopeRegistry};

use crate::core::{config, Result, TallyError};
use crate::sampler::SeriesOptions;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::SystemTime;

/// What a variable represents to exporters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariableKind {
    /// Only grows.
    Counter,
    /// Goes up and down.
    Gauge,
    /// Bucketed distribution.
    Histogram,
    /// Free-form text.
    Status,
    /// Percentile points, described as text.
    Cdf,
}

impl VariableKind {
    /// Counter, Gauge and Histogram translate into typed metric samples.
    pub fn is_metric(self) -> bool {
        matches!(self, Self::Counter | Self::Gauge | Self::Histogram)
    }

    /// Lowercase name used by exporters.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
            Self::Status => "status",
            Self::Cdf => "cdf",
        }
    }
}

impl fmt::Display for VariableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One cumulative histogram bucket.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketSample {
    /// Inclusive upper bound.
    pub upper_bound: f64,
    /// Values at or below the bound.
    pub cumulative_count: u64,
}

/// Point-in-time histogram state. The last bucket is `+Inf`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HistogramSample {
    /// Sum of recorded values.
    pub sum: f64,
    /// Values recorded.
    pub count: u64,
    /// Cumulative buckets.
    pub buckets: Vec<BucketSample>,
}

/// Numeric payload of a [`MetricSample`].
#[derive(Debug, Clone, PartialEq)]
pub enum SampleValue {
    /// One number.
    Scalar(f64),
    /// Buckets with sum and count.
    Histogram(HistogramSample),
    /// Not representable as a number
    Empty,
}

/// Value of a variable as handed to reporters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// How exporters treat the value.
    pub kind: VariableKind,
    /// The value.
    pub value: SampleValue,
    /// When it was read.
    pub timestamp: SystemTime,
}

impl MetricSample {
    /// Single number.
    pub fn scalar(kind: VariableKind, value: f64, timestamp: SystemTime) -> Self {
        Self {
            kind,
            value: SampleValue::Scalar(value),
            timestamp,
        }
    }

    /// Sample with no number, for statuses and CDFs.
    pub fn empty(kind: VariableKind, timestamp: SystemTime) -> Self {
        Self {
            kind,
            value: SampleValue::Empty,
            timestamp,
        }
    }
}

/// A value that can be listed, described and reported.
pub trait Variable: Send + Sync + 'static {
    /// How exporters treat this variable.
    fn kind(&self) -> VariableKind;

    /// Write the current value as text.
    fn describe(&self, out: &mut dyn fmt::Write, quote_string: bool) -> fmt::Result;

    /// Write the trend of the value. Only variables sampled into a series
    /// support this.
    fn describe_series(&self, _out: &mut dyn fmt::Write, _options: &SeriesOptions) -> Result<()> {
        Err(TallyError::unavailable("variable has no series"))
    }

    /// Point-in-time value for reporters.
    fn get_metric(&self, stamp: SystemTime) -> MetricSample {
        MetricSample::empty(self.kind(), stamp)
    }
}

/// Render `var` into a new string.
pub fn describe_to_string(var: &dyn Variable, quote_string: bool) -> String {
    let mut out = String::new();
    if var.describe(&mut out, quote_string).is_err() {
        out.clear();
    }
    out
}

/// Write `text` quoted, escaping embedded quotes and backslashes.
pub(crate) fn write_quoted(out: &mut dyn fmt::Write, text: &str) -> fmt::Result {
    out.write_char('"')?;
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.write_char('\\')?;
        }
        out.write_char(c)?;
    }
    out.write_char('"')
}

/// Registration held by an exposed variable. Dropping it hides the name.
#[derive(Debug)]
pub(crate) struct Exposure {
    name: String,
    token: u64,
}

impl Drop for Exposure {
    fn drop(&mut self) {
        registry::remove(&self.name, self.token);
    }
}

/// Where a variable keeps its current registration.
#[derive(Debug, Default)]
pub struct ExposeSlot {
    exposure: Mutex<Option<Exposure>>,
}

impl ExposeSlot {
    fn name(&self) -> Option<String> {
        self.exposure.lock().as_ref().map(|e| e.name.clone())
    }
}

/// Implemented by every metric handle that can be exposed by name.
pub trait Exposable {
    /// Registration slot of the shared variable.
    #[doc(hidden)]
    fn expose_slot(&self) -> &ExposeSlot;

    /// Weak reference stored in the registry.
    #[doc(hidden)]
    fn variable(&self) -> Weak<dyn Variable>;

    /// Called after each successful exposure.
    fn on_exposed(&self) {}

    /// Expose under the root scope.
    fn expose(&self, name: &str, help: &str) -> Result<()> {
        self.expose_in(&Scope::root(), name, help)
    }

    /// Expose as `name` qualified by `scope`, hiding any previous name first.
    fn expose_in(&self, scope: &Arc<Scope>, name: &str, help: &str) -> Result<()> {
        self.hide();
        let outcome = registry::insert(scope, name, help, self.variable());
        match outcome {
            Ok(exposure) => {
                tracing::debug!(name = %exposure.name, "variable exposed");
                *self.expose_slot().exposure.lock() = Some(exposure);
                self.on_exposed();
                Ok(())
            }
            Err(e) => {
                if config::current().variable.crash_on_expose_fail {
                    panic!("failed to expose variable {:?}: {}", name, e);
                }
                tracing::warn!(name, error = %e, "failed to expose variable");
                Err(e)
            }
        }
    }

    /// Remove from the registry. False when not exposed.
    fn hide(&self) -> bool {
        let previous = self.expose_slot().exposure.lock().take();
        previous.is_some()
    }

    /// The fully qualified name, while exposed.
    fn name(&self) -> Option<String> {
        self.expose_slot().name()
    }

    /// Whether it currently has a name in the registry.
    fn is_exposed(&self) -> bool {
        self.expose_slot().exposure.lock().is_some()
    }
}
