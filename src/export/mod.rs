//! Reporting exposed variables to external formats.
//!
//! [`crate::variable::report`] walks the registry and hands each variable to
//! a [`StatsReporter`]. Reporters only read values; they never reset or
//! otherwise mutate a metric.

pub mod json;
pub mod prometheus;
pub mod scheduler;

pub use json::JsonReporter;
pub use prometheus::PrometheusReporter;
pub use scheduler::ReportScheduler;

use crate::core::{config, Result, TallyError};
use crate::variable::{Variable, WildcardFilter};
use std::collections::BTreeMap;
use std::time::SystemTime;

/// Report output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Prometheus text exposition format
    Prometheus,
    /// `{"metric":[...],"variable":[...]}`
    Json,
}

impl std::str::FromStr for ReportFormat {
    type Err = TallyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "prometheus" | "prom" => Ok(ReportFormat::Prometheus),
            "json" => Ok(ReportFormat::Json),
            _ => Err(TallyError::invalid_argument(format!(
                "Unknown report format: {}",
                s
            ))),
        }
    }
}

/// Which variables a reporter wants and how strings are rendered.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    /// Quote string-valued variables
    pub quote_string: bool,
    allow: Option<WildcardFilter>,
    block: Option<WildcardFilter>,
}

impl ReportOptions {
    /// Report everything, quoting strings as configured.
    pub fn new() -> Self {
        Self {
            quote_string: config::current().report.quote_string,
            ..Self::default()
        }
    }

    /// Only report names matching `patterns` (wildcards, `,` or `;` separated).
    pub fn allow(mut self, patterns: &str) -> Result<Self> {
        self.allow = Some(WildcardFilter::new(patterns)?);
        Ok(self)
    }

    /// Never report names matching `patterns`.
    pub fn block(mut self, patterns: &str) -> Result<Self> {
        self.block = Some(WildcardFilter::new(patterns)?);
        Ok(self)
    }

    /// Quote string values in descriptions.
    pub fn quote_string(mut self, quote: bool) -> Self {
        self.quote_string = quote;
        self
    }

    /// Passes the allow list and is not blocked.
    pub fn allow_report(&self, name: &str) -> bool {
        let allowed = self.allow.as_ref().map_or(true, |f| f.matches(name));
        allowed && !self.block.as_ref().map_or(false, |f| f.matches(name))
    }
}

/// A variable as seen by a reporter during one sweep.
pub struct ReportedVariable<'a> {
    /// Fully qualified name.
    pub name: &'a str,
    /// Help text, possibly empty.
    pub help: &'a str,
    /// Tags of the variable's scope.
    pub tags: &'a BTreeMap<String, String>,
    /// The variable itself.
    pub variable: &'a dyn Variable,
}

/// Receives every exposed variable during a [`crate::variable::report`] sweep.
pub trait StatsReporter {
    /// Filters and quoting applied to this reporter.
    fn options(&self) -> &ReportOptions;

    /// Called once per exposed variable that passes [`ReportOptions`].
    fn report_variable(&mut self, var: &ReportedVariable<'_>, stamp: SystemTime);

    /// Called after the last variable of a sweep.
    fn flush(&mut self) {}

    /// Take the text produced since the last call.
    fn take_output(&mut self) -> String {
        String::new()
    }
}

/// Reporter for `format`.
pub fn reporter_for(format: ReportFormat, options: ReportOptions) -> Box<dyn StatsReporter + Send> {
    match format {
        ReportFormat::Prometheus => Box::new(PrometheusReporter::new(options)),
        ReportFormat::Json => Box::new(JsonReporter::new(options)),
    }
}
