//! Prometheus text exposition format.

use crate::core::clock::unix_millis;
use crate::export::{ReportOptions, ReportedVariable, StatsReporter};
use crate::variable::{HistogramSample, SampleValue};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::time::SystemTime;

/// Renders counters, gauges and histograms; other variables are skipped.
#[derive(Debug, Default)]
pub struct PrometheusReporter {
    options: ReportOptions,
    buffer: String,
}

impl PrometheusReporter {
    /// Reporter writing the text format into its own buffer.
    pub fn new(options: ReportOptions) -> Self {
        Self {
            options,
            buffer: String::with_capacity(4096),
        }
    }

    /// Text written so far.
    pub fn output(&self) -> &str {
        &self.buffer
    }

    fn write_header(&mut self, name: &str, help: &str, kind: &str) {
        if !help.is_empty() {
            let _ = writeln!(self.buffer, "# HELP {} {}", name, escape_help(help));
        }
        let _ = writeln!(self.buffer, "# TYPE {} {}", name, kind);
    }

    fn write_line(
        &mut self,
        name: &str,
        tags: &BTreeMap<String, String>,
        le: Option<f64>,
        value: f64,
        ts_ms: i64,
    ) {
        self.buffer.push_str(name);
        if !tags.is_empty() || le.is_some() {
            self.buffer.push('{');
            let mut first = true;
            for (k, v) in tags {
                if !first {
                    self.buffer.push(',');
                }
                first = false;
                let _ = write!(self.buffer, "{}=\"{}\"", k, escape_label(v));
            }
            if let Some(bound) = le {
                if !first {
                    self.buffer.push(',');
                }
                let _ = write!(self.buffer, "le=\"{}\"", format_value(bound));
            }
            self.buffer.push('}');
        }
        let _ = writeln!(self.buffer, " {} {}", format_value(value), ts_ms);
    }

    #[allow(clippy::cast_precision_loss)]
    fn write_histogram(
        &mut self,
        name: &str,
        tags: &BTreeMap<String, String>,
        sample: &HistogramSample,
        ts_ms: i64,
    ) {
        self.write_line(&format!("{}_sum", name), tags, None, sample.sum, ts_ms);
        let bucket_name = format!("{}_bucket", name);
        for bucket in &sample.buckets {
            self.write_line(
                &bucket_name,
                tags,
                Some(bucket.upper_bound),
                bucket.cumulative_count as f64,
                ts_ms,
            );
        }
        self.write_line(
            &format!("{}_count", name),
            tags,
            None,
            sample.count as f64,
            ts_ms,
        );
    }
}

impl StatsReporter for PrometheusReporter {
    fn options(&self) -> &ReportOptions {
        &self.options
    }

    fn report_variable(&mut self, var: &ReportedVariable<'_>, stamp: SystemTime) {
        let kind = var.variable.kind();
        if !kind.is_metric() {
            return;
        }
        let sample = var.variable.get_metric(stamp);
        let ts_ms = unix_millis(sample.timestamp);
        match &sample.value {
            SampleValue::Scalar(value) => {
                self.write_header(var.name, var.help, kind.as_str());
                self.write_line(var.name, var.tags, None, *value, ts_ms);
            }
            SampleValue::Histogram(histogram) => {
                self.write_header(var.name, var.help, kind.as_str());
                self.write_histogram(var.name, var.tags, histogram, ts_ms);
            }
            SampleValue::Empty => {}
        }
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value == f64::INFINITY {
        "+Inf".to_string()
    } else if value == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        value.to_string()
    }
}

// HELP text keeps quotes as-is.
fn escape_help(text: &str) -> String {
    text.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
