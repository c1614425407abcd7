//! JSON report: typed metrics plus described non-metric variables.

use crate::core::clock::unix_millis;
use crate::core::Result;
use crate::export::{ReportOptions, ReportedVariable, StatsReporter};
use crate::variable::{describe_to_string, BucketSample, SampleValue};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::SystemTime;

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
enum JsonValue {
    Scalar(f64),
    Histogram {
        sum: f64,
        count: u64,
        buckets: Vec<JsonBucket>,
    },
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct JsonBucket {
    le: String,
    count: u64,
}

impl From<&BucketSample> for JsonBucket {
    fn from(bucket: &BucketSample) -> Self {
        let le = if bucket.upper_bound.is_infinite() {
            "+Inf".to_string()
        } else {
            bucket.upper_bound.to_string()
        };
        Self {
            le,
            count: bucket.cumulative_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct JsonMetric {
    name: String,
    help: String,
    #[serde(rename = "type")]
    kind: String,
    value: JsonValue,
    timestamp_ms: i64,
    tags: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
struct JsonVariable {
    name: String,
    value: String,
}

#[derive(Debug, Default, Serialize)]
struct JsonReport {
    metric: Vec<JsonMetric>,
    variable: Vec<JsonVariable>,
}

/// Collects one sweep into `{"metric":[...],"variable":[...]}`.
#[derive(Debug, Default)]
pub struct JsonReporter {
    options: ReportOptions,
    report: JsonReport,
    output: String,
}

impl JsonReporter {
    /// Reporter that collects into a JSON document.
    pub fn new(options: ReportOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Serialize what was collected since the last flush.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.report)?)
    }

    /// Metrics collected since the last flush.
    pub fn metric_count(&self) -> usize {
        self.report.metric.len()
    }

    /// Non-metric variables collected since the last flush.
    pub fn variable_count(&self) -> usize {
        self.report.variable.len()
    }
}

impl StatsReporter for JsonReporter {
    fn options(&self) -> &ReportOptions {
        &self.options
    }

    fn report_variable(&mut self, var: &ReportedVariable<'_>, stamp: SystemTime) {
        let kind = var.variable.kind();
        if kind.is_metric() {
            let sample = var.variable.get_metric(stamp);
            let value = match sample.value {
                SampleValue::Scalar(v) => JsonValue::Scalar(v),
                SampleValue::Histogram(h) => JsonValue::Histogram {
                    sum: h.sum,
                    count: h.count,
                    buckets: h.buckets.iter().map(JsonBucket::from).collect(),
                },
                SampleValue::Empty => return,
            };
            let help = if var.help.is_empty() { "help" } else { var.help };
            self.report.metric.push(JsonMetric {
                name: var.name.to_string(),
                help: help.to_string(),
                kind: kind.as_str().to_string(),
                value,
                timestamp_ms: unix_millis(sample.timestamp),
                tags: var.tags.clone(),
            });
        } else {
            self.report.variable.push(JsonVariable {
                name: var.name.to_string(),
                value: describe_to_string(var.variable, self.options.quote_string),
            });
        }
    }

    fn flush(&mut self) {
        match self.to_json() {
            Ok(json) => self.output = json,
            Err(e) => tracing::error!(error = %e, "failed to serialize json report"),
        }
        self.report = JsonReport::default();
    }

    fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}
