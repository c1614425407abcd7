//! Prometheus and JSON reports over the live registry.

mod common;

use common::unique_name;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::time::{Duration, SystemTime};
use tally::export::{reporter_for, JsonReporter, PrometheusReporter};
use tally::variable::report;
use tally::{
    Buckets, Counter, Exposable, Gauge, Histogram, ReportFormat, ReportOptions, ReportScheduler,
    Scope, StatsReporter, Status,
};

#[test]
fn test_prometheus_report() {
    let prefix = unique_name("reporter_prom");
    let counter: Counter = Counter::with_name(&format!("{}_requests", prefix), "served requests");
    counter.increment_by(3);
    let gauge: Gauge = Gauge::with_name(&format!("{}_inflight", prefix), "", 2);
    let histogram = Histogram::with_name(
        &format!("{}_size", prefix),
        "payload size",
        Buckets::custom(vec![10.0, 100.0]).unwrap(),
    );
    histogram.record(5.0);
    histogram.record(50.0);
    let _status = Status::with_name(&format!("{}_version", prefix), "", "1.0".to_string());

    let options = ReportOptions::new().allow(&format!("{}_*", prefix)).unwrap();
    let mut reporter = PrometheusReporter::new(options);
    let state = report(&mut reporter, SystemTime::now());
    assert_eq!(state.counter_count, 1);
    assert_eq!(state.gauge_count, 1);
    assert_eq!(state.histogram_count, 1);
    assert_eq!(state.no_metric_count, 1);
    assert!(state.discard_count + 4 <= state.total);

    let out = reporter.take_output();
    let lines: Vec<&str> = out.lines().collect();
    let requests = format!("{}_requests", prefix);
    assert!(lines.contains(&format!("# HELP {} served requests", requests).as_str()));
    assert!(lines.contains(&format!("# TYPE {} counter", requests).as_str()));
    assert!(lines
        .iter()
        .any(|l| l.starts_with(&format!("{} 3 ", requests))));

    let inflight = format!("{}_inflight", prefix);
    assert!(!out.contains(&format!("# HELP {}", inflight)));
    assert!(lines.contains(&format!("# TYPE {} gauge", inflight).as_str()));

    let size = format!("{}_size", prefix);
    for expected in [
        format!("{}_sum 55 ", size),
        format!("{}_bucket{{le=\"10\"}} 1 ", size),
        format!("{}_bucket{{le=\"100\"}} 2 ", size),
        format!("{}_bucket{{le=\"+Inf\"}} 2 ", size),
        format!("{}_count 2 ", size),
    ] {
        assert!(lines.iter().any(|l| l.starts_with(&expected)), "missing {}", expected);
    }
    assert!(!out.contains("_version"));
}

#[test]
fn test_prometheus_labels_from_scope_tags() {
    let service = unique_name("reporter_tagged");
    let mut tags = BTreeMap::new();
    tags.insert("host".to_string(), "h1".to_string());
    let scope = Scope::root().sub_scope_tagged(&service, &tags);
    let counter: Counter = Counter::new();
    counter.expose_in(&scope, "hits", "").unwrap();
    counter.increment();

    let options = ReportOptions::new().allow(&format!("{}_*", service)).unwrap();
    let mut reporter = PrometheusReporter::new(options);
    report(&mut reporter, SystemTime::now());
    let expected = format!("{}_hits{{host=\"h1\"}} 1 ", service);
    assert!(reporter.output().lines().any(|l| l.starts_with(&expected)));
}

#[test]
fn test_json_report() {
    let prefix = unique_name("reporter_json");
    let counter: Counter = Counter::with_name(&format!("{}_errors", prefix), "");
    counter.increment_by(4);
    let _status = Status::with_name(&format!("{}_state", prefix), "", "ready".to_string());

    let options = ReportOptions::new()
        .allow(&format!("{}_*", prefix))
        .unwrap()
        .quote_string(true);
    let mut reporter = JsonReporter::new(options);
    report(&mut reporter, SystemTime::now());
    let parsed: serde_json::Value = serde_json::from_str(&reporter.take_output()).unwrap();

    let metrics = parsed["metric"].as_array().unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0]["name"], format!("{}_errors", prefix));
    assert_eq!(metrics[0]["type"], "counter");
    assert_eq!(metrics[0]["help"], "help");
    assert_eq!(metrics[0]["value"], 4.0);

    let variables = parsed["variable"].as_array().unwrap();
    assert_eq!(variables.len(), 1);
    assert_eq!(variables[0]["name"], format!("{}_state", prefix));
    assert_eq!(variables[0]["value"], "\"ready\"");
}

#[test]
fn test_block_list_discards() {
    let prefix = unique_name("reporter_block");
    let _kept: Gauge = Gauge::with_name(&format!("{}_kept", prefix), "", 1);
    let _secret: Gauge = Gauge::with_name(&format!("{}_secret", prefix), "", 2);

    let options = ReportOptions::new()
        .allow(&format!("{}_*", prefix))
        .unwrap()
        .block("*_secret")
        .unwrap();
    let mut reporter = reporter_for(ReportFormat::Prometheus, options);
    let state = report(reporter.as_mut(), SystemTime::now());
    assert_eq!(state.gauge_count, 1);
    let out = reporter.take_output();
    assert!(out.contains(&format!("{}_kept", prefix)));
    assert!(!out.contains(&format!("{}_secret", prefix)));
}

#[test]
fn test_scheduler_delivers_reports() {
    let prefix = unique_name("reporter_sched");
    let gauge: Gauge = Gauge::with_name(&format!("{}_value", prefix), "", 1);
    let options = ReportOptions::new().allow(&format!("{}_*", prefix)).unwrap();

    let (tx, rx) = mpsc::channel();
    let mut scheduler = ReportScheduler::with_interval(
        reporter_for(ReportFormat::Prometheus, options),
        move |out| {
            let _ = tx.send(out);
        },
        Duration::from_millis(20),
    );
    scheduler.start().unwrap();

    let first = rx.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(first.contains(&format!("{}_value 1 ", prefix)));

    gauge.set_value(5);
    let updated = (0..50)
        .filter_map(|_| rx.recv_timeout(Duration::from_secs(1)).ok())
        .any(|out| out.contains(&format!("{}_value 5 ", prefix)));
    assert!(updated);

    scheduler.stop();
    assert!(!scheduler.is_running());
}
