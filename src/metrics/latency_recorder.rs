//! Latency recorder: average, max, qps and percentiles over one window.

use crate::core::{config, Result, TallyError};
use crate::metrics::average::AverageGauge;
use crate::metrics::gauge::{FuncGauge, MaxerGauge};
use crate::percentile::{Percentile, PercentileCdf, PercentileSamples};
use crate::variable::{Exposable, ExposeSlot, Scope, Variable, VariableKind};
use crate::window::Window;
use std::fmt;
use std::sync::{Arc, Weak};

struct RecorderCore {
    latency: AverageGauge,
    max_latency: MaxerGauge<i64>,
    percentile: Percentile,
    latency_window: Window<AverageGauge>,
    max_latency_window: Window<MaxerGauge<i64>>,
    percentile_window: Window<Percentile>,
    window_size: usize,
    scale_factor: i64,
}

impl RecorderCore {
    fn samples(&self) -> PercentileSamples {
        self.percentile_window.get_value()
    }

    fn percentile(&self, ratio: f64) -> i64 {
        self.samples().get_number(ratio)
    }

    /// p1, p2, p3 from the config, then p99.9 and p99.99.
    fn percentiles(&self) -> [i64; 5] {
        let latency = &config::current().latency;
        let samples = self.samples();
        [
            samples.get_number(f64::from(latency.p1) / 100.0),
            samples.get_number(f64::from(latency.p2) / 100.0),
            samples.get_number(f64::from(latency.p3) / 100.0),
            samples.get_number(0.999),
            samples.get_number(0.9999),
        ]
    }

    fn qps(&self, window: usize) -> i64 {
        let span = self.latency_window.get_span(window);
        if span.time_us <= 0 {
            return 0;
        }
        #[allow(clippy::cast_precision_loss)]
        let rate = span.data.num as f64 * 1_000_000.0 / span.time_us as f64;
        random_round(rate)
    }

    fn max_latency(&self) -> i64 {
        match self.max_latency_window.get_value() {
            i64::MIN => 0,
            v => v,
        }
    }
}

/// Round to a neighbouring integer at random, so the mean stays `value`.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn random_round(value: f64) -> i64 {
    let floor = value as i64;
    if value > floor as f64 + fastrand::f64() {
        floor + 1
    } else {
        floor
    }
}

struct PercentilesInner {
    core: Weak<RecorderCore>,
    exposure: ExposeSlot,
}

impl Variable for PercentilesInner {
    fn kind(&self) -> VariableKind {
        VariableKind::Status
    }

    fn describe(&self, out: &mut dyn fmt::Write, _quote_string: bool) -> fmt::Result {
        let values = self.core.upgrade().map_or([0; 5], |core| core.percentiles());
        let quote = config::current().variable.quote_vector;
        if quote {
            out.write_char('"')?;
        }
        out.write_char('[')?;
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                out.write_char(',')?;
            }
            write!(out, "{}", v)?;
        }
        out.write_char(']')?;
        if quote {
            out.write_char('"')?;
        }
        Ok(())
    }
}

struct PercentilesView {
    inner: Arc<PercentilesInner>,
}

impl Exposable for PercentilesView {
    fn expose_slot(&self) -> &ExposeSlot {
        &self.inner.exposure
    }

    fn variable(&self) -> Weak<dyn Variable> {
        let weak: Weak<PercentilesInner> = Arc::downgrade(&self.inner);
        weak
    }
}

/// Variables exposed on behalf of the recorder, derived from the core.
struct RecorderViews {
    count: FuncGauge<i64>,
    qps: FuncGauge<i64>,
    p1: FuncGauge<i64>,
    p2: FuncGauge<i64>,
    p3: FuncGauge<i64>,
    p999: FuncGauge<i64>,
    p9999: FuncGauge<i64>,
    cdf: PercentileCdf,
    percentiles: PercentilesView,
}

impl RecorderViews {
    fn new(core: &Arc<RecorderCore>) -> Self {
        let percentile_of = |select: fn(&config::Config) -> f64| {
            let weak = Arc::downgrade(core);
            FuncGauge::new(move || {
                let ratio = select(&config::current());
                weak.upgrade().map_or(0, |core| core.percentile(ratio))
            })
        };
        let count = {
            let weak = Arc::downgrade(core);
            FuncGauge::with_kind(
                move || weak.upgrade().map_or(0, |core| core.latency.get_value().num),
                VariableKind::Counter,
            )
        };
        let qps = {
            let weak = Arc::downgrade(core);
            FuncGauge::new(move || weak.upgrade().map_or(0, |core| core.qps(core.window_size)))
        };
        let cdf = {
            let weak = Arc::downgrade(core);
            PercentileCdf::new(move || weak.upgrade().map(|core| core.samples()).unwrap_or_default())
        };
        Self {
            count,
            qps,
            p1: percentile_of(|c| f64::from(c.latency.p1) / 100.0),
            p2: percentile_of(|c| f64::from(c.latency.p2) / 100.0),
            p3: percentile_of(|c| f64::from(c.latency.p3) / 100.0),
            p999: percentile_of(|_| 0.999),
            p9999: percentile_of(|_| 0.9999),
            cdf,
            percentiles: PercentilesView {
                inner: Arc::new(PercentilesInner {
                    core: Arc::downgrade(core),
                    exposure: ExposeSlot::default(),
                }),
            },
        }
    }
}

/// Records latencies and exposes a family of derived variables.
///
/// Recording `foo` latencies and exposing with prefix `"foo"` publishes:
///
/// | name | value |
/// |------|-------|
/// | `foo_latency` | average over the window |
/// | `foo_max_latency` | maximum over the window |
/// | `foo_count` | total recorded |
/// | `foo_qps` | records per second over the window |
/// | `foo_latency_80`, `_90`, `_99` | configured percentiles |
/// | `foo_latency_999`, `foo_latency_9999` | p99.9 and p99.99 |
/// | `foo_latency_cdf` | CDF points |
/// | `foo_latency_percentiles` | all of the above percentiles |
///
/// Recorded values are divided by `latency.scale_factor`, read once when
/// the recorder is created.
pub struct LatencyRecorder {
    core: Arc<RecorderCore>,
    views: Arc<RecorderViews>,
}

impl Clone for LatencyRecorder {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
            views: Arc::clone(&self.views),
        }
    }
}

impl LatencyRecorder {
    /// Recorder over the configured default window.
    pub fn new() -> Self {
        Self::with_window(config::current().latency.window_size)
    }

    /// Recorder over the last `window_size` sampling periods.
    pub fn with_window(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        let latency = AverageGauge::new();
        let max_latency = MaxerGauge::new();
        let percentile = Percentile::new();
        let core = Arc::new(RecorderCore {
            latency_window: Window::new(&latency, window_size),
            max_latency_window: Window::new(&max_latency, window_size),
            percentile_window: Window::new(&percentile, window_size),
            latency,
            max_latency,
            percentile,
            window_size,
            scale_factor: config::current().latency.scale_factor.max(1),
        });
        let views = Arc::new(RecorderViews::new(&core));
        Self { core, views }
    }

    /// Recorder exposed under `prefix`; failures are logged.
    pub fn with_name(prefix: &str, help: &str) -> Self {
        let recorder = Self::new();
        if let Err(e) = recorder.expose(prefix, help) {
            tracing::warn!(prefix, error = %e, "latency recorder not exposed");
        }
        recorder
    }

    /// Record one latency, divided by the scale factor configured when the
    /// recorder was created.
    pub fn record(&self, latency: i64) {
        let latency = latency / self.core.scale_factor;
        self.core.latency.set(latency);
        self.core.max_latency.update(latency);
        self.core.percentile.record(latency);
    }

    /// Average latency over the whole window.
    pub fn latency(&self) -> i64 {
        self.latency_in(self.core.window_size)
    }

    /// Average latency over the last `window` periods.
    pub fn latency_in(&self, window: usize) -> i64 {
        self.core.latency_window.get_value_in(window).average_int()
    }

    /// Largest latency in the window, 0 when nothing was recorded.
    pub fn max_latency(&self) -> i64 {
        self.core.max_latency()
    }

    /// Latencies recorded since creation.
    pub fn count(&self) -> i64 {
        self.core.latency.get_value().num
    }

    /// Records per second over the whole window.
    pub fn qps(&self) -> i64 {
        self.core.qps(self.core.window_size)
    }

    /// Records per second over the last `window` periods. 0 before the
    /// first two samples.
    pub fn qps_in(&self, window: usize) -> i64 {
        self.core.qps(window)
    }

    /// Latency at `ratio` in `[0, 1]`, e.g. 0.99.
    pub fn latency_percentile(&self, ratio: f64) -> i64 {
        self.core.percentile(ratio)
    }

    /// The configured p1, p2, p3, then p99.9 and p99.99.
    pub fn latency_percentiles(&self) -> [i64; 5] {
        self.core.percentiles()
    }

    /// CDF points over the whole window.
    pub fn latency_cdf(&self) -> Vec<(u32, i64)> {
        self.views.cdf.points()
    }

    /// Window length in sampling periods.
    pub fn window_size(&self) -> usize {
        self.core.window_size
    }

    /// Expose every derived variable under `prefix` in the root scope.
    pub fn expose(&self, prefix: &str, help: &str) -> Result<()> {
        self.expose_in(&Scope::root(), prefix, help)
    }

    /// Expose every derived variable under `prefix` in `scope`.
    ///
    /// A trailing `latency` and `_` are stripped from the prefix. When any
    /// name fails, the ones already exposed are hidden again.
    pub fn expose_in(&self, scope: &Arc<Scope>, prefix: &str, help: &str) -> Result<()> {
        let prefix = strip_latency_suffix(prefix)?;
        let latency = config::current().latency.clone();
        let views = &*self.views;
        let named: [(&dyn Exposable, String); 11] = [
            (&self.core.latency_window, format!("{}_latency", prefix)),
            (&self.core.max_latency_window, format!("{}_max_latency", prefix)),
            (&views.count, format!("{}_count", prefix)),
            (&views.qps, format!("{}_qps", prefix)),
            (&views.p1, format!("{}_latency_{}", prefix, latency.p1)),
            (&views.p2, format!("{}_latency_{}", prefix, latency.p2)),
            (&views.p3, format!("{}_latency_{}", prefix, latency.p3)),
            (&views.p999, format!("{}_latency_999", prefix)),
            (&views.p9999, format!("{}_latency_9999", prefix)),
            (&views.cdf, format!("{}_latency_cdf", prefix)),
            (&views.percentiles, format!("{}_latency_percentiles", prefix)),
        ];
        for (variable, name) in &named {
            if let Err(e) = variable.expose_in(scope, name, help) {
                self.hide();
                return Err(e);
            }
        }
        Ok(())
    }

    /// Hide every exposed variable.
    pub fn hide(&self) {
        let views = &*self.views;
        let all: [&dyn Exposable; 11] = [
            &self.core.latency_window,
            &self.core.max_latency_window,
            &views.count,
            &views.qps,
            &views.p1,
            &views.p2,
            &views.p3,
            &views.p999,
            &views.p9999,
            &views.cdf,
            &views.percentiles,
        ];
        for variable in all {
            variable.hide();
        }
    }

    /// Name of the average latency variable, once exposed.
    pub fn latency_name(&self) -> Option<String> {
        self.core.latency_window.name()
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for LatencyRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{latency={} max{}={} qps={} count={}}}",
            self.latency(),
            self.window_size(),
            self.max_latency(),
            self.qps(),
            self.count()
        )
    }
}

fn strip_latency_suffix(prefix: &str) -> Result<&str> {
    let mut stripped = prefix;
    let suffix = "latency";
    if stripped.len() >= suffix.len() {
        let at = stripped.len() - suffix.len();
        if stripped.is_char_boundary(at) && stripped[at..].eq_ignore_ascii_case(suffix) {
            stripped = &stripped[..at];
        }
    }
    let stripped = stripped.strip_suffix('_').unwrap_or(stripped);
    if stripped.is_empty() {
        return Err(TallyError::invalid_argument(format!(
            "invalid latency recorder prefix {:?}",
            prefix
        )));
    }
    Ok(stripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variable::{describe_exposed, find_exposed};

    #[test]
    fn test_strip_latency_suffix() {
        assert_eq!(strip_latency_suffix("rpc").unwrap(), "rpc");
        assert_eq!(strip_latency_suffix("rpc_latency").unwrap(), "rpc");
        assert_eq!(strip_latency_suffix("rpcLatency").unwrap(), "rpc");
        assert_eq!(strip_latency_suffix("rpc_").unwrap(), "rpc");
        assert!(matches!(
            strip_latency_suffix("latency"),
            Err(TallyError::InvalidArgument(_))
        ));
        assert!(strip_latency_suffix("_latency").is_err());
        assert!(strip_latency_suffix("").is_err());
    }

    #[test]
    fn test_record_count_and_average() {
        let recorder = LatencyRecorder::with_window(10);
        std::thread::scope(|s| {
            for _ in 0..4 {
                let recorder = recorder.clone();
                s.spawn(move || {
                    for v in 1..=100 {
                        recorder.record(v);
                    }
                });
            }
        });
        assert_eq!(recorder.count(), 400);
        // Cold window reads the base: mean of 1..=100 in integer math.
        assert_eq!(recorder.latency(), 50);
        let p50 = recorder.latency_percentile(0.5);
        assert!((49..=51).contains(&p50), "p50 = {}", p50);
        assert_eq!(recorder.qps(), 0);
    }

    #[test]
    fn test_random_round_is_bounded() {
        for _ in 0..100 {
            let v = random_round(2.4);
            assert!(v == 2 || v == 3);
        }
        assert_eq!(random_round(5.0), 5);
    }

    #[test]
    fn test_expose_all_and_hide() {
        let recorder = LatencyRecorder::new();
        recorder.record(7);
        recorder.expose("recorder_mod_rpc_latency", "rpc latency").unwrap();

        let latency = config::current().latency.clone();
        let mut names = vec![
            "recorder_mod_rpc_latency".to_string(),
            "recorder_mod_rpc_max_latency".to_string(),
            "recorder_mod_rpc_count".to_string(),
            "recorder_mod_rpc_qps".to_string(),
            "recorder_mod_rpc_latency_999".to_string(),
            "recorder_mod_rpc_latency_9999".to_string(),
            "recorder_mod_rpc_latency_cdf".to_string(),
            "recorder_mod_rpc_latency_percentiles".to_string(),
        ];
        for p in [latency.p1, latency.p2, latency.p3] {
            names.push(format!("recorder_mod_rpc_latency_{}", p));
        }
        for name in &names {
            assert!(find_exposed(name).is_some(), "{} not exposed", name);
        }
        assert_eq!(describe_exposed("recorder_mod_rpc_count", false).unwrap(), "1");
        assert_eq!(
            find_exposed("recorder_mod_rpc_latency_cdf").unwrap().kind(),
            VariableKind::Cdf
        );
        assert_eq!(recorder.latency_name().as_deref(), Some("recorder_mod_rpc_latency"));

        recorder.hide();
        for name in &names {
            assert!(find_exposed(name).is_none(), "{} still exposed", name);
        }
    }

    #[test]
    fn test_failed_expose_rolls_back() {
        let blocker: FuncGauge<i64> = FuncGauge::new(|| 0);
        blocker.expose("recorder_mod_clash_qps", "taken").unwrap();

        let recorder = LatencyRecorder::new();
        assert!(matches!(
            recorder.expose("recorder_mod_clash", ""),
            Err(TallyError::AlreadyExists(_))
        ));
        assert!(find_exposed("recorder_mod_clash_latency").is_none());
        assert!(find_exposed("recorder_mod_clash_count").is_none());
        assert!(find_exposed("recorder_mod_clash_qps").is_some());
    }

    #[test]
    fn test_display() {
        let recorder = LatencyRecorder::with_window(5);
        recorder.record(10);
        assert_eq!(recorder.to_string(), "{latency=10 max5=10 qps=0 count=1}");
    }
}
