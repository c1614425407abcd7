//! Configuration management for tally.
//!
//! The active configuration is process-wide and swapped atomically, so the
//! sampler thread and metric constructors always read a consistent snapshot.

use crate::core::{Result, TallyError};
use arc_swap::ArcSwap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Background sampler settings
    pub sampler: SamplerConfig,
    /// Variable exposure settings
    pub variable: VariableConfig,
    /// Latency recorder defaults
    pub latency: LatencyConfig,
    /// Periodic report settings
    pub report: ReportConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Sampler thread configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// When false, samplers are never scheduled and windows stay cold
    pub enable_sampling: bool,
    /// Delay before the sampler thread runs its first cycle
    #[serde(with = "humantime_serde")]
    pub start_delay: Duration,
    /// Period between two sampling cycles
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Keep a per-second trend for exposed numeric variables
    pub save_series: bool,
}

/// Variable exposure configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableConfig {
    /// Panic instead of logging when a convenience constructor fails to expose
    pub crash_on_expose_fail: bool,
    /// Quote vector-like values in descriptions
    pub quote_vector: bool,
    /// Prefix of the root scope; empty means names are used as-is
    pub root_scope_name: String,
    /// Separator between a scope prefix and a variable name
    pub scope_separator: String,
}

/// Latency recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// First exposed percentile
    pub p1: u32,
    /// Second exposed percentile
    pub p2: u32,
    /// Third exposed percentile
    pub p3: u32,
    /// Recorded latencies are divided by this factor
    pub scale_factor: i64,
    /// Default window of latency recorders, in sampling periods
    pub window_size: usize,
}

/// Periodic report configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Interval between two scheduled reports
    #[serde(with = "humantime_serde")]
    pub dump_interval: Duration,
    /// Quote string values in reports
    pub quote_string: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Include targets and thread ids in log lines
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[allow(missing_docs)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            enable_sampling: true,
            start_delay: Duration::from_millis(10),
            interval: Duration::from_secs(1),
            save_series: true,
        }
    }
}

impl Default for VariableConfig {
    fn default() -> Self {
        VariableConfig {
            crash_on_expose_fail: false,
            quote_vector: true,
            root_scope_name: String::new(),
            scope_separator: "_".to_string(),
        }
    }
}

impl Default for LatencyConfig {
    fn default() -> Self {
        LatencyConfig {
            p1: 80,
            p2: 90,
            p3: 99,
            scale_factor: 1,
            window_size: 10,
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        ReportConfig {
            dump_interval: Duration::from_secs(10),
            quote_string: true,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.sampler.interval.is_zero() {
            return Err(TallyError::config("sampler interval must be greater than 0"));
        }

        let LatencyConfig { p1, p2, p3, .. } = self.latency;
        if !(0 < p1 && p1 < p2 && p2 < p3 && p3 < 100) {
            return Err(TallyError::config(format!(
                "latency percentiles must satisfy 0 < p1 < p2 < p3 < 100, got {}/{}/{}",
                p1, p2, p3
            )));
        }

        if self.latency.scale_factor < 1 {
            return Err(TallyError::config(format!(
                "latency scale_factor must be at least 1, got {}",
                self.latency.scale_factor
            )));
        }

        if self.latency.window_size == 0 {
            return Err(TallyError::config("latency window_size must be greater than 0"));
        }

        if self.report.dump_interval.is_zero() {
            return Err(TallyError::config("dump_interval must be greater than 0"));
        }

        if self.variable.scope_separator.is_empty() {
            return Err(TallyError::config("scope_separator must not be empty"));
        }

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)
            .map_err(|e| TallyError::config(format!("Failed to parse YAML config: {}", e)))?;
        Ok(self)
    }

    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(self, path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        self.from_yaml(&content)
    }

    /// Enable or disable the background sampler
    pub fn enable_sampling(mut self, enable: bool) -> Self {
        self.config.sampler.enable_sampling = enable;
        self
    }

    /// Set sampler start delay
    pub fn start_delay(mut self, delay: Duration) -> Self {
        self.config.sampler.start_delay = delay;
        self
    }

    /// Set sampling interval
    pub fn sampling_interval(mut self, interval: Duration) -> Self {
        self.config.sampler.interval = interval;
        self
    }

    /// Enable or disable per-variable series
    pub fn save_series(mut self, enable: bool) -> Self {
        self.config.sampler.save_series = enable;
        self
    }

    /// Panic on expose failures from convenience constructors
    pub fn crash_on_expose_fail(mut self, enable: bool) -> Self {
        self.config.variable.crash_on_expose_fail = enable;
        self
    }

    /// Set the root scope prefix
    pub fn root_scope_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.variable.root_scope_name = name.into();
        self
    }

    /// Set the scope separator
    pub fn scope_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.config.variable.scope_separator = separator.into();
        self
    }

    /// Set the three exposed latency percentiles
    pub fn latency_percentiles(mut self, p1: u32, p2: u32, p3: u32) -> Self {
        self.config.latency.p1 = p1;
        self.config.latency.p2 = p2;
        self.config.latency.p3 = p3;
        self
    }

    /// Set the latency scale factor
    pub fn latency_scale_factor(mut self, factor: i64) -> Self {
        self.config.latency.scale_factor = factor;
        self
    }

    /// Set the default latency window
    pub fn latency_window(mut self, window: usize) -> Self {
        self.config.latency.window_size = window;
        self
    }

    /// Set the scheduled report interval
    pub fn dump_interval(mut self, interval: Duration) -> Self {
        self.config.report.dump_interval = interval;
        self
    }

    /// Set log level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

static ACTIVE: Lazy<ArcSwap<Config>> = Lazy::new(|| ArcSwap::from_pointee(Config::default()));

/// Returns the active configuration.
pub fn current() -> Arc<Config> {
    ACTIVE.load_full()
}

/// Validates `config` and makes it the active configuration.
///
/// Metrics read the configuration when they are created or exposed, so
/// already-constructed metrics keep the settings they started with.
pub fn install(config: Config) -> Result<()> {
    config.validate()?;
    ACTIVE.store(Arc::new(config));
    tracing::debug!("tally configuration installed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_percentiles() {
        let result = ConfigBuilder::new().latency_percentiles(90, 80, 99).build();
        assert!(result.is_err());

        let result = ConfigBuilder::new().latency_percentiles(0, 80, 99).build();
        assert!(result.is_err());

        let result = ConfigBuilder::new().latency_percentiles(80, 90, 100).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_scale_factor() {
        let result = ConfigBuilder::new().latency_scale_factor(0).build();
        assert!(matches!(result, Err(TallyError::Config(_))));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let result = ConfigBuilder::new().sampling_interval(Duration::ZERO).build();
        assert!(result.is_err());
    }

    #[test]
    fn test_yaml_partial_overrides() {
        let yaml = r#"
sampler:
  start_delay: 50ms
latency:
  p1: 50
"#;
        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();
        assert_eq!(config.sampler.start_delay, Duration::from_millis(50));
        assert_eq!(config.sampler.interval, Duration::from_secs(1));
        assert_eq!(config.latency.p1, 50);
        assert_eq!(config.latency.p2, 90);
    }
}
