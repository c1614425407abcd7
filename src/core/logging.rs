//! Logging initialisation for binaries and tests that embed tally.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is left to the application, this helper is a convenience.

use crate::core::{LoggingConfig, Result, TallyError};

/// Install a global `tracing` subscriber configured from `config`.
///
/// `RUST_LOG` wins over the configured level when it is set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let fmt_layer = if config.structured {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true)
            .compact()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .compact()
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| TallyError::config(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}
