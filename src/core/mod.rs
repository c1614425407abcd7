//! Error type, configuration, logging and clock shared by every tally module.

#![warn(missing_docs)]

pub mod clock;
pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{Config, ConfigBuilder, LogLevel, LoggingConfig};
pub use error::{Result, TallyError};
