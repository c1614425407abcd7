//! Crate error type.

use thiserror::Error;

/// Everything that can go wrong in tally.
#[derive(Error, Debug)]
pub enum TallyError {
    /// A caller-supplied value was rejected.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A variable with this name is already exposed.
    #[error("Variable already exposed: {0}")]
    AlreadyExists(String),

    /// No variable with this name.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The variable cannot answer this query.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Invalid or conflicting configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The sampler thread failed.
    #[error("Sampler error: {0}")]
    Sampler(String),

    /// Reading configuration failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON output failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Writing a description failed.
    #[error("Format error: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Result type alias for tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// Creates a new invalid argument error
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Creates a new already-exists error
    pub fn already_exists<S: Into<String>>(name: S) -> Self {
        Self::AlreadyExists(name.into())
    }

    /// Creates a new not-found error
    pub fn not_found<S: Into<String>>(name: S) -> Self {
        Self::NotFound(name.into())
    }

    /// Creates a new unavailable error
    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::Unavailable(msg.into())
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new sampler error
    pub fn sampler<S: Into<String>>(msg: S) -> Self {
        Self::Sampler(msg.into())
    }

    /// Returns true if the caller can reasonably retry or fall back.
    ///
    /// Cold-start reads report `Unavailable` until enough samples exist.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NotFound(_) | Self::Io(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "validation",
            Self::AlreadyExists(_) => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Unavailable(_) => "unavailable",
            Self::Config(_) => "config",
            Self::Sampler(_) => "sampler",
            Self::Io(_) => "io",
            Self::Serialization(_) | Self::Format(_) => "serialization",
        }
    }
}
