use std::path::PathBuf;

use guard_adapters::traits::AdapterError;
use guard_engine::EngineError;
use guard_notify::NotifyError;
use guard_policy::PolicyError;
use guard_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised while loading or applying configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        /// File that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for [`crate::GuardConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// An override variable held a value of the wrong shape.
    #[error("invalid value `{value}` for {key}")]
    InvalidValue {
        /// Variable name.
        key: &'static str,
        /// Raw value.
        value: String,
    },

    /// A field is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),

    /// Rejected by the policy cache.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// Rejected by the decision engine.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// Rejected by the notification dispatcher.
    #[error(transparent)]
    Notify(#[from] NotifyError),

    /// Rejected by the model adapter.
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Rejected by the telemetry layer.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
