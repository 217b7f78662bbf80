//! Observability setup for OrchestraGuard.
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`, or by
//! [`TelemetryConfig::filter`] when the variable is unset.

#![warn(missing_docs, clippy::pedantic)]

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{filter}`: {reason}")]
    InvalidFilter {
        /// Offending directive.
        filter: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber is already installed.
    #[error("tracing already initialised: {reason}")]
    AlreadyInitialized {
        /// Underlying message.
        reason: String,
    },
}

/// Result alias for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Default filter directive, used when `RUST_LOG` is unset.
    pub filter: String,
    /// Whether to print event targets.
    pub with_target: bool,
    /// Whether to emit ANSI colours.
    pub ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_owned(),
            with_target: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Sets the default filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Toggles target printing.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Toggles ANSI colours.
    #[must_use]
    pub const fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Checks that the filter directive parses.
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] otherwise.
    pub fn validate(&self) -> TelemetryResult<()> {
        self.env_filter().map(|_| ())
    }

    fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        EnvFilter::try_new(&self.filter).map_err(|err| TelemetryError::InvalidFilter {
            filter: self.filter.clone(),
            reason: err.to_string(),
        })
    }
}

/// Installs the global fmt subscriber.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad default directive and
/// [`TelemetryError::AlreadyInitialized`] when called more than once.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| TelemetryError::AlreadyInitialized {
            reason: err.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_filter() {
        let config = TelemetryConfig::default().with_filter("guard_engine=loud");
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::InvalidFilter { .. })
        ));
        assert!(TelemetryConfig::default()
            .with_filter("info,guard_engine=debug")
            .validate()
            .is_ok());
    }

    #[test]
    fn second_init_is_an_error() {
        let config = TelemetryConfig::default().with_ansi(false);
        init_tracing(&config).unwrap();
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::AlreadyInitialized { .. })
        ));
    }
}
