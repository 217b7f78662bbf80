//! Errors surfaced by policy resolution.

use thiserror::Error;

/// Errors surfaced by policy stores and the rule cache.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// Cache configuration was invalid.
    #[error("invalid cache configuration: {0}")]
    InvalidConfig(&'static str),
    /// The backing store could not be reached or returned garbage.
    #[error("policy store unavailable: {reason}")]
    StoreUnavailable {
        /// Human-readable explanation for logging and operators.
        reason: String,
    },
}

impl PolicyError {
    /// Convenience helper to construct store failures.
    #[must_use]
    pub fn store(reason: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            reason: reason.into(),
        }
    }
}

/// Result alias for policy operations.
pub type PolicyResult<T> = Result<T, PolicyError>;
