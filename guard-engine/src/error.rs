use std::time::Duration;

use guard_adapters::traits::AdapterError;
use guard_policy::PolicyError;
use thiserror::Error;

use crate::{PARSE_ERROR_TAG, VALIDATION_ERROR_TAG};

/// Failures of a single oracle consultation.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The underlying model adapter failed.
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    /// The oracle answered with no content.
    #[error("oracle returned an empty reply")]
    EmptyReply,
    /// The attempt exceeded its deadline.
    #[error("oracle call timed out after {0:?}")]
    Timeout(Duration),
    /// The oracle could not be reached.
    #[error("oracle unavailable: {reason}")]
    Unavailable {
        /// Additional context.
        reason: String,
    },
}

impl OracleError {
    /// Convenience constructor for unreachable oracles.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Result alias for oracle calls.
pub type OracleResult<T> = Result<T, OracleError>;

/// The oracle reply could not be turned into a decision.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    /// No extraction strategy produced a JSON object.
    #[error("no JSON object found in oracle reply: {reason}")]
    Parse {
        /// Additional context.
        reason: String,
    },
    /// A JSON object was found but violates the decision schema.
    #[error("oracle reply failed validation: {reason}")]
    Validation {
        /// Additional context.
        reason: String,
    },
}

impl ResponseError {
    pub(crate) fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub(crate) fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Rule tag recorded on the fail-closed verdict.
    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Parse { .. } => PARSE_ERROR_TAG,
            Self::Validation { .. } => VALIDATION_ERROR_TAG,
        }
    }
}

/// Faults on the decision path. Each one ends in an emergency BLOCK.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine configuration was invalid.
    #[error("invalid engine configuration: {0}")]
    InvalidConfig(&'static str),
    /// Policy refresh failed.
    #[error(transparent)]
    Policy(#[from] PolicyError),
    /// The action context could not be encoded for the oracle.
    #[error("failed to encode action context: {source}")]
    Context {
        /// Source [`serde_json::Error`].
        #[from]
        source: serde_json::Error,
    },
    /// Every oracle attempt failed.
    #[error("oracle failed after {attempts} attempts: {source}")]
    OracleExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error of the final attempt.
        #[source]
        source: OracleError,
    },
}

/// Result alias for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;
