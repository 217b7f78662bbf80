//! Shared error definitions for governance primitives.

use thiserror::Error;

/// Result alias used throughout the guard workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while constructing governance primitive types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// Rule identifier did not follow the `AA-000` format.
    #[error("invalid rule id `{id}`: expected two uppercase letters, a dash and three digits")]
    InvalidRuleId {
        /// The offending identifier string.
        id: String,
    },

    /// Rule definition failed validation.
    #[error("invalid rule `{rule_id}`: {reason}")]
    InvalidRule {
        /// Identifier of the rule being validated.
        rule_id: String,
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// Intercepted action failed validation.
    #[error("invalid action: {reason}")]
    InvalidAction {
        /// Human-readable reason for rejection.
        reason: String,
    },

    /// An enumerated field carried a value outside its vocabulary.
    #[error("unrecognized {field} value `{value}`")]
    UnknownVariant {
        /// Name of the enumerated field.
        field: &'static str,
        /// The value that could not be recognized.
        value: String,
    },
}

impl Error {
    pub(crate) fn invalid_rule(rule_id: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRule {
            rule_id: rule_id.to_owned(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_action(reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            reason: reason.into(),
        }
    }
}
