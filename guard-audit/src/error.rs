use serde_json::Error as SerdeError;
use thiserror::Error;

/// Errors emitted by audit sinks.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The provided configuration was invalid.
    #[error("invalid audit configuration: {0}")]
    InvalidConfig(&'static str),
    /// I/O failure while reading or writing the journal.
    #[error("i/o error: {source}")]
    Io {
        /// Source [`std::io::Error`].
        #[from]
        source: std::io::Error,
    },
    /// Record could not be encoded or decoded.
    #[error("serialization error: {source}")]
    Serialization {
        /// Source [`serde_json::Error`].
        #[from]
        source: SerdeError,
    },
    /// External sink rejected the record.
    #[error("audit sink unavailable: {reason}")]
    Unavailable {
        /// Reason reported by the sink.
        reason: String,
    },
}

impl AuditError {
    /// Helper for sinks backed by remote services.
    #[must_use]
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }
}

/// Result alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;
