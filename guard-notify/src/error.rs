use std::time::Duration;

use thiserror::Error;

/// Errors produced while registering or delivering notifications.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Dispatcher configuration was invalid.
    #[error("invalid dispatcher configuration: {0}")]
    InvalidConfig(&'static str),

    /// Webhook URL was rejected at registration.
    #[error("invalid webhook url `{url}`: {reason}")]
    InvalidUrl {
        /// Offending URL.
        url: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The notification could not be encoded.
    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),

    /// Network or protocol failure.
    #[error("webhook transport error: {reason}")]
    Transport {
        /// Additional context.
        reason: String,
    },

    /// The receiver answered with a non-2xx status.
    #[error("webhook returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// A delivery attempt exceeded its timeout.
    #[error("webhook attempt timed out after {0:?}")]
    Timeout(Duration),

    /// The dispatcher is draining and accepts no new background work.
    #[error("notification dispatcher is closed")]
    Closed,
}

impl NotifyError {
    /// Convenience constructor for transport failures.
    #[must_use]
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            url: url.to_owned(),
            reason: reason.into(),
        }
    }
}

/// Result alias for notification operations.
pub type NotifyResult<T> = Result<T, NotifyError>;
