//! Notification categories and the JSON body posted to webhooks.

use std::fmt;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use guard_primitives::{Action, Decision, Verdict};
use serde::Serialize;

use crate::NotifyResult;

/// Category a webhook subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    /// A BLOCK verdict; delivered synchronously.
    BlockAlert,
    /// A FLAG verdict; delivered in the background.
    FlagAlert,
    /// The pipeline itself failed and fell back to an emergency block.
    SystemAlert,
}

impl NotificationCategory {
    /// Every category, in registry order.
    pub const ALL: [Self; 3] = [Self::BlockAlert, Self::FlagAlert, Self::SystemAlert];

    /// Returns the wire label, also used as the `X-Notification-Type` header.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BlockAlert => "BLOCK_ALERT",
            Self::FlagAlert => "FLAG_ALERT",
            Self::SystemAlert => "SYSTEM_ALERT",
        }
    }

    /// Default urgency for the category.
    #[must_use]
    pub const fn urgency(self) -> Urgency {
        match self {
            Self::BlockAlert | Self::SystemAlert => Urgency::High,
            Self::FlagAlert => Urgency::Medium,
        }
    }

    /// Category matching a verdict decision, if the decision is notifiable.
    #[must_use]
    pub const fn for_decision(decision: Decision) -> Option<Self> {
        match decision {
            Decision::Block => Some(Self::BlockAlert),
            Decision::Flag => Some(Self::FlagAlert),
            Decision::Allow => None,
        }
    }
}

impl fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Urgency advertised to receivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Urgency {
    /// Must be looked at now.
    High,
    /// Review when convenient.
    Medium,
}

impl Urgency {
    /// Returns the header value.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
        }
    }
}

/// Body posted to every webhook registered for a category.
#[derive(Clone, Debug, Serialize)]
pub struct Notification {
    #[serde(rename = "type")]
    category: NotificationCategory,
    decision: Verdict,
    action: Action,
    timestamp: DateTime<Utc>,
    urgency: Urgency,
}

impl Notification {
    /// Creates a notification for `verdict` in the given category.
    #[must_use]
    pub fn new(category: NotificationCategory, verdict: &Verdict, action: &Action) -> Self {
        Self {
            category,
            decision: verdict.clone(),
            action: action.clone(),
            timestamp: Utc::now(),
            urgency: category.urgency(),
        }
    }

    /// Returns the category.
    #[must_use]
    pub const fn category(&self) -> NotificationCategory {
        self.category
    }

    /// Returns the urgency.
    #[must_use]
    pub const fn urgency(&self) -> Urgency {
        self.urgency
    }

    /// Returns the verdict being reported.
    #[must_use]
    pub fn verdict(&self) -> &Verdict {
        &self.decision
    }

    /// Encodes the notification as a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`crate::NotifyError::Encode`] when serialization fails.
    pub fn to_body(&self) -> NotifyResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}
