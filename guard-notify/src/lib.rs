//! Webhook notifications raised around every verdict.
//!
//! Two tiers exist. BLOCK verdicts go through
//! [`NotificationDispatcher::notify_immediate`], which finishes (or times out)
//! before the verdict is handed back. Lower-urgency alerts go through
//! [`NotificationDispatcher::dispatch_background`], which spawns a tracked
//! task that [`NotificationDispatcher::drain`] can await at shutdown.

#![warn(missing_docs, clippy::pedantic)]

pub mod dispatcher;
pub mod payload;
pub mod transport;

mod error;

pub use dispatcher::{
    BackgroundTicket, DeliveryReport, DispatcherConfig, DrainReport, NotificationDispatcher,
};
pub use error::{NotifyError, NotifyResult};
pub use payload::{Notification, NotificationCategory, Urgency};
pub use transport::{HyperTransport, WebhookRequest, WebhookTransport};
