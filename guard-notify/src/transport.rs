//! Webhook transport seam and the hyper-backed implementation.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use guard_adapters::http::{HyperClient, build_https_client};
use hyper::header::{CONTENT_TYPE, USER_AGENT};
use hyper::{Body, Request};
use tracing::debug;

use crate::payload::{NotificationCategory, Urgency};
use crate::{NotifyError, NotifyResult};

/// User agent sent with every webhook call.
pub const USER_AGENT_VALUE: &str = concat!("OrchestraGuard/", env!("CARGO_PKG_VERSION"));

/// A single POST to a single webhook URL.
#[derive(Clone, Debug)]
pub struct WebhookRequest {
    /// Destination URL.
    pub url: String,
    /// JSON body.
    pub body: Bytes,
    /// Sent as `X-Notification-Type`.
    pub category: NotificationCategory,
    /// Sent as `X-Notification-Urgency`.
    pub urgency: Urgency,
}

/// Delivers webhook requests. Implementations report non-2xx answers as
/// [`NotifyError::Status`].
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    /// Performs one delivery attempt.
    async fn deliver(&self, request: WebhookRequest) -> NotifyResult<()>;
}

/// Transport posting JSON with hyper.
pub struct HyperTransport {
    client: HyperClient,
}

impl fmt::Debug for HyperTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HyperTransport").finish_non_exhaustive()
    }
}

impl HyperTransport {
    /// Creates a transport with a pooled HTTPS client.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: build_https_client(),
        }
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WebhookTransport for HyperTransport {
    async fn deliver(&self, request: WebhookRequest) -> NotifyResult<()> {
        let http_request = Request::post(request.url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, USER_AGENT_VALUE)
            .header("X-Notification-Type", request.category.as_str())
            .header("X-Notification-Urgency", request.urgency.as_str())
            .body(Body::from(request.body))
            .map_err(|err| NotifyError::transport(format!("failed to build request: {err}")))?;

        let response = self
            .client
            .request(http_request)
            .await
            .map_err(|err| NotifyError::transport(err.to_string()))?;

        let status = response.status();
        debug!(url = %request.url, %status, "webhook answered");
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Status {
                status: status.as_u16(),
            })
        }
    }
}
