//! Webhook registry and the two delivery tiers.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use futures::future::join_all;
use hyper::Uri;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::payload::{Notification, NotificationCategory, Urgency};
use crate::transport::{WebhookRequest, WebhookTransport};
use crate::{NotifyError, NotifyResult};

/// Delivery tuning for both tiers.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherConfig {
    immediate_attempts: u32,
    background_attempts: u32,
    attempt_timeout: Duration,
    backoff_step: Duration,
    drain_deadline: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            immediate_attempts: 3,
            background_attempts: 2,
            attempt_timeout: Duration::from_secs(5),
            backoff_step: Duration::from_secs(1),
            drain_deadline: Duration::from_secs(5),
        }
    }
}

impl DispatcherConfig {
    /// Sets the attempts per URL for synchronous deliveries (1 to 3).
    #[must_use]
    pub const fn with_immediate_attempts(mut self, attempts: u32) -> Self {
        self.immediate_attempts = attempts;
        self
    }

    /// Sets the attempts per URL for background deliveries.
    #[must_use]
    pub const fn with_background_attempts(mut self, attempts: u32) -> Self {
        self.background_attempts = attempts;
        self
    }

    /// Sets the timeout applied to each delivery attempt.
    #[must_use]
    pub const fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    /// Sets the linear backoff step; retry `n` waits `n * step`.
    #[must_use]
    pub const fn with_backoff_step(mut self, step: Duration) -> Self {
        self.backoff_step = step;
        self
    }

    /// Sets how long [`NotificationDispatcher::drain`] waits for background
    /// tasks.
    #[must_use]
    pub const fn with_drain_deadline(mut self, deadline: Duration) -> Self {
        self.drain_deadline = deadline;
        self
    }

    /// Attempts per URL for synchronous deliveries.
    #[must_use]
    pub const fn immediate_attempts(self) -> u32 {
        self.immediate_attempts
    }

    /// Attempts per URL for background deliveries.
    #[must_use]
    pub const fn background_attempts(self) -> u32 {
        self.background_attempts
    }

    /// Timeout applied to each attempt.
    #[must_use]
    pub const fn attempt_timeout(self) -> Duration {
        self.attempt_timeout
    }

    /// Linear backoff step.
    #[must_use]
    pub const fn backoff_step(self) -> Duration {
        self.backoff_step
    }

    /// Drain deadline used at shutdown.
    #[must_use]
    pub const fn drain_deadline(self) -> Duration {
        self.drain_deadline
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidConfig`] when a bound is out of range.
    pub fn validate(self) -> NotifyResult<()> {
        if !(1..=3).contains(&self.immediate_attempts) {
            return Err(NotifyError::InvalidConfig(
                "immediate attempts must be between 1 and 3",
            ));
        }
        if self.background_attempts == 0 {
            return Err(NotifyError::InvalidConfig(
                "background attempts must be greater than zero",
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(NotifyError::InvalidConfig(
                "attempt timeout must be greater than zero",
            ));
        }
        if self.drain_deadline.is_zero() {
            return Err(NotifyError::InvalidConfig(
                "drain deadline must be greater than zero",
            ));
        }
        Ok(())
    }
}

/// Handle to a background delivery, usable with
/// [`NotificationDispatcher::cancel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackgroundTicket(u64);

/// Outcome of a fan-out across registered URLs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// URLs that accepted the notification.
    pub delivered: usize,
    /// URLs that failed every attempt.
    pub failed: usize,
}

/// Outcome of draining background tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Tasks that finished before the deadline.
    pub completed: usize,
    /// Tasks aborted when the deadline passed.
    pub abandoned: usize,
}

#[derive(Clone, Copy)]
struct RetryPlan {
    attempts: u32,
    attempt_timeout: Duration,
    backoff_step: Duration,
}

type PendingTasks = Arc<Mutex<HashMap<u64, JoinHandle<()>>>>;

/// Routes verdict notifications to registered webhooks.
pub struct NotificationDispatcher {
    transport: Arc<dyn WebhookTransport>,
    config: DispatcherConfig,
    registry: RwLock<HashMap<NotificationCategory, Vec<String>>>,
    pending: PendingTasks,
    next_ticket: AtomicU64,
    closed: AtomicBool,
}

impl fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("config", &self.config)
            .field("pending", &self.pending_count())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl NotificationDispatcher {
    /// Creates a dispatcher with no registered webhooks.
    #[must_use]
    pub fn new(transport: Arc<dyn WebhookTransport>, config: DispatcherConfig) -> Self {
        Self {
            transport,
            config,
            registry: RwLock::new(HashMap::new()),
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_ticket: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Returns the dispatcher configuration.
    #[must_use]
    pub const fn config(&self) -> DispatcherConfig {
        self.config
    }

    /// Registers `url` for `category`. Returns `false` when it was already
    /// registered.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::InvalidUrl`] unless `url` is an absolute
    /// `http` or `https` URL.
    pub fn register(&self, category: NotificationCategory, url: impl Into<String>) -> NotifyResult<bool> {
        let url = url.into();
        validate_url(&url)?;

        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let urls = registry.entry(category).or_default();
        if urls.contains(&url) {
            return Ok(false);
        }
        info!(%category, %url, "webhook registered");
        urls.push(url);
        Ok(true)
    }

    /// Removes `url` from `category`. Returns whether it was registered.
    pub fn unregister(&self, category: NotificationCategory, url: &str) -> bool {
        let mut registry = self.registry.write().unwrap_or_else(PoisonError::into_inner);
        let Some(urls) = registry.get_mut(&category) else {
            return false;
        };
        let before = urls.len();
        urls.retain(|existing| existing != url);
        let removed = urls.len() != before;
        if removed {
            info!(%category, url, "webhook unregistered");
        }
        removed
    }

    /// Returns the URLs registered for `category`.
    #[must_use]
    pub fn urls(&self, category: NotificationCategory) -> Vec<String> {
        self.registry
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&category)
            .cloned()
            .unwrap_or_default()
    }

    /// Delivers `notification` to every URL of its category, one URL after
    /// another, before returning. Failures are logged and reported, never
    /// raised.
    pub async fn notify_immediate(&self, notification: &Notification) -> DeliveryReport {
        let category = notification.category();
        let urls = self.urls(category);
        if urls.is_empty() {
            warn!(%category, "no webhooks registered for immediate notification");
            return DeliveryReport::default();
        }

        let body = match notification.to_body() {
            Ok(body) => body,
            Err(err) => {
                error!(%err, %category, "dropping immediate notification");
                return DeliveryReport {
                    delivered: 0,
                    failed: urls.len(),
                };
            }
        };

        let plan = RetryPlan {
            attempts: self.config.immediate_attempts,
            attempt_timeout: self.config.attempt_timeout,
            backoff_step: self.config.backoff_step,
        };

        let mut report = DeliveryReport::default();
        for url in urls {
            let request = WebhookRequest {
                url,
                body: body.clone(),
                category,
                urgency: notification.urgency(),
            };
            let url = request.url.clone();
            match deliver_with_retry(self.transport.as_ref(), request, plan).await {
                Ok(()) => {
                    info!(%category, %url, "immediate webhook delivered");
                    report.delivered += 1;
                }
                Err(err) => {
                    warn!(%category, %url, %err, "immediate webhook failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Spawns a tracked task delivering `notification` to every URL of its
    /// category concurrently. Returns `None` when nothing is registered.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Closed`] once draining has started and
    /// [`NotifyError::Encode`] when the body cannot be built.
    pub fn dispatch_background(
        &self,
        notification: &Notification,
    ) -> NotifyResult<Option<BackgroundTicket>> {
        if self.is_closed() {
            return Err(NotifyError::Closed);
        }

        let category = notification.category();
        let urls = self.urls(category);
        if urls.is_empty() {
            debug!(%category, "no webhooks registered for background notification");
            return Ok(None);
        }

        let body = notification.to_body()?;
        let urgency = notification.urgency();
        let plan = RetryPlan {
            attempts: self.config.background_attempts,
            attempt_timeout: self.config.attempt_timeout,
            backoff_step: self.config.backoff_step,
        };
        let transport = Arc::clone(&self.transport);
        let pending = Arc::clone(&self.pending);
        let id = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        // Held across spawn so the task cannot deregister before it is inserted.
        // `closed` is only set under this lock, so a drain either sees the
        // task or this check sees the drain.
        let mut tasks = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return Err(NotifyError::Closed);
        }
        let handle = tokio::spawn(async move {
            let report = fan_out(transport.as_ref(), urls, body, category, urgency, plan).await;
            if report.failed > 0 {
                warn!(%category, delivered = report.delivered, failed = report.failed, "background notification incomplete");
            } else {
                debug!(%category, delivered = report.delivered, "background notification delivered");
            }
            pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
        });
        tasks.insert(id, handle);

        Ok(Some(BackgroundTicket(id)))
    }

    /// Aborts a background delivery. Returns `false` when it already finished.
    pub fn cancel(&self, ticket: BackgroundTicket) -> bool {
        let handle = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&ticket.0);
        match handle {
            Some(handle) => {
                handle.abort();
                debug!(ticket = ticket.0, "background notification cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of background deliveries still in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Returns `true` once draining has started.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the dispatcher and waits for background tasks up to the
    /// configured drain deadline.
    pub async fn drain(&self) -> DrainReport {
        self.drain_within(self.config.drain_deadline).await
    }

    /// Closes the dispatcher and waits up to `deadline` for background
    /// tasks. Tasks still running afterwards are aborted.
    pub async fn drain_within(&self, deadline: Duration) -> DrainReport {
        let mut handles: Vec<JoinHandle<()>> = {
            let mut tasks = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            self.closed.store(true, Ordering::Release);
            tasks.drain().map(|(_, handle)| handle).collect()
        };
        let total = handles.len();
        if total == 0 {
            return DrainReport::default();
        }

        let timed_out = timeout(deadline, join_all(handles.iter_mut()))
            .await
            .is_err();

        let mut abandoned = 0;
        if timed_out {
            for handle in &handles {
                if !handle.is_finished() {
                    handle.abort();
                    abandoned += 1;
                }
            }
            warn!(abandoned, ?deadline, "drain deadline passed; abandoning notifications");
        }

        info!(completed = total - abandoned, abandoned, "notification dispatcher drained");
        DrainReport {
            completed: total - abandoned,
            abandoned,
        }
    }
}

fn validate_url(url: &str) -> NotifyResult<()> {
    let uri = url
        .parse::<Uri>()
        .map_err(|err| NotifyError::invalid_url(url, err.to_string()))?;
    match uri.scheme_str() {
        Some("http" | "https") => {}
        _ => return Err(NotifyError::invalid_url(url, "scheme must be http or https")),
    }
    if uri.host().is_none() {
        return Err(NotifyError::invalid_url(url, "missing host"));
    }
    Ok(())
}

async fn deliver_with_retry(
    transport: &dyn WebhookTransport,
    request: WebhookRequest,
    plan: RetryPlan,
) -> NotifyResult<()> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match timeout(plan.attempt_timeout, transport.deliver(request.clone())).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(plan.attempt_timeout)),
        };

        match outcome {
            Ok(()) => return Ok(()),
            Err(err) if attempt >= plan.attempts => return Err(err),
            Err(err) => {
                debug!(url = %request.url, attempt, %err, "webhook attempt failed; retrying");
                sleep(plan.backoff_step * attempt).await;
            }
        }
    }
}

async fn fan_out(
    transport: &dyn WebhookTransport,
    urls: Vec<String>,
    body: Bytes,
    category: NotificationCategory,
    urgency: Urgency,
    plan: RetryPlan,
) -> DeliveryReport {
    let deliveries = urls.into_iter().map(|url| {
        let request = WebhookRequest {
            url,
            body: body.clone(),
            category,
            urgency,
        };
        async move {
            let url = request.url.clone();
            let result = deliver_with_retry(transport, request, plan).await;
            if let Err(err) = &result {
                warn!(%category, %url, %err, "background webhook failed");
            }
            result.is_ok()
        }
    });

    let outcomes = join_all(deliveries).await;
    let delivered = outcomes.iter().filter(|ok| **ok).count();
    DeliveryReport {
        delivered,
        failed: outcomes.len() - delivered,
    }
}
