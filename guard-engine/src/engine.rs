//! Decision pipeline driving one action from resolution to verdict.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use guard_audit::{AuditRecord, AuditSink, DecisionStats, StatsSnapshot, TracingAuditSink};
use guard_notify::{
    DispatcherConfig, DrainReport, HyperTransport, Notification, NotificationCategory,
    NotificationDispatcher,
};
use guard_policy::{CacheEntry, CacheStatus, PolicyCache, RefreshReport};
use guard_primitives::{Action, Decision, Verdict};
use serde::Serialize;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, error, info, warn};

use crate::oracle::{Oracle, OracleRequest};
use crate::reconcile::{attributed_severity, reconcile_rules};
use crate::response::parse_reply;
use crate::{EngineError, EngineResult, OracleError, SYSTEM_ERROR_TAG};

/// Retry and timeout settings for oracle calls.
#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    max_attempts: u32,
    base_delay: Duration,
    oracle_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            oracle_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Sets the number of oracle attempts.
    #[must_use]
    pub const fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Sets the base backoff; retry `i` waits `base * 2^i`.
    #[must_use]
    pub const fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Sets the deadline for a single oracle attempt.
    #[must_use]
    pub const fn with_oracle_timeout(mut self, timeout: Duration) -> Self {
        self.oracle_timeout = timeout;
        self
    }

    /// Oracle attempts per action.
    #[must_use]
    pub const fn max_attempts(self) -> u32 {
        self.max_attempts
    }

    /// Base backoff delay.
    #[must_use]
    pub const fn base_delay(self) -> Duration {
        self.base_delay
    }

    /// Per-attempt oracle deadline.
    #[must_use]
    pub const fn oracle_timeout(self) -> Duration {
        self.oracle_timeout
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] for zero attempts, more than
    /// ten attempts, or a zero oracle timeout.
    pub fn validate(self) -> EngineResult<()> {
        if self.max_attempts == 0 {
            return Err(EngineError::InvalidConfig("max attempts must be greater than zero"));
        }
        if self.max_attempts > 10 {
            return Err(EngineError::InvalidConfig("max attempts must not exceed 10"));
        }
        if self.oracle_timeout.is_zero() {
            return Err(EngineError::InvalidConfig("oracle timeout must be greater than zero"));
        }
        Ok(())
    }
}

/// Terminal state the pipeline reached for an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    /// No rule matched the tool.
    AllowDefault,
    /// The oracle reply was unusable.
    SafeBlock,
    /// The oracle decision was accepted.
    Finalized,
    /// A fault on the decision path forced a block.
    EmergencyBlock,
}

/// Verdict plus how the pipeline arrived at it.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// The verdict returned to the caller.
    pub verdict: Verdict,
    /// Terminal state reached.
    pub outcome: Outcome,
    /// Wall time spent on the action.
    pub elapsed: Duration,
}

/// Reporting view of the engine.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    /// Decision counters.
    pub stats: StatsSnapshot,
    /// Policy cache state.
    pub cache: CacheStatus,
    /// Background notifications still in flight.
    pub pending_notifications: usize,
}

/// Builder for [`DecisionEngine`].
pub struct DecisionEngineBuilder {
    cache: Arc<PolicyCache>,
    oracle: Arc<dyn Oracle>,
    dispatcher: Option<Arc<NotificationDispatcher>>,
    audit: Option<Arc<dyn AuditSink>>,
    config: EngineConfig,
}

impl DecisionEngineBuilder {
    /// Uses `dispatcher` for notifications.
    #[must_use]
    pub fn with_dispatcher(mut self, dispatcher: Arc<NotificationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Uses `sink` for audit records.
    #[must_use]
    pub fn with_audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Overrides retry and timeout settings.
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the engine. Without an explicit dispatcher a hyper-backed one
    /// with no webhooks is used; without an audit sink records only go to
    /// tracing.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidConfig`] when the configuration is
    /// rejected.
    pub fn build(self) -> EngineResult<DecisionEngine> {
        self.config.validate()?;
        let dispatcher = self.dispatcher.unwrap_or_else(|| {
            Arc::new(NotificationDispatcher::new(
                Arc::new(HyperTransport::new()),
                DispatcherConfig::default(),
            ))
        });
        let audit = self
            .audit
            .unwrap_or_else(|| Arc::new(TracingAuditSink) as Arc<dyn AuditSink>);

        Ok(DecisionEngine {
            cache: self.cache,
            oracle: self.oracle,
            dispatcher,
            audit,
            stats: DecisionStats::new(),
            config: self.config,
        })
    }
}

/// Renders verdicts for intercepted actions.
///
/// Collaborators are injected; the engine holds no per-action state, so one
/// instance can serve many concurrent evaluations.
pub struct DecisionEngine {
    cache: Arc<PolicyCache>,
    oracle: Arc<dyn Oracle>,
    dispatcher: Arc<NotificationDispatcher>,
    audit: Arc<dyn AuditSink>,
    stats: DecisionStats,
    config: EngineConfig,
}

impl fmt::Debug for DecisionEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecisionEngine")
            .field("cache", &self.cache)
            .field("dispatcher", &self.dispatcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DecisionEngine {
    /// Starts building an engine around a policy cache and an oracle.
    #[must_use]
    pub fn builder(cache: Arc<PolicyCache>, oracle: Arc<dyn Oracle>) -> DecisionEngineBuilder {
        DecisionEngineBuilder {
            cache,
            oracle,
            dispatcher: None,
            audit: None,
            config: EngineConfig::default(),
        }
    }

    /// Returns the engine configuration.
    #[must_use]
    pub const fn config(&self) -> EngineConfig {
        self.config
    }

    /// Returns the policy cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<PolicyCache> {
        &self.cache
    }

    /// Returns the notification dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<NotificationDispatcher> {
        &self.dispatcher
    }

    /// Populates the policy cache ahead of the first action.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Policy`] when the store cannot be read.
    pub async fn warm_up(&self) -> EngineResult<RefreshReport> {
        Ok(self.cache.refresh().await?)
    }

    /// Renders the verdict for `action`.
    pub async fn evaluate(&self, action: Action) -> Verdict {
        self.evaluate_detailed(action).await.verdict
    }

    /// Renders the verdict for `action` and reports the terminal state.
    ///
    /// Notification, audit and statistics all run before this returns; a
    /// BLOCK verdict's synchronous notification has completed or timed out.
    pub async fn evaluate_detailed(&self, action: Action) -> Evaluation {
        let started = Instant::now();

        let (verdict, outcome) = match AssertUnwindSafe(self.decide(&action)).catch_unwind().await {
            Ok(Ok(decided)) => decided,
            Ok(Err(err)) => {
                error!(action_id = action.action_id(), %err, "decision pipeline failed");
                (emergency_verdict(&action, &err.to_string()), Outcome::EmergencyBlock)
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                error!(action_id = action.action_id(), reason, "decision pipeline panicked");
                (emergency_verdict(&action, reason), Outcome::EmergencyBlock)
            }
        };

        self.notify(&verdict, &action, outcome).await;

        let elapsed = started.elapsed();
        let record = AuditRecord::from_verdict(&verdict, &action, elapsed);
        if let Err(err) = self.audit.record(&record).await {
            warn!(action_id = action.action_id(), %err, "audit write failed");
        }
        self.stats.record(verdict.decision());

        info!(
            action_id = action.action_id(),
            target_tool = action.target_tool(),
            decision = %verdict.decision(),
            ?outcome,
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "action evaluated"
        );

        Evaluation {
            verdict,
            outcome,
            elapsed,
        }
    }

    async fn decide(&self, action: &Action) -> EngineResult<(Verdict, Outcome)> {
        let entries = self.cache.resolve(action.target_tool()).await;
        if entries.is_empty() {
            debug!(action_id = action.action_id(), target_tool = action.target_tool(), "no rules apply");
            return Ok((Verdict::allow_ungoverned(action), Outcome::AllowDefault));
        }

        let request = OracleRequest::new(&entries, action)?;
        let reply = self.consult_with_retry(&request, action).await?;

        match parse_reply(&reply) {
            Ok(parsed) => Ok((finalize(action, parsed, &entries), Outcome::Finalized)),
            Err(err) => {
                warn!(action_id = action.action_id(), %err, tag = err.tag(), "oracle reply rejected");
                let verdict = Verdict::fail_closed(
                    action,
                    err.tag(),
                    format!("Failed to parse oracle response: {err}"),
                );
                Ok((verdict, Outcome::SafeBlock))
            }
        }
    }

    async fn consult_with_retry(&self, request: &OracleRequest, action: &Action) -> EngineResult<String> {
        let attempts = self.config.max_attempts;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match timeout(self.config.oracle_timeout, self.oracle.consult(request)).await {
                Ok(Ok(reply)) if !reply.trim().is_empty() => return Ok(reply),
                Ok(Ok(_)) => OracleError::EmptyReply,
                Ok(Err(err)) => err,
                Err(_) => OracleError::Timeout(self.config.oracle_timeout),
            };

            if attempt >= attempts {
                return Err(EngineError::OracleExhausted {
                    attempts,
                    source: err,
                });
            }

            let delay = self.config.base_delay * 2u32.saturating_pow(attempt - 1);
            warn!(
                action_id = action.action_id(),
                attempt,
                ?delay,
                %err,
                "oracle call failed; retrying"
            );
            sleep(delay).await;
        }
    }

    async fn notify(&self, verdict: &Verdict, action: &Action, outcome: Outcome) {
        match NotificationCategory::for_decision(verdict.decision()) {
            Some(NotificationCategory::BlockAlert) => {
                let note = Notification::new(NotificationCategory::BlockAlert, verdict, action);
                let report = self.dispatcher.notify_immediate(&note).await;
                debug!(
                    action_id = action.action_id(),
                    delivered = report.delivered,
                    failed = report.failed,
                    "block alert sent"
                );
            }
            Some(category) => self.notify_background(category, verdict, action),
            None => {}
        }

        if outcome == Outcome::EmergencyBlock {
            self.notify_background(NotificationCategory::SystemAlert, verdict, action);
        }
    }

    fn notify_background(&self, category: NotificationCategory, verdict: &Verdict, action: &Action) {
        let note = Notification::new(category, verdict, action);
        if let Err(err) = self.dispatcher.dispatch_background(&note) {
            warn!(action_id = action.action_id(), %category, %err, "background notification not dispatched");
        }
    }

    /// Returns counters, cache state and pending notification count.
    #[must_use]
    pub fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            stats: self.stats.snapshot(),
            cache: self.cache.status(),
            pending_notifications: self.dispatcher.pending_count(),
        }
    }

    /// Drains background notifications and logs the final snapshot.
    pub async fn shutdown(&self) -> DrainReport {
        let report = self.dispatcher.drain().await;
        let snapshot = self.snapshot();
        info!(
            total = snapshot.stats.total,
            allow = snapshot.stats.allow,
            block = snapshot.stats.block,
            flag = snapshot.stats.flag,
            abandoned_notifications = report.abandoned,
            "decision engine shut down"
        );
        report
    }
}

fn finalize(action: &Action, parsed: crate::OracleDecision, entries: &[CacheEntry]) -> Verdict {
    let applied = reconcile_rules(parsed.decision, &parsed.applied_rules, &parsed.rationale, entries);
    let severity = attributed_severity(parsed.decision, parsed.severity, &applied, entries);
    Verdict::new(action, parsed.decision, parsed.rationale, severity, applied)
}

fn emergency_verdict(action: &Action, fault: &str) -> Verdict {
    Verdict::fail_closed(
        action,
        SYSTEM_ERROR_TAG,
        format!("System error in policy evaluation: {fault}"),
    )
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
