//! TTL-refreshed policy cache with stale-on-failure semantics.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::index::{CacheEntry, PolicyIndex};
use crate::store::PolicyStore;
use crate::{PolicyError, PolicyResult};

/// Configuration for [`PolicyCache`].
#[derive(Debug, Clone, Copy)]
pub struct CacheConfig {
    ttl: Duration,
}

impl CacheConfig {
    /// Creates a configuration with the supplied time-to-live.
    #[must_use]
    pub const fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Returns the freshness window.
    #[must_use]
    pub const fn ttl(self) -> Duration {
        self.ttl
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::InvalidConfig`] when the TTL is zero.
    pub fn validate(self) -> PolicyResult<()> {
        if self.ttl.is_zero() {
            return Err(PolicyError::InvalidConfig("cache ttl must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

/// Outcome of a successful refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshReport {
    /// Records returned by the store.
    pub records: usize,
    /// Distinct target patterns in the new index.
    pub patterns: usize,
    /// Entries in the new index.
    pub entries: usize,
    /// Records skipped because their rule was invalid.
    pub skipped: usize,
}

/// Read-only view of the cache for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStatus {
    /// Distinct target patterns.
    pub patterns: usize,
    /// Indexed entries.
    pub entries: usize,
    /// Wall-clock time of the last successful refresh.
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Seconds elapsed since the last successful refresh.
    pub age_secs: Option<f64>,
}

struct CacheState {
    index: Arc<PolicyIndex>,
    refreshed: Option<Instant>,
    refreshed_at: Option<DateTime<Utc>>,
    invalidated: bool,
}

impl CacheState {
    fn is_stale(&self, ttl: Duration) -> bool {
        self.invalidated
            || self
                .refreshed
                .is_none_or(|refreshed| refreshed.elapsed() > ttl)
    }
}

/// Rule cache keyed by target pattern.
///
/// The index is never mutated in place: each refresh builds a new
/// [`PolicyIndex`] and swaps it in, so readers always see a complete index.
pub struct PolicyCache {
    store: Arc<dyn PolicyStore>,
    config: CacheConfig,
    state: RwLock<Arc<CacheState>>,
    refresh_gate: Mutex<()>,
}

impl fmt::Debug for PolicyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyCache")
            .field("store", &"dyn PolicyStore")
            .field("config", &self.config)
            .field("status", &self.status())
            .finish()
    }
}

impl PolicyCache {
    /// Creates an empty cache backed by `store`. The first
    /// [`PolicyCache::ensure_fresh`] call populates it.
    #[must_use]
    pub fn new(store: Arc<dyn PolicyStore>, config: CacheConfig) -> Self {
        Self {
            store,
            config,
            state: RwLock::new(Arc::new(CacheState {
                index: Arc::new(PolicyIndex::empty()),
                refreshed: None,
                refreshed_at: None,
                invalidated: false,
            })),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Returns the cache configuration.
    #[must_use]
    pub const fn config(&self) -> CacheConfig {
        self.config
    }

    fn current(&self) -> Arc<CacheState> {
        Arc::clone(&self.state.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn swap(&self, next: CacheState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
    }

    /// Returns the currently published index.
    #[must_use]
    pub fn index(&self) -> Arc<PolicyIndex> {
        Arc::clone(&self.current().index)
    }

    /// Pulls every active rule from the store and swaps in a freshly built
    /// index.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::StoreUnavailable`] when the store fails; the
    /// previous index stays published.
    pub async fn refresh(&self) -> PolicyResult<RefreshReport> {
        let records = match self.store.active_policies().await {
            Ok(records) => records,
            Err(err) => {
                warn!(%err, "policy refresh failed; serving previous rules");
                return Err(err);
            }
        };

        let index = PolicyIndex::build(&records);
        let report = RefreshReport {
            records: records.len(),
            patterns: index.pattern_count(),
            entries: index.entry_count(),
            skipped: index.skipped(),
        };

        self.swap(CacheState {
            index: Arc::new(index),
            refreshed: Some(Instant::now()),
            refreshed_at: Some(Utc::now()),
            invalidated: false,
        });

        info!(
            records = report.records,
            patterns = report.patterns,
            entries = report.entries,
            skipped = report.skipped,
            "policy cache refreshed"
        );
        Ok(report)
    }

    /// Refreshes when the cache was never populated, was invalidated, or its
    /// TTL elapsed. Store failures are logged and the stale index is kept.
    pub async fn ensure_fresh(&self) {
        let ttl = self.config.ttl();
        if !self.current().is_stale(ttl) {
            return;
        }

        let _gate = self.refresh_gate.lock().await;
        if !self.current().is_stale(ttl) {
            debug!("policy cache refreshed by a concurrent caller");
            return;
        }

        // Failure already logged by refresh.
        let _ = self.refresh().await;
    }

    /// Ensures freshness, then returns every entry whose pattern matches
    /// `target_tool`.
    pub async fn resolve(&self, target_tool: &str) -> Vec<CacheEntry> {
        self.ensure_fresh().await;
        self.lookup(target_tool)
    }

    /// Matches `target_tool` against the published index without refreshing.
    #[must_use]
    pub fn lookup(&self, target_tool: &str) -> Vec<CacheEntry> {
        self.current().index.resolve(target_tool)
    }

    /// Forces the next [`PolicyCache::ensure_fresh`] to refresh while still
    /// serving the current index.
    pub fn invalidate(&self) {
        let current = self.current();
        self.swap(CacheState {
            index: Arc::clone(&current.index),
            refreshed: current.refreshed,
            refreshed_at: current.refreshed_at,
            invalidated: true,
        });
    }

    /// Returns a reporting snapshot.
    #[must_use]
    pub fn status(&self) -> CacheStatus {
        let current = self.current();
        CacheStatus {
            patterns: current.index.pattern_count(),
            entries: current.index.entry_count(),
            refreshed_at: current.refreshed_at,
            age_secs: current.refreshed.map(|r| r.elapsed().as_secs_f64()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PolicyRecord;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingStore {
        calls: AtomicUsize,
        failing: AtomicBool,
        records: Vec<PolicyRecord>,
    }

    impl CountingStore {
        fn new(records: Vec<PolicyRecord>) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                records,
            })
        }
    }

    #[async_trait]
    impl PolicyStore for CountingStore {
        async fn active_policies(&self) -> PolicyResult<Vec<PolicyRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(PolicyError::store("connection refused"));
            }
            Ok(self.records.clone())
        }
    }

    fn slack_record() -> PolicyRecord {
        PolicyRecord::new(
            "p1",
            "Public channels",
            json!({
                "rule_id": "SL-001",
                "description": "No posting confidential data to public channels",
                "target_pattern": "Slack_API_.*",
                "condition_text": "channel is public and message is confidential",
                "severity": "MEDIUM",
                "action_on_violation": "BLOCK"
            }),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn refreshes_once_per_ttl_window() {
        let store = CountingStore::new(vec![slack_record()]);
        let cache = PolicyCache::new(store.clone(), CacheConfig::default());

        assert_eq!(cache.resolve("Slack_API_PostMessage").await.len(), 1);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(30)).await;
        cache.resolve("Slack_API_PostMessage").await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        cache.resolve("Slack_API_PostMessage").await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn store_failure_keeps_previous_index() {
        let store = CountingStore::new(vec![slack_record()]);
        let cache = PolicyCache::new(store.clone(), CacheConfig::default());
        cache.refresh().await.unwrap();

        store.failing.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(120)).await;

        let entries = cache.resolve("Slack_API_PostMessage").await;
        assert_eq!(entries.len(), 1);
        assert!(matches!(
            cache.refresh().await,
            Err(PolicyError::StoreUnavailable { .. })
        ));
        assert_eq!(cache.status().entries, 1);
    }

    #[tokio::test]
    async fn never_populated_cache_with_failing_store_resolves_nothing() {
        let store = CountingStore::new(vec![slack_record()]);
        store.failing.store(true, Ordering::SeqCst);
        let cache = PolicyCache::new(store, CacheConfig::default());

        assert!(cache.resolve("Slack_API_PostMessage").await.is_empty());
        assert!(cache.status().refreshed_at.is_none());
    }

    #[tokio::test]
    async fn refresh_is_idempotent() {
        let store = CountingStore::new(vec![slack_record(), slack_record()]);
        let cache = PolicyCache::new(store, CacheConfig::default());

        let first = cache.refresh().await.unwrap();
        let before: Vec<_> = cache
            .index()
            .entries()
            .map(|(p, e)| (p.to_owned(), e.clone()))
            .collect();
        let second = cache.refresh().await.unwrap();
        let after: Vec<_> = cache
            .index()
            .entries()
            .map(|(p, e)| (p.to_owned(), e.clone()))
            .collect();

        assert_eq!(first, second);
        assert_eq!(first.entries, 1);
        assert_eq!(before, after);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_forces_refresh_before_ttl() {
        let store = CountingStore::new(vec![slack_record()]);
        let cache = PolicyCache::new(store.clone(), CacheConfig::default());
        cache.ensure_fresh().await;
        cache.invalidate();
        assert_eq!(cache.lookup("Slack_API_PostMessage").len(), 1);

        cache.ensure_fresh().await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(CacheConfig::new(Duration::ZERO).validate().is_err());
        assert!(CacheConfig::default().validate().is_ok());
    }
}
