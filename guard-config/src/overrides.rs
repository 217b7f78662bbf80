//! `ORCHESTRA_GUARD_*` overrides applied on top of a loaded document.

use std::str::FromStr;

use guard_adapters::openai_compat::ORACLE_API_KEY_ENV;
use tracing::debug;

use crate::{ConfigError, ConfigResult, GuardConfig};

/// Policy cache TTL in seconds.
pub const CACHE_TTL_SECS: &str = "ORCHESTRA_GUARD_CACHE_TTL_SECS";
/// Oracle base URL.
pub const ORACLE_BASE_URL: &str = "ORCHESTRA_GUARD_ORACLE_BASE_URL";
/// Oracle model identifier.
pub const ORACLE_MODEL: &str = "ORCHESTRA_GUARD_ORACLE_MODEL";
/// Oracle API key.
pub const ORACLE_API_KEY: &str = ORACLE_API_KEY_ENV;
/// Oracle HTTP timeout in seconds.
pub const ORACLE_TIMEOUT_SECS: &str = "ORCHESTRA_GUARD_ORACLE_TIMEOUT_SECS";
/// Oracle attempts per action.
pub const ENGINE_MAX_ATTEMPTS: &str = "ORCHESTRA_GUARD_ENGINE_MAX_ATTEMPTS";
/// First retry delay in milliseconds.
pub const ENGINE_BASE_DELAY_MS: &str = "ORCHESTRA_GUARD_ENGINE_BASE_DELAY_MS";
/// Per-call oracle timeout in seconds.
pub const ENGINE_ORACLE_TIMEOUT_SECS: &str = "ORCHESTRA_GUARD_ENGINE_ORACLE_TIMEOUT_SECS";
/// Background drain deadline in seconds.
pub const DRAIN_DEADLINE_SECS: &str = "ORCHESTRA_GUARD_DRAIN_DEADLINE_SECS";
/// Default log filter directive.
pub const LOG_FILTER: &str = "ORCHESTRA_GUARD_LOG_FILTER";

impl GuardConfig {
    /// Applies overrides read through `lookup`, then re-validates.
    ///
    /// `lookup` receives a variable name such as [`CACHE_TTL_SECS`] and
    /// returns its value when set. Pass `|key| std::env::var(key).ok()` to
    /// read the process environment.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for a value that does not parse
    /// and any error from [`GuardConfig::validate`].
    pub fn with_overrides<F>(mut self, lookup: F) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| {
            let value = lookup(key)?;
            debug!(key, "configuration override applied");
            Some(value)
        };

        if let Some(raw) = get(CACHE_TTL_SECS) {
            self.cache.ttl_secs = parse(CACHE_TTL_SECS, &raw)?;
        }
        if let Some(raw) = get(ORACLE_BASE_URL) {
            self.oracle.base_url = raw;
        }
        if let Some(raw) = get(ORACLE_MODEL) {
            self.oracle.model = raw;
        }
        if let Some(raw) = get(ORACLE_API_KEY) {
            self.oracle.api_key = Some(raw).filter(|key| !key.trim().is_empty());
        }
        if let Some(raw) = get(ORACLE_TIMEOUT_SECS) {
            self.oracle.timeout_secs = parse(ORACLE_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(ENGINE_MAX_ATTEMPTS) {
            self.engine.max_attempts = parse(ENGINE_MAX_ATTEMPTS, &raw)?;
        }
        if let Some(raw) = get(ENGINE_BASE_DELAY_MS) {
            self.engine.base_delay_ms = parse(ENGINE_BASE_DELAY_MS, &raw)?;
        }
        if let Some(raw) = get(ENGINE_ORACLE_TIMEOUT_SECS) {
            self.engine.oracle_timeout_secs = parse(ENGINE_ORACLE_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = get(DRAIN_DEADLINE_SECS) {
            self.notifications.drain_deadline_secs = parse(DRAIN_DEADLINE_SECS, &raw)?;
        }
        if let Some(raw) = get(LOG_FILTER) {
            self.telemetry.filter = raw;
        }

        self.validate()?;
        Ok(self)
    }

    /// Applies overrides from the process environment.
    ///
    /// # Errors
    ///
    /// See [`GuardConfig::with_overrides`].
    pub fn with_env_overrides(self) -> ConfigResult<Self> {
        self.with_overrides(|key| std::env::var(key).ok())
    }
}

fn parse<T: FromStr>(key: &'static str, raw: &str) -> ConfigResult<T> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_owned(),
    })
}
