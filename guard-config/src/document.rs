//! The JSON configuration document and its conversions.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use guard_adapters::openai_compat::{DEFAULT_BASE_URL, OpenAiCompatAdapter, OpenAiCompatConfig};
use guard_engine::{AdapterOracle, EngineConfig};
use guard_notify::{DispatcherConfig, NotificationCategory, NotificationDispatcher};
use guard_policy::CacheConfig;
use guard_telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{ConfigError, ConfigResult};

/// Policy cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Seconds a refreshed index stays fresh.
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { ttl_secs: 60 }
    }
}

/// Oracle endpoint and sampling settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OracleSection {
    /// OpenAI-compatible base URL including the version prefix.
    pub base_url: String,
    /// Model identifier sent with each request.
    pub model: String,
    /// Bearer token; local servers usually need none.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// HTTP timeout for a single request.
    pub timeout_secs: u64,
    /// Sampling temperature.
    pub temperature: f32,
    /// Output token cap.
    pub max_output_tokens: u32,
}

impl std::fmt::Debug for OracleSection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleSection")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .field("temperature", &self.temperature)
            .field("max_output_tokens", &self.max_output_tokens)
            .finish()
    }
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            model: "local-model".to_owned(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.1,
            max_output_tokens: 1000,
        }
    }
}

/// Retry loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineSection {
    /// Oracle attempts per action.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub base_delay_ms: u64,
    /// Upper bound on a single oracle call.
    pub oracle_timeout_secs: u64,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            oracle_timeout_secs: 30,
        }
    }
}

/// Webhook receivers and delivery settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NotificationSection {
    /// Receivers of BLOCK alerts.
    pub block_urls: Vec<String>,
    /// Receivers of FLAG alerts.
    pub flag_urls: Vec<String>,
    /// Receivers of system alerts.
    pub system_urls: Vec<String>,
    /// Attempts per URL on the synchronous tier.
    pub immediate_attempts: u32,
    /// Attempts per URL on the background tier.
    pub background_attempts: u32,
    /// Per-attempt timeout.
    pub attempt_timeout_secs: u64,
    /// Linear backoff step between attempts.
    pub backoff_step_ms: u64,
    /// How long shutdown waits for background deliveries.
    pub drain_deadline_secs: u64,
}

impl Default for NotificationSection {
    fn default() -> Self {
        Self {
            block_urls: Vec::new(),
            flag_urls: Vec::new(),
            system_urls: Vec::new(),
            immediate_attempts: 3,
            background_attempts: 2,
            attempt_timeout_secs: 5,
            backoff_step_ms: 1000,
            drain_deadline_secs: 5,
        }
    }
}

impl NotificationSection {
    /// Configured receivers paired with their category.
    pub fn webhooks(&self) -> impl Iterator<Item = (NotificationCategory, &str)> {
        tagged(NotificationCategory::BlockAlert, &self.block_urls)
            .chain(tagged(NotificationCategory::FlagAlert, &self.flag_urls))
            .chain(tagged(NotificationCategory::SystemAlert, &self.system_urls))
    }
}

fn tagged(
    category: NotificationCategory,
    urls: &[String],
) -> impl Iterator<Item = (NotificationCategory, &str)> {
    urls.iter().map(move |url| (category, url.as_str()))
}

/// Complete OrchestraGuard configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuardConfig {
    /// Policy cache section.
    pub cache: CacheSection,
    /// Oracle section.
    pub oracle: OracleSection,
    /// Retry loop section.
    pub engine: EngineSection,
    /// Notification section.
    pub notifications: NotificationSection,
    /// Log subscriber section.
    pub telemetry: TelemetryConfig,
}

impl GuardConfig {
    /// Reads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the
    /// errors of [`GuardConfig::from_json_str`].
    pub async fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::from_json_str(&text)?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Parses and validates a JSON document. Missing fields take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed JSON or unknown fields and
    /// any error from [`GuardConfig::validate`].
    pub fn from_json_str(text: &str) -> ConfigResult<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks every section against the bounds its crate enforces.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> ConfigResult<()> {
        self.cache_config().validate()?;
        self.engine_config().validate()?;
        self.dispatcher_config().validate()?;
        self.telemetry.validate()?;

        if self.oracle.model.trim().is_empty() {
            return Err(ConfigError::InvalidConfig("oracle model must not be empty"));
        }
        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig("oracle timeout must be non-zero"));
        }
        if !(0.0..=2.0).contains(&self.oracle.temperature) {
            return Err(ConfigError::InvalidConfig(
                "oracle temperature must be within 0.0..=2.0",
            ));
        }
        if self.oracle.max_output_tokens == 0 {
            return Err(ConfigError::InvalidConfig(
                "oracle max_output_tokens must be non-zero",
            ));
        }
        self.oracle_config()?;
        Ok(())
    }

    /// Policy cache configuration.
    #[must_use]
    pub const fn cache_config(&self) -> CacheConfig {
        CacheConfig::new(Duration::from_secs(self.cache.ttl_secs))
    }

    /// Retry loop configuration.
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_max_attempts(self.engine.max_attempts)
            .with_base_delay(Duration::from_millis(self.engine.base_delay_ms))
            .with_oracle_timeout(Duration::from_secs(self.engine.oracle_timeout_secs))
    }

    /// Notification dispatcher configuration.
    #[must_use]
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let section = &self.notifications;
        DispatcherConfig::default()
            .with_immediate_attempts(section.immediate_attempts)
            .with_background_attempts(section.background_attempts)
            .with_attempt_timeout(Duration::from_secs(section.attempt_timeout_secs))
            .with_backoff_step(Duration::from_millis(section.backoff_step_ms))
            .with_drain_deadline(Duration::from_secs(section.drain_deadline_secs))
    }

    /// Adapter configuration for the oracle endpoint.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Adapter`] when the base URL is invalid.
    pub fn oracle_config(&self) -> ConfigResult<OpenAiCompatConfig> {
        let section = &self.oracle;
        let mut config = OpenAiCompatConfig::new(section.model.clone())
            .with_base_url(&section.base_url)?
            .with_timeout(Duration::from_secs(section.timeout_secs))
            .with_default_temperature(section.temperature);
        if let Some(key) = &section.api_key {
            config = config.with_api_key(key.clone());
        }
        Ok(config)
    }

    /// Builds the HTTP-backed oracle described by the `oracle` section.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Adapter`] when the adapter cannot be built.
    pub fn build_oracle(&self) -> ConfigResult<AdapterOracle> {
        let adapter = OpenAiCompatAdapter::new(self.oracle_config()?)?;
        Ok(AdapterOracle::new(Arc::new(adapter))
            .with_temperature(self.oracle.temperature)
            .with_max_output_tokens(self.oracle.max_output_tokens))
    }

    /// Log subscriber configuration.
    #[must_use]
    pub fn telemetry_config(&self) -> TelemetryConfig {
        self.telemetry.clone()
    }

    /// Registers every configured webhook with `dispatcher` and returns how
    /// many were newly added.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Notify`] on the first URL the dispatcher rejects.
    pub fn register_webhooks(&self, dispatcher: &NotificationDispatcher) -> ConfigResult<usize> {
        let mut added = 0;
        for (category, url) in self.notifications.webhooks() {
            if dispatcher.register(category, url)? {
                added += 1;
            }
        }
        debug!(added, "webhooks registered");
        Ok(added)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_notify::HyperTransport;

    #[test]
    fn defaults_match_pipeline_constants() {
        let config = GuardConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cache_config().ttl(), Duration::from_secs(60));

        let engine = config.engine_config();
        assert_eq!(engine.max_attempts(), 3);
        assert_eq!(engine.base_delay(), Duration::from_secs(1));

        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.immediate_attempts(), 3);
        assert_eq!(dispatcher.background_attempts(), 2);
        assert_eq!(dispatcher.drain_deadline(), Duration::from_secs(5));
        assert_eq!(config.telemetry_config().filter, "info");
    }

    #[test]
    fn partial_document_fills_defaults() {
        let config = GuardConfig::from_json_str(
            r#"{
                "cache": {"ttl_secs": 5},
                "oracle": {"model": "qwen2.5-7b-instruct", "api_key": "sk-test"},
                "notifications": {"block_urls": ["https://hooks.example.com/block"]}
            }"#,
        )
        .unwrap();
        assert_eq!(config.cache.ttl_secs, 5);
        assert_eq!(config.engine, EngineSection::default());
        assert_eq!(config.oracle.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.oracle.api_key.as_deref(), Some("sk-test"));
        assert!(!format!("{:?}", config.oracle).contains("sk-test"));
        assert!(!serde_json::to_string(&config).unwrap().contains("sk-test"));
    }

    #[test]
    fn unknown_fields_and_bad_bounds_are_rejected() {
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"cache": {"ttl": 5}}"#),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"cache": {"ttl_secs": 0}}"#),
            Err(ConfigError::Policy(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"engine": {"max_attempts": 0}}"#),
            Err(ConfigError::Engine(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"notifications": {"drain_deadline_secs": 0}}"#),
            Err(ConfigError::Notify(_))
        ));
        assert!(matches!(
            GuardConfig::from_json_str(r#"{"oracle": {"temperature": 3.5}}"#),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn webhooks_register_by_category() {
        let mut config = GuardConfig::default();
        config.notifications.block_urls = vec![
            "https://hooks.example.com/block".to_owned(),
            "https://hooks.example.com/block".to_owned(),
        ];
        config.notifications.system_urls = vec!["http://ops.internal/alerts".to_owned()];

        let dispatcher = NotificationDispatcher::new(
            Arc::new(HyperTransport::new()),
            config.dispatcher_config(),
        );
        assert_eq!(config.register_webhooks(&dispatcher).unwrap(), 2);
        assert_eq!(dispatcher.urls(NotificationCategory::BlockAlert).len(), 1);
        assert!(dispatcher.urls(NotificationCategory::FlagAlert).is_empty());

        config.notifications.flag_urls = vec!["ftp://nope".to_owned()];
        assert!(matches!(
            config.register_webhooks(&dispatcher),
            Err(ConfigError::Notify(_))
        ));
    }

    #[test]
    fn builds_http_oracle() {
        let config = GuardConfig::default();
        let oracle = config.build_oracle().unwrap();
        assert!(format!("{oracle:?}").contains("AdapterOracle"));
    }

    #[tokio::test]
    async fn load_reads_file_and_reports_missing_path() {
        let path = std::env::temp_dir().join(format!("guard-config-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, r#"{"telemetry": {"filter": "debug"}}"#)
            .await
            .unwrap();
        let config = GuardConfig::load(&path).await.unwrap();
        assert_eq!(config.telemetry.filter, "debug");
        tokio::fs::remove_file(&path).await.unwrap();

        assert!(matches!(
            GuardConfig::load(&path).await,
            Err(ConfigError::Io { .. })
        ));
    }
}
