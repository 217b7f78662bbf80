//! OrchestraGuard facade.
//!
//! Screens tool calls issued by autonomous agents against governance rules
//! and answers ALLOW, BLOCK or FLAG. The pipeline crates are bundled behind
//! feature flags; the default set pulls in everything needed to run a
//! [`engine::DecisionEngine`] from a configuration file.

#![warn(missing_docs, clippy::pedantic)]

/// Rules, actions and verdicts.
pub use guard_primitives as primitives;

/// Model adapters (enabled by `adapters` feature).
#[cfg(feature = "adapters")]
pub use guard_adapters as adapters;

/// Policy store and TTL cache (enabled by `policy` feature).
#[cfg(feature = "policy")]
pub use guard_policy as policy;

/// Webhook notifications (enabled by `notify` feature).
#[cfg(feature = "notify")]
pub use guard_notify as notify;

/// Audit sinks and decision statistics (enabled by `audit` feature).
#[cfg(feature = "audit")]
pub use guard_audit as audit;

/// Decision pipeline (enabled by `engine` feature).
#[cfg(feature = "engine")]
pub use guard_engine as engine;

/// File and environment configuration (enabled by `config` feature).
#[cfg(feature = "config")]
pub use guard_config as config;

/// Tracing setup (enabled by `telemetry` feature).
#[cfg(feature = "telemetry")]
pub use guard_telemetry as telemetry;

/// Types most integrations need.
#[cfg(feature = "engine")]
pub mod prelude {
    pub use guard_engine::{DecisionEngine, EngineConfig, Oracle, OracleRequest};
    pub use guard_policy::{PolicyCache, PolicyRecord, PolicyStore};
    pub use guard_primitives::{Action, Decision, Severity, Verdict};
}
