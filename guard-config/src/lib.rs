//! Configuration loading for OrchestraGuard.
//!
//! A [`GuardConfig`] is read from a JSON document whose fields all default,
//! adjusted through `ORCHESTRA_GUARD_*` overrides, and then turned into the
//! typed configuration each pipeline crate validates on its own.

#![warn(missing_docs, clippy::pedantic)]

pub mod document;
pub mod overrides;

mod error;

pub use document::{
    CacheSection, EngineSection, GuardConfig, NotificationSection, OracleSection,
};
pub use error::{ConfigError, ConfigResult};
