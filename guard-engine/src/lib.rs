//! The OrchestraGuard decision pipeline.
//!
//! [`DecisionEngine::evaluate`] walks one action through policy resolution,
//! the oracle retry loop, reply extraction and validation, rule attribution
//! and the notification, audit and statistics fan-out. Every path ends in a
//! well-formed [`guard_primitives::Verdict`]; faults fail closed to BLOCK.

#![warn(missing_docs, clippy::pedantic)]

pub mod extract;
pub mod oracle;
pub mod prompt;
pub mod reconcile;
pub mod response;

mod engine;
mod error;

pub use engine::{
    DecisionEngine, DecisionEngineBuilder, EngineConfig, EngineSnapshot, Evaluation, Outcome,
};
pub use error::{EngineError, EngineResult, OracleError, OracleResult, ResponseError};
pub use oracle::{AdapterOracle, Oracle, OracleRequest};
pub use response::OracleDecision;

/// Tag attributed to verdicts whose oracle reply held no usable JSON.
pub const PARSE_ERROR_TAG: &str = "PARSE-ERROR";
/// Tag attributed to verdicts whose oracle reply failed schema checks.
pub const VALIDATION_ERROR_TAG: &str = "VALIDATION-ERROR";
/// Tag attributed to emergency blocks.
pub const SYSTEM_ERROR_TAG: &str = "SYSTEM-ERROR";
