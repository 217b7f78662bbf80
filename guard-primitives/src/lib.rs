//! Core shared types for the OrchestraGuard decision pipeline.

#![warn(missing_docs, clippy::pedantic)]

mod action;
mod error;
mod rule;
mod verdict;

/// Intercepted agent actions and their builder.
pub use action::{Action, ActionBuilder};
/// Error type and result alias shared across the workspace.
pub use error::{Error, Result};
/// Governance rules and their enumerations.
pub use rule::{ActionOnViolation, Rule, RuleId, RuleSpec, Severity};
/// Verdicts rendered for intercepted actions.
pub use verdict::{Decision, Verdict};

/// Maximum number of characters retained from an oracle rationale.
pub const MAX_RATIONALE_CHARS: usize = 1000;
