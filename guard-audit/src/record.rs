//! Audit record shape handed to sinks.

use std::time::Duration;

use chrono::{DateTime, Utc};
use guard_primitives::{Action, Decision, Severity, Verdict};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Context stored next to each verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditMetadata {
    /// Arguments the agent passed to the tool.
    pub tool_arguments: Map<String, Value>,
    /// Caller-supplied context, if any.
    pub user_context: Option<Map<String, Value>>,
    /// Verdict severity.
    pub severity: Option<Severity>,
    /// Wall time spent producing the verdict.
    pub processing_time_ms: u64,
}

/// One audited verdict.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Action identifier.
    pub action_id: String,
    /// Agent that issued the action.
    pub source_agent: String,
    /// Tool that was targeted.
    pub target_tool: String,
    /// Final decision.
    pub decision: Decision,
    /// Oracle or pipeline rationale.
    pub rationale: String,
    /// Extra context.
    pub metadata: AuditMetadata,
    /// Rules the verdict is attributed to.
    pub applied_rules: Vec<String>,
    /// Verdict timestamp.
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds the record for `verdict` rendered on `action`.
    #[must_use]
    pub fn from_verdict(verdict: &Verdict, action: &Action, processing_time: Duration) -> Self {
        Self {
            action_id: verdict.action_id().to_owned(),
            source_agent: verdict.source_agent().to_owned(),
            target_tool: verdict.target_tool().to_owned(),
            decision: verdict.decision(),
            rationale: verdict.rationale().to_owned(),
            metadata: AuditMetadata {
                tool_arguments: action.tool_arguments().clone(),
                user_context: action.user_context().cloned(),
                severity: verdict.severity(),
                processing_time_ms: u64::try_from(processing_time.as_millis()).unwrap_or(u64::MAX),
            },
            applied_rules: verdict.applied_rules().to_vec(),
            timestamp: verdict.timestamp(),
        }
    }
}
