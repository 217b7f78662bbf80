//! Verdicts rendered for intercepted actions.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::error::{Error, Result};
use crate::rule::Severity;
use crate::MAX_RATIONALE_CHARS;

/// Outcome of evaluating an action.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    /// Action may proceed.
    Allow,
    /// Action is rejected.
    Block,
    /// Action may proceed but is raised for review.
    Flag,
}

impl Decision {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Block => "BLOCK",
            Self::Flag => "FLAG",
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ALLOW" => Ok(Self::Allow),
            "BLOCK" => Ok(Self::Block),
            "FLAG" => Ok(Self::Flag),
            _ => Err(Error::UnknownVariant {
                field: "decision",
                value: s.to_owned(),
            }),
        }
    }
}

/// Final, immutable verdict for one action.
///
/// Construction enforces the severity invariants: a BLOCK always carries a
/// severity (HIGH when none is supplied) and an ALLOW never does.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Verdict {
    action_id: String,
    source_agent: String,
    target_tool: String,
    decision: Decision,
    rationale: String,
    severity: Option<Severity>,
    applied_rules: Vec<String>,
    timestamp: DateTime<Utc>,
}

impl Verdict {
    /// Creates a verdict for `action`, truncating the rationale to
    /// [`MAX_RATIONALE_CHARS`] characters.
    #[must_use]
    pub fn new(
        action: &Action,
        decision: Decision,
        rationale: impl Into<String>,
        severity: Option<Severity>,
        applied_rules: Vec<String>,
    ) -> Self {
        let severity = match decision {
            Decision::Allow => None,
            Decision::Block => Some(severity.unwrap_or(Severity::High)),
            Decision::Flag => severity,
        };

        Self {
            action_id: action.action_id().to_owned(),
            source_agent: action.source_agent().to_owned(),
            target_tool: action.target_tool().to_owned(),
            decision,
            rationale: truncate_chars(rationale.into(), MAX_RATIONALE_CHARS),
            severity,
            applied_rules,
            timestamp: Utc::now(),
        }
    }

    /// ALLOW verdict for an action no cached rule applies to.
    #[must_use]
    pub fn allow_ungoverned(action: &Action) -> Self {
        Self::new(
            action,
            Decision::Allow,
            "No active policies defined for this tool",
            None,
            Vec::new(),
        )
    }

    /// Fail-closed BLOCK verdict with severity HIGH, attributed to a diagnostic
    /// `tag` such as `PARSE-ERROR`.
    #[must_use]
    pub fn fail_closed(action: &Action, tag: &str, rationale: impl Into<String>) -> Self {
        Self::new(
            action,
            Decision::Block,
            rationale,
            Some(Severity::High),
            vec![tag.to_owned()],
        )
    }

    /// Returns the action identifier.
    #[must_use]
    pub fn action_id(&self) -> &str {
        &self.action_id
    }

    /// Returns the agent that issued the action.
    #[must_use]
    pub fn source_agent(&self) -> &str {
        &self.source_agent
    }

    /// Returns the targeted tool.
    #[must_use]
    pub fn target_tool(&self) -> &str {
        &self.target_tool
    }

    /// Returns the decision.
    #[must_use]
    pub const fn decision(&self) -> Decision {
        self.decision
    }

    /// Returns the (bounded) rationale.
    #[must_use]
    pub fn rationale(&self) -> &str {
        &self.rationale
    }

    /// Returns the severity, always present for BLOCK.
    #[must_use]
    pub const fn severity(&self) -> Option<Severity> {
        self.severity
    }

    /// Returns the attributed rule identifiers or diagnostic tags.
    #[must_use]
    pub fn applied_rules(&self) -> &[String] {
        &self.applied_rules
    }

    /// Returns when the verdict was rendered.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns true for BLOCK verdicts.
    #[must_use]
    pub fn is_block(&self) -> bool {
        self.decision == Decision::Block
    }
}

fn truncate_chars(mut text: String, max: usize) -> String {
    if let Some((idx, _)) = text.char_indices().nth(max) {
        text.truncate(idx);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action() -> Action {
        Action::builder("agent-b", "Slack_API_PostMessage")
            .action_id("act-7")
            .build()
            .unwrap()
    }

    #[test]
    fn block_without_severity_becomes_high() {
        let verdict = Verdict::new(&action(), Decision::Block, "nope", None, Vec::new());
        assert_eq!(verdict.severity(), Some(Severity::High));
        assert!(verdict.is_block());
    }

    #[test]
    fn allow_drops_severity() {
        let verdict = Verdict::new(
            &action(),
            Decision::Allow,
            "fine",
            Some(Severity::Low),
            Vec::new(),
        );
        assert_eq!(verdict.severity(), None);
    }

    #[test]
    fn rationale_is_truncated_on_char_boundaries() {
        let long = "é".repeat(MAX_RATIONALE_CHARS + 50);
        let verdict = Verdict::new(&action(), Decision::Flag, long, None, Vec::new());
        assert_eq!(verdict.rationale().chars().count(), MAX_RATIONALE_CHARS);
    }

    #[test]
    fn fail_closed_tags_rule_list() {
        let verdict = Verdict::fail_closed(&action(), "PARSE-ERROR", "bad reply");
        assert_eq!(verdict.decision(), Decision::Block);
        assert_eq!(verdict.severity(), Some(Severity::High));
        assert_eq!(verdict.applied_rules(), ["PARSE-ERROR"]);
        assert_eq!(verdict.action_id(), "act-7");
    }

    #[test]
    fn decision_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&Decision::Flag).unwrap(), "\"FLAG\"");
        assert_eq!("allow".parse::<Decision>().unwrap(), Decision::Allow);
        assert!("MAYBE".parse::<Decision>().is_err());
    }
}
