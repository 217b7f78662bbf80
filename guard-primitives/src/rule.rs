//! Governance rules forwarded to the reasoning oracle.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MIN_DESCRIPTION_CHARS: usize = 10;
const MAX_DESCRIPTION_CHARS: usize = 500;
const MAX_PATTERN_CHARS: usize = 200;
const MAX_CONDITION_CHARS: usize = 1000;

/// Identifier of a governance rule, formatted as two uppercase letters, a dash
/// and three digits (for example `DP-001`).
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RuleId(String);

impl RuleId {
    /// Parses and validates a rule identifier.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRuleId`] when the identifier does not follow the
    /// `AA-000` format.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let bytes = id.as_bytes();
        let valid = bytes.len() == 6
            && bytes[..2].iter().all(u8::is_ascii_uppercase)
            && bytes[2] == b'-'
            && bytes[3..].iter().all(u8::is_ascii_digit);
        if !valid {
            return Err(Error::InvalidRuleId { id });
        }
        Ok(Self(id))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RuleId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RuleId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<RuleId> for String {
    fn from(value: RuleId) -> Self {
        value.0
    }
}

impl FromStr for RuleId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Severity attached to rules and verdicts, ordered from least to most severe.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Informational; no immediate risk.
    Low,
    /// Requires attention but not immediate intervention.
    Medium,
    /// Critical; the action must not proceed unreviewed.
    High,
}

impl Severity {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Self::Low),
            "MEDIUM" => Ok(Self::Medium),
            "HIGH" => Ok(Self::High),
            _ => Err(Error::UnknownVariant {
                field: "severity",
                value: s.to_owned(),
            }),
        }
    }
}

/// Outcome a rule demands when the oracle finds it violated.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionOnViolation {
    /// Reject the action.
    Block,
    /// Let the action proceed but raise it for review.
    Flag,
}

impl ActionOnViolation {
    /// Returns the canonical uppercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Block => "BLOCK",
            Self::Flag => "FLAG",
        }
    }
}

impl Display for ActionOnViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of a rule as stored by the policy backend.
///
/// Missing severity defaults to [`Severity::Medium`] and a missing violation
/// action defaults to [`ActionOnViolation::Block`].
#[derive(Clone, Debug, Deserialize)]
pub struct RuleSpec {
    rule_id: String,
    description: String,
    #[serde(alias = "target_tool_regex")]
    target_pattern: String,
    #[serde(alias = "condition_logic")]
    condition_text: String,
    #[serde(default)]
    severity: Option<Severity>,
    #[serde(default)]
    action_on_violation: Option<ActionOnViolation>,
}

/// A governance rule. Immutable once loaded.
///
/// `condition_text` is opaque: it is forwarded to the oracle verbatim and is
/// never interpreted locally.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RuleSpec")]
pub struct Rule {
    rule_id: RuleId,
    description: String,
    target_pattern: String,
    condition_text: String,
    severity: Severity,
    action_on_violation: ActionOnViolation,
}

impl Rule {
    /// Creates a validated rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] when a text field is empty or outside its
    /// length bounds.
    pub fn new(
        rule_id: RuleId,
        description: impl Into<String>,
        target_pattern: impl Into<String>,
        condition_text: impl Into<String>,
        severity: Severity,
        action_on_violation: ActionOnViolation,
    ) -> Result<Self> {
        let description = description.into();
        let target_pattern = target_pattern.into();
        let condition_text = condition_text.into();

        check_len(
            &rule_id,
            "description",
            &description,
            MIN_DESCRIPTION_CHARS,
            MAX_DESCRIPTION_CHARS,
        )?;
        check_len(&rule_id, "target pattern", &target_pattern, 1, MAX_PATTERN_CHARS)?;
        check_len(&rule_id, "condition", &condition_text, 1, MAX_CONDITION_CHARS)?;

        Ok(Self {
            rule_id,
            description,
            target_pattern,
            condition_text,
            severity,
            action_on_violation,
        })
    }

    /// Returns the rule identifier.
    #[must_use]
    pub fn rule_id(&self) -> &RuleId {
        &self.rule_id
    }

    /// Returns the human-readable description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Returns the regex or literal used to select target tools.
    #[must_use]
    pub fn target_pattern(&self) -> &str {
        &self.target_pattern
    }

    /// Returns the opaque condition text forwarded to the oracle.
    #[must_use]
    pub fn condition_text(&self) -> &str {
        &self.condition_text
    }

    /// Returns the rule severity.
    #[must_use]
    pub const fn severity(&self) -> Severity {
        self.severity
    }

    /// Returns the outcome demanded on violation.
    #[must_use]
    pub const fn action_on_violation(&self) -> ActionOnViolation {
        self.action_on_violation
    }
}

impl TryFrom<RuleSpec> for Rule {
    type Error = Error;

    fn try_from(spec: RuleSpec) -> Result<Self> {
        let rule_id = RuleId::new(spec.rule_id)?;
        Self::new(
            rule_id,
            spec.description,
            spec.target_pattern,
            spec.condition_text,
            spec.severity.unwrap_or(Severity::Medium),
            spec.action_on_violation.unwrap_or(ActionOnViolation::Block),
        )
    }
}

fn check_len(rule_id: &RuleId, field: &str, value: &str, min: usize, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::invalid_rule(
            rule_id.as_str(),
            format!("{field} cannot be empty"),
        ));
    }
    let chars = value.chars().count();
    if chars < min || chars > max {
        return Err(Error::invalid_rule(
            rule_id.as_str(),
            format!("{field} must be between {min} and {max} characters"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rule_id_format_is_enforced() {
        assert!(RuleId::new("DP-001").is_ok());
        for bad in ["dp-001", "DP001", "DPX-001", "DP-01", "DP-0011", ""] {
            assert!(
                matches!(RuleId::new(bad), Err(Error::InvalidRuleId { .. })),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn severity_parses_case_insensitively_and_orders() {
        assert_eq!(" high ".parse::<Severity>().unwrap(), Severity::High);
        assert_eq!("Medium".parse::<Severity>().unwrap(), Severity::Medium);
        assert!("CRITICAL".parse::<Severity>().is_err());
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
    }

    #[test]
    fn rule_spec_applies_defaults_and_aliases() {
        let rule: Rule = serde_json::from_value(json!({
            "rule_id": "DP-001",
            "description": "Never share social security numbers",
            "target_tool_regex": "Slack_API_.*",
            "condition_logic": "arguments contain an SSN",
        }))
        .unwrap();

        assert_eq!(rule.rule_id().as_str(), "DP-001");
        assert_eq!(rule.target_pattern(), "Slack_API_.*");
        assert_eq!(rule.severity(), Severity::Medium);
        assert_eq!(rule.action_on_violation(), ActionOnViolation::Block);
    }

    #[test]
    fn rule_rejects_short_description() {
        let err = Rule::new(
            RuleId::new("DP-002").unwrap(),
            "too short",
            ".*",
            "always",
            Severity::Low,
            ActionOnViolation::Flag,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidRule { .. }));
    }

    #[test]
    fn rule_rejects_unknown_severity_on_the_wire() {
        let result = serde_json::from_value::<Rule>(json!({
            "rule_id": "DP-003",
            "description": "Payments above the limit need review",
            "target_pattern": "Stripe_.*",
            "condition_text": "amount > 10000",
            "severity": "CATASTROPHIC",
        }));
        assert!(result.is_err());
    }

    #[test]
    fn stored_enums_must_be_uppercase() {
        let result = serde_json::from_value::<Rule>(json!({
            "rule_id": "DP-004",
            "description": "Payments above the limit need review",
            "target_pattern": "Stripe_.*",
            "condition_text": "amount > 10000",
            "severity": "medium",
        }));
        assert!(result.is_err());
    }
}
