//! Validation of the oracle's JSON object into a typed decision.

use guard_primitives::{Decision, Severity};
use serde_json::{Map, Value};
use tracing::debug;

use crate::ResponseError;
use crate::extract::extract_object;

/// Decision as stated by the oracle, before rule reconciliation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OracleDecision {
    /// Oracle verdict.
    pub decision: Decision,
    /// Oracle explanation.
    pub rationale: String,
    /// Oracle-supplied severity, if any.
    pub severity: Option<Severity>,
    /// Rule ids the oracle claims to have applied.
    pub applied_rules: Vec<String>,
}

/// Extracts and validates the decision embedded in `reply`.
///
/// # Errors
///
/// Returns [`ResponseError::Parse`] when no strategy finds a JSON object and
/// [`ResponseError::Validation`] when the object breaks the schema.
pub fn parse_reply(reply: &str) -> Result<OracleDecision, ResponseError> {
    let Some((strategy, object)) = extract_object(reply) else {
        return Err(ResponseError::parse(format!(
            "no strategy matched a {}-character reply",
            reply.chars().count()
        )));
    };
    debug!(strategy, "oracle reply extracted");
    validate(&object)
}

/// Validates an already extracted object.
///
/// `decision` and `rationale` are required. Enum values are matched
/// case-insensitively; a `severity` of `null`, `"null"` or `""` counts as
/// absent.
///
/// # Errors
///
/// Returns [`ResponseError::Validation`] on a missing field, a wrong type or
/// an unrecognized enum value.
pub fn validate(object: &Map<String, Value>) -> Result<OracleDecision, ResponseError> {
    let decision = match object.get("decision") {
        Some(Value::String(raw)) => raw
            .parse::<Decision>()
            .map_err(|_| ResponseError::validation(format!("unrecognized decision `{raw}`")))?,
        Some(_) => return Err(ResponseError::validation("`decision` must be a string")),
        None => return Err(ResponseError::validation("missing `decision`")),
    };

    let rationale = match object.get("rationale") {
        Some(Value::String(text)) => text.clone(),
        Some(_) => return Err(ResponseError::validation("`rationale` must be a string")),
        None => return Err(ResponseError::validation("missing `rationale`")),
    };

    let severity = match object.get("severity") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) if raw.trim().is_empty() || raw.trim().eq_ignore_ascii_case("null") => None,
        Some(Value::String(raw)) => Some(
            raw.parse::<Severity>()
                .map_err(|_| ResponseError::validation(format!("unrecognized severity `{raw}`")))?,
        ),
        Some(_) => return Err(ResponseError::validation("`severity` must be a string")),
    };

    let applied_rules = match object.get("applied_rules") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_owned)
            .collect(),
        Some(_) => return Err(ResponseError::validation("`applied_rules` must be a list")),
    };

    Ok(OracleDecision {
        decision,
        rationale,
        severity,
        applied_rules,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_reply() {
        let parsed =
            parse_reply(r#"{"decision":"BLOCK","rationale":"public channel","severity":"MEDIUM"}"#)
                .unwrap();
        assert_eq!(parsed.decision, Decision::Block);
        assert_eq!(parsed.severity, Some(Severity::Medium));
        assert!(parsed.applied_rules.is_empty());
    }

    #[test]
    fn enums_are_case_insensitive_and_null_severity_is_absent() {
        let parsed = parse_reply(
            r#"Output: {"decision":"flag","rationale":"odd","severity":"null","applied_rules":["sl-001", 7]}"#,
        )
        .unwrap();
        assert_eq!(parsed.decision, Decision::Flag);
        assert_eq!(parsed.severity, None);
        assert_eq!(parsed.applied_rules, vec!["sl-001".to_owned()]);
    }

    #[test]
    fn quoted_action_context_before_answer_is_skipped() {
        let parsed = parse_reply(
            "The action context was {\"channel\":\"#general\"}.\nOutput: {\"decision\":\"ALLOW\",\"rationale\":\"internal channel\"}",
        )
        .unwrap();
        assert_eq!(parsed.decision, Decision::Allow);
        assert_eq!(parsed.rationale, "internal channel");
    }

    #[test]
    fn prose_is_a_parse_error() {
        let err = parse_reply("Sure, I think this is fine").unwrap_err();
        assert!(matches!(err, ResponseError::Parse { .. }));
        assert_eq!(err.tag(), "PARSE-ERROR");
    }

    #[test]
    fn schema_violations_are_validation_errors() {
        for reply in [
            r#"{"rationale":"no decision"}"#,
            r#"{"decision":"MAYBE","rationale":"x"}"#,
            r#"{"decision":"ALLOW"}"#,
            r#"{"decision":"BLOCK","rationale":"x","severity":"CRITICAL"}"#,
            r#"{"decision":"BLOCK","rationale":"x","applied_rules":"SL-001"}"#,
        ] {
            let err = parse_reply(reply).unwrap_err();
            assert_eq!(err.tag(), "VALIDATION-ERROR", "reply: {reply}");
        }
    }
}
