//! Prompt rendering for the oracle.

use guard_policy::CacheEntry;
use guard_primitives::Action;
use serde_json::{Map, Value, json};

/// System prompt given to the oracle; `{policy_rules}` is replaced by the
/// rendered rule block.
pub const MASTER_PROMPT: &str = r#"You are the Ethical Reasoner for OrchestraGuard. Your job is to evaluate intercepted agent actions against enterprise policies.

CRITICAL RULES:
1. NEVER allow an action that violates a rule in the EPKB.
2. NEVER use external knowledge or common sense; rely only on the EPKB rule.
3. ALWAYS provide a clear rationale for your decision.
4. PRIORITY: Security and Compliance override Efficiency. When in doubt, Block.
5. OUTPUT FORMAT: Your final response MUST be a single, valid JSON object.

CORE LOGIC FLOW:
1. RECEIVE INTERCEPTION: Analyze the intercepted action JSON.
2. RETRIEVE POLICY: Apply relevant policy rules for the target_tool.
3. REASON & EVALUATE: Compare tool_arguments and user_context against rules.
4. DECIDE: Determine if action is compliant (ALLOW/BLOCK/FLAG).
5. LOG: Record decision with rationale and severity.

POLICY RULES TO APPLY:
{policy_rules}

OUTPUT JSON FORMAT:
{
  "decision": "ALLOW|BLOCK|FLAG",
  "rationale": "concise explanation of why this decision was made",
  "severity": "HIGH|MEDIUM|LOW|null",
  "applied_rules": ["rule_id_1", "rule_id_2"]
}

Remember: When a rule is violated, you MUST set decision to the rule's action_on_violation."#;

const RULE_SEPARATOR: &str = "\n---\n";

/// Renders resolved rules into the block embedded in the system prompt.
#[must_use]
pub fn render_rules(entries: &[CacheEntry]) -> String {
    entries
        .iter()
        .map(|entry| {
            let rule = entry.rule();
            format!(
                "Rule ID: {}\nPolicy: {}\nDescription: {}\nTarget Tool Pattern: {}\nCondition: {}\nSeverity: {}\nAction on Violation: {}\n",
                rule.rule_id(),
                entry.policy_name(),
                rule.description(),
                rule.target_pattern(),
                rule.condition_text(),
                rule.severity().as_str(),
                rule.action_on_violation(),
            )
        })
        .collect::<Vec<_>>()
        .join(RULE_SEPARATOR)
}

/// Builds the system prompt around a rendered rule block.
#[must_use]
pub fn system_prompt(rendered_rules: &str) -> String {
    MASTER_PROMPT.replace("{policy_rules}", rendered_rules)
}

/// Serializable view of the action handed to the oracle.
#[must_use]
pub fn action_context(action: &Action) -> Value {
    json!({
        "action_id": action.action_id(),
        "source_agent": action.source_agent(),
        "target_tool": action.target_tool(),
        "tool_arguments": action.tool_arguments(),
        "user_context": action.user_context().cloned().unwrap_or_else(Map::new),
        "timestamp": action.timestamp().to_rfc3339(),
    })
}

/// Builds the user prompt embedding the action context as fenced JSON.
///
/// # Errors
///
/// Returns the serialization error if the context cannot be pretty-printed.
pub fn user_prompt(context: &Value) -> serde_json::Result<String> {
    let pretty = serde_json::to_string_pretty(context)?;
    Ok(format!(
        "Evaluate this intercepted action against the provided policies:\n\n```json\n{pretty}\n```\nProvide your decision in the required JSON format."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_primitives::{ActionOnViolation, Rule, RuleId, Severity};

    fn entry(id: &str, name: &str) -> CacheEntry {
        let rule = Rule::new(
            RuleId::new(id).unwrap(),
            "Do not share secrets outside the company",
            "Slack_API_.*",
            "message contains credentials",
            Severity::High,
            ActionOnViolation::Block,
        )
        .unwrap();
        CacheEntry::new("p1", name, rule)
    }

    #[test]
    fn rules_are_rendered_and_separated() {
        let rendered = render_rules(&[entry("SL-001", "Secrets"), entry("SL-002", "Secrets")]);
        assert!(rendered.starts_with("Rule ID: SL-001\nPolicy: Secrets\n"));
        assert!(rendered.contains("Severity: HIGH\nAction on Violation: BLOCK\n"));
        assert_eq!(rendered.matches(RULE_SEPARATOR).count(), 1);

        let prompt = system_prompt(&rendered);
        assert!(prompt.contains("Rule ID: SL-002"));
        assert!(!prompt.contains("{policy_rules}"));
    }

    #[test]
    fn user_prompt_fences_the_action_context() {
        let action = Action::builder("agent-1", "Slack_API_PostMessage")
            .action_id("a-1")
            .argument("channel", "#general")
            .build()
            .unwrap();
        let context = action_context(&action);
        assert_eq!(context["user_context"], json!({}));
        assert_eq!(context["tool_arguments"]["channel"], "#general");

        let prompt = user_prompt(&context).unwrap();
        assert!(prompt.contains("```json\n{\n  \"action_id\": \"a-1\""));
        assert!(prompt.ends_with("Provide your decision in the required JSON format."));
    }
}
