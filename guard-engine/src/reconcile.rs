//! Attribution of a verdict to the rules that were resolved for it.

use guard_policy::CacheEntry;
use guard_primitives::{Decision, Severity};

/// Chooses the rule ids a verdict is attributed to.
///
/// Oracle claims are kept only when they name a resolved rule (compared
/// case-insensitively, reported in canonical form). When no claim survives,
/// ALLOW is attributed to every resolved rule, while BLOCK and FLAG are
/// attributed to the rules whose id or description appears in the rationale,
/// or to every resolved rule if none does.
#[must_use]
pub fn reconcile_rules(
    decision: Decision,
    claimed: &[String],
    rationale: &str,
    resolved: &[CacheEntry],
) -> Vec<String> {
    let resolved_ids = distinct_ids(resolved.iter().map(|e| e.rule().rule_id().as_str()));

    let confirmed = distinct_ids(claimed.iter().filter_map(|claim| {
        resolved_ids
            .iter()
            .find(|id| id.eq_ignore_ascii_case(claim.trim()))
            .map(String::as_str)
    }));
    if !confirmed.is_empty() {
        return confirmed;
    }

    if decision == Decision::Allow {
        return resolved_ids;
    }

    let haystack = rationale.to_lowercase();
    let inferred = distinct_ids(resolved.iter().filter_map(|entry| {
        let rule = entry.rule();
        let id = rule.rule_id().as_str();
        let mentioned = haystack.contains(&id.to_lowercase())
            || haystack.contains(&rule.description().to_lowercase());
        mentioned.then_some(id)
    }));
    if inferred.is_empty() {
        resolved_ids
    } else {
        inferred
    }
}

/// Severity carried by the final verdict.
///
/// ALLOW never has one. An oracle-supplied severity wins otherwise. A BLOCK
/// without one takes the highest severity among the attributed rules.
#[must_use]
pub fn attributed_severity(
    decision: Decision,
    stated: Option<Severity>,
    applied: &[String],
    resolved: &[CacheEntry],
) -> Option<Severity> {
    match (decision, stated) {
        (Decision::Allow, _) => None,
        (_, Some(severity)) => Some(severity),
        (Decision::Block, None) => Some(
            resolved
                .iter()
                .map(CacheEntry::rule)
                .filter(|rule| applied.iter().any(|id| id == rule.rule_id().as_str()))
                .map(guard_primitives::Rule::severity)
                .max()
                .unwrap_or(Severity::High),
        ),
        (Decision::Flag, None) => None,
    }
}

fn distinct_ids<'a>(ids: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for id in ids {
        if !out.iter().any(|seen| seen == id) {
            out.push(id.to_owned());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_primitives::{ActionOnViolation, Rule, RuleId};

    fn entry(id: &str, description: &str, severity: Severity) -> CacheEntry {
        let rule = Rule::new(
            RuleId::new(id).unwrap(),
            description,
            "Slack_API_.*",
            "opaque",
            severity,
            ActionOnViolation::Block,
        )
        .unwrap();
        CacheEntry::new("p1", "Policy", rule)
    }

    fn resolved() -> Vec<CacheEntry> {
        vec![
            entry("SL-001", "no public confidential posts", Severity::Medium),
            entry("SL-002", "no posting customer credentials", Severity::Low),
        ]
    }

    fn claims(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| (*id).to_owned()).collect()
    }

    #[test]
    fn claims_are_filtered_to_resolved_rules() {
        let applied = reconcile_rules(
            Decision::Block,
            &claims(&["sl-002", "XX-999", "SL-002"]),
            "",
            &resolved(),
        );
        assert_eq!(applied, claims(&["SL-002"]));
    }

    #[test]
    fn allow_without_claims_lists_everything_considered() {
        let applied = reconcile_rules(Decision::Allow, &[], "fine", &resolved());
        assert_eq!(applied, claims(&["SL-001", "SL-002"]));
    }

    #[test]
    fn block_infers_from_rationale() {
        let by_id = reconcile_rules(Decision::Block, &claims(&["ZZ-000"]), "violates sl-002", &resolved());
        assert_eq!(by_id, claims(&["SL-002"]));

        let by_description = reconcile_rules(
            Decision::Flag,
            &[],
            "Looks like No Public Confidential Posts applies",
            &resolved(),
        );
        assert_eq!(by_description, claims(&["SL-001"]));

        let fallback = reconcile_rules(Decision::Block, &[], "public channel", &resolved());
        assert_eq!(fallback, claims(&["SL-001", "SL-002"]));
    }

    #[test]
    fn severity_follows_decision() {
        let rules = resolved();
        assert_eq!(
            attributed_severity(Decision::Allow, Some(Severity::High), &[], &rules),
            None
        );
        assert_eq!(
            attributed_severity(Decision::Block, Some(Severity::Low), &[], &rules),
            Some(Severity::Low)
        );
        assert_eq!(
            attributed_severity(Decision::Block, None, &claims(&["SL-001", "SL-002"]), &rules),
            Some(Severity::Medium)
        );
        assert_eq!(
            attributed_severity(Decision::Block, None, &claims(&["PARSE-ERROR"]), &rules),
            Some(Severity::High)
        );
        assert_eq!(attributed_severity(Decision::Flag, None, &[], &rules), None);
    }
}
