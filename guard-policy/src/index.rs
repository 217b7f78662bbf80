//! Immutable pattern-to-rules index rebuilt on every refresh.

use std::collections::BTreeMap;
use std::fmt;

use guard_primitives::Rule;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::store::PolicyRecord;

/// A rule together with the policy it belongs to.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    policy_id: String,
    policy_name: String,
    rule: Rule,
}

impl CacheEntry {
    /// Creates an entry.
    #[must_use]
    pub fn new(policy_id: impl Into<String>, policy_name: impl Into<String>, rule: Rule) -> Self {
        Self {
            policy_id: policy_id.into(),
            policy_name: policy_name.into(),
            rule,
        }
    }

    /// Returns the owning policy identifier.
    #[must_use]
    pub fn policy_id(&self) -> &str {
        &self.policy_id
    }

    /// Returns the owning policy name.
    #[must_use]
    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    /// Returns the rule.
    #[must_use]
    pub fn rule(&self) -> &Rule {
        &self.rule
    }
}

enum PatternMatcher {
    Regex(Regex),
    /// Pattern failed to compile; matched by substring containment.
    Literal(String),
}

impl PatternMatcher {
    fn compile(pattern: &str) -> Self {
        // Validate the bare pattern; wrapping can make a broken one parse.
        match Regex::new(pattern).and_then(|_| Regex::new(&format!("^(?:{pattern})"))) {
            Ok(regex) => Self::Regex(regex),
            Err(err) => {
                debug!(pattern, %err, "target pattern is not a valid regex; using substring match");
                Self::Literal(pattern.to_owned())
            }
        }
    }

    fn matches(&self, target_tool: &str) -> bool {
        match self {
            Self::Regex(regex) => regex.is_match(target_tool),
            Self::Literal(literal) => target_tool.contains(literal.as_str()),
        }
    }
}

struct PatternGroup {
    matcher: PatternMatcher,
    entries: Vec<CacheEntry>,
}

/// Rules grouped by target pattern. Every pattern maps to at least one entry.
#[derive(Default)]
pub struct PolicyIndex {
    groups: BTreeMap<String, PatternGroup>,
    skipped: usize,
}

impl fmt::Debug for PolicyIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyIndex")
            .field("patterns", &self.groups.keys().collect::<Vec<_>>())
            .field("entries", &self.entry_count())
            .field("skipped", &self.skipped)
            .finish()
    }
}

impl PolicyIndex {
    /// Returns an index with no rules.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a fresh index from store records.
    ///
    /// Inactive records are ignored. Records whose rule fails validation are
    /// skipped with a warning and counted in [`PolicyIndex::skipped`].
    #[must_use]
    pub fn build(records: &[PolicyRecord]) -> Self {
        let mut index = Self::empty();

        for record in records.iter().filter(|r| r.is_active()) {
            let rule = match serde_json::from_value::<Rule>(record.rule().clone()) {
                Ok(rule) => rule,
                Err(err) => {
                    warn!(policy_id = record.id(), %err, "skipping invalid policy rule");
                    index.skipped += 1;
                    continue;
                }
            };
            index.insert(CacheEntry::new(record.id(), record.name(), rule));
        }

        index
    }

    fn insert(&mut self, entry: CacheEntry) {
        let pattern = entry.rule().target_pattern().to_owned();
        let group = self
            .groups
            .entry(pattern)
            .or_insert_with_key(|pattern| PatternGroup {
                matcher: PatternMatcher::compile(pattern),
                entries: Vec::new(),
            });

        let duplicate = group.entries.iter().any(|existing| {
            existing.policy_id == entry.policy_id
                && existing.rule.rule_id() == entry.rule.rule_id()
        });
        if !duplicate {
            group.entries.push(entry);
        }
    }

    /// Returns every entry whose pattern matches `target_tool`.
    #[must_use]
    pub fn resolve(&self, target_tool: &str) -> Vec<CacheEntry> {
        self.groups
            .values()
            .filter(|group| group.matcher.matches(target_tool))
            .flat_map(|group| group.entries.iter().cloned())
            .collect()
    }

    /// Iterates over `(pattern, entry)` pairs.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &CacheEntry)> {
        self.groups
            .iter()
            .flat_map(|(pattern, group)| group.entries.iter().map(move |e| (pattern.as_str(), e)))
    }

    /// Number of distinct target patterns.
    #[must_use]
    pub fn pattern_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of indexed entries across all patterns.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.groups.values().map(|g| g.entries.len()).sum()
    }

    /// Number of records skipped because their rule was invalid.
    #[must_use]
    pub const fn skipped(&self) -> usize {
        self.skipped
    }
}
