//! Policy store interface and an in-memory implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::RwLock;

use crate::PolicyResult;

/// A policy row as returned by the store.
///
/// `rule` is kept as raw JSON so a single malformed rule can be skipped at
/// index time without failing the whole refresh.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    id: String,
    name: String,
    #[serde(default)]
    is_active: bool,
    #[serde(alias = "rules")]
    rule: Value,
}

impl PolicyRecord {
    /// Creates an active policy record.
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>, rule: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            is_active: true,
            rule,
        }
    }

    /// Marks the record inactive.
    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Returns the policy identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the policy name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns whether the policy is active.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the raw rule document.
    #[must_use]
    pub fn rule(&self) -> &Value {
        &self.rule
    }
}

/// Trait implemented by policy backends.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Returns every active policy record.
    async fn active_policies(&self) -> PolicyResult<Vec<PolicyRecord>>;
}

/// In-memory store whose contents can be swapped at runtime.
#[derive(Debug, Default)]
pub struct StaticPolicyStore {
    records: RwLock<Vec<PolicyRecord>>,
}

impl StaticPolicyStore {
    /// Creates a store seeded with `records`.
    #[must_use]
    pub fn new(records: Vec<PolicyRecord>) -> Self {
        Self {
            records: RwLock::new(records),
        }
    }

    /// Replaces the stored records.
    pub async fn replace(&self, records: Vec<PolicyRecord>) {
        *self.records.write().await = records;
    }

    /// Appends a record.
    pub async fn push(&self, record: PolicyRecord) {
        self.records.write().await.push(record);
    }
}

#[async_trait]
impl PolicyStore for StaticPolicyStore {
    async fn active_policies(&self) -> PolicyResult<Vec<PolicyRecord>> {
        let guard = self.records.read().await;
        Ok(guard.iter().filter(|r| r.is_active()).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn static_store_filters_inactive() {
        let store = StaticPolicyStore::new(vec![
            PolicyRecord::new("p1", "PII", json!({})),
            PolicyRecord::new("p2", "Legacy", json!({})).inactive(),
        ]);
        let active = store.active_policies().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), "p1");

        store.replace(Vec::new()).await;
        assert!(store.active_policies().await.unwrap().is_empty());
    }

    #[test]
    fn record_accepts_legacy_rules_key() {
        let record: PolicyRecord = serde_json::from_value(json!({
            "id": "p1",
            "name": "PII",
            "is_active": true,
            "rules": {"rule_id": "DP-001"}
        }))
        .unwrap();
        assert_eq!(record.rule()["rule_id"], json!("DP-001"));
    }
}
