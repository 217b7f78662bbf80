//! Bounded in-memory audit ring.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::record::AuditRecord;
use crate::{AuditResult, AuditSink};

/// Capacity of the in-memory ring.
#[derive(Debug, Clone, Copy)]
pub struct MemoryAuditConfig {
    capacity: NonZeroUsize,
}

impl MemoryAuditConfig {
    /// Creates a configuration retaining at most `capacity` records.
    #[must_use]
    pub const fn new(capacity: NonZeroUsize) -> Self {
        Self { capacity }
    }

    /// Returns the ring capacity.
    #[must_use]
    pub const fn capacity(self) -> NonZeroUsize {
        self.capacity
    }
}

impl Default for MemoryAuditConfig {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(256).unwrap_or(NonZeroUsize::MIN))
    }
}

/// Sink keeping the most recent records in memory.
#[derive(Debug)]
pub struct MemoryAuditSink {
    config: MemoryAuditConfig,
    entries: RwLock<VecDeque<AuditRecord>>,
}

impl MemoryAuditSink {
    /// Creates an empty ring.
    #[must_use]
    pub fn new(config: MemoryAuditConfig) -> Self {
        Self {
            config,
            entries: RwLock::new(VecDeque::with_capacity(config.capacity().get())),
        }
    }

    /// Returns up to `limit` most recent records, oldest first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let guard = self.entries.read().await;
        let skip = guard.len().saturating_sub(limit);
        guard.iter().skip(skip).cloned().collect()
    }

    /// Number of retained records.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing has been recorded.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new(MemoryAuditConfig::default())
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut guard = self.entries.write().await;
        guard.push_back(record.clone());
        while guard.len() > self.config.capacity().get() {
            guard.pop_front();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guard_primitives::{Action, Verdict};
    use std::time::Duration;

    fn record(tool: &str) -> AuditRecord {
        let action = Action::builder("agent-1", tool).build().unwrap();
        AuditRecord::from_verdict(&Verdict::allow_ungoverned(&action), &action, Duration::ZERO)
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let sink = MemoryAuditSink::new(MemoryAuditConfig::new(NonZeroUsize::new(2).unwrap()));
        for tool in ["One_Tool", "Two_Tool", "Three_Tool"] {
            sink.record(&record(tool)).await.unwrap();
        }

        let recent = sink.recent(10).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].target_tool, "Two_Tool");
        assert_eq!(recent[1].target_tool, "Three_Tool");
        assert_eq!(sink.recent(1).await[0].target_tool, "Three_Tool");
    }
}
