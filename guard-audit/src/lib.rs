//! Best-effort audit trail and running decision counters.

#![warn(missing_docs, clippy::pedantic)]

pub mod journal;
pub mod memory;
pub mod record;
pub mod stats;

mod error;

use async_trait::async_trait;
use tracing::info;

pub use error::{AuditError, AuditResult};
pub use journal::JournalAuditSink;
pub use memory::{MemoryAuditConfig, MemoryAuditSink};
pub use record::{AuditMetadata, AuditRecord};
pub use stats::{DecisionStats, StatsSnapshot};

/// Destination for finalized verdicts.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one audit record.
    async fn record(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// Sink that only writes audit records to the tracing system.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        info!(
            action_id = %record.action_id,
            target_tool = %record.target_tool,
            decision = %record.decision,
            applied_rules = ?record.applied_rules,
            processing_time_ms = record.metadata.processing_time_ms,
            "verdict audited"
        );
        Ok(())
    }
}
