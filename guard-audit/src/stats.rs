//! Running verdict counters.

use std::sync::atomic::{AtomicU64, Ordering};

use guard_primitives::Decision;
use serde::Serialize;

/// Lock-free decision counters shared by concurrent pipelines.
#[derive(Debug, Default)]
pub struct DecisionStats {
    allow: AtomicU64,
    block: AtomicU64,
    flag: AtomicU64,
}

impl DecisionStats {
    /// Creates zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one verdict.
    pub fn record(&self, decision: Decision) {
        let counter = match decision {
            Decision::Allow => &self.allow,
            Decision::Block => &self.block,
            Decision::Flag => &self.flag,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns counts and rates.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let allow = self.allow.load(Ordering::Relaxed);
        let block = self.block.load(Ordering::Relaxed);
        let flag = self.flag.load(Ordering::Relaxed);
        let total = allow + block + flag;

        #[allow(clippy::cast_precision_loss)]
        let rate = |count: u64| {
            if total == 0 {
                0.0
            } else {
                count as f64 / total as f64
            }
        };

        StatsSnapshot {
            total,
            allow,
            block,
            flag,
            allow_rate: rate(allow),
            block_rate: rate(block),
            flag_rate: rate(flag),
        }
    }
}

/// Point-in-time view of [`DecisionStats`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatsSnapshot {
    /// Verdicts rendered.
    pub total: u64,
    /// ALLOW verdicts.
    pub allow: u64,
    /// BLOCK verdicts.
    pub block: u64,
    /// FLAG verdicts.
    pub flag: u64,
    /// Share of ALLOW verdicts, 0 when nothing was counted.
    pub allow_rate: f64,
    /// Share of BLOCK verdicts.
    pub block_rate: f64,
    /// Share of FLAG verdicts.
    pub flag_rate: f64,
}
