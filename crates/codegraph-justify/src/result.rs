//! `JustificationResult` and friends (§6, §7 "User-visible").

use codegraph_core::EntityId;

#[derive(Debug, Clone)]
pub struct EntityFailure {
    pub entity_id: EntityId,
    pub error: String,
}

#[derive(Debug, Clone, Default)]
pub struct JustificationStats {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub pending_clarification: usize,
    pub average_confidence: f32,
    pub duration_ms: u64,
    /// Set when the run stopped early on a cancellation signal (§5, §7
    /// `cancelled`). The result up to this point is still valid and
    /// persisted; this only flags that it is partial.
    pub cancelled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct JustificationResult {
    pub justified: Vec<EntityId>,
    pub failed: Vec<EntityFailure>,
    pub needing_clarification: Vec<EntityId>,
    pub stats: JustificationStats,
}

impl JustificationResult {
    pub fn merge(&mut self, other: JustificationResult) {
        self.justified.extend(other.justified);
        self.failed.extend(other.failed);
        self.needing_clarification.extend(other.needing_clarification);
        self.stats.succeeded += other.stats.succeeded;
        self.stats.failed += other.stats.failed;
        self.stats.skipped += other.stats.skipped;
        self.stats.pending_clarification += other.stats.pending_clarification;
        self.stats.duration_ms += other.stats.duration_ms;
        self.stats.cancelled = self.stats.cancelled || other.stats.cancelled;
    }

    pub fn finalize_average_confidence(&mut self, confidence_sum: f32) {
        self.stats.average_confidence = if self.stats.succeeded == 0 {
            0.0
        } else {
            confidence_sum / self.stats.succeeded as f32
        };
    }
}
