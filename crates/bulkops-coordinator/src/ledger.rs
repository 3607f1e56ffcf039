//! Success/failure counters for one bulk operation.
//!
//! The ledger is keyed by [`ItemId`] so that every outcome is an idempotent
//! merge: a second outcome for an item that already settled is reported as
//! [`RecordResult::Duplicate`] and leaves the counters untouched. This matters
//! for remote completions, which arrive over an at-least-once channel.

use std::collections::HashSet;

use bulkops_core::{ItemId, WorkItem};
use serde::Serialize;

use crate::error::ItemFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome {
    Succeeded,
    Failed { reason: String },
}

impl ItemOutcome {
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl From<Result<(), ItemFailure>> for ItemOutcome {
    fn from(result: Result<(), ItemFailure>) -> Self {
        match result {
            Ok(()) => Self::Succeeded,
            Err(failure) => Self::Failed {
                reason: failure.reason,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordResult {
    Counted,
    /// The item had already settled; counters unchanged.
    Duplicate,
    /// The id does not belong to this operation; counters unchanged.
    Unknown,
}

#[derive(Debug, Clone)]
pub struct ProgressLedger {
    total: usize,
    succeeded: usize,
    failed: usize,
    expected: HashSet<ItemId>,
    settled: HashSet<ItemId>,
    stop_acknowledged: bool,
}

impl ProgressLedger {
    /// Creates a ledger sized to the distinct ids in `items`.
    #[must_use]
    pub fn for_items(items: &[WorkItem]) -> Self {
        let expected: HashSet<ItemId> = items.iter().map(|item| item.id().clone()).collect();
        Self {
            total: expected.len(),
            succeeded: 0,
            failed: 0,
            expected,
            settled: HashSet::new(),
            stop_acknowledged: false,
        }
    }

    /// Records the outcome for `id`. Only the first outcome for an id counts.
    pub fn record_outcome(&mut self, id: &ItemId, outcome: &ItemOutcome) -> RecordResult {
        if !self.expected.contains(id) {
            return RecordResult::Unknown;
        }
        if !self.settled.insert(id.clone()) {
            return RecordResult::Duplicate;
        }
        match outcome {
            ItemOutcome::Succeeded => self.succeeded += 1,
            ItemOutcome::Failed { .. } => self.failed += 1,
        }
        debug_assert!(self.succeeded + self.failed <= self.total);
        RecordResult::Counted
    }

    /// Marks the operation as stopped: no further items will be started.
    pub fn acknowledge_stop(&mut self) {
        self.stop_acknowledged = true;
    }

    #[must_use]
    pub fn is_settled(&self, id: &ItemId) -> bool {
        self.settled.contains(id)
    }

    #[must_use]
    pub fn settled_count(&self) -> usize {
        self.succeeded + self.failed
    }

    /// Every item reached a terminal outcome.
    #[must_use]
    pub fn all_settled(&self) -> bool {
        self.settled_count() == self.total
    }

    /// `true` when every item settled or a stop has been acknowledged.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.all_settled() || self.stop_acknowledged
    }

    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            succeeded: self.succeeded,
            failed: self.failed,
            stopped: self.stop_acknowledged,
        }
    }
}

/// Point-in-time copy of the ledger counters handed to renderers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: bool,
}

impl ProgressSnapshot {
    #[must_use]
    pub fn pending(&self) -> usize {
        self.total.saturating_sub(self.succeeded + self.failed)
    }

    #[must_use]
    pub fn bar(&self) -> BarSegments {
        BarSegments::from_counts(self.succeeded, self.failed, self.total)
    }
}

/// Widths, in percent, of the success and error segments of the progress bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BarSegments {
    pub success_pct: f64,
    pub error_pct: f64,
}

impl BarSegments {
    /// Computes both segments as `count / total * 100`. The error segment is
    /// clamped so the two never add up to more than 100.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(succeeded: usize, failed: usize, total: usize) -> Self {
        if total == 0 {
            return Self {
                success_pct: 0.0,
                error_pct: 0.0,
            };
        }
        let total = total as f64;
        let success_pct = (succeeded as f64 / total * 100.0).clamp(0.0, 100.0);
        let error_pct = (failed as f64 / total * 100.0).clamp(0.0, 100.0 - success_pct);
        Self {
            success_pct,
            error_pct,
        }
    }

    #[must_use]
    pub fn combined_pct(&self) -> f64 {
        self.success_pct + self.error_pct
    }
}
