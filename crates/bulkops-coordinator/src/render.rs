//! Renderers for live bulk-operation feedback.

use std::collections::HashMap;

use bulkops_core::ItemId;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::ledger::{BarSegments, ItemOutcome, ProgressSnapshot};

/// How an operation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// Every dispatched item settled and none were skipped.
    Finished,
    /// A stop was observed; some items were never started.
    Stopped,
    /// The completion channel closed before every accepted item reported back.
    ChannelClosed,
    /// The wait for outstanding remote completions was given up after a stop.
    Abandoned,
}

impl std::fmt::Display for Completion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Completion::Finished => write!(f, "finished"),
            Completion::Stopped => write!(f, "stopped"),
            Completion::ChannelClosed => write!(f, "channel_closed"),
            Completion::Abandoned => write!(f, "abandoned"),
        }
    }
}

/// One line of the append-only results table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub item_id: ItemId,
    pub label: String,
    pub outcome: ItemOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl ResultRow {
    #[must_use]
    pub fn new(item_id: ItemId, label: String, outcome: ItemOutcome) -> Self {
        Self {
            item_id,
            label,
            outcome,
            recorded_at: Utc::now(),
        }
    }
}

/// Receives ledger updates. Called on the coordinating task only.
pub trait ProgressRenderer {
    /// An item settled and was counted.
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow);

    /// A remote system reported intermediate progress for an item.
    fn item_progress(&mut self, _item_id: &ItemId, _message: &str) {}

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion);
}

impl<R: ProgressRenderer + ?Sized> ProgressRenderer for &mut R {
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow) {
        (**self).item_settled(snapshot, row);
    }

    fn item_progress(&mut self, item_id: &ItemId, message: &str) {
        (**self).item_progress(item_id, message);
    }

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion) {
        (**self).finished(snapshot, completion);
    }
}

impl<A: ProgressRenderer, B: ProgressRenderer> ProgressRenderer for (A, B) {
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow) {
        self.0.item_settled(snapshot, row);
        self.1.item_settled(snapshot, row);
    }

    fn item_progress(&mut self, item_id: &ItemId, message: &str) {
        self.0.item_progress(item_id, message);
        self.1.item_progress(item_id, message);
    }

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion) {
        self.0.finished(snapshot, completion);
        self.1.finished(snapshot, completion);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    InProgress,
    Done,
}

/// In-memory model of the progress dialog: the two-segment bar, the results
/// table, the latest progress message per item and the done/dismiss state.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressView {
    bar: BarSegments,
    snapshot: Option<ProgressSnapshot>,
    rows: Vec<ResultRow>,
    #[serde(skip)]
    progress: HashMap<ItemId, String>,
    phase: Phase,
    completion: Option<Completion>,
    dismiss_enabled: bool,
}

impl Default for ProgressView {
    fn default() -> Self {
        Self {
            bar: BarSegments::from_counts(0, 0, 0),
            snapshot: None,
            rows: Vec::new(),
            progress: HashMap::new(),
            phase: Phase::InProgress,
            completion: None,
            dismiss_enabled: false,
        }
    }
}

impl ProgressView {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn bar(&self) -> BarSegments {
        self.bar
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&ProgressSnapshot> {
        self.snapshot.as_ref()
    }

    #[must_use]
    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    #[must_use]
    pub fn progress_for(&self, item_id: &ItemId) -> Option<&str> {
        self.progress.get(item_id).map(String::as_str)
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn completion(&self) -> Option<Completion> {
        self.completion
    }

    #[must_use]
    pub fn dismiss_enabled(&self) -> bool {
        self.dismiss_enabled
    }

    fn apply(&mut self, snapshot: &ProgressSnapshot) {
        self.bar = snapshot.bar();
        self.snapshot = Some(*snapshot);
    }
}

impl ProgressRenderer for ProgressView {
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow) {
        self.apply(snapshot);
        self.progress.remove(&row.item_id);
        self.rows.push(row.clone());
    }

    fn item_progress(&mut self, item_id: &ItemId, message: &str) {
        self.progress.insert(item_id.clone(), message.to_owned());
    }

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion) {
        self.apply(snapshot);
        self.phase = Phase::Done;
        self.completion = Some(completion);
        self.dismiss_enabled = true;
    }
}

/// Renderer that emits structured `tracing` events.
#[derive(Debug, Clone)]
pub struct TracingRenderer {
    operation: String,
}

impl TracingRenderer {
    #[must_use]
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
        }
    }
}

impl ProgressRenderer for TracingRenderer {
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow) {
        match &row.outcome {
            ItemOutcome::Succeeded => tracing::info!(
                operation = %self.operation,
                item_id = %row.item_id,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                total = snapshot.total,
                "item succeeded"
            ),
            ItemOutcome::Failed { reason } => tracing::warn!(
                operation = %self.operation,
                item_id = %row.item_id,
                reason = %reason,
                succeeded = snapshot.succeeded,
                failed = snapshot.failed,
                total = snapshot.total,
                "item failed"
            ),
        }
    }

    fn item_progress(&mut self, item_id: &ItemId, message: &str) {
        tracing::debug!(operation = %self.operation, item_id = %item_id, progress = message, "item progress");
    }

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion) {
        tracing::info!(
            operation = %self.operation,
            %completion,
            succeeded = snapshot.succeeded,
            failed = snapshot.failed,
            total = snapshot.total,
            "bulk operation done"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(succeeded: usize, failed: usize, total: usize) -> ProgressSnapshot {
        ProgressSnapshot {
            total,
            succeeded,
            failed,
            stopped: false,
        }
    }

    #[test]
    fn view_starts_in_progress_with_dismiss_disabled() {
        let view = ProgressView::new();
        assert_eq!(view.phase(), Phase::InProgress);
        assert!(!view.dismiss_enabled());
        assert!(view.rows().is_empty());
    }

    #[test]
    fn view_appends_rows_and_tracks_bar() {
        let mut view = ProgressView::new();
        let row = ResultRow::new(ItemId::from(1), "order 1".to_owned(), ItemOutcome::Succeeded);
        view.item_settled(&snapshot(1, 0, 2), &row);
        let row = ResultRow::new(
            ItemId::from(2),
            "order 2".to_owned(),
            ItemOutcome::failed("no tracking number"),
        );
        view.item_settled(&snapshot(1, 1, 2), &row);

        assert_eq!(view.rows().len(), 2);
        assert_eq!(view.rows()[0].item_id, ItemId::from(1));
        assert!((view.bar().success_pct - 50.0).abs() < f64::EPSILON);
        assert!((view.bar().error_pct - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn finish_switches_to_done_and_enables_dismiss() {
        let mut view = ProgressView::new();
        view.finished(&snapshot(0, 0, 0), Completion::Finished);
        assert_eq!(view.phase(), Phase::Done);
        assert_eq!(view.completion(), Some(Completion::Finished));
        assert!(view.dismiss_enabled());
    }

    #[test]
    fn progress_message_cleared_when_item_settles() {
        let mut view = ProgressView::new();
        let id = ItemId::from(5);
        view.item_progress(&id, "Uploading images");
        assert_eq!(view.progress_for(&id), Some("Uploading images"));

        let row = ResultRow::new(id.clone(), "product 5".to_owned(), ItemOutcome::Succeeded);
        view.item_settled(&snapshot(1, 0, 1), &row);
        assert_eq!(view.progress_for(&id), None);
    }

    #[test]
    fn pair_renderer_forwards_to_both() {
        let mut pair = (ProgressView::new(), ProgressView::new());
        pair.finished(&snapshot(0, 0, 0), Completion::Stopped);
        assert_eq!(pair.0.completion(), Some(Completion::Stopped));
        assert_eq!(pair.1.completion(), Some(Completion::Stopped));
    }
}
