//! Line-oriented rendering of a [`ProgressView`] on stdout.

use bulkops_coordinator::{
    BarSegments, Completion, ItemOutcome, ProgressRenderer, ProgressSnapshot, ProgressView,
    ResultRow,
};
use bulkops_core::ItemId;

const BAR_WIDTH: usize = 30;

/// Prints one results-table row per settled item plus the current bar, and
/// keeps the full view for the closing summary.
#[derive(Debug, Default)]
pub(crate) struct TerminalRenderer {
    view: ProgressView,
}

impl TerminalRenderer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn view(&self) -> &ProgressView {
        &self.view
    }
}

/// `#` for successes, `x` for failures, `.` for what is left.
pub(crate) fn draw_bar(bar: BarSegments) -> String {
    let cells = |pct: f64| -> usize {
        // Percentages are in [0, 100], so the rounded cell count fits.
        #[allow(
            clippy::cast_possible_truncation,
            clippy::cast_precision_loss,
            clippy::cast_sign_loss
        )]
        let n = (pct / 100.0 * BAR_WIDTH as f64).round() as usize;
        n.min(BAR_WIDTH)
    };
    let ok = cells(bar.success_pct);
    let err = cells(bar.error_pct).min(BAR_WIDTH - ok);
    format!(
        "[{}{}{}] {:>3.0}%",
        "#".repeat(ok),
        "x".repeat(err),
        ".".repeat(BAR_WIDTH - ok - err),
        bar.combined_pct()
    )
}

fn format_row(snapshot: &ProgressSnapshot, row: &ResultRow) -> String {
    let settled = snapshot.succeeded + snapshot.failed;
    let width = snapshot.total.to_string().len();
    match &row.outcome {
        ItemOutcome::Succeeded => format!("[{settled:>width$}/{}] ok    {}", snapshot.total, row.label),
        ItemOutcome::Failed { reason } => format!(
            "[{settled:>width$}/{}] FAIL  {}: {reason}",
            snapshot.total, row.label
        ),
    }
}

impl ProgressRenderer for TerminalRenderer {
    fn item_settled(&mut self, snapshot: &ProgressSnapshot, row: &ResultRow) {
        self.view.item_settled(snapshot, row);
        println!("{}  {}", format_row(snapshot, row), draw_bar(self.view.bar()));
    }

    fn item_progress(&mut self, item_id: &ItemId, message: &str) {
        self.view.item_progress(item_id, message);
        println!("      ..    {item_id}: {message}");
    }

    fn finished(&mut self, snapshot: &ProgressSnapshot, completion: Completion) {
        self.view.finished(snapshot, completion);
        println!("{}  {completion}", draw_bar(self.view.bar()));
        let failures: Vec<&ResultRow> = self
            .view
            .rows()
            .iter()
            .filter(|row| !row.outcome.is_success())
            .collect();
        if !failures.is_empty() {
            println!("failed items:");
            for row in failures {
                if let ItemOutcome::Failed { reason } = &row.outcome {
                    println!("  {} ({}): {reason}", row.label, row.item_id);
                }
            }
        }
    }
}
