//! Concurrency-bounded dispatch over a static list of work items.
//!
//! All futures are polled on the calling task through a
//! [`FuturesUnordered`] window, so nothing here needs to be `Send` and the
//! settlement callback can mutate caller state without locking.

use std::collections::VecDeque;
use std::future::Future;

use bulkops_core::{BulkSettings, WorkItem};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::time::Instant;

use crate::cancel::StopToken;
use crate::error::ItemFailure;
use crate::ledger::ItemOutcome;

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    /// Items whose operation was started. Each settled exactly once.
    pub attempted: usize,
    /// Items left unstarted because a stop was observed, in input order.
    pub not_started: Vec<WorkItem>,
}

impl DispatchReport {
    #[must_use]
    pub fn stopped_early(&self) -> bool {
        !self.not_started.is_empty()
    }
}

/// Runs `op` over `items` with at most `settings.concurrency()` operations
/// in flight, calling `on_settled` once per started item as it settles.
///
/// Items are started in input order; settlement order is whatever the
/// operations produce. The stop token is checked before every start and
/// never interrupts work already in flight. When an inter-item delay is
/// configured, consecutive starts are spaced by at least that delay while
/// in-flight work keeps being polled.
///
/// Individual failures are passed to `on_settled` and never abort the batch.
pub async fn dispatch<F, Fut, C>(
    items: Vec<WorkItem>,
    settings: &BulkSettings,
    token: &StopToken,
    op: F,
    mut on_settled: C,
) -> DispatchReport
where
    F: Fn(WorkItem) -> Fut,
    Fut: Future<Output = Result<(), ItemFailure>>,
    C: FnMut(WorkItem, ItemOutcome),
{
    let limit = settings.concurrency();
    let delay = settings.item_delay();
    let mut queue: VecDeque<WorkItem> = items.into();
    let mut in_flight = FuturesUnordered::new();
    let mut attempted = 0usize;
    let mut next_start_at: Option<Instant> = None;

    loop {
        let can_start = !token.is_stopped() && in_flight.len() < limit && !queue.is_empty();

        if can_start {
            if let Some(at) = next_start_at.filter(|at| *at > Instant::now()) {
                tokio::select! {
                    () = tokio::time::sleep_until(at) => {}
                    () = token.cancelled() => {}
                    Some((item, outcome)) = in_flight.next(), if !in_flight.is_empty() => {
                        on_settled(item, outcome);
                    }
                }
                continue;
            }

            if let Some(item) = queue.pop_front() {
                tracing::debug!(
                    item_id = %item.id(),
                    in_flight = in_flight.len() + 1,
                    limit,
                    "starting item"
                );
                let pending = op(item.clone());
                in_flight.push(async move {
                    let outcome = ItemOutcome::from(pending.await);
                    (item, outcome)
                });
                attempted += 1;
                next_start_at = delay.map(|d| Instant::now() + d);
            }
            continue;
        }

        match in_flight.next().await {
            Some((item, outcome)) => on_settled(item, outcome),
            None => break,
        }
    }

    if !queue.is_empty() {
        tracing::info!(
            attempted,
            not_started = queue.len(),
            "dispatch stopped before all items were started"
        );
    }

    DispatchReport {
        attempted,
        not_started: queue.into(),
    }
}

#[cfg(test)]
#[path = "dispatch_test.rs"]
mod tests;
