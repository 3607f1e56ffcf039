//! Façade that ties the dispatcher, ledger and renderers together for one
//! bulk action.

use std::cell::RefCell;
use std::collections::HashSet;
use std::future::Future;

use bulkops_core::{BulkSettings, ItemId, WorkItem};
use serde::Serialize;
use uuid::Uuid;

use crate::completion::{correlate, CompletionChannel, Correlation};
use crate::dispatch::{dispatch, DispatchReport};
use crate::error::{CoordinatorError, ItemFailure};
use crate::ledger::{ItemOutcome, ProgressLedger, RecordResult};
use crate::render::{Completion, ProgressRenderer, ResultRow};
use crate::session::OperationContext;

/// A collaborator that must be present before any item is started (a
/// browser-extension bridge, an event feed, ...).
pub trait Preflight {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns a human-readable reason when the integration is unavailable.
    fn check(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkSummary {
    pub operation_id: Uuid,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Items never started because a stop was observed.
    pub not_started: usize,
    /// Items accepted by the backend that never reported back.
    pub awaiting: usize,
    pub completion: Completion,
}

pub struct BulkCoordinator {
    settings: BulkSettings,
    preflights: Vec<Box<dyn Preflight + Send + Sync>>,
}

impl BulkCoordinator {
    #[must_use]
    pub fn new(settings: BulkSettings) -> Self {
        Self {
            settings,
            preflights: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_preflight(mut self, check: impl Preflight + Send + Sync + 'static) -> Self {
        self.preflights.push(Box::new(check));
        self
    }

    #[must_use]
    pub fn settings(&self) -> &BulkSettings {
        &self.settings
    }

    /// Runs every registered preflight check.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::MissingIntegration`] for the first check
    /// that reports itself unavailable.
    pub fn check_integrations(&self) -> Result<(), CoordinatorError> {
        for preflight in &self.preflights {
            if let Err(reason) = preflight.check() {
                tracing::warn!(integration = preflight.name(), %reason, "preflight failed");
                return Err(CoordinatorError::MissingIntegration {
                    name: preflight.name().to_owned(),
                    reason,
                });
            }
        }
        Ok(())
    }

    /// Runs preflight checks and then the initiating "what are the items"
    /// call. Nothing is dispatched if either fails.
    ///
    /// # Errors
    ///
    /// - [`CoordinatorError::MissingIntegration`] from a failed preflight.
    /// - [`CoordinatorError::Systemic`] wrapping the error from `load`.
    pub async fn prepare<L, LFut, E>(
        &self,
        ctx: &OperationContext,
        load: L,
    ) -> Result<Vec<WorkItem>, CoordinatorError>
    where
        L: FnOnce() -> LFut,
        LFut: Future<Output = Result<Vec<WorkItem>, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        self.check_integrations()?;
        let items = load().await.map_err(|e| {
            tracing::error!(operation = ctx.label(), error = %e, "bulk operation could not start");
            CoordinatorError::Systemic {
                context: ctx.label().to_owned(),
                source: Box::new(e),
            }
        })?;
        Ok(dedupe_items(items))
    }

    /// Runs `op` over `items` where each call's own result is the item's
    /// outcome.
    pub async fn run<F, Fut, R>(
        &self,
        ctx: &OperationContext,
        items: Vec<WorkItem>,
        op: F,
        renderer: &mut R,
    ) -> BulkSummary
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Result<(), ItemFailure>>,
        R: ProgressRenderer + ?Sized,
    {
        let items = dedupe_items(items);
        let mut ledger = ProgressLedger::for_items(&items);
        tracing::info!(
            operation = ctx.label(),
            operation_id = %ctx.id(),
            total = items.len(),
            concurrency = self.settings.concurrency(),
            "bulk operation dispatching"
        );

        let report = dispatch(items, &self.settings, ctx.token(), op, |item, outcome| {
            settle(&mut ledger, renderer, &item, outcome);
        })
        .await;

        finish(ctx, &mut ledger, renderer, &report, 0, None)
    }

    /// Runs `trigger` over `items` where a successful call only means the
    /// backend accepted the work; outcomes arrive later on `channel`.
    ///
    /// Trigger failures settle the item as failed immediately. Events are
    /// consumed while triggers are still running. After a stop, items
    /// already accepted are still awaited unless the token is abandoned;
    /// events for items that have not been started are ignored. Returns once
    /// every accepted item settled, the channel closed or the wait was
    /// abandoned.
    pub async fn run_remote<F, Fut, Ch, R>(
        &self,
        ctx: &OperationContext,
        items: Vec<WorkItem>,
        trigger: F,
        channel: &mut Ch,
        renderer: &mut R,
    ) -> BulkSummary
    where
        F: Fn(WorkItem) -> Fut,
        Fut: Future<Output = Result<(), ItemFailure>>,
        Ch: CompletionChannel + ?Sized,
        R: ProgressRenderer + ?Sized,
    {
        let items = dedupe_items(items);
        let labels: std::collections::HashMap<ItemId, String> = items
            .iter()
            .map(|item| (item.id().clone(), item.display_label()))
            .collect();
        let ledger = RefCell::new(ProgressLedger::for_items(&items));
        let renderer = RefCell::new(renderer);
        tracing::info!(
            operation = ctx.label(),
            operation_id = %ctx.id(),
            channel = %ctx.channel(),
            total = items.len(),
            concurrency = self.settings.concurrency(),
            "bulk operation dispatching; awaiting remote completions"
        );

        let started: RefCell<HashSet<ItemId>> = RefCell::new(HashSet::with_capacity(items.len()));
        let start = |item: WorkItem| {
            started.borrow_mut().insert(item.id().clone());
            trigger(item)
        };

        let dispatching = dispatch(items, &self.settings, ctx.token(), start, |item, outcome| {
            if outcome.is_success() {
                tracing::debug!(item_id = %item.id(), "item accepted by backend");
            } else {
                settle(
                    &mut ledger.borrow_mut(),
                    &mut **renderer.borrow_mut(),
                    &item,
                    outcome,
                );
            }
        });
        tokio::pin!(dispatching);

        let mut report: Option<DispatchReport> = None;
        let mut channel_open = true;
        let mut abandoned = false;

        loop {
            if let Some(report) = &report {
                if ledger.borrow().settled_count() >= report.attempted
                    || !channel_open
                    || abandoned
                {
                    break;
                }
            }

            tokio::select! {
                biased;
                done = &mut dispatching, if report.is_none() => {
                    report = Some(done);
                }
                () = ctx.token().abandoned(), if !abandoned => {
                    tracing::warn!(operation = ctx.label(), "no longer waiting for remote completions");
                    abandoned = true;
                }
                event = channel.next_event(), if channel_open => match event {
                    Some(event) if !started.borrow().contains(&event.item) => {
                        tracing::debug!(item_id = %event.item, "ignoring completion for unstarted item");
                    }
                    Some(event) => {
                        let correlation = correlate(&mut ledger.borrow_mut(), &event);
                        let mut renderer = renderer.borrow_mut();
                        match correlation {
                            Correlation::Recorded(outcome) => {
                                let label = labels
                                    .get(&event.item)
                                    .cloned()
                                    .unwrap_or_else(|| event.item.to_string());
                                let row = ResultRow::new(event.item.clone(), label, outcome);
                                renderer.item_settled(&ledger.borrow().snapshot(), &row);
                            }
                            Correlation::Progress(message) => {
                                renderer.item_progress(&event.item, &message);
                            }
                            Correlation::Duplicate | Correlation::Unknown => {}
                        }
                    }
                    None => {
                        tracing::warn!(operation = ctx.label(), "completion channel closed");
                        channel_open = false;
                    }
                },
            }
        }

        let report = report.unwrap_or(DispatchReport {
            attempted: 0,
            not_started: Vec::new(),
        });
        // The dispatch future still borrows both cells until end of scope.
        let mut ledger = ledger.borrow_mut();
        let awaiting = report.attempted.saturating_sub(ledger.settled_count());
        let mut renderer = renderer.borrow_mut();
        let forced = (abandoned && awaiting > 0).then_some(Completion::Abandoned);
        finish(ctx, &mut ledger, &mut **renderer, &report, awaiting, forced)
    }
}

/// Drops later items whose id repeats an earlier one.
fn dedupe_items(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen: HashSet<ItemId> = HashSet::with_capacity(items.len());
    let before = items.len();
    let unique: Vec<WorkItem> = items
        .into_iter()
        .filter(|item| seen.insert(item.id().clone()))
        .collect();
    if unique.len() != before {
        tracing::warn!(
            dropped = before - unique.len(),
            "duplicate work items removed before dispatch"
        );
    }
    unique
}

fn settle<R: ProgressRenderer + ?Sized>(
    ledger: &mut ProgressLedger,
    renderer: &mut R,
    item: &WorkItem,
    outcome: ItemOutcome,
) {
    if ledger.record_outcome(item.id(), &outcome) != RecordResult::Counted {
        return;
    }
    let row = ResultRow::new(item.id().clone(), item.display_label(), outcome);
    renderer.item_settled(&ledger.snapshot(), &row);
}

fn finish<R: ProgressRenderer + ?Sized>(
    ctx: &OperationContext,
    ledger: &mut ProgressLedger,
    renderer: &mut R,
    report: &DispatchReport,
    awaiting: usize,
    forced: Option<Completion>,
) -> BulkSummary {
    let completion = match forced {
        Some(completion) => completion,
        None if report.stopped_early() => Completion::Stopped,
        None if awaiting > 0 => Completion::ChannelClosed,
        None => Completion::Finished,
    };
    if matches!(completion, Completion::Stopped | Completion::Abandoned) {
        ledger.acknowledge_stop();
    }

    let snapshot = ledger.snapshot();
    renderer.finished(&snapshot, completion);
    tracing::info!(
        operation = ctx.label(),
        operation_id = %ctx.id(),
        %completion,
        total = snapshot.total,
        succeeded = snapshot.succeeded,
        failed = snapshot.failed,
        not_started = report.not_started.len(),
        awaiting,
        "bulk operation finished"
    );

    BulkSummary {
        operation_id: ctx.id(),
        total: snapshot.total,
        succeeded: snapshot.succeeded,
        failed: snapshot.failed,
        not_started: report.not_started.len(),
        awaiting,
        completion,
    }
}

#[cfg(test)]
#[path = "coordinator_test.rs"]
mod tests;
