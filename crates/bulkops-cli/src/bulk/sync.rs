use bulkops_client::{BackendClient, OrderPages};
use bulkops_coordinator::{
    BulkCoordinator, BulkSummary, CoordinatorError, FetchState, ItemFailure, ModalSlot,
    OperationContext, PagedFetch, ProgressRenderer, TracingRenderer,
};
use bulkops_core::{AppConfig, PageCursor, WorkItem};

use super::{build_client, print_summary, resolve_settings, stop_on_ctrl_c};
use crate::terminal::TerminalRenderer;
use crate::BulkOverrides;

pub(crate) const DEFAULT_UPDATE_ENDPOINT: &str = "api/orders/tracking";

#[derive(Debug)]
pub(super) enum SyncOutcome {
    /// Stopped while listing; no order was updated.
    ListingStopped {
        resume: Option<PageCursor>,
        pages: usize,
        orders: usize,
    },
    Synced(BulkSummary),
}

/// Lists every order of `store` page by page, then posts each one to
/// `update_endpoint`.
///
/// Ctrl-C during the listing prints a cursor that `--cursor` resumes from;
/// Ctrl-C during the updates stops starting new orders.
///
/// # Errors
///
/// Returns an error when the order listing fails or another sync is
/// already running. Per-order failures are reported, not returned.
pub(crate) async fn run_sync_tracking(
    config: &AppConfig,
    store: &str,
    cursor: Option<&str>,
    update_endpoint: &str,
    overrides: &BulkOverrides,
) -> anyhow::Result<()> {
    let client = build_client(config)?;
    let settings = resolve_settings(config, &client, overrides).await;
    let coordinator = BulkCoordinator::new(settings);
    let slot = ModalSlot::new("sync tracking");
    let ctx = slot.begin()?;
    let stop = stop_on_ctrl_c(ctx.token().clone());

    let mut renderer = (TerminalRenderer::new(), TracingRenderer::new(ctx.label()));
    let outcome = sync_orders(
        &client,
        &coordinator,
        &ctx,
        store,
        cursor.and_then(PageCursor::parse),
        update_endpoint,
        &mut renderer,
    )
    .await;
    stop.abort();

    match outcome? {
        SyncOutcome::ListingStopped {
            resume: Some(next),
            pages,
            orders,
        } => println!("stopped after {pages} pages ({orders} orders); resume with --cursor {next}"),
        SyncOutcome::ListingStopped { resume: None, .. } => println!("stopped before the first page"),
        SyncOutcome::Synced(summary) => print_summary(&summary),
    }
    Ok(())
}

pub(super) async fn sync_orders<R: ProgressRenderer + ?Sized>(
    client: &BackendClient,
    coordinator: &BulkCoordinator,
    ctx: &OperationContext,
    store: &str,
    cursor: Option<PageCursor>,
    update_endpoint: &str,
    renderer: &mut R,
) -> anyhow::Result<SyncOutcome> {
    let max_pages = coordinator.settings().max_pages();
    let source = OrderPages::new(client, store);
    let mut fetch: PagedFetch<WorkItem> = PagedFetch::starting_at(cursor, max_pages);

    match fetch.run(&source, ctx.token()).await {
        Ok(FetchState::Cancelled) => {
            return Ok(SyncOutcome::ListingStopped {
                resume: fetch.resume_cursor().cloned(),
                pages: fetch.pages_fetched(),
                orders: fetch.items().len(),
            });
        }
        Ok(_) => {}
        Err(e) => {
            return Err(CoordinatorError::Systemic {
                context: format!("order listing for store {store}"),
                source: Box::new(e),
            }
            .into());
        }
    }

    if fetch.ceiling_reached() {
        tracing::warn!(
            store,
            max_pages,
            "order listing hit the page ceiling; later orders were not loaded"
        );
        if let Some(next) = fetch.resume_cursor() {
            println!("page ceiling reached; continue later with --cursor {next}");
        }
    }

    let orders = fetch.into_items();
    println!("syncing tracking for {} orders", orders.len());

    let summary = coordinator
        .run(
            ctx,
            orders,
            |order| async move {
                client
                    .update_item(update_endpoint, &order)
                    .await
                    .map_err(ItemFailure::from)
            },
            renderer,
        )
        .await;
    Ok(SyncOutcome::Synced(summary))
}
