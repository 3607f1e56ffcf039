use std::path::{Path, PathBuf};

use bulkops_client::{BackendClient, ExportQuery};
use bulkops_coordinator::{
    BulkCoordinator, BulkSummary, CompletionChannel, CoordinatorError, ItemFailure,
    JsonLinesChannel, ModalSlot, OperationContext, Preflight, ProgressRenderer, TracingRenderer,
};
use bulkops_core::{AppConfig, WorkItem};
use tokio::io::{AsyncRead, BufReader};

use super::{build_client, print_summary, resolve_settings, stop_on_ctrl_c};
use crate::terminal::TerminalRenderer;
use crate::BulkOverrides;

/// The feed remote export completions are read from. Without it nothing
/// would ever settle, so its absence fails the run up front.
pub(super) struct EventFeed {
    source: Option<PathBuf>,
}

impl EventFeed {
    pub(super) fn new(source: Option<PathBuf>) -> Self {
        Self { source }
    }

    fn is_stdin(path: &Path) -> bool {
        path.as_os_str() == "-"
    }
}

impl Preflight for EventFeed {
    fn name(&self) -> &str {
        "completion event feed"
    }

    fn check(&self) -> Result<(), String> {
        match &self.source {
            None => Err("no feed configured; pass --events <PATH> or --events -".to_owned()),
            Some(path) if Self::is_stdin(path) || path.exists() => Ok(()),
            Some(path) => Err(format!("{} does not exist", path.display())),
        }
    }
}

async fn open_feed(path: &Path) -> anyhow::Result<BufReader<Box<dyn AsyncRead + Unpin + Send>>> {
    let reader: Box<dyn AsyncRead + Unpin + Send> = if EventFeed::is_stdin(path) {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(tokio::fs::File::open(path).await?)
    };
    Ok(BufReader::new(reader))
}

/// Exports every matching product to `query.store`. Each trigger only
/// queues the export; outcomes are read from the `events` feed.
///
/// With `dry_run` the pending count is printed and nothing is triggered.
///
/// # Errors
///
/// Returns an error when the event feed is missing, the product list
/// cannot be loaded, or another export is already running.
pub(crate) async fn run_export(
    config: &AppConfig,
    query: &ExportQuery,
    dry_run: bool,
    events: Option<PathBuf>,
    overrides: &BulkOverrides,
) -> anyhow::Result<()> {
    let client = build_client(config)?;

    if dry_run {
        let pending = client.export_count(query).await?;
        println!(
            "dry-run: {pending} products would be exported to store {}",
            query.store
        );
        return Ok(());
    }

    let settings = resolve_settings(config, &client, overrides).await;
    let coordinator = BulkCoordinator::new(settings).with_preflight(EventFeed::new(events.clone()));
    let slot = ModalSlot::new("export");
    let ctx = slot.begin()?;

    let items = load_exportable(&client, &coordinator, &ctx, query).await?;
    if items.is_empty() {
        println!("nothing to export");
        return Ok(());
    }

    // `load_exportable` already verified the feed is configured.
    let feed_path = events.unwrap_or_else(|| PathBuf::from("-"));
    let mut channel =
        JsonLinesChannel::new(open_feed(&feed_path).await?).for_channel(ctx.channel().clone());
    println!(
        "exporting {} products; completions are read from channel {}",
        items.len(),
        ctx.channel()
    );

    let stop = stop_on_ctrl_c(ctx.token().clone());
    let mut renderer = (TerminalRenderer::new(), TracingRenderer::new(ctx.label()));
    let summary = export_items(
        &client,
        &coordinator,
        &ctx,
        &query.store,
        items,
        &mut channel,
        &mut renderer,
    )
    .await;
    stop.abort();

    print_summary(&summary);
    Ok(())
}

/// Runs the preflight checks, then loads the products to export.
pub(super) async fn load_exportable(
    client: &BackendClient,
    coordinator: &BulkCoordinator,
    ctx: &OperationContext,
    query: &ExportQuery,
) -> Result<Vec<WorkItem>, CoordinatorError> {
    coordinator
        .prepare(ctx, || client.export_items(query))
        .await
}

pub(super) async fn export_items<Ch, R>(
    client: &BackendClient,
    coordinator: &BulkCoordinator,
    ctx: &OperationContext,
    store: &str,
    items: Vec<WorkItem>,
    channel: &mut Ch,
    renderer: &mut R,
) -> BulkSummary
where
    Ch: CompletionChannel + ?Sized,
    R: ProgressRenderer + ?Sized,
{
    coordinator
        .run_remote(
            ctx,
            items,
            |item| {
                let reply_to = ctx.channel();
                async move {
                    client
                        .trigger_export(store, &item, reply_to)
                        .await
                        .map_err(ItemFailure::from)
                }
            },
            channel,
            renderer,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_feed_fails_preflight() {
        let err = EventFeed::new(None).check().unwrap_err();
        assert!(err.contains("--events"), "unexpected reason: {err}");
    }

    #[test]
    fn stdin_feed_passes_preflight() {
        assert!(EventFeed::new(Some(PathBuf::from("-"))).check().is_ok());
    }

    #[test]
    fn nonexistent_feed_path_fails_preflight() {
        let err = EventFeed::new(Some(PathBuf::from("/nonexistent/bulkops/events.jsonl")))
            .check()
            .unwrap_err();
        assert!(err.contains("does not exist"));
    }

    #[test]
    fn missing_feed_is_reported_as_missing_integration() {
        let coordinator = BulkCoordinator::new(bulkops_core::BulkSettings::default())
            .with_preflight(EventFeed::new(None));
        let result = coordinator.check_integrations();
        assert!(matches!(
            result,
            Err(bulkops_coordinator::CoordinatorError::MissingIntegration { .. })
        ));
    }
}
