//! Bulk command handlers for the CLI.
//!
//! Each handler claims its own [`ModalSlot`], so a command never runs two
//! bulk operations at once, and wires Ctrl-C to the operation's stop token.
//! Per-item failures end up in the results table; only systemic failures
//! (the initiating call, a missing integration) are returned as errors.
//!
//! [`ModalSlot`]: bulkops_coordinator::ModalSlot

mod export;
mod sync;

use bulkops_client::BackendClient;
use bulkops_coordinator::{BulkSummary, Completion, StopToken};
use bulkops_core::{AppConfig, BulkSettings, ItemId};
use tokio::task::JoinHandle;

use crate::BulkOverrides;

pub(crate) use export::run_export;
pub(crate) use sync::{run_sync_tracking, DEFAULT_UPDATE_ENDPOINT};

pub(crate) fn build_client(config: &AppConfig) -> anyhow::Result<BackendClient> {
    BackendClient::new(config).map_err(|e| anyhow::anyhow!("failed to build backend client: {e}"))
}

/// Effective dispatcher settings: environment defaults, then stored user
/// preferences, then command-line overrides.
///
/// A failure to read the stored preferences is logged and the environment
/// defaults are used.
pub(crate) async fn resolve_settings(
    config: &AppConfig,
    client: &BackendClient,
    overrides: &BulkOverrides,
) -> BulkSettings {
    let mut settings = BulkSettings::from_app_config(config);
    match client.load_user_config().await {
        Ok(stored) => settings = settings.with_user_config(&stored),
        Err(e) => tracing::warn!(error = %e, "could not load stored bulk settings; using defaults"),
    }
    apply_overrides(settings, overrides)
}

pub(crate) fn apply_overrides(mut settings: BulkSettings, overrides: &BulkOverrides) -> BulkSettings {
    if let Some(concurrency) = overrides.concurrency {
        settings = settings.with_concurrency(concurrency);
    }
    if let Some(ms) = overrides.delay_ms {
        settings = settings.with_item_delay_ms((ms > 0).then_some(ms));
    }
    settings
}

/// Wires Ctrl-C to `token`. The first press stops starting new items; a
/// second one gives up waiting for remote completions. Abort the handle
/// once the operation is over.
pub(crate) fn stop_on_ctrl_c(token: StopToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if token.request_stop() {
                eprintln!(
                    "stop requested; waiting for in-flight items to settle (Ctrl-C again to stop waiting)"
                );
            } else if token.request_abandon() {
                eprintln!("no longer waiting for outstanding completions");
                break;
            }
        }
    })
}

pub(crate) fn summary_text(summary: &BulkSummary) -> String {
    let mut text = format!(
        "{}: {} succeeded, {} failed of {}",
        summary.completion, summary.succeeded, summary.failed, summary.total
    );
    let detail = match summary.completion {
        Completion::Stopped => Some(format!("{} items were not started", summary.not_started)),
        Completion::ChannelClosed => Some(format!(
            "{} items were accepted but never reported back",
            summary.awaiting
        )),
        Completion::Abandoned => Some(format!(
            "{} items were not started; {} accepted items were no longer awaited",
            summary.not_started, summary.awaiting
        )),
        Completion::Finished => None,
    };
    if let Some(detail) = detail {
        text.push('\n');
        text.push_str(&detail);
    }
    text
}

pub(crate) fn print_summary(summary: &BulkSummary) {
    println!("{}", summary_text(summary));
}

/// # Errors
///
/// Returns an error when the client cannot be built or the backend refuses
/// the removal.
pub(crate) async fn run_remove_line(
    config: &AppConfig,
    order_id: &str,
    line_id: &str,
) -> anyhow::Result<()> {
    let client = build_client(config)?;
    client
        .delete_line(&ItemId::new(order_id), &ItemId::new(line_id))
        .await?;
    tracing::info!(order_id, line_id, "order line removed");
    println!("removed line {line_id} from order {order_id}");
    Ok(())
}

#[cfg(test)]
#[path = "bulk_test.rs"]
mod tests;
