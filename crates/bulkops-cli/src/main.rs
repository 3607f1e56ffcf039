mod bulk;
mod settings;
mod terminal;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::settings::SettingsCommands;

#[derive(Debug, Parser)]
#[command(name = "bulkops")]
#[command(about = "Run bulk actions against the store backend")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Per-run overrides for the dispatcher settings.
#[derive(Debug, Clone, Default, Args)]
pub(crate) struct BulkOverrides {
    /// Items in flight at once (clamped to 1..=10)
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Minimum milliseconds between item starts (clamped to 100..=100000; 0 disables)
    #[arg(long)]
    pub delay_ms: Option<u64>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Export products to a connected store
    Export {
        /// Store to export to
        #[arg(long)]
        store: String,
        /// Include products that were already exported
        #[arg(long)]
        all: bool,
        /// Only products with unfulfilled orders
        #[arg(long)]
        unfulfilled_only: bool,
        /// Print how many products would be exported and exit
        #[arg(long)]
        dry_run: bool,
        /// Completion event feed as JSON lines: a file or FIFO path, or `-` for stdin
        #[arg(long)]
        events: Option<PathBuf>,
        #[command(flatten)]
        overrides: BulkOverrides,
    },
    /// Push tracking details for every order of a store
    SyncTracking {
        /// Store whose orders are synced
        #[arg(long)]
        store: String,
        /// Resume the order listing from a cursor printed by a stopped run
        #[arg(long)]
        cursor: Option<String>,
        /// Backend route each order is posted to
        #[arg(long, default_value = bulk::DEFAULT_UPDATE_ENDPOINT)]
        update_endpoint: String,
        #[command(flatten)]
        overrides: BulkOverrides,
    },
    /// Remove a single line from an order
    RemoveLine {
        #[arg(long)]
        order_id: String,
        #[arg(long)]
        line_id: String,
    },
    /// Show or change stored bulk-action preferences
    Settings {
        #[command(subcommand)]
        command: SettingsCommands,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("bulkops: no command given; see --help");
        return Ok(());
    };

    let config = bulkops_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(env = %config.env, base_url = %config.api_base_url, "config loaded");

    match command {
        Commands::Export {
            store,
            all,
            unfulfilled_only,
            dry_run,
            events,
            overrides,
        } => {
            let query = bulkops_client::ExportQuery {
                store,
                all,
                unfulfilled_only,
            };
            bulk::run_export(&config, &query, dry_run, events, &overrides).await?;
        }
        Commands::SyncTracking {
            store,
            cursor,
            update_endpoint,
            overrides,
        } => {
            bulk::run_sync_tracking(
                &config,
                &store,
                cursor.as_deref(),
                &update_endpoint,
                &overrides,
            )
            .await?;
        }
        Commands::RemoveLine { order_id, line_id } => {
            bulk::run_remove_line(&config, &order_id, &line_id).await?;
        }
        Commands::Settings { command } => settings::run_settings(&config, command).await?,
    }

    Ok(())
}
