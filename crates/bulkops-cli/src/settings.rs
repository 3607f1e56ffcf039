//! `settings` sub-commands: the bulk-action preferences stored on the
//! backend user config.

use std::collections::HashMap;

use bulkops_core::policy::{clamp_concurrency, clamp_delay_ms, CONCURRENCY_KEY, ITEM_DELAY_KEY};
use bulkops_core::{AppConfig, BulkSettings};
use clap::Subcommand;

use crate::bulk::build_client;

#[derive(Debug, Subcommand)]
pub enum SettingsCommands {
    /// Show the effective bulk settings and where they come from
    Show,
    /// Store new bulk preferences for this user
    Set {
        /// Items in flight at once (clamped to 1..=10)
        #[arg(long)]
        concurrency: Option<usize>,
        /// Minimum milliseconds between item starts (clamped to 100..=100000; 0 disables)
        #[arg(long)]
        delay_ms: Option<u64>,
    },
}

pub(crate) async fn run_settings(config: &AppConfig, command: SettingsCommands) -> anyhow::Result<()> {
    let client = build_client(config)?;
    match command {
        SettingsCommands::Show => {
            let stored = client.load_user_config().await?;
            let effective = BulkSettings::from_app_config(config).with_user_config(&stored);
            println!("concurrency: {}", effective.concurrency());
            match effective.item_delay() {
                Some(delay) => println!("item delay:  {} ms", delay.as_millis()),
                None => println!("item delay:  off"),
            }
            println!("max pages:   {}", effective.max_pages());
            for key in [CONCURRENCY_KEY, ITEM_DELAY_KEY] {
                if let Some(value) = stored.get(key) {
                    println!("stored {key} = {value}");
                }
            }
        }
        SettingsCommands::Set {
            concurrency,
            delay_ms,
        } => {
            let values = preference_update(concurrency, delay_ms)?;
            client.save_user_config(&values).await?;
            tracing::info!(?values, "bulk settings saved");
            println!("saved");
        }
    }
    Ok(())
}

/// Clamped values to store. A delay of `0` is stored as-is and means "off".
fn preference_update(
    concurrency: Option<usize>,
    delay_ms: Option<u64>,
) -> anyhow::Result<HashMap<String, serde_json::Value>> {
    let mut values = HashMap::new();
    if let Some(n) = concurrency {
        values.insert(CONCURRENCY_KEY.to_owned(), clamp_concurrency(n).into());
    }
    if let Some(ms) = delay_ms {
        let stored = if ms == 0 { 0 } else { clamp_delay_ms(ms) };
        values.insert(ITEM_DELAY_KEY.to_owned(), stored.into());
    }
    if values.is_empty() {
        anyhow::bail!("nothing to set; pass --concurrency and/or --delay-ms");
    }
    Ok(values)
}
