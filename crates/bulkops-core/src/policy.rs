//! Bulk operation policy: concurrency bound, inter-item delay and page ceiling.
//!
//! Values come from the environment first and may then be overridden by the
//! user's stored preferences on the backend. Every path goes through the same
//! clamping so an out-of-range stored value can never widen the window.

use std::collections::HashMap;
use std::time::Duration;

use crate::AppConfig;

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 10;
pub const MIN_ITEM_DELAY_MS: u64 = 100;
pub const MAX_ITEM_DELAY_MS: u64 = 100_000;
pub const DEFAULT_MAX_PAGES: usize = 100;

/// User-config key holding the preferred concurrency bound.
pub const CONCURRENCY_KEY: &str = "bulk_concurrency";
/// User-config key holding the preferred inter-item delay in milliseconds.
pub const ITEM_DELAY_KEY: &str = "bulk_item_delay_ms";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkSettings {
    concurrency: usize,
    item_delay: Option<Duration>,
    max_pages: usize,
}

impl Default for BulkSettings {
    fn default() -> Self {
        Self {
            concurrency: MIN_CONCURRENCY,
            item_delay: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }
}

impl BulkSettings {
    /// Builds settings, clamping concurrency to `[1, 10]`, the delay (when
    /// present) to `[100, 100000]` ms and the page ceiling to at least 1.
    #[must_use]
    pub fn new(concurrency: usize, item_delay_ms: Option<u64>, max_pages: usize) -> Self {
        Self {
            concurrency: clamp_concurrency(concurrency),
            item_delay: item_delay_ms.map(|ms| Duration::from_millis(clamp_delay_ms(ms))),
            max_pages: max_pages.max(1),
        }
    }

    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self::new(
            config.bulk_concurrency,
            config.bulk_item_delay_ms,
            config.bulk_max_pages,
        )
    }

    /// Applies stored user preferences on top of these settings.
    ///
    /// Values may be JSON numbers or numeric strings; anything else is
    /// ignored and the current value kept. A delay of `0` disables the delay.
    #[must_use]
    pub fn with_user_config(mut self, stored: &HashMap<String, serde_json::Value>) -> Self {
        if let Some(n) = stored.get(CONCURRENCY_KEY).and_then(as_u64) {
            self.concurrency = clamp_concurrency(usize::try_from(n).unwrap_or(usize::MAX));
        }
        if let Some(ms) = stored.get(ITEM_DELAY_KEY).and_then(as_u64) {
            self.item_delay = if ms == 0 {
                None
            } else {
                Some(Duration::from_millis(clamp_delay_ms(ms)))
            };
        }
        self
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = clamp_concurrency(concurrency);
        self
    }

    #[must_use]
    pub fn with_item_delay_ms(mut self, item_delay_ms: Option<u64>) -> Self {
        self.item_delay = item_delay_ms.map(|ms| Duration::from_millis(clamp_delay_ms(ms)));
        self
    }

    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    #[must_use]
    pub fn item_delay(&self) -> Option<Duration> {
        self.item_delay
    }

    #[must_use]
    pub fn max_pages(&self) -> usize {
        self.max_pages
    }
}

#[must_use]
pub fn clamp_concurrency(requested: usize) -> usize {
    requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY)
}

#[must_use]
pub fn clamp_delay_ms(requested: u64) -> u64 {
    requested.clamp(MIN_ITEM_DELAY_MS, MAX_ITEM_DELAY_MS)
}

fn as_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn concurrency_is_clamped_to_bounds() {
        assert_eq!(BulkSettings::new(0, None, 100).concurrency(), 1);
        assert_eq!(BulkSettings::new(4, None, 100).concurrency(), 4);
        assert_eq!(BulkSettings::new(50, None, 100).concurrency(), 10);
    }

    #[test]
    fn delay_is_clamped_when_present() {
        let low = BulkSettings::new(1, Some(5), 100);
        assert_eq!(low.item_delay(), Some(Duration::from_millis(100)));

        let high = BulkSettings::new(1, Some(1_000_000), 100);
        assert_eq!(high.item_delay(), Some(Duration::from_millis(100_000)));

        assert_eq!(BulkSettings::new(1, None, 100).item_delay(), None);
    }

    #[test]
    fn zero_max_pages_becomes_one() {
        assert_eq!(BulkSettings::new(1, None, 0).max_pages(), 1);
    }

    #[test]
    fn user_config_overrides_and_clamps() {
        let mut stored = HashMap::new();
        stored.insert(CONCURRENCY_KEY.to_owned(), json!(25));
        stored.insert(ITEM_DELAY_KEY.to_owned(), json!("250"));

        let settings = BulkSettings::default().with_user_config(&stored);
        assert_eq!(settings.concurrency(), 10);
        assert_eq!(settings.item_delay(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn user_config_zero_delay_disables_delay() {
        let mut stored = HashMap::new();
        stored.insert(ITEM_DELAY_KEY.to_owned(), json!(0));

        let settings = BulkSettings::new(2, Some(500), 100).with_user_config(&stored);
        assert_eq!(settings.item_delay(), None);
        assert_eq!(settings.concurrency(), 2);
    }

    #[test]
    fn user_config_ignores_non_numeric_values() {
        let mut stored = HashMap::new();
        stored.insert(CONCURRENCY_KEY.to_owned(), json!("fast"));
        stored.insert(ITEM_DELAY_KEY.to_owned(), json!(null));

        let settings = BulkSettings::new(3, Some(200), 100).with_user_config(&stored);
        assert_eq!(settings.concurrency(), 3);
        assert_eq!(settings.item_delay(), Some(Duration::from_millis(200)));
    }
}
