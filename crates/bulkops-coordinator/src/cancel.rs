//! Cooperative stop flag for one bulk operation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// One-way stop flag shared between the user-facing stop action and the
/// dispatcher.
///
/// Clones share state. Once stopped the token stays stopped; a new operation
/// must allocate a new token.
///
/// A stop lets work already accepted by a remote system finish reporting. A
/// second, stronger request ([`Self::request_abandon`]) also gives up on
/// those outstanding reports.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    requested: Arc<AtomicBool>,
    signal: CancellationToken,
    abandon_requested: Arc<AtomicBool>,
    abandon: CancellationToken,
}

impl StopToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop. Returns `true` for the call that flipped the flag and
    /// `false` for every later call.
    pub fn request_stop(&self) -> bool {
        if self.requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.signal.cancel();
        tracing::info!("stop requested; no further items will be started");
        true
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`Self::request_stop`] has been called.
    pub async fn cancelled(&self) {
        self.signal.cancelled().await;
    }

    /// Stops, and stops waiting for remote completions of items that were
    /// already accepted. Returns `true` only for the first call.
    pub fn request_abandon(&self) -> bool {
        self.request_stop();
        if self.abandon_requested.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.abandon.cancel();
        tracing::warn!("abandon requested; outstanding remote completions will not be awaited");
        true
    }

    #[must_use]
    pub fn is_abandoned(&self) -> bool {
        self.abandon_requested.load(Ordering::SeqCst)
    }

    /// Resolves once [`Self::request_abandon`] has been called.
    pub async fn abandoned(&self) {
        self.abandon.cancelled().await;
    }
}
