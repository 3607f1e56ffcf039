//! Correlation of remote "item completed" events back to ledger slots.
//!
//! Some bulk actions (exports to a remote store, for example) are only
//! accepted by the triggering HTTP call; the real outcome arrives later on a
//! pub/sub channel. The channel is at-least-once and unordered, so every event
//! is merged into the ledger by item id and duplicates are dropped.
//!
//! Payloads name the item under `task`, `product` or `order` depending on the
//! publisher. Events can arrive bare or wrapped in the pub/sub envelope, whose
//! `data` field may itself be a JSON-encoded string.

use std::future::Future;

use bulkops_core::ItemId;
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::ledger::{ItemOutcome, ProgressLedger, RecordResult};

/// Opaque per-operation channel name the backend publishes completions to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelName(String);

impl ChannelName {
    #[must_use]
    pub fn for_operation(operation_id: &Uuid) -> Self {
        Self(format!("bulk-{}", operation_id.simple()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CompletionEvent {
    #[serde(alias = "task", alias = "product", alias = "order")]
    pub item: ItemId,
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Settled(ItemOutcome),
    /// Intermediate status; the item has not settled yet.
    Progress(String),
}

impl CompletionEvent {
    /// An error message always wins; otherwise `success` settles the item;
    /// otherwise a `progress` message is intermediate. An event with none of
    /// these is a failure without a reason.
    #[must_use]
    pub fn classify(&self) -> EventKind {
        if let Some(reason) = self.error.as_deref().filter(|e| !e.trim().is_empty()) {
            return EventKind::Settled(ItemOutcome::failed(reason));
        }
        if self.success {
            return EventKind::Settled(ItemOutcome::Succeeded);
        }
        match &self.progress {
            Some(message) => EventKind::Progress(message.clone()),
            None => EventKind::Settled(ItemOutcome::failed("remote operation reported failure")),
        }
    }
}

/// Result of merging one event into the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Correlation {
    Recorded(ItemOutcome),
    Progress(String),
    /// Late or repeated completion for an item that already settled.
    Duplicate,
    /// Event for an item outside this operation.
    Unknown,
}

/// Merges `event` into `ledger`. Applying the same event twice changes the
/// ledger exactly as much as applying it once.
pub fn correlate(ledger: &mut ProgressLedger, event: &CompletionEvent) -> Correlation {
    match event.classify() {
        EventKind::Progress(message) => {
            if ledger.is_settled(&event.item) {
                Correlation::Duplicate
            } else {
                Correlation::Progress(message)
            }
        }
        EventKind::Settled(outcome) => match ledger.record_outcome(&event.item, &outcome) {
            RecordResult::Counted => Correlation::Recorded(outcome),
            RecordResult::Duplicate => {
                tracing::debug!(item_id = %event.item, "ignoring duplicate completion event");
                Correlation::Duplicate
            }
            RecordResult::Unknown => {
                tracing::debug!(item_id = %event.item, "ignoring completion event for unknown item");
                Correlation::Unknown
            }
        },
    }
}

/// Source of inbound completion events. `None` means the channel closed.
pub trait CompletionChannel {
    fn next_event(&mut self) -> impl Future<Output = Option<CompletionEvent>>;
}

impl CompletionChannel for mpsc::Receiver<CompletionEvent> {
    async fn next_event(&mut self) -> Option<CompletionEvent> {
        self.recv().await
    }
}

impl CompletionChannel for mpsc::UnboundedReceiver<CompletionEvent> {
    async fn next_event(&mut self) -> Option<CompletionEvent> {
        self.recv().await
    }
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    channel: Option<String>,
    data: serde_json::Value,
}

/// Parses one line as either a bare event or an envelope. Returns `Ok(None)`
/// when the envelope is addressed to a different channel.
///
/// # Errors
///
/// Returns the JSON error when the line is neither shape.
pub fn parse_event_line(
    line: &str,
    channel: Option<&ChannelName>,
) -> Result<Option<CompletionEvent>, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(line)?;
    if value.get("data").is_none() {
        return serde_json::from_value(value).map(Some);
    }

    let envelope: Envelope = serde_json::from_value(value)?;
    if let (Some(expected), Some(actual)) = (channel, envelope.channel.as_deref()) {
        if expected.as_str() != actual {
            return Ok(None);
        }
    }
    let event = match envelope.data {
        serde_json::Value::String(encoded) => serde_json::from_str(&encoded)?,
        other => serde_json::from_value(other)?,
    };
    Ok(Some(event))
}

/// Newline-delimited JSON events read from any async reader. Blank lines,
/// lines that are not UTF-8 and lines that are not events are skipped with a
/// warning; only end of input or a read error closes the channel.
pub struct JsonLinesChannel<R> {
    reader: R,
    buf: Vec<u8>,
    channel: Option<ChannelName>,
}

impl<R: AsyncBufRead + Unpin> JsonLinesChannel<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            channel: None,
        }
    }

    /// Only accept envelopes published to `channel`. Bare events are always
    /// accepted.
    #[must_use]
    pub fn for_channel(mut self, channel: ChannelName) -> Self {
        self.channel = Some(channel);
        self
    }
}

impl<R: AsyncBufRead + Unpin> CompletionChannel for JsonLinesChannel<R> {
    async fn next_event(&mut self) -> Option<CompletionEvent> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => return None,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "completion channel read failed");
                    return None;
                }
            }
            let line = match std::str::from_utf8(&self.buf) {
                Ok(line) => line.trim(),
                Err(err) => {
                    tracing::warn!(error = %err, "skipping completion line that is not UTF-8");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match parse_event_line(line, self.channel.as_ref()) {
                Ok(Some(event)) => return Some(event),
                Ok(None) => {}
                Err(err) => {
                    tracing::warn!(error = %err, "skipping malformed completion event");
                }
            }
        }
    }
}
