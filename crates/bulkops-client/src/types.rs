//! Wire types for the bulk-action backend.
//!
//! Item ids arrive as JSON numbers from some endpoints and strings from
//! others; [`ItemId`] accepts both. Acknowledgement bodies (`{"status":"ok"}`
//! or `{"error": "..."}`) are checked on the raw JSON value and have no type
//! here.

use bulkops_core::{ItemId, ItemKind, PageCursor, WorkItem};
use serde::{Deserialize, Serialize};

/// Filters shared by the export count and export item list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportQuery {
    pub store: String,
    /// Include products that were already exported.
    pub all: bool,
    pub unfulfilled_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PendingCount {
    pub pending: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportItemsResponse {
    #[serde(default)]
    pub items: Vec<ExportItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportItem {
    #[serde(alias = "id")]
    pub product: ItemId,
    #[serde(default)]
    pub title: Option<String>,
}

impl From<ExportItem> for WorkItem {
    fn from(item: ExportItem) -> Self {
        let work = WorkItem::new(item.product, ItemKind::Product);
        match item.title.filter(|t| !t.trim().is_empty()) {
            Some(title) => work.with_label(title),
            None => work,
        }
    }
}

/// Body of `POST /api/bulk/export/item`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportItemRequest<'a> {
    pub store: &'a str,
    pub product: &'a ItemId,
    pub channel: &'a str,
}

/// Body posted to a per-item update endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateItemRequest<'a> {
    pub id: &'a ItemId,
    pub kind: ItemKind,
    pub payload: &'a serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersPage {
    #[serde(default)]
    pub orders: Vec<OrderSummary>,
    #[serde(default)]
    pub next: Option<String>,
}

impl OrdersPage {
    /// Cursor for the following page; blank cursors mean "no more pages".
    #[must_use]
    pub fn next_cursor(&self) -> Option<PageCursor> {
        self.next.as_deref().and_then(PageCursor::parse)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderSummary {
    pub id: ItemId,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tracking_number: Option<String>,
    #[serde(default)]
    pub carrier: Option<String>,
}

impl From<OrderSummary> for WorkItem {
    fn from(order: OrderSummary) -> Self {
        let payload = serde_json::to_value(&order).unwrap_or(serde_json::Value::Null);
        let work = WorkItem::new(order.id, ItemKind::Order).with_payload(payload);
        match order.name {
            Some(name) => work.with_label(name),
            None => work,
        }
    }
}
