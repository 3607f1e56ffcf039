use bulkops_core::{PageCursor, WorkItem};
use bulkops_coordinator::{Page, PageSource};

use crate::error::ClientError;

use super::BackendClient;

/// A store's order list as a [`PageSource`] for `PagedFetch`.
pub struct OrderPages<'a> {
    client: &'a BackendClient,
    store: String,
}

impl<'a> OrderPages<'a> {
    #[must_use]
    pub fn new(client: &'a BackendClient, store: impl Into<String>) -> Self {
        Self {
            client,
            store: store.into(),
        }
    }
}

impl PageSource<WorkItem> for OrderPages<'_> {
    type Error = ClientError;

    async fn fetch_page(&self, cursor: Option<&PageCursor>) -> Result<Page<WorkItem>, ClientError> {
        self.client.fetch_orders_page(&self.store, cursor).await
    }
}
