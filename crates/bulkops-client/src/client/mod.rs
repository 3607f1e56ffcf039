//! HTTP client for the bulk-action backend.

mod orders;

use std::collections::HashMap;
use std::time::Duration;

use bulkops_core::{AppConfig, ItemId, PageCursor, WorkItem};
use bulkops_coordinator::{ChannelName, Page};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::ClientError;
use crate::types::{
    ExportItemRequest, ExportItemsResponse, ExportQuery, OrdersPage, PendingCount,
    UpdateItemRequest,
};

pub use orders::OrderPages;

/// Client for the backend endpoints that bulk actions drive.
///
/// Every call is made once. Rate limiting (429), not-found (404) and other
/// non-2xx responses surface as typed errors, and a 2xx body carrying an
/// `"error"` field surfaces as [`ClientError::Api`]. Use
/// [`BackendClient::with_base_url`] to point at a mock server in tests.
pub struct BackendClient {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl BackendClient {
    /// Builds a client from the application config.
    ///
    /// # Errors
    ///
    /// See [`BackendClient::with_base_url`].
    pub fn new(config: &AppConfig) -> Result<Self, ClientError> {
        Self::with_base_url(
            &config.api_base_url,
            config.api_token.as_deref(),
            config.request_timeout_secs,
            &config.user_agent,
        )
    }

    /// # Errors
    ///
    /// - [`ClientError::Http`] if the underlying `reqwest::Client` cannot be
    ///   constructed.
    /// - [`ClientError::InvalidBaseUrl`] if `base_url` does not parse.
    pub fn with_base_url(
        base_url: &str,
        token: Option<&str>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;

        // Exactly one trailing slash so `Url::join` appends instead of
        // replacing the last path segment.
        let normalised = format!("{}/", base_url.trim_end_matches('/'));
        let parsed = Url::parse(&normalised).map_err(|e| ClientError::InvalidBaseUrl {
            base_url: base_url.to_owned(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            client,
            base_url: parsed,
            token: token.map(str::to_owned),
        })
    }

    /// Number of products an export with these filters would touch.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the request or response body.
    pub async fn export_count(&self, query: &ExportQuery) -> Result<u64, ClientError> {
        let mut url = self.export_url(query)?;
        url.query_pairs_mut().append_pair("count_only", "true");
        let count: PendingCount = self
            .request_typed(Method::GET, url, None, "export count")
            .await?;
        Ok(count.pending)
    }

    /// The products an export with these filters would touch.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the request or response body.
    pub async fn export_items(&self, query: &ExportQuery) -> Result<Vec<WorkItem>, ClientError> {
        let url = self.export_url(query)?;
        let response: ExportItemsResponse = self
            .request_typed(Method::GET, url, None, "export items")
            .await?;
        Ok(response.items.into_iter().map(WorkItem::from).collect())
    }

    /// Asks the backend to export one product. Success only means the work
    /// was accepted; the outcome is published later on `channel`.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; [`ClientError::Api`] when the backend refuses.
    pub async fn trigger_export(
        &self,
        store: &str,
        item: &WorkItem,
        channel: &ChannelName,
    ) -> Result<(), ClientError> {
        let url = self.endpoint("api/bulk/export/item")?;
        let body = encode_body(
            &ExportItemRequest {
                store,
                product: item.id(),
                channel: channel.as_str(),
            },
            || format!("export request for product {}", item.id()),
        )?;
        self.request_json(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    /// Posts one item to a caller-chosen update endpoint (e.g. a tracking
    /// sync route).
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; [`ClientError::Api`] when the backend refuses.
    pub async fn update_item(&self, endpoint: &str, item: &WorkItem) -> Result<(), ClientError> {
        let url = self.endpoint(endpoint)?;
        let body = encode_body(
            &UpdateItemRequest {
                id: item.id(),
                kind: item.kind(),
                payload: item.payload(),
            },
            || format!("update request for {}", item.display_label()),
        )?;
        self.request_json(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    /// Removes a single line from an order.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; [`ClientError::Api`] when the backend refuses.
    pub async fn delete_line(&self, order_id: &ItemId, line_id: &ItemId) -> Result<(), ClientError> {
        let mut url = self.endpoint("api/order/line")?;
        url.query_pairs_mut()
            .append_pair("order_id", order_id.as_str())
            .append_pair("line_id", line_id.as_str());
        self.request_json(Method::DELETE, url, None).await?;
        Ok(())
    }

    /// Fetches one page of a store's orders.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`] from the request or response body.
    pub async fn fetch_orders_page(
        &self,
        store: &str,
        cursor: Option<&PageCursor>,
    ) -> Result<Page<WorkItem>, ClientError> {
        let mut url = self.endpoint("api/orders")?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("store", store);
            if let Some(cursor) = cursor {
                pairs.append_pair("cursor", cursor.as_str());
            }
        }
        let page: OrdersPage = self
            .request_typed(Method::GET, url, None, "orders page")
            .await?;
        let next = page.next_cursor();
        Ok(Page {
            items: page.orders.into_iter().map(WorkItem::from).collect(),
            next,
        })
    }

    /// # Errors
    ///
    /// Any [`ClientError`] from the request or response body.
    pub async fn load_user_config(
        &self,
    ) -> Result<HashMap<String, serde_json::Value>, ClientError> {
        let url = self.endpoint("api/user-config")?;
        self.request_typed(Method::GET, url, None, "user config")
            .await
    }

    /// Saves `values`, merged server-side into the stored user config.
    ///
    /// # Errors
    ///
    /// Any [`ClientError`]; [`ClientError::Api`] when the backend refuses.
    pub async fn save_user_config(
        &self,
        values: &HashMap<String, serde_json::Value>,
    ) -> Result<(), ClientError> {
        let url = self.endpoint("api/user-config")?;
        let body = encode_body(values, || "user config".to_owned())?;
        self.request_json(Method::POST, url, Some(&body)).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> Result<Url, ClientError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|e| ClientError::InvalidBaseUrl {
                base_url: self.base_url.to_string(),
                reason: format!("cannot join \"{path}\": {e}"),
            })
    }

    fn export_url(&self, query: &ExportQuery) -> Result<Url, ClientError> {
        let mut url = self.endpoint("api/bulk/export")?;
        url.query_pairs_mut()
            .append_pair("store", &query.store)
            .append_pair("all", if query.all { "true" } else { "false" })
            .append_pair(
                "unfulfilled_only",
                if query.unfulfilled_only { "true" } else { "false" },
            );
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn request_typed<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
        context: &str,
    ) -> Result<T, ClientError> {
        let value = self.request_json(method, url, body).await?;
        serde_json::from_value(value).map_err(|e| ClientError::Deserialize {
            context: context.to_owned(),
            source: e,
        })
    }

    /// Sends one request and returns the JSON body after status and
    /// `"error"` checks. An empty body is returned as `null`.
    async fn request_json(
        &self,
        method: Method,
        url: Url,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value, ClientError> {
        tracing::debug!(%method, %url, "backend request");
        let mut request = self.authorize(self.client.request(method, url.clone()));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_secs = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(60);
            return Err(ClientError::RateLimited { retry_after_secs });
        }

        if status == StatusCode::NOT_FOUND {
            return Err(ClientError::NotFound {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        let value: serde_json::Value =
            serde_json::from_str(&text).map_err(|e| ClientError::Deserialize {
                context: url.to_string(),
                source: e,
            })?;
        check_api_error(&value)?;
        Ok(value)
    }
}

/// Serialises a request body, naming it in the error when that fails.
fn encode_body<T: Serialize + ?Sized>(
    body: &T,
    context: impl FnOnce() -> String,
) -> Result<serde_json::Value, ClientError> {
    serde_json::to_value(body).map_err(|source| ClientError::Serialize {
        context: context(),
        source,
    })
}

fn check_api_error(body: &serde_json::Value) -> Result<(), ClientError> {
    match body.get("error") {
        None | Some(serde_json::Value::Null) => Ok(()),
        Some(serde_json::Value::String(message)) => Err(ClientError::Api(message.clone())),
        Some(other) => Err(ClientError::Api(other.to_string())),
    }
}

#[cfg(test)]
#[path = "../client_test.rs"]
mod tests;
