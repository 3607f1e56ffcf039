use bulkops_coordinator::ItemFailure;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization error for {context}: {source}")]
    Deserialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("JSON serialization error for {context}: {source}")]
    Serialize {
        context: String,
        #[source]
        source: serde_json::Error,
    },

    /// The backend answered 2xx with an `{"error": "..."}` body.
    #[error("backend error: {0}")]
    Api(String),

    #[error("endpoint not found: {url}")]
    NotFound { url: String },

    #[error("rate limited by backend (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error("invalid base URL \"{base_url}\": {reason}")]
    InvalidBaseUrl { base_url: String, reason: String },
}

impl From<ClientError> for ItemFailure {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Api(message) => ItemFailure::new(message),
            other => ItemFailure::new(other.to_string()),
        }
    }
}
