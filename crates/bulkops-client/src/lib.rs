pub mod client;
pub mod error;
pub mod types;

pub use client::{BackendClient, OrderPages};
pub use error::ClientError;
pub use types::{ExportItem, ExportQuery, OrderSummary, OrdersPage};
