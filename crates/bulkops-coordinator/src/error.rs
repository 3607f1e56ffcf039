use thiserror::Error;

/// Errors that stop a bulk operation before or instead of running it.
///
/// Per-item failures are not errors at this level; they are recorded in the
/// ledger as [`ItemFailure`] values and the batch continues.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("bulk operation \"{label}\" is already in progress")]
    Busy { label: String },

    #[error("could not prepare {context}: {source}")]
    Systemic {
        context: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("required integration \"{name}\" is unavailable: {reason}")]
    MissingIntegration { name: String, reason: String },
}

/// Failure of a single work item. Never retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct ItemFailure {
    pub reason: String,
}

impl ItemFailure {
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
