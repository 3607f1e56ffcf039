//! One bulk operation in flight per modal.
//!
//! A [`ModalSlot`] stands for one bulk-action surface (the order sync dialog,
//! the export dialog, ...). [`ModalSlot::begin`] hands out an
//! [`OperationContext`] that owns everything the operation needs; while it is
//! alive the slot refuses a second operation, and dropping it frees the slot.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::cancel::StopToken;
use crate::completion::ChannelName;
use crate::error::CoordinatorError;

#[derive(Debug, Clone)]
pub struct ModalSlot {
    label: String,
    busy: Arc<AtomicBool>,
}

impl ModalSlot {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Claims the slot for a new operation.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Busy`] while another operation started
    /// from this slot is still alive.
    pub fn begin(&self) -> Result<OperationContext, CoordinatorError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::warn!(label = %self.label, "bulk operation already in progress");
            return Err(CoordinatorError::Busy {
                label: self.label.clone(),
            });
        }

        let id = Uuid::new_v4();
        tracing::debug!(label = %self.label, operation_id = %id, "bulk operation started");
        Ok(OperationContext {
            id,
            label: self.label.clone(),
            started_at: Utc::now(),
            token: StopToken::new(),
            channel: ChannelName::for_operation(&id),
            _guard: BusyGuard {
                busy: Arc::clone(&self.busy),
            },
        })
    }

    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[derive(Debug)]
struct BusyGuard {
    busy: Arc<AtomicBool>,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Per-operation state. Created by [`ModalSlot::begin`], dropped when the
/// operation's dialog closes.
#[derive(Debug)]
pub struct OperationContext {
    id: Uuid,
    label: String,
    started_at: DateTime<Utc>,
    token: StopToken,
    channel: ChannelName,
    _guard: BusyGuard,
}

impl OperationContext {
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn token(&self) -> &StopToken {
        &self.token
    }

    #[must_use]
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }
}
