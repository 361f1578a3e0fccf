//! Sticky routing state
//!
//! The gateway remembers the last routed provider/model so bare model strings
//! keep going to the same backend. There is one slot per process; it is not
//! persisted and concurrent requests race with last-writer-wins.

use std::sync::RwLock;

use tracing::debug;

use super::ProviderModel;

/// Single process-wide routing slot, unset until the first request routes
#[derive(Debug, Default)]
pub struct SessionRoutingState {
    slot: RwLock<Option<ProviderModel>>,
}

impl SessionRoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sticky target, if any request has been routed
    pub fn get(&self) -> Option<ProviderModel> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Overwrite the sticky target
    pub fn set(&self, target: ProviderModel) {
        debug!(provider = %target.provider, model = %target.model, "Sticky target updated");
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(target);
    }

    /// Back to the unset state
    pub fn clear(&self) {
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
