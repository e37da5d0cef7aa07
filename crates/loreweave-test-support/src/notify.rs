//! Recording notification dispatcher.

use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use loreweave_core::error::SyncError;
use loreweave_core::notify::NotificationDispatcher;

/// Records every dispatched notification.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    notifications: Mutex<Vec<(Uuid, i64)>>,
}

impl RecordingDispatcher {
    /// A fresh dispatcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all dispatched notifications.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn notifications(&self) -> Vec<(Uuid, i64)> {
        self.notifications.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationDispatcher for RecordingDispatcher {
    async fn sync_trouble(&self, campaign_id: Uuid, failure_count: i64) -> Result<(), SyncError> {
        self.notifications
            .lock()
            .unwrap()
            .push((campaign_id, failure_count));
        Ok(())
    }
}
