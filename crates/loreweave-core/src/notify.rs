//! Notification dispatch abstraction.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::SyncError;

/// Dispatches owner-facing notifications. Email delivery (or whatever
/// channel) lives behind this trait; the throttle guarantees at most one
/// call per campaign per cooldown window.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// Tells the campaign owner their integration needs attention.
    async fn sync_trouble(&self, campaign_id: Uuid, failure_count: i64) -> Result<(), SyncError>;
}
