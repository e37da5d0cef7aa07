//! Task queue abstraction.
//!
//! The queue runtime is an external collaborator: at-least-once delivery,
//! bounded attempts. The engine only consumes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::SyncError;

/// The operation a sync task requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SyncOp {
    /// Push the entity's local state to its external page.
    Push,
    /// Pull one external page into the entity.
    Pull {
        /// The external page to pull.
        page_id: String,
    },
}

/// One sync request, keyed by entity id and operation kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncTask {
    /// The entity to sync.
    pub entity_id: Uuid,
    /// The campaign the entity belongs to.
    pub campaign_id: Uuid,
    /// The entity's kind.
    pub kind: EntityKind,
    /// What to do.
    pub op: SyncOp,
    /// Delivery attempt counter, starting at 1.
    pub attempt: u32,
}

/// Consumer side of the task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Fetches the next task, or `None` when the queue is drained.
    async fn next(&self) -> Result<Option<SyncTask>, SyncError>;
}
