//! Persistence abstractions.
//!
//! Traits are defined here and implemented by the store crate; the sync
//! engine only ever sees these interfaces.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::{EntityKind, SyncableEntity};
use crate::error::SyncError;
use crate::integration::{CampaignIntegration, IntegrationStatus};
use crate::scope::MentionTarget;

/// Repository for syncable entities.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Loads an entity by local id.
    async fn find(&self, id: Uuid) -> Result<Option<SyncableEntity>, SyncError>;

    /// Loads an entity by its external page id, scoped to a campaign and kind.
    async fn find_by_correlation(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        correlation_id: &str,
    ) -> Result<Option<SyncableEntity>, SyncError>;

    /// Case-insensitive name lookup, used for bulk initial import before
    /// correlations exist.
    async fn find_by_name(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<SyncableEntity>, SyncError>;

    /// Loads the campaign's mention-resolution index.
    async fn mention_targets(&self, campaign_id: Uuid) -> Result<Vec<MentionTarget>, SyncError>;

    /// Inserts a new entity.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::CorrelationConflict` when the entity's
    /// `correlation_id` is already claimed by another entity of the same
    /// kind (storage-level uniqueness, not in-process locking).
    async fn insert(&self, entity: &SyncableEntity) -> Result<(), SyncError>;

    /// Persists the full current state of an existing entity.
    async fn update(&self, entity: &SyncableEntity) -> Result<(), SyncError>;

    /// Atomically claims the correlation for a first-time push: sets
    /// `correlation_id` and `last_synced_at` only if the entity is still
    /// uncorrelated (or already carries the same id).
    ///
    /// # Errors
    ///
    /// Returns `SyncError::CorrelationConflict` when a concurrent push won
    /// the race and stored a different page id.
    async fn set_correlation(
        &self,
        id: Uuid,
        correlation_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SyncError>;

    /// Refreshes `last_synced_at`, never moving it backwards.
    async fn touch_synced_at(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<(), SyncError>;
}

/// Repository for per-campaign integration state.
#[async_trait]
pub trait IntegrationRepository: Send + Sync {
    /// Loads a campaign's integration, if one exists.
    async fn find(&self, campaign_id: Uuid) -> Result<Option<CampaignIntegration>, SyncError>;

    /// Campaigns whose integration status is `Working`.
    async fn connected_campaigns(&self) -> Result<Vec<Uuid>, SyncError>;

    /// Sets the integration status.
    async fn set_status(
        &self,
        campaign_id: Uuid,
        status: IntegrationStatus,
    ) -> Result<(), SyncError>;

    /// Atomically increments the failure counter, resetting it first when
    /// `failure_window_start` fell out of the rolling `window`. Returns the
    /// new count. Must be a single conditional write, safe under concurrent
    /// failures from parallel workers.
    async fn record_failure(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<i64, SyncError>;

    /// Attempts to claim the notification slot with one conditional write:
    /// `set notified_at = now where notified_at is null or notified_at <
    /// now - cooldown`. Returns `true` only for the caller whose write
    /// changed a row; exactly that caller dispatches the notification.
    async fn claim_notification(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, SyncError>;

    /// Clears the failure counter and window after a dispatched notification.
    async fn reset_failures(&self, campaign_id: Uuid) -> Result<(), SyncError>;
}

/// Correlates an external block id to a mirrored asset URL, scoped per
/// external page. Created lazily on first successful mirror; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportedAssetMapping {
    /// The page the block belongs to.
    pub page_id: String,
    /// The image block id.
    pub block_id: String,
    /// Where the mirrored bytes live.
    pub mirrored_url: String,
    /// When the mirror succeeded.
    pub created_at: DateTime<Utc>,
}

/// Repository for imported asset mappings.
#[async_trait]
pub trait AssetMappingRepository: Send + Sync {
    /// Looks up the mapping for a block within a page.
    async fn find(
        &self,
        page_id: &str,
        block_id: &str,
    ) -> Result<Option<ImportedAssetMapping>, SyncError>;

    /// Records a mapping. Inserting the same (page, block) twice is a no-op.
    async fn insert(&self, mapping: &ImportedAssetMapping) -> Result<(), SyncError>;
}
