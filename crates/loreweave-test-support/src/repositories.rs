//! In-memory repository implementations for tests.
//!
//! The entity repository enforces the same per-kind correlation uniqueness
//! as the Postgres store, and the integration repository performs the
//! failure increment and notification claim atomically under one mutex, so
//! tests exercise the same race semantics the engine relies on.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use loreweave_core::entity::{EntityKind, SyncableEntity};
use loreweave_core::error::SyncError;
use loreweave_core::integration::{CampaignIntegration, IntegrationStatus};
use loreweave_core::repository::{
    AssetMappingRepository, EntityRepository, ImportedAssetMapping, IntegrationRepository,
};
use loreweave_core::scope::MentionTarget;

/// An entity repository backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryEntityRepository {
    entities: Mutex<HashMap<Uuid, SyncableEntity>>,
}

impl InMemoryEntityRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an entity without uniqueness checks (test setup).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, entity: SyncableEntity) {
        self.entities.lock().unwrap().insert(entity.id, entity);
    }

    /// Snapshot of one entity for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<SyncableEntity> {
        self.entities.lock().unwrap().get(&id).cloned()
    }

    /// Number of stored entities.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.lock().unwrap().len()
    }

    /// Whether the repository is empty.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.lock().unwrap().is_empty()
    }

    fn correlation_taken(
        entities: &HashMap<Uuid, SyncableEntity>,
        kind: EntityKind,
        correlation_id: &str,
        except: Uuid,
    ) -> bool {
        entities.values().any(|e| {
            e.id != except
                && e.kind == kind
                && e.correlation_id.as_deref() == Some(correlation_id)
        })
    }
}

#[async_trait]
impl EntityRepository for InMemoryEntityRepository {
    async fn find(&self, id: Uuid) -> Result<Option<SyncableEntity>, SyncError> {
        Ok(self.entities.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_correlation(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        correlation_id: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .find(|e| {
                e.campaign_id == campaign_id
                    && e.kind == kind
                    && e.correlation_id.as_deref() == Some(correlation_id)
            })
            .cloned())
    }

    async fn find_by_name(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .find(|e| {
                e.campaign_id == campaign_id
                    && e.kind == kind
                    && e.name.eq_ignore_ascii_case(name)
            })
            .cloned())
    }

    async fn mention_targets(&self, campaign_id: Uuid) -> Result<Vec<MentionTarget>, SyncError> {
        Ok(self
            .entities
            .lock()
            .unwrap()
            .values()
            .filter(|e| e.campaign_id == campaign_id)
            .map(|e| MentionTarget {
                kind: e.kind,
                id: e.id,
                name: e.name.clone(),
                correlation_id: e.correlation_id.clone(),
            })
            .collect())
    }

    async fn insert(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
        let mut entities = self.entities.lock().unwrap();
        if let Some(correlation_id) = &entity.correlation_id {
            if Self::correlation_taken(&entities, entity.kind, correlation_id, entity.id) {
                return Err(SyncError::CorrelationConflict {
                    kind: entity.kind,
                    correlation_id: correlation_id.clone(),
                });
            }
        }
        entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn update(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
        let mut entities = self.entities.lock().unwrap();
        if !entities.contains_key(&entity.id) {
            return Err(SyncError::Storage(format!("unknown entity {}", entity.id)));
        }
        entities.insert(entity.id, entity.clone());
        Ok(())
    }

    async fn set_correlation(
        &self,
        id: Uuid,
        correlation_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        let mut entities = self.entities.lock().unwrap();
        let Some(entity) = entities.get_mut(&id) else {
            return Err(SyncError::Storage(format!("unknown entity {id}")));
        };
        match &entity.correlation_id {
            Some(existing) if existing != correlation_id => Err(SyncError::CorrelationConflict {
                kind: entity.kind,
                correlation_id: existing.clone(),
            }),
            _ => {
                entity.correlation_id = Some(correlation_id.to_owned());
                entity.last_synced_at = Some(entity.last_synced_at.map_or(synced_at, |t| t.max(synced_at)));
                Ok(())
            }
        }
    }

    async fn touch_synced_at(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<(), SyncError> {
        let mut entities = self.entities.lock().unwrap();
        let Some(entity) = entities.get_mut(&id) else {
            return Err(SyncError::Storage(format!("unknown entity {id}")));
        };
        entity.last_synced_at = Some(entity.last_synced_at.map_or(synced_at, |t| t.max(synced_at)));
        Ok(())
    }
}

/// An integration repository backed by a `HashMap`. The failure increment
/// and notification claim happen under one lock, mirroring the atomic
/// statements of the Postgres store.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationRepository {
    integrations: Mutex<HashMap<Uuid, CampaignIntegration>>,
}

impl InMemoryIntegrationRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores an integration (test setup).
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn seed(&self, integration: CampaignIntegration) {
        self.integrations
            .lock()
            .unwrap()
            .insert(integration.campaign_id, integration);
    }

    /// Snapshot of one integration for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn get(&self, campaign_id: Uuid) -> Option<CampaignIntegration> {
        self.integrations.lock().unwrap().get(&campaign_id).cloned()
    }
}

#[async_trait]
impl IntegrationRepository for InMemoryIntegrationRepository {
    async fn find(&self, campaign_id: Uuid) -> Result<Option<CampaignIntegration>, SyncError> {
        Ok(self.integrations.lock().unwrap().get(&campaign_id).cloned())
    }

    async fn connected_campaigns(&self) -> Result<Vec<Uuid>, SyncError> {
        Ok(self
            .integrations
            .lock()
            .unwrap()
            .values()
            .filter(|i| i.status == IntegrationStatus::Working)
            .map(|i| i.campaign_id)
            .collect())
    }

    async fn set_status(
        &self,
        campaign_id: Uuid,
        status: IntegrationStatus,
    ) -> Result<(), SyncError> {
        let mut integrations = self.integrations.lock().unwrap();
        let Some(integration) = integrations.get_mut(&campaign_id) else {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        };
        integration.status = status;
        Ok(())
    }

    async fn record_failure(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<i64, SyncError> {
        let mut integrations = self.integrations.lock().unwrap();
        let Some(integration) = integrations.get_mut(&campaign_id) else {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        };
        let expired = integration
            .failure_window_start
            .is_none_or(|start| start < now - window);
        if expired {
            integration.failure_count = 1;
            integration.failure_window_start = Some(now);
        } else {
            integration.failure_count += 1;
        }
        Ok(integration.failure_count)
    }

    async fn claim_notification(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, SyncError> {
        let mut integrations = self.integrations.lock().unwrap();
        let Some(integration) = integrations.get_mut(&campaign_id) else {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        };
        let open = integration
            .notified_at
            .is_none_or(|at| at < now - cooldown);
        if open {
            integration.notified_at = Some(now);
        }
        Ok(open)
    }

    async fn reset_failures(&self, campaign_id: Uuid) -> Result<(), SyncError> {
        let mut integrations = self.integrations.lock().unwrap();
        let Some(integration) = integrations.get_mut(&campaign_id) else {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        };
        integration.failure_count = 0;
        integration.failure_window_start = None;
        Ok(())
    }
}

/// An asset-mapping repository backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct InMemoryAssetMappingRepository {
    mappings: Mutex<HashMap<(String, String), ImportedAssetMapping>>,
}

impl InMemoryAssetMappingRepository {
    /// An empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssetMappingRepository for InMemoryAssetMappingRepository {
    async fn find(
        &self,
        page_id: &str,
        block_id: &str,
    ) -> Result<Option<ImportedAssetMapping>, SyncError> {
        Ok(self
            .mappings
            .lock()
            .unwrap()
            .get(&(page_id.to_owned(), block_id.to_owned()))
            .cloned())
    }

    async fn insert(&self, mapping: &ImportedAssetMapping) -> Result<(), SyncError> {
        self.mappings
            .lock()
            .unwrap()
            .entry((mapping.page_id.clone(), mapping.block_id.clone()))
            .or_insert_with(|| mapping.clone());
        Ok(())
    }
}
