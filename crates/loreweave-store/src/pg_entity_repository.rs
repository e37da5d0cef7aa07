//! `PostgreSQL` implementation of the `EntityRepository` trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use loreweave_core::entity::{EntityKind, SyncableEntity};
use loreweave_core::error::SyncError;
use loreweave_core::repository::EntityRepository;
use loreweave_core::scope::MentionTarget;

use crate::{is_unique_violation, storage_err};

/// PostgreSQL-backed entity repository.
#[derive(Debug, Clone)]
pub struct PgEntityRepository {
    pool: PgPool,
}

impl PgEntityRepository {
    /// Creates a new `PgEntityRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const ENTITY_COLUMNS: &str =
    "id, campaign_id, kind, name, content, correlation_id, last_synced_at, fields";

fn entity_from_row(row: &PgRow) -> Result<SyncableEntity, SyncError> {
    let kind_raw: String = row.try_get("kind").map_err(storage_err)?;
    let kind = EntityKind::parse(&kind_raw)
        .ok_or_else(|| SyncError::Storage(format!("unknown entity kind {kind_raw}")))?;
    let fields_raw: serde_json::Value = row.try_get("fields").map_err(storage_err)?;
    let fields = serde_json::from_value(fields_raw)
        .map_err(|err| SyncError::Storage(format!("corrupt fields payload: {err}")))?;
    Ok(SyncableEntity {
        id: row.try_get("id").map_err(storage_err)?,
        campaign_id: row.try_get("campaign_id").map_err(storage_err)?,
        kind,
        name: row.try_get("name").map_err(storage_err)?,
        content: row.try_get("content").map_err(storage_err)?,
        correlation_id: row.try_get("correlation_id").map_err(storage_err)?,
        last_synced_at: row.try_get("last_synced_at").map_err(storage_err)?,
        fields,
    })
}

#[async_trait]
impl EntityRepository for PgEntityRepository {
    async fn find(&self, id: Uuid) -> Result<Option<SyncableEntity>, SyncError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM sync_entities WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn find_by_correlation(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        correlation_id: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM sync_entities \
             WHERE campaign_id = $1 AND kind = $2 AND correlation_id = $3"
        ))
        .bind(campaign_id)
        .bind(kind.as_str())
        .bind(correlation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn find_by_name(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        name: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        let row = sqlx::query(&format!(
            "SELECT {ENTITY_COLUMNS} FROM sync_entities \
             WHERE campaign_id = $1 AND kind = $2 AND LOWER(name) = LOWER($3) \
             LIMIT 1"
        ))
        .bind(campaign_id)
        .bind(kind.as_str())
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(entity_from_row).transpose()
    }

    async fn mention_targets(&self, campaign_id: Uuid) -> Result<Vec<MentionTarget>, SyncError> {
        let rows = sqlx::query(
            "SELECT id, kind, name, correlation_id FROM sync_entities WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_err)?;
        rows.iter()
            .map(|row| {
                let kind_raw: String = row.try_get("kind").map_err(storage_err)?;
                let kind = EntityKind::parse(&kind_raw)
                    .ok_or_else(|| SyncError::Storage(format!("unknown entity kind {kind_raw}")))?;
                Ok(MentionTarget {
                    kind,
                    id: row.try_get("id").map_err(storage_err)?,
                    name: row.try_get("name").map_err(storage_err)?,
                    correlation_id: row.try_get("correlation_id").map_err(storage_err)?,
                })
            })
            .collect()
    }

    async fn insert(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
        let fields = serde_json::to_value(&entity.fields)
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        let result = sqlx::query(
            "INSERT INTO sync_entities \
             (id, campaign_id, kind, name, content, correlation_id, last_synced_at, fields) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(entity.id)
        .bind(entity.campaign_id)
        .bind(entity.kind.as_str())
        .bind(&entity.name)
        .bind(&entity.content)
        .bind(&entity.correlation_id)
        .bind(entity.last_synced_at)
        .bind(fields)
        .execute(&self.pool)
        .await;
        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(SyncError::CorrelationConflict {
                kind: entity.kind,
                correlation_id: entity.correlation_id.clone().unwrap_or_default(),
            }),
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn update(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
        let fields = serde_json::to_value(&entity.fields)
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        let result = sqlx::query(
            "UPDATE sync_entities \
             SET name = $2, content = $3, correlation_id = $4, last_synced_at = $5, fields = $6 \
             WHERE id = $1",
        )
        .bind(entity.id)
        .bind(&entity.name)
        .bind(&entity.content)
        .bind(&entity.correlation_id)
        .bind(entity.last_synced_at)
        .bind(fields)
        .execute(&self.pool)
        .await;
        match result {
            Ok(done) if done.rows_affected() == 0 => {
                Err(SyncError::Storage(format!("unknown entity {}", entity.id)))
            }
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(SyncError::CorrelationConflict {
                kind: entity.kind,
                correlation_id: entity.correlation_id.clone().unwrap_or_default(),
            }),
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn set_correlation(
        &self,
        id: Uuid,
        correlation_id: &str,
        synced_at: DateTime<Utc>,
    ) -> Result<(), SyncError> {
        // Conditional claim: only an uncorrelated entity (or one already
        // holding this page id) is written. The partial unique index rejects
        // a page id already held by another entity of the same kind.
        let result = sqlx::query(
            "UPDATE sync_entities \
             SET correlation_id = $2, \
                 last_synced_at = GREATEST(COALESCE(last_synced_at, $3), $3) \
             WHERE id = $1 AND (correlation_id IS NULL OR correlation_id = $2)",
        )
        .bind(id)
        .bind(correlation_id)
        .bind(synced_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(done) if done.rows_affected() > 0 => Ok(()),
            Ok(_) => {
                let row = sqlx::query("SELECT kind, correlation_id FROM sync_entities WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage_err)?;
                let Some(row) = row else {
                    return Err(SyncError::Storage(format!("unknown entity {id}")));
                };
                let kind_raw: String = row.try_get("kind").map_err(storage_err)?;
                let kind = EntityKind::parse(&kind_raw)
                    .ok_or_else(|| SyncError::Storage(format!("unknown entity kind {kind_raw}")))?;
                let existing: Option<String> =
                    row.try_get("correlation_id").map_err(storage_err)?;
                Err(SyncError::CorrelationConflict {
                    kind,
                    correlation_id: existing.unwrap_or_default(),
                })
            }
            Err(err) if is_unique_violation(&err) => {
                let kind = sqlx::query("SELECT kind FROM sync_entities WHERE id = $1")
                    .bind(id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(storage_err)?
                    .and_then(|row| row.try_get::<String, _>("kind").ok())
                    .and_then(|raw| EntityKind::parse(&raw))
                    .ok_or_else(|| SyncError::Storage(format!("unknown entity {id}")))?;
                Err(SyncError::CorrelationConflict {
                    kind,
                    correlation_id: correlation_id.to_owned(),
                })
            }
            Err(err) => Err(storage_err(err)),
        }
    }

    async fn touch_synced_at(&self, id: Uuid, synced_at: DateTime<Utc>) -> Result<(), SyncError> {
        let done = sqlx::query(
            "UPDATE sync_entities \
             SET last_synced_at = GREATEST(COALESCE(last_synced_at, $2), $2) \
             WHERE id = $1",
        )
        .bind(id)
        .bind(synced_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(SyncError::Storage(format!("unknown entity {id}")));
        }
        Ok(())
    }
}
