//! `PostgreSQL` implementation of the `IntegrationRepository` trait.
//!
//! The failure increment and the notification claim are each one
//! conditional statement, so parallel workers recording failures for the
//! same campaign serialize in the database instead of in process.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use loreweave_core::entity::EntityKind;
use loreweave_core::error::SyncError;
use loreweave_core::integration::{CampaignIntegration, Credential, IntegrationStatus};
use loreweave_core::repository::IntegrationRepository;

use crate::storage_err;

/// PostgreSQL-backed integration repository.
#[derive(Debug, Clone)]
pub struct PgIntegrationRepository {
    pool: PgPool,
}

impl PgIntegrationRepository {
    /// Creates a new `PgIntegrationRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates or replaces a campaign's integration row, used when an owner
    /// (re)connects their workspace.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` when the write fails.
    pub async fn upsert(&self, integration: &CampaignIntegration) -> Result<(), SyncError> {
        let containers = containers_to_json(&integration.containers)?;
        sqlx::query(
            "INSERT INTO campaign_integrations \
             (campaign_id, status, credential, containers, failure_count, failure_window_start, notified_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (campaign_id) DO UPDATE SET \
                 status = EXCLUDED.status, \
                 credential = EXCLUDED.credential, \
                 containers = EXCLUDED.containers, \
                 failure_count = EXCLUDED.failure_count, \
                 failure_window_start = EXCLUDED.failure_window_start, \
                 notified_at = EXCLUDED.notified_at",
        )
        .bind(integration.campaign_id)
        .bind(integration.status.as_str())
        .bind(integration.credential.expose())
        .bind(containers)
        .bind(integration.failure_count)
        .bind(integration.failure_window_start)
        .bind(integration.notified_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

fn containers_to_json(
    containers: &BTreeMap<EntityKind, String>,
) -> Result<serde_json::Value, SyncError> {
    let by_name: BTreeMap<&str, &str> = containers
        .iter()
        .map(|(kind, container)| (kind.as_str(), container.as_str()))
        .collect();
    serde_json::to_value(by_name).map_err(|err| SyncError::Storage(err.to_string()))
}

fn containers_from_json(
    value: serde_json::Value,
) -> Result<BTreeMap<EntityKind, String>, SyncError> {
    let by_name: BTreeMap<String, String> = serde_json::from_value(value)
        .map_err(|err| SyncError::Storage(format!("corrupt containers payload: {err}")))?;
    by_name
        .into_iter()
        .map(|(raw, container)| {
            let kind = EntityKind::parse(&raw)
                .ok_or_else(|| SyncError::Storage(format!("unknown entity kind {raw}")))?;
            Ok((kind, container))
        })
        .collect()
}

fn integration_from_row(row: &PgRow) -> Result<CampaignIntegration, SyncError> {
    let status_raw: String = row.try_get("status").map_err(storage_err)?;
    let status = IntegrationStatus::parse(&status_raw)
        .ok_or_else(|| SyncError::Storage(format!("unknown integration status {status_raw}")))?;
    let credential: String = row.try_get("credential").map_err(storage_err)?;
    let containers_raw: serde_json::Value = row.try_get("containers").map_err(storage_err)?;
    Ok(CampaignIntegration {
        campaign_id: row.try_get("campaign_id").map_err(storage_err)?,
        status,
        credential: Credential::new(credential),
        containers: containers_from_json(containers_raw)?,
        failure_count: row.try_get("failure_count").map_err(storage_err)?,
        failure_window_start: row.try_get("failure_window_start").map_err(storage_err)?,
        notified_at: row.try_get("notified_at").map_err(storage_err)?,
    })
}

#[async_trait]
impl IntegrationRepository for PgIntegrationRepository {
    async fn find(&self, campaign_id: Uuid) -> Result<Option<CampaignIntegration>, SyncError> {
        let row = sqlx::query(
            "SELECT campaign_id, status, credential, containers, \
                    failure_count, failure_window_start, notified_at \
             FROM campaign_integrations WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.as_ref().map(integration_from_row).transpose()
    }

    async fn connected_campaigns(&self) -> Result<Vec<Uuid>, SyncError> {
        let rows = sqlx::query("SELECT campaign_id FROM campaign_integrations WHERE status = $1")
            .bind(IntegrationStatus::Working.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(storage_err)?;
        rows.iter()
            .map(|row| row.try_get("campaign_id").map_err(storage_err))
            .collect()
    }

    async fn set_status(
        &self,
        campaign_id: Uuid,
        status: IntegrationStatus,
    ) -> Result<(), SyncError> {
        let done = sqlx::query("UPDATE campaign_integrations SET status = $2 WHERE campaign_id = $1")
            .bind(campaign_id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await
            .map_err(storage_err)?;
        if done.rows_affected() == 0 {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<i64, SyncError> {
        let cutoff = now - window;
        let row = sqlx::query(
            "UPDATE campaign_integrations \
             SET failure_count = CASE \
                     WHEN failure_window_start IS NULL OR failure_window_start < $2 \
                     THEN 1 ELSE failure_count + 1 END, \
                 failure_window_start = CASE \
                     WHEN failure_window_start IS NULL OR failure_window_start < $2 \
                     THEN $3 ELSE failure_window_start END \
             WHERE campaign_id = $1 \
             RETURNING failure_count",
        )
        .bind(campaign_id)
        .bind(cutoff)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        let Some(row) = row else {
            return Err(SyncError::Storage(format!(
                "unknown integration {campaign_id}"
            )));
        };
        row.try_get("failure_count").map_err(storage_err)
    }

    async fn claim_notification(
        &self,
        campaign_id: Uuid,
        now: DateTime<Utc>,
        cooldown: Duration,
    ) -> Result<bool, SyncError> {
        let cutoff = now - cooldown;
        let done = sqlx::query(
            "UPDATE campaign_integrations \
             SET notified_at = $3 \
             WHERE campaign_id = $1 AND (notified_at IS NULL OR notified_at < $2)",
        )
        .bind(campaign_id)
        .bind(cutoff)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(done.rows_affected() > 0)
    }

    async fn reset_failures(&self, campaign_id: Uuid) -> Result<(), SyncError> {
        sqlx::query(
            "UPDATE campaign_integrations \
             SET failure_count = 0, failure_window_start = NULL \
             WHERE campaign_id = $1",
        )
        .bind(campaign_id)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_containers_round_trip_through_json() {
        let containers = BTreeMap::from([
            (EntityKind::Character, "container-ch".to_owned()),
            (EntityKind::Journal, "container-jo".to_owned()),
        ]);

        let json = containers_to_json(&containers).unwrap();
        let back = containers_from_json(json).unwrap();

        assert_eq!(back, containers);
    }

    #[test]
    fn test_unknown_container_kind_is_rejected() {
        let json = serde_json::json!({"spell": "container-sp"});
        assert!(containers_from_json(json).is_err());
    }
}
