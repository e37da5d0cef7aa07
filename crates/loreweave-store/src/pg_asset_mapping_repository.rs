//! `PostgreSQL` implementation of the `AssetMappingRepository` trait.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use loreweave_core::error::SyncError;
use loreweave_core::repository::{AssetMappingRepository, ImportedAssetMapping};

use crate::storage_err;

/// PostgreSQL-backed asset mapping repository.
#[derive(Debug, Clone)]
pub struct PgAssetMappingRepository {
    pool: PgPool,
}

impl PgAssetMappingRepository {
    /// Creates a new `PgAssetMappingRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AssetMappingRepository for PgAssetMappingRepository {
    async fn find(
        &self,
        page_id: &str,
        block_id: &str,
    ) -> Result<Option<ImportedAssetMapping>, SyncError> {
        let row = sqlx::query(
            "SELECT page_id, block_id, mirrored_url, created_at \
             FROM imported_asset_mappings WHERE page_id = $1 AND block_id = $2",
        )
        .bind(page_id)
        .bind(block_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage_err)?;
        row.map(|row| {
            Ok(ImportedAssetMapping {
                page_id: row.try_get("page_id").map_err(storage_err)?,
                block_id: row.try_get("block_id").map_err(storage_err)?,
                mirrored_url: row.try_get("mirrored_url").map_err(storage_err)?,
                created_at: row.try_get("created_at").map_err(storage_err)?,
            })
        })
        .transpose()
    }

    async fn insert(&self, mapping: &ImportedAssetMapping) -> Result<(), SyncError> {
        // Racing imports of the same block are harmless; first write wins.
        sqlx::query(
            "INSERT INTO imported_asset_mappings (page_id, block_id, mirrored_url, created_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (page_id, block_id) DO NOTHING",
        )
        .bind(&mapping.page_id)
        .bind(&mapping.block_id)
        .bind(&mapping.mirrored_url)
        .bind(mapping.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage_err)?;
        Ok(())
    }
}
