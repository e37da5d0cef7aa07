//! Loreweave Store — `PostgreSQL`-backed repositories for the sync engine.
//!
//! Each repository implements a trait from `loreweave-core` over a shared
//! [`sqlx::PgPool`]. The statements that back concurrency-sensitive
//! operations (correlation claims, failure counting, notification claims)
//! are single conditional writes; nothing here takes in-process locks.

pub mod pg_asset_mapping_repository;
pub mod pg_entity_repository;
pub mod pg_integration_repository;
pub mod schema;

pub use pg_asset_mapping_repository::PgAssetMappingRepository;
pub use pg_entity_repository::PgEntityRepository;
pub use pg_integration_repository::PgIntegrationRepository;

use loreweave_core::error::SyncError;

/// Postgres unique-violation SQLSTATE.
const UNIQUE_VIOLATION: &str = "23505";

pub(crate) fn storage_err(err: sqlx::Error) -> SyncError {
    SyncError::Storage(err.to_string())
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION)
    )
}
