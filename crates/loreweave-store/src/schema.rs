//! Sync engine database schema.

/// SQL to create the syncable entities table.
///
/// The partial unique index enforces per-kind correlation uniqueness at the
/// storage layer; concurrent claims surface as unique violations, never as
/// silent double-links.
pub const CREATE_SYNC_ENTITIES_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS sync_entities (
    id              UUID PRIMARY KEY,
    campaign_id     UUID NOT NULL,
    kind            VARCHAR(32) NOT NULL,
    name            TEXT NOT NULL,
    content         TEXT,
    correlation_id  TEXT,
    last_synced_at  TIMESTAMPTZ,
    fields          JSONB NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_sync_entities_correlation
    ON sync_entities (kind, correlation_id)
    WHERE correlation_id IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_sync_entities_campaign
    ON sync_entities (campaign_id, kind);
";

/// SQL to create the campaign integrations table.
pub const CREATE_CAMPAIGN_INTEGRATIONS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS campaign_integrations (
    campaign_id           UUID PRIMARY KEY,
    status                VARCHAR(32) NOT NULL,
    credential            TEXT NOT NULL,
    containers            JSONB NOT NULL,
    failure_count         BIGINT NOT NULL DEFAULT 0,
    failure_window_start  TIMESTAMPTZ,
    notified_at           TIMESTAMPTZ
);
";

/// SQL to create the imported asset mappings table.
pub const CREATE_IMPORTED_ASSET_MAPPINGS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS imported_asset_mappings (
    page_id       TEXT NOT NULL,
    block_id      TEXT NOT NULL,
    mirrored_url  TEXT NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (page_id, block_id)
);
";
