//! Loreweave Mapping — per-entity-kind export/import between syncable
//! entities and external page properties.
//!
//! Each entity kind implements two total functions over the closed
//! [`EntityFields`](loreweave_core::entity::EntityFields) enum: `export`
//! builds the external property map (rich text via the forward converter),
//! `import` extracts typed fields from an external page and merges them
//! against the existing entity using field-specific rules. Dispatch is a
//! `match` per kind; there is no open registry.

mod export;
mod import;
pub mod properties;

pub use export::export;
pub use import::{AttributePatch, import};

/// Protected numeric fields keep the local value when it exceeds this
/// baseline; otherwise the external value wins.
pub const PROTECTED_FIELD_BASELINE: i64 = 5;

/// Title used when an imported page has a blank title and there is no
/// existing entity to fall back to.
pub const PLACEHOLDER_NAME: &str = "Untitled import";
