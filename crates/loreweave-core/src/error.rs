//! Sync error types.

use std::time::Duration;

use thiserror::Error;

use crate::entity::EntityKind;

/// Top-level error type for the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An external page, container, or block does not exist (or is no longer
    /// shared with the integration).
    #[error("external resource not found: {0}")]
    NotFoundExternal(String),

    /// The workspace API asked us to back off. Retried later; does not count
    /// toward the failure-notification window.
    #[error("rate limited by the workspace API")]
    RateLimited {
        /// Server-suggested delay before retrying, if any.
        retry_after: Option<Duration>,
    },

    /// The stored credential is no longer valid. Drives the integration to
    /// `Disconnected` and suppresses failure counting until reconnected.
    #[error("workspace credential expired or revoked")]
    AuthExpired,

    /// A payload (external property, block, or response body) could not be
    /// interpreted. The affected field or item is skipped.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// A local attribute patch failed domain validation. The entity is
    /// skipped; the rest of the batch proceeds.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Another worker already correlated this entity (or this external page)
    /// first. Callers convert a detected duplicate into an update.
    #[error("correlation conflict for {kind:?} on external page {correlation_id}")]
    CorrelationConflict {
        /// The entity kind whose correlation collided.
        kind: EntityKind,
        /// The external page id that was already claimed.
        correlation_id: String,
    },

    /// A persistence error.
    #[error("storage error: {0}")]
    Storage(String),

    /// A transport-level error talking to an external service.
    #[error("transport error: {0}")]
    Transport(String),
}

impl SyncError {
    /// Whether this failure increments the per-campaign failure counter.
    ///
    /// `RateLimited` is transient by contract and `AuthExpired` has its own
    /// lifecycle (the integration disconnects); neither counts.
    #[must_use]
    pub fn counts_toward_throttle(&self) -> bool {
        !matches!(self, Self::RateLimited { .. } | Self::AuthExpired)
    }
}
