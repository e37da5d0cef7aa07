//! Per-campaign integration state.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::entity::EntityKind;

/// Connection state of a campaign's workspace integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationStatus {
    /// No usable credential; sync is suspended until reconnected.
    Disconnected,
    /// Healthy.
    Working,
    /// Repeated failures crossed the notification threshold.
    NeedsAttention,
}

impl IntegrationStatus {
    /// Stable storage identifier for this status.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Working => "working",
            Self::NeedsAttention => "needs_attention",
        }
    }

    /// Parses a status from its storage identifier.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "disconnected" => Some(Self::Disconnected),
            "working" => Some(Self::Working),
            "needs_attention" => Some(Self::NeedsAttention),
            _ => None,
        }
    }
}

/// An opaque workspace credential. Encrypted at rest by the store; redacted
/// from `Debug` output so it never leaks into logs.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential(String);

impl Credential {
    /// Wraps a raw credential string.
    #[must_use]
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Exposes the raw credential for use at an external-call boundary.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// Per-campaign connection state, created on first successful connection.
///
/// `status` transitions are driven only by the orchestrator and the failure
/// throttle. `failure_count` / `failure_window_start` are reset whenever a
/// notification is successfully claimed and dispatched.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignIntegration {
    /// The campaign this integration belongs to.
    pub campaign_id: Uuid,
    /// Current connection status.
    pub status: IntegrationStatus,
    /// Opaque workspace credential.
    pub credential: Credential,
    /// Mapping from entity kind to the external container holding its pages.
    pub containers: BTreeMap<EntityKind, String>,
    /// Failures accumulated in the current rolling window.
    pub failure_count: i64,
    /// Start of the current failure window, if any failures are recorded.
    pub failure_window_start: Option<DateTime<Utc>>,
    /// When the last trouble notification was claimed, if ever.
    pub notified_at: Option<DateTime<Utc>>,
}

impl CampaignIntegration {
    /// A freshly connected integration with no failure history.
    #[must_use]
    pub fn connected(
        campaign_id: Uuid,
        credential: Credential,
        containers: BTreeMap<EntityKind, String>,
    ) -> Self {
        Self {
            campaign_id,
            status: IntegrationStatus::Working,
            credential,
            containers,
            failure_count: 0,
            failure_window_start: None,
            notified_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_storage_identifier_round_trips() {
        for status in [
            IntegrationStatus::Disconnected,
            IntegrationStatus::Working,
            IntegrationStatus::NeedsAttention,
        ] {
            assert_eq!(IntegrationStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("secret_token_abc");
        let rendered = format!("{credential:?}");
        assert!(!rendered.contains("secret_token_abc"));
        assert!(rendered.contains("redacted"));
    }
}
