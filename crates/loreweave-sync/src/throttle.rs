//! Failure counting and notification throttling.
//!
//! Sync tasks run on independent workers, so several failures for one
//! campaign can land at the same instant. Correctness rests on two atomic
//! repository operations: the windowed failure increment and the
//! notification claim (one conditional write; only the caller whose write
//! changed a row dispatches). The throttle itself holds no state.

use std::sync::Arc;

use uuid::Uuid;

use loreweave_core::clock::Clock;
use loreweave_core::config::SyncConfig;
use loreweave_core::error::SyncError;
use loreweave_core::integration::IntegrationStatus;
use loreweave_core::notify::NotificationDispatcher;
use loreweave_core::repository::IntegrationRepository;

/// Routes sync failures into the per-campaign counter and dispatches at
/// most one notification per cooldown window.
pub struct FailureThrottle {
    integrations: Arc<dyn IntegrationRepository>,
    notifier: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    window: chrono::Duration,
    threshold: i64,
}

impl FailureThrottle {
    /// Wires a throttle over its collaborators.
    #[must_use]
    pub fn new(
        integrations: Arc<dyn IntegrationRepository>,
        notifier: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: &SyncConfig,
    ) -> Self {
        Self {
            integrations,
            notifier,
            clock,
            window: config.failure_window,
            threshold: config.notify_threshold,
        }
    }

    /// Records one sync failure for the campaign.
    ///
    /// `RateLimited` and `AuthExpired` do not count. When the windowed
    /// count reaches the threshold, the notification slot is claimed with a
    /// single conditional write; the claiming caller dispatches exactly one
    /// notification, flips the integration to `NeedsAttention`, and resets
    /// the failure counter.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` when the counter update, the claim, or the
    /// dispatch itself fails.
    pub async fn record(&self, campaign_id: Uuid, err: &SyncError) -> Result<(), SyncError> {
        if !err.counts_toward_throttle() {
            return Ok(());
        }

        let now = self.clock.now();
        let count = self
            .integrations
            .record_failure(campaign_id, now, self.window)
            .await?;
        if count < self.threshold {
            return Ok(());
        }

        let claimed = self
            .integrations
            .claim_notification(campaign_id, now, self.window)
            .await?;
        if !claimed {
            return Ok(());
        }

        tracing::info!(%campaign_id, count, "sync failures crossed threshold, notifying owner");
        self.notifier.sync_trouble(campaign_id, count).await?;
        self.integrations
            .set_status(campaign_id, IntegrationStatus::NeedsAttention)
            .await?;
        self.integrations.reset_failures(campaign_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use chrono::{Duration, TimeZone, Utc};
    use loreweave_core::config::{Deployment, SyncConfig};
    use loreweave_core::integration::{CampaignIntegration, Credential};
    use loreweave_test_support::{InMemoryIntegrationRepository, ManualClock, RecordingDispatcher};

    fn setup() -> (
        Uuid,
        Arc<InMemoryIntegrationRepository>,
        Arc<RecordingDispatcher>,
        Arc<ManualClock>,
        FailureThrottle,
    ) {
        let campaign_id = Uuid::new_v4();
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        integrations.seed(CampaignIntegration::connected(
            campaign_id,
            Credential::new("token"),
            BTreeMap::new(),
        ));
        let notifier = Arc::new(RecordingDispatcher::new());
        let clock = Arc::new(ManualClock::starting_at(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let config = SyncConfig::for_deployment(Deployment::Development, "http://localhost");
        let throttle = FailureThrottle::new(
            integrations.clone(),
            notifier.clone(),
            clock.clone(),
            &config,
        );
        (campaign_id, integrations, notifier, clock, throttle)
    }

    fn storage_error() -> SyncError {
        SyncError::Storage("connection refused".into())
    }

    #[tokio::test]
    async fn test_failures_within_window_notify_exactly_once() {
        // Arrange
        let (campaign_id, integrations, notifier, clock, throttle) = setup();

        // Act: failures at T and T+1h.
        throttle.record(campaign_id, &storage_error()).await.unwrap();
        clock.advance(Duration::hours(1));
        throttle.record(campaign_id, &storage_error()).await.unwrap();

        // Assert
        assert_eq!(notifier.notifications().len(), 1);
        let integration = integrations.get(campaign_id).unwrap();
        assert_eq!(integration.status, IntegrationStatus::NeedsAttention);
    }

    #[tokio::test]
    async fn test_failure_after_cooldown_notifies_again() {
        let (campaign_id, _integrations, notifier, clock, throttle) = setup();

        // T and T+1h: one notification.
        throttle.record(campaign_id, &storage_error()).await.unwrap();
        clock.advance(Duration::hours(1));
        throttle.record(campaign_id, &storage_error()).await.unwrap();
        // T+25h: the cooldown has passed.
        clock.advance(Duration::hours(24));
        throttle.record(campaign_id, &storage_error()).await.unwrap();

        assert_eq!(notifier.notifications().len(), 2);
    }

    #[tokio::test]
    async fn test_counter_resets_after_claimed_notification() {
        let (campaign_id, integrations, _notifier, _clock, throttle) = setup();

        throttle.record(campaign_id, &storage_error()).await.unwrap();

        let integration = integrations.get(campaign_id).unwrap();
        assert_eq!(integration.failure_count, 0);
        assert!(integration.failure_window_start.is_none());
        assert!(integration.notified_at.is_some());
    }

    #[tokio::test]
    async fn test_rate_limited_and_auth_expired_do_not_count() {
        let (campaign_id, integrations, notifier, _clock, throttle) = setup();

        throttle
            .record(campaign_id, &SyncError::RateLimited { retry_after: None })
            .await
            .unwrap();
        throttle.record(campaign_id, &SyncError::AuthExpired).await.unwrap();

        assert!(notifier.notifications().is_empty());
        let integration = integrations.get(campaign_id).unwrap();
        assert_eq!(integration.failure_count, 0);
        assert_eq!(integration.status, IntegrationStatus::Working);
    }

    #[tokio::test]
    async fn test_unclaimed_slot_keeps_counting_without_dispatch() {
        let (campaign_id, integrations, notifier, clock, throttle) = setup();

        throttle.record(campaign_id, &storage_error()).await.unwrap();
        clock.advance(Duration::hours(2));
        throttle.record(campaign_id, &storage_error()).await.unwrap();
        clock.advance(Duration::hours(2));
        throttle.record(campaign_id, &storage_error()).await.unwrap();

        assert_eq!(notifier.notifications().len(), 1);
        // The two unclaimed failures accumulated in the counter.
        assert_eq!(integrations.get(campaign_id).unwrap().failure_count, 2);
    }
}
