//! Notification dispatcher over the application's internal webhook.
//!
//! Delivery mechanics (email, in-app inbox) live behind the endpoint; the
//! sync engine only reports that a campaign needs attention.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;

use loreweave_core::error::SyncError;
use loreweave_core::notify::NotificationDispatcher;

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(10);

/// A [`NotificationDispatcher`] that posts sync-trouble events to an
/// internal endpoint.
#[derive(Debug, Clone)]
pub struct HttpNotificationDispatcher {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct SyncTroubleBody {
    campaign_id: Uuid,
    failure_count: i64,
}

impl HttpNotificationDispatcher {
    /// Builds a dispatcher against the notification endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` when the underlying HTTP client cannot
    /// be constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(NOTIFY_TIMEOUT)
            .build()
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for HttpNotificationDispatcher {
    async fn sync_trouble(&self, campaign_id: Uuid, failure_count: i64) -> Result<(), SyncError> {
        let response = self
            .http
            .post(&self.endpoint)
            .json(&SyncTroubleBody {
                campaign_id,
                failure_count,
            })
            .send()
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(SyncError::Transport(format!(
                "notification endpoint returned status {status}"
            )));
        }
        Ok(())
    }
}
