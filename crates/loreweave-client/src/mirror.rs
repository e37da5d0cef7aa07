//! Asset mirror client.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use loreweave_core::error::SyncError;
use loreweave_core::external::AssetMirrorClient;

/// Uploads can be large; give the mirror more room than page calls get.
const MIRROR_TIMEOUT: Duration = Duration::from_secs(120);

/// An [`AssetMirrorClient`] over the application's internal mirror endpoint.
///
/// The endpoint fetches the source bytes itself and returns the durable URL,
/// so this client never streams image payloads.
#[derive(Debug, Clone)]
pub struct HttpAssetMirror {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Serialize)]
struct MirrorRequest<'a> {
    source_url: &'a str,
}

#[derive(Deserialize)]
struct MirrorResponse {
    mirrored_url: String,
}

impl HttpAssetMirror {
    /// Builds a client against the mirror endpoint URL.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Transport` when the underlying HTTP client cannot
    /// be constructed.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SyncError> {
        let http = reqwest::Client::builder()
            .timeout(MIRROR_TIMEOUT)
            .build()
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl AssetMirrorClient for HttpAssetMirror {
    async fn mirror(&self, source_url: &str) -> Result<String, SyncError> {
        tracing::debug!(source_url, "mirroring external asset");
        let response = self
            .http
            .post(&self.endpoint)
            .json(&MirrorRequest { source_url })
            .send()
            .await
            .map_err(|err| SyncError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Transport(format!(
                "mirror returned status {status}: {body}"
            )));
        }
        let body: MirrorResponse = response
            .json()
            .await
            .map_err(|err| SyncError::MalformedPayload(err.to_string()))?;
        Ok(body.mirrored_url)
    }
}
