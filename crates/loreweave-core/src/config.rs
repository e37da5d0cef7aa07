//! Sync engine configuration.
//!
//! Built once at startup (from the environment, in the worker binary) and
//! threaded explicitly into the engine. Nothing in the engine reads
//! process-global state.

use chrono::Duration;

/// Which deployment this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    /// The production deployment; exported pages get a canonical back-link.
    Production,
    /// A staging deployment.
    Staging,
    /// A local development deployment.
    Development,
}

impl Deployment {
    /// Parses a deployment name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Engine-wide configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Which deployment this is.
    pub deployment: Deployment,
    /// Base URL of the application, used for canonical entity links.
    pub app_base_url: String,
    /// Rolling window for failure counting and notification cooldown.
    pub failure_window: Duration,
    /// Failure count at which a notification claim is attempted.
    pub notify_threshold: i64,
    /// Maximum concurrent sync tasks in the worker pool.
    pub worker_concurrency: usize,
}

impl SyncConfig {
    /// Defaults for the given deployment.
    #[must_use]
    pub fn for_deployment(deployment: Deployment, app_base_url: impl Into<String>) -> Self {
        Self {
            deployment,
            app_base_url: app_base_url.into(),
            failure_window: Duration::hours(24),
            notify_threshold: 1,
            worker_concurrency: 8,
        }
    }
}
