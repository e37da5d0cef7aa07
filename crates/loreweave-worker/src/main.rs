//! Loreweave background sync worker entry point.

use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing_subscriber::EnvFilter;

use loreweave_assets::ImageImporter;
use loreweave_client::{HttpAssetMirror, HttpNotificationDispatcher, HttpWorkspaceClient};
use loreweave_core::clock::{Clock, SystemClock};
use loreweave_core::config::{Deployment, SyncConfig};
use loreweave_core::repository::IntegrationRepository;
use loreweave_sync::{FailureThrottle, SyncEngine};
use loreweave_store::{PgAssetMappingRepository, PgEntityRepository, PgIntegrationRepository};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Loreweave sync worker");

    // Read configuration from environment.
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| "DATABASE_URL environment variable must be set")?;
    let app_base_url = std::env::var("APP_BASE_URL")
        .map_err(|_| "APP_BASE_URL environment variable must be set")?;
    let workspace_api_base = std::env::var("WORKSPACE_API_BASE")
        .map_err(|_| "WORKSPACE_API_BASE environment variable must be set")?;
    let mirror_endpoint = std::env::var("ASSET_MIRROR_URL")
        .map_err(|_| "ASSET_MIRROR_URL environment variable must be set")?;
    let notify_endpoint = std::env::var("NOTIFY_ENDPOINT")
        .map_err(|_| "NOTIFY_ENDPOINT environment variable must be set")?;
    let deployment_raw =
        std::env::var("DEPLOYMENT").unwrap_or_else(|_| "development".to_string());
    let deployment = Deployment::parse(&deployment_raw)
        .ok_or_else(|| format!("unknown DEPLOYMENT value: {deployment_raw}"))?;
    let sweep_interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
        .unwrap_or_else(|_| "300".to_string())
        .parse()
        .map_err(|e| format!("SWEEP_INTERVAL_SECS must be a valid u64: {e}"))?;

    let mut config = SyncConfig::for_deployment(deployment, app_base_url);
    if let Ok(raw) = std::env::var("WORKER_CONCURRENCY") {
        config.worker_concurrency = raw
            .parse()
            .map_err(|e| format!("WORKER_CONCURRENCY must be a valid usize: {e}"))?;
    }
    let worker_concurrency = config.worker_concurrency.max(1);

    // Create database connection pool and apply migrations.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Wire the engine.
    let entities = Arc::new(PgEntityRepository::new(pool.clone()));
    let integrations = Arc::new(PgIntegrationRepository::new(pool.clone()));
    let mappings = Arc::new(PgAssetMappingRepository::new(pool));
    let workspace = Arc::new(HttpWorkspaceClient::new(workspace_api_base)?);
    let mirror = Arc::new(HttpAssetMirror::new(mirror_endpoint)?);
    let notifier = Arc::new(HttpNotificationDispatcher::new(notify_endpoint)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let images = Arc::new(ImageImporter::new(
        workspace.clone(),
        mirror,
        mappings,
        clock.clone(),
    ));
    let throttle = Arc::new(FailureThrottle::new(
        integrations.clone(),
        notifier,
        clock.clone(),
        &config,
    ));
    let engine = Arc::new(SyncEngine::new(
        entities,
        integrations.clone(),
        workspace,
        images,
        throttle,
        clock,
        config,
    ));

    tracing::info!(sweep_interval_secs, worker_concurrency, "entering sweep loop");
    let limiter = Arc::new(Semaphore::new(worker_concurrency));
    let mut ticker = tokio::time::interval(Duration::from_secs(sweep_interval_secs));
    loop {
        ticker.tick().await;
        let campaigns = match integrations.connected_campaigns().await {
            Ok(campaigns) => campaigns,
            Err(err) => {
                tracing::error!(error = %err, "failed to list connected campaigns");
                continue;
            }
        };
        tracing::info!(count = campaigns.len(), "sweeping connected campaigns");
        let mut sweeps = JoinSet::new();
        for campaign_id in campaigns {
            let permit = limiter.clone().acquire_owned().await?;
            let engine = engine.clone();
            sweeps.spawn(async move {
                let _permit = permit;
                match engine.sweep_campaign(campaign_id).await {
                    Ok(report) => {
                        tracing::debug!(%campaign_id, pulled = report.pulled, failed = report.failed, "sweep done");
                    }
                    Err(err) => {
                        tracing::error!(%campaign_id, error = %err, "campaign sweep failed");
                    }
                }
            });
        }
        while let Some(joined) = sweeps.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "campaign sweep panicked");
            }
        }
    }
}
