//! Task worker pool.
//!
//! Drains the task queue with bounded concurrency. Retries happen in
//! process: a failing task is retried until [`MAX_ATTEMPTS`] total attempts
//! are spent, then dropped with an error log. Per-entity throttling and
//! notification live in the engine, not here.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use loreweave_core::error::SyncError;
use loreweave_core::queue::{SyncOp, SyncTask, TaskQueue};

use crate::engine::SyncEngine;

/// Total attempts spent on one task before it is dropped.
pub const MAX_ATTEMPTS: u32 = 3;

/// Drains the queue, running up to `concurrency` tasks at once. Returns
/// once the queue reports empty and every in-flight task has finished.
///
/// # Errors
///
/// Returns `SyncError` when fetching the next task fails. Individual task
/// failures never fail the pool.
pub async fn run_worker_pool(
    engine: Arc<SyncEngine>,
    queue: Arc<dyn TaskQueue>,
    concurrency: usize,
) -> Result<(), SyncError> {
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut in_flight = JoinSet::new();

    while let Some(task) = queue.next().await? {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|err| SyncError::Storage(err.to_string()))?;
        let engine = engine.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            run_task(&engine, task).await;
        });
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "sync worker task panicked");
        }
    }
    Ok(())
}

async fn run_task(engine: &SyncEngine, task: SyncTask) {
    for attempt in task.attempt..=MAX_ATTEMPTS {
        let result = match &task.op {
            SyncOp::Push => engine.push(task.entity_id).await,
            SyncOp::Pull { page_id } => {
                engine.pull_page(task.campaign_id, task.kind, page_id).await
            }
        };
        match result {
            Ok(()) => return,
            Err(err) => {
                tracing::warn!(
                    entity_id = %task.entity_id,
                    campaign_id = %task.campaign_id,
                    attempt,
                    error = %err,
                    "sync task attempt failed"
                );
            }
        }
    }
    tracing::error!(
        entity_id = %task.entity_id,
        campaign_id = %task.campaign_id,
        "sync task exhausted its attempts, dropping"
    );
}
