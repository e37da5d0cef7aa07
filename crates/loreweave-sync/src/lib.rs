//! Loreweave Sync — the orchestrator that drives push/pull per entity, the
//! failure/notification throttle, and the task worker pool.
//!
//! Per-entity sync state is derived, never stored: an entity with no
//! `correlation_id` has never been synced; one with a correlation and a
//! `last_synced_at` is pushed; a local mutation after `last_synced_at`
//! makes it stale until the next push. The orchestrator owns both fields.

pub mod engine;
pub mod throttle;
pub mod worker;

pub use engine::{SweepReport, SyncEngine};
pub use throttle::FailureThrottle;
pub use worker::run_worker_pool;
