//! Shared test mocks and utilities for the Loreweave sync engine.

mod clock;
mod notify;
mod queue;
mod repositories;
mod workspace;

pub use clock::{FixedClock, ManualClock};
pub use notify::RecordingDispatcher;
pub use queue::InMemoryTaskQueue;
pub use repositories::{
    InMemoryAssetMappingRepository, InMemoryEntityRepository, InMemoryIntegrationRepository,
};
pub use workspace::{CountingMirrorClient, ScriptedWorkspaceClient};
