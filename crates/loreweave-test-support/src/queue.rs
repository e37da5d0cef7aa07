//! In-memory task queue.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use loreweave_core::error::SyncError;
use loreweave_core::queue::{SyncTask, TaskQueue};

/// A drain-once queue fed by tests.
#[derive(Debug, Default)]
pub struct InMemoryTaskQueue {
    tasks: Mutex<VecDeque<SyncTask>>,
}

impl InMemoryTaskQueue {
    /// A queue preloaded with tasks.
    #[must_use]
    pub fn with_tasks(tasks: Vec<SyncTask>) -> Self {
        Self {
            tasks: Mutex::new(tasks.into()),
        }
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn next(&self) -> Result<Option<SyncTask>, SyncError> {
        Ok(self.tasks.lock().unwrap().pop_front())
    }
}
