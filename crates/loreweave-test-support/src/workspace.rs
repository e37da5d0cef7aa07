//! Scripted workspace and mirror clients for tests.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use loreweave_core::error::SyncError;
use loreweave_core::external::{
    ApiContext, AssetMirrorClient, Block, ExternalPage, PageBatch, PropertyValue, WorkspaceClient,
};

/// A workspace client driven entirely by scripted state. Created pages get
/// sequential ids (`page-1`, `page-2`, ...); call counts and stored pages
/// are exposed for assertions, and failures can be queued per operation.
#[derive(Debug, Default)]
pub struct ScriptedWorkspaceClient {
    pages: Mutex<HashMap<String, ExternalPage>>,
    children: Mutex<HashMap<String, Vec<Block>>>,
    containers: Mutex<HashMap<String, Vec<ExternalPage>>>,
    next_page: AtomicUsize,
    create_calls: AtomicUsize,
    update_calls: AtomicUsize,
    fail_create: Mutex<VecDeque<SyncError>>,
    fail_update: Mutex<VecDeque<SyncError>>,
    fail_query: Mutex<VecDeque<SyncError>>,
}

impl ScriptedWorkspaceClient {
    /// An empty client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the children returned for a block id.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_children(&self, block_id: &str, blocks: Vec<Block>) {
        self.children
            .lock()
            .unwrap()
            .insert(block_id.to_owned(), blocks);
    }

    /// Scripts the pages returned by a container query.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_container(&self, container_id: &str, pages: Vec<ExternalPage>) {
        self.containers
            .lock()
            .unwrap()
            .insert(container_id.to_owned(), pages);
    }

    /// Stores a page so `fetch_page` finds it.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn set_page(&self, page: ExternalPage) {
        self.pages.lock().unwrap().insert(page.id.clone(), page);
    }

    /// Queues an error for the next `create_page` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_create(&self, err: SyncError) {
        self.fail_create.lock().unwrap().push_back(err);
    }

    /// Queues an error for the next `update_page` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_update(&self, err: SyncError) {
        self.fail_update.lock().unwrap().push_back(err);
    }

    /// Queues an error for the next `query_container` call.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next_query(&self, err: SyncError) {
        self.fail_query.lock().unwrap().push_back(err);
    }

    /// How many pages have been created.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// How many pages have been updated.
    #[must_use]
    pub fn update_calls(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    /// Snapshot of a stored page for assertions.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    #[must_use]
    pub fn page(&self, page_id: &str) -> Option<ExternalPage> {
        self.pages.lock().unwrap().get(page_id).cloned()
    }
}

#[async_trait]
impl WorkspaceClient for ScriptedWorkspaceClient {
    async fn create_page(
        &self,
        _ctx: &ApiContext,
        _container_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError> {
        if let Some(err) = self.fail_create.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_page.fetch_add(1, Ordering::SeqCst) + 1;
        let page = ExternalPage {
            id: format!("page-{n}"),
            properties,
        };
        self.pages.lock().unwrap().insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn update_page(
        &self,
        _ctx: &ApiContext,
        page_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError> {
        if let Some(err) = self.fail_update.lock().unwrap().pop_front() {
            return Err(err);
        }
        self.update_calls.fetch_add(1, Ordering::SeqCst);
        let page = ExternalPage {
            id: page_id.to_owned(),
            properties,
        };
        self.pages.lock().unwrap().insert(page.id.clone(), page.clone());
        Ok(page)
    }

    async fn fetch_page(
        &self,
        _ctx: &ApiContext,
        page_id: &str,
    ) -> Result<ExternalPage, SyncError> {
        self.pages
            .lock()
            .unwrap()
            .get(page_id)
            .cloned()
            .ok_or_else(|| SyncError::NotFoundExternal(page_id.to_owned()))
    }

    async fn query_container(
        &self,
        _ctx: &ApiContext,
        container_id: &str,
        _cursor: Option<&str>,
    ) -> Result<PageBatch, SyncError> {
        if let Some(err) = self.fail_query.lock().unwrap().pop_front() {
            return Err(err);
        }
        let pages = self
            .containers
            .lock()
            .unwrap()
            .get(container_id)
            .cloned()
            .unwrap_or_default();
        Ok(PageBatch {
            pages,
            next_cursor: None,
        })
    }

    async fn block_children(
        &self,
        _ctx: &ApiContext,
        block_id: &str,
    ) -> Result<Vec<Block>, SyncError> {
        Ok(self
            .children
            .lock()
            .unwrap()
            .get(block_id)
            .cloned()
            .unwrap_or_default())
    }
}

/// A mirror client that counts uploads and can fail on demand.
#[derive(Debug, Default)]
pub struct CountingMirrorClient {
    calls: AtomicUsize,
    fail_next: Mutex<bool>,
}

impl CountingMirrorClient {
    /// A fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// How many mirror uploads have happened.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Makes the next `mirror` call fail with a transport error.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn fail_next(&self) {
        *self.fail_next.lock().unwrap() = true;
    }
}

#[async_trait]
impl AssetMirrorClient for CountingMirrorClient {
    async fn mirror(&self, source_url: &str) -> Result<String, SyncError> {
        let mut fail = self.fail_next.lock().unwrap();
        if *fail {
            *fail = false;
            return Err(SyncError::Transport(format!(
                "mirror failed for {source_url}"
            )));
        }
        drop(fail);
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("https://cdn.loreweave.io/assets/{n}"))
    }
}
