//! External document workspace wire model and client abstractions.
//!
//! The workspace API is a bearer-token-authenticated JSON-over-HTTPS service
//! versioned by a protocol header. Only the shapes the sync engine consumes
//! are modeled: pages with typed properties, rich-text runs, and blocks.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::SyncError;
use crate::integration::Credential;

/// One atomic unit of the workspace's inline rich-text representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RichTextRun {
    /// Plain content, optionally carrying a hyperlink.
    Text {
        /// The literal text.
        content: String,
        /// Hyperlink target, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        link: Option<String>,
    },
    /// A structured reference to another workspace page.
    PageMention {
        /// The referenced page id.
        page_id: String,
        /// Plain-text fallback label as stored by the workspace.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
    /// Legacy flat-label shape emitted by old workspace clients.
    PlainLabel {
        /// The flattened text.
        plain_text: String,
    },
}

impl RichTextRun {
    /// A plain text run with no link.
    #[must_use]
    pub fn text(content: impl Into<String>) -> Self {
        Self::Text {
            content: content.into(),
            link: None,
        }
    }
}

/// A typed page property value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    /// The page title, as rich text.
    Title(Vec<RichTextRun>),
    /// A rich-text property.
    RichText(Vec<RichTextRun>),
    /// A single-select property.
    Select(Option<String>),
    /// A multi-select property.
    MultiSelect(Vec<String>),
    /// A numeric property.
    Number(Option<f64>),
    /// A checkbox property.
    Checkbox(bool),
    /// A date property.
    Date(Option<NaiveDate>),
    /// A relation to other pages, by page id.
    Relation(Vec<String>),
    /// A URL property.
    Url(Option<String>),
}

/// A page in the external workspace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPage {
    /// Opaque page id; persisted locally as the correlation id.
    pub id: String,
    /// Typed properties, keyed by property name.
    pub properties: BTreeMap<String, PropertyValue>,
}

impl ExternalPage {
    /// Looks up a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }
}

/// A content block inside a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Opaque block id.
    pub id: String,
    /// The block payload.
    pub kind: BlockKind,
    /// Whether the block has children that must be fetched separately.
    pub has_children: bool,
}

/// The subset of block payloads the image pipeline cares about. Anything
/// else arrives as `Unsupported` and is skipped.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockKind {
    /// An image block with its source URL.
    Image {
        /// Where the image bytes currently live.
        url: String,
    },
    /// A paragraph block (may still carry children).
    Paragraph,
    /// Any block type the engine does not interpret.
    #[serde(other)]
    Unsupported,
}

/// One page of container query results.
#[derive(Debug, Clone)]
pub struct PageBatch {
    /// The pages in this batch.
    pub pages: Vec<ExternalPage>,
    /// Cursor for the next batch, if more results exist.
    pub next_cursor: Option<String>,
}

/// Ambient call context for the workspace API.
///
/// Threaded explicitly into every external-call boundary instead of being
/// read from process-global state, so the engine stays testable and
/// multi-tenant-safe.
#[derive(Debug, Clone)]
pub struct ApiContext {
    /// The campaign's workspace credential.
    pub credential: Credential,
}

impl ApiContext {
    /// Builds a call context around a credential.
    #[must_use]
    pub fn new(credential: Credential) -> Self {
        Self { credential }
    }
}

/// Client for the external document workspace.
///
/// All calls are blocking, timeout-bounded I/O from the engine's point of
/// view; implementations map transport and HTTP failures onto [`SyncError`].
#[async_trait]
pub trait WorkspaceClient: Send + Sync {
    /// Creates a page in the given container and returns it.
    async fn create_page(
        &self,
        ctx: &ApiContext,
        container_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError>;

    /// Updates the properties of an existing page.
    async fn update_page(
        &self,
        ctx: &ApiContext,
        page_id: &str,
        properties: BTreeMap<String, PropertyValue>,
    ) -> Result<ExternalPage, SyncError>;

    /// Fetches a single page by id.
    async fn fetch_page(&self, ctx: &ApiContext, page_id: &str) -> Result<ExternalPage, SyncError>;

    /// Queries a container for its pages, one cursor-bounded batch at a time.
    async fn query_container(
        &self,
        ctx: &ApiContext,
        container_id: &str,
        cursor: Option<&str>,
    ) -> Result<PageBatch, SyncError>;

    /// Fetches the direct children of a block (a page id is a block id).
    async fn block_children(&self, ctx: &ApiContext, block_id: &str)
    -> Result<Vec<Block>, SyncError>;
}

/// Client that mirrors an external asset URL into application-owned storage
/// and returns the mirrored URL. Storage mechanics live behind this call.
#[async_trait]
pub trait AssetMirrorClient: Send + Sync {
    /// Mirrors `source_url` and returns the durable URL.
    async fn mirror(&self, source_url: &str) -> Result<String, SyncError>;
}
