//! Loreweave Assets — recursive import of images embedded in external pages.
//!
//! Walks a page's block tree (given roots plus recursively fetched
//! children), mirrors every image block into application-owned storage, and
//! records an [`ImportedAssetMapping`] per block so re-imports are
//! idempotent. Traversal is bounded and single-block failures never abort
//! the batch.

use std::collections::BTreeMap;
use std::sync::Arc;

use loreweave_core::clock::Clock;
use loreweave_core::error::SyncError;
use loreweave_core::external::{ApiContext, AssetMirrorClient, Block, BlockKind, WorkspaceClient};
use loreweave_core::repository::{AssetMappingRepository, ImportedAssetMapping};

/// Maximum child-fetch depth tolerated in an external block tree.
pub const MAX_DEPTH: usize = 8;

/// Maximum number of blocks visited per page import.
pub const MAX_BLOCKS: usize = 2048;

/// Imports the images embedded in one external page.
pub struct ImageImporter {
    workspace: Arc<dyn WorkspaceClient>,
    mirror: Arc<dyn AssetMirrorClient>,
    mappings: Arc<dyn AssetMappingRepository>,
    clock: Arc<dyn Clock>,
}

impl ImageImporter {
    /// Wires an importer over its collaborators.
    #[must_use]
    pub fn new(
        workspace: Arc<dyn WorkspaceClient>,
        mirror: Arc<dyn AssetMirrorClient>,
        mappings: Arc<dyn AssetMappingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            workspace,
            mirror,
            mappings,
            clock,
        }
    }

    /// Traverses `root_blocks` (and recursively fetched children) and
    /// returns the mapping of external block id to mirrored URL for every
    /// image encountered, whether mirrored now or on an earlier import.
    ///
    /// Unknown block types are skipped. A failing mirror or child fetch is
    /// logged and skipped so the rest of the batch proceeds. Traversal stops
    /// at [`MAX_DEPTH`] / [`MAX_BLOCKS`] to tolerate anomalous trees.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::Storage` only when reading or writing asset
    /// mappings fails; external failures are isolated per block.
    pub async fn import_images(
        &self,
        ctx: &ApiContext,
        page_id: &str,
        root_blocks: Vec<Block>,
    ) -> Result<BTreeMap<String, String>, SyncError> {
        let mut imported = BTreeMap::new();
        let mut stack: Vec<(Block, usize)> =
            root_blocks.into_iter().rev().map(|b| (b, 0)).collect();
        let mut visited = 0usize;

        while let Some((block, depth)) = stack.pop() {
            visited += 1;
            if visited > MAX_BLOCKS {
                tracing::warn!(page_id, "block budget exhausted, truncating image import");
                break;
            }

            if let BlockKind::Image { url } = &block.kind {
                match self.import_one(page_id, &block.id, url).await {
                    Ok(mirrored_url) => {
                        imported.insert(block.id.clone(), mirrored_url);
                    }
                    Err(err) => {
                        tracing::warn!(page_id, block_id = %block.id, error = %err, "image mirror failed, skipping block");
                    }
                }
            }

            if block.has_children {
                if depth + 1 > MAX_DEPTH {
                    tracing::warn!(page_id, block_id = %block.id, "max block depth reached, skipping children");
                    continue;
                }
                match self.workspace.block_children(ctx, &block.id).await {
                    Ok(children) => {
                        for child in children.into_iter().rev() {
                            stack.push((child, depth + 1));
                        }
                    }
                    Err(err) => {
                        tracing::warn!(page_id, block_id = %block.id, error = %err, "child fetch failed, skipping subtree");
                    }
                }
            }
        }

        Ok(imported)
    }

    /// Mirrors one image unless a mapping already exists for the block.
    async fn import_one(
        &self,
        page_id: &str,
        block_id: &str,
        source_url: &str,
    ) -> Result<String, SyncError> {
        if let Some(existing) = self.mappings.find(page_id, block_id).await? {
            return Ok(existing.mirrored_url);
        }

        let mirrored_url = self.mirror.mirror(source_url).await?;
        self.mappings
            .insert(&ImportedAssetMapping {
                page_id: page_id.to_owned(),
                block_id: block_id.to_owned(),
                mirrored_url: mirrored_url.clone(),
                created_at: self.clock.now(),
            })
            .await?;
        Ok(mirrored_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use loreweave_core::integration::Credential;
    use loreweave_test_support::{
        CountingMirrorClient, FixedClock, InMemoryAssetMappingRepository, ScriptedWorkspaceClient,
    };

    fn ctx() -> ApiContext {
        ApiContext::new(Credential::new("token"))
    }

    fn image(id: &str, url: &str) -> Block {
        Block {
            id: id.into(),
            kind: BlockKind::Image { url: url.into() },
            has_children: false,
        }
    }

    fn container(id: &str) -> Block {
        Block {
            id: id.into(),
            kind: BlockKind::Paragraph,
            has_children: true,
        }
    }

    fn importer(
        workspace: Arc<ScriptedWorkspaceClient>,
        mirror: Arc<CountingMirrorClient>,
        mappings: Arc<InMemoryAssetMappingRepository>,
    ) -> ImageImporter {
        let clock = Arc::new(FixedClock(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        ImageImporter::new(workspace, mirror, mappings, clock)
    }

    #[tokio::test]
    async fn test_image_in_fetched_child_block_is_mirrored_once() {
        // Arrange: the image lives only inside a fetched child block.
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        workspace.set_children("outer", vec![image("img-1", "https://ext.example/pic.png")]);
        let mirror = Arc::new(CountingMirrorClient::new());
        let mappings = Arc::new(InMemoryAssetMappingRepository::new());
        let importer = importer(workspace, mirror.clone(), mappings.clone());

        // Act
        let imported = importer
            .import_images(&ctx(), "page-1", vec![container("outer")])
            .await
            .unwrap();

        // Assert: exactly one mapping, one upload.
        assert_eq!(imported.len(), 1);
        assert!(imported.contains_key("img-1"));
        assert_eq!(mirror.calls(), 1);
        assert!(mappings.find("page-1", "img-1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reimporting_same_page_uploads_nothing() {
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        let mirror = Arc::new(CountingMirrorClient::new());
        let mappings = Arc::new(InMemoryAssetMappingRepository::new());
        let importer = importer(workspace, mirror.clone(), mappings);
        let blocks = || vec![image("img-1", "https://ext.example/pic.png")];

        let first = importer
            .import_images(&ctx(), "page-1", blocks())
            .await
            .unwrap();
        let second = importer
            .import_images(&ctx(), "page-1", blocks())
            .await
            .unwrap();

        // The mapping short-circuits the second upload but still reports it.
        assert_eq!(first, second);
        assert_eq!(mirror.calls(), 1);
    }

    #[tokio::test]
    async fn test_unsupported_blocks_are_skipped() {
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        let mirror = Arc::new(CountingMirrorClient::new());
        let mappings = Arc::new(InMemoryAssetMappingRepository::new());
        let importer = importer(workspace, mirror.clone(), mappings);
        let blocks = vec![
            Block {
                id: "b-1".into(),
                kind: BlockKind::Unsupported,
                has_children: false,
            },
            image("img-1", "https://ext.example/pic.png"),
        ];

        let imported = importer
            .import_images(&ctx(), "page-1", blocks)
            .await
            .unwrap();

        assert_eq!(imported.len(), 1);
        assert_eq!(mirror.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_mirror_isolates_single_block() {
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        let mirror = Arc::new(CountingMirrorClient::new());
        mirror.fail_next();
        let mappings = Arc::new(InMemoryAssetMappingRepository::new());
        let importer = importer(workspace, mirror.clone(), mappings);
        let blocks = vec![
            image("img-bad", "https://ext.example/bad.png"),
            image("img-good", "https://ext.example/good.png"),
        ];

        let imported = importer
            .import_images(&ctx(), "page-1", blocks)
            .await
            .unwrap();

        // The failed block is skipped; the rest of the batch proceeds.
        assert_eq!(imported.len(), 1);
        assert!(imported.contains_key("img-good"));
    }

    #[tokio::test]
    async fn test_depth_bound_stops_anomalous_trees() {
        // A container that always reports itself as its own child.
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        workspace.set_children("loop", vec![container("loop")]);
        let mirror = Arc::new(CountingMirrorClient::new());
        let mappings = Arc::new(InMemoryAssetMappingRepository::new());
        let importer = importer(workspace, mirror, mappings);

        // Must terminate.
        let imported = importer
            .import_images(&ctx(), "page-1", vec![container("loop")])
            .await
            .unwrap();

        assert!(imported.is_empty());
    }
}
