//! The sync orchestrator.
//!
//! Owns the push and pull flows per entity, including correlation claims,
//! create-race convergence, and routing failures into the throttle. All
//! collaborators arrive as trait objects; the engine holds no connection
//! state of its own and is shared across workers behind an `Arc`.

use std::sync::Arc;

use uuid::Uuid;

use loreweave_assets::ImageImporter;
use loreweave_core::clock::Clock;
use loreweave_core::config::SyncConfig;
use loreweave_core::entity::{EntityKind, SyncableEntity};
use loreweave_core::error::SyncError;
use loreweave_core::external::{ApiContext, ExternalPage, WorkspaceClient};
use loreweave_core::integration::{CampaignIntegration, IntegrationStatus};
use loreweave_core::repository::{EntityRepository, IntegrationRepository};
use loreweave_core::scope::CampaignScope;
use loreweave_mapping::{AttributePatch, export, import};

use crate::throttle::FailureThrottle;

/// Outcome counters for one campaign sweep.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    /// Pages pulled successfully.
    pub pulled: usize,
    /// Pages that failed and were skipped.
    pub failed: usize,
}

/// Drives push and pull for syncable entities.
pub struct SyncEngine {
    entities: Arc<dyn EntityRepository>,
    integrations: Arc<dyn IntegrationRepository>,
    workspace: Arc<dyn WorkspaceClient>,
    images: Arc<ImageImporter>,
    throttle: Arc<FailureThrottle>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl SyncEngine {
    /// Wires an engine over its collaborators.
    #[must_use]
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        integrations: Arc<dyn IntegrationRepository>,
        workspace: Arc<dyn WorkspaceClient>,
        images: Arc<ImageImporter>,
        throttle: Arc<FailureThrottle>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            entities,
            integrations,
            workspace,
            images,
            throttle,
            clock,
            config,
        }
    }

    /// Pushes one entity's local state to its external page.
    ///
    /// A first push creates the page in the kind's configured container and
    /// claims the correlation; later pushes update in place. An entity whose
    /// campaign has no integration, or whose integration is disconnected, is
    /// skipped silently. Failures are routed into the failure throttle
    /// before being returned.
    ///
    /// # Errors
    ///
    /// Returns the underlying `SyncError` after recording it against the
    /// campaign.
    pub async fn push(&self, entity_id: Uuid) -> Result<(), SyncError> {
        let Some(entity) = self.entities.find(entity_id).await? else {
            tracing::warn!(%entity_id, "push requested for unknown entity, skipping");
            return Ok(());
        };
        let Some(integration) = self.integrations.find(entity.campaign_id).await? else {
            tracing::debug!(campaign_id = %entity.campaign_id, "no integration, skipping push");
            return Ok(());
        };
        if integration.status == IntegrationStatus::Disconnected {
            tracing::debug!(campaign_id = %entity.campaign_id, "integration disconnected, skipping push");
            return Ok(());
        }

        match self.push_inner(&entity, &integration).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.handle_failure(entity.campaign_id, &err).await;
                Err(err)
            }
        }
    }

    async fn push_inner(
        &self,
        entity: &SyncableEntity,
        integration: &CampaignIntegration,
    ) -> Result<(), SyncError> {
        let scope = self.load_scope(entity.campaign_id).await?;
        let properties = export(entity, &scope, self.config.deployment);
        let ctx = ApiContext::new(integration.credential.clone());
        let now = self.clock.now();

        if let Some(page_id) = &entity.correlation_id {
            self.workspace.update_page(&ctx, page_id, properties).await?;
            self.entities.touch_synced_at(entity.id, now).await?;
            return Ok(());
        }

        let container_id = integration.containers.get(&entity.kind).ok_or_else(|| {
            SyncError::ValidationFailed(format!(
                "no container configured for kind {}",
                entity.kind.as_str()
            ))
        })?;
        let page = self
            .workspace
            .create_page(&ctx, container_id, properties.clone())
            .await?;

        match self.entities.set_correlation(entity.id, &page.id, now).await {
            Ok(()) => Ok(()),
            Err(SyncError::CorrelationConflict { .. }) => {
                // A concurrent push claimed the correlation first. Converge
                // on the winning page; ours stays orphaned in the workspace.
                let winner = self
                    .entities
                    .find(entity.id)
                    .await?
                    .and_then(|e| e.correlation_id)
                    .ok_or_else(|| {
                        SyncError::Storage(format!(
                            "entity {} has no correlation after a claimed conflict",
                            entity.id
                        ))
                    })?;
                tracing::warn!(
                    entity_id = %entity.id,
                    orphan_page = %page.id,
                    winning_page = %winner,
                    "lost create race, converging on winning page"
                );
                self.workspace.update_page(&ctx, &winner, properties).await?;
                self.entities.touch_synced_at(entity.id, now).await?;
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    /// Fetches one external page and pulls it into the campaign.
    ///
    /// Skipped silently when the campaign has no integration or the
    /// integration is disconnected. Failures are routed into the failure
    /// throttle before being returned.
    ///
    /// # Errors
    ///
    /// Returns the underlying `SyncError` after recording it against the
    /// campaign.
    pub async fn pull_page(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        page_id: &str,
    ) -> Result<(), SyncError> {
        let Some(integration) = self.integrations.find(campaign_id).await? else {
            tracing::debug!(%campaign_id, "no integration, skipping pull");
            return Ok(());
        };
        if integration.status == IntegrationStatus::Disconnected {
            tracing::debug!(%campaign_id, "integration disconnected, skipping pull");
            return Ok(());
        }

        let ctx = ApiContext::new(integration.credential.clone());
        let result = match self.workspace.fetch_page(&ctx, page_id).await {
            Ok(page) => self.pull_inner(&ctx, campaign_id, kind, &page).await,
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            self.handle_failure(campaign_id, err).await;
        }
        result
    }

    /// Pulls every page from every configured container of a campaign.
    ///
    /// Page failures are isolated: each is counted, recorded against the
    /// campaign, and skipped. A failing container query is counted and
    /// recorded the same way, and the sweep continues with the next
    /// container.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` when the integration cannot be loaded.
    pub async fn sweep_campaign(&self, campaign_id: Uuid) -> Result<SweepReport, SyncError> {
        let Some(integration) = self.integrations.find(campaign_id).await? else {
            return Ok(SweepReport::default());
        };
        if integration.status == IntegrationStatus::Disconnected {
            return Ok(SweepReport::default());
        }

        let ctx = ApiContext::new(integration.credential.clone());
        let mut report = SweepReport::default();
        for (&kind, container_id) in &integration.containers {
            let mut cursor: Option<String> = None;
            loop {
                let batch = match self
                    .workspace
                    .query_container(&ctx, container_id, cursor.as_deref())
                    .await
                {
                    Ok(batch) => batch,
                    Err(err) => {
                        report.failed += 1;
                        tracing::warn!(
                            %campaign_id,
                            %container_id,
                            error = %err,
                            "container query failed, continuing with next container"
                        );
                        self.handle_failure(campaign_id, &err).await;
                        break;
                    }
                };
                for page in &batch.pages {
                    match self.pull_inner(&ctx, campaign_id, kind, page).await {
                        Ok(()) => report.pulled += 1,
                        Err(err) => {
                            report.failed += 1;
                            tracing::warn!(
                                %campaign_id,
                                page_id = %page.id,
                                error = %err,
                                "page pull failed, continuing sweep"
                            );
                            self.handle_failure(campaign_id, &err).await;
                        }
                    }
                }
                match batch.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
            }
        }
        tracing::info!(%campaign_id, pulled = report.pulled, failed = report.failed, "campaign sweep finished");
        Ok(report)
    }

    /// Links an external page to a same-name local entity that has never
    /// been synced.
    ///
    /// The name lookup is case-insensitive. Returns the entity with the
    /// correlation claimed, or `None` when no uncorrelated same-name entity
    /// exists or a concurrent claim won the race.
    ///
    /// # Errors
    ///
    /// Returns `SyncError` when the lookup or the claim fails for any reason
    /// other than losing the claim race.
    pub async fn reconcile_by_name(
        &self,
        campaign_id: Uuid,
        kind: EntityKind,
        name: &str,
        page_id: &str,
    ) -> Result<Option<SyncableEntity>, SyncError> {
        let Some(found) = self.entities.find_by_name(campaign_id, kind, name).await? else {
            return Ok(None);
        };
        if found.correlation_id.is_some() {
            return Ok(None);
        }
        match self
            .entities
            .set_correlation(found.id, page_id, self.clock.now())
            .await
        {
            Ok(()) => {
                let entity = self.entities.find(found.id).await?.ok_or_else(|| {
                    SyncError::Storage(format!("entity {} vanished during adoption", found.id))
                })?;
                Ok(Some(entity))
            }
            Err(SyncError::CorrelationConflict { .. }) => {
                tracing::debug!(
                    entity_id = %found.id,
                    page_id,
                    "adoption lost a correlation race"
                );
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    async fn pull_inner(
        &self,
        ctx: &ApiContext,
        campaign_id: Uuid,
        kind: EntityKind,
        page: &ExternalPage,
    ) -> Result<(), SyncError> {
        let scope = self.load_scope(campaign_id).await?;
        let existing = self
            .entities
            .find_by_correlation(campaign_id, kind, &page.id)
            .await?;
        let patch = import(page, kind, existing.as_ref(), &scope);
        let now = self.clock.now();

        if let Some(mut entity) = existing {
            apply_patch(&mut entity, patch);
            self.entities.update(&entity).await?;
            self.entities.touch_synced_at(entity.id, now).await?;
            self.import_page_images(ctx, &page.id).await;
            return Ok(());
        }

        // Never-synced pages first try to adopt a same-name local entity,
        // so bulk authoring followed by a first sweep links up instead of
        // duplicating. An adoption that loses the correlation race falls
        // through to creating a fresh entity.
        if let Some(mut adopted) = self
            .reconcile_by_name(campaign_id, kind, &patch.name, &page.id)
            .await?
        {
            apply_patch(&mut adopted, patch);
            self.entities.update(&adopted).await?;
            self.import_page_images(ctx, &page.id).await;
            return Ok(());
        }

        let entity = SyncableEntity {
            id: Uuid::new_v4(),
            campaign_id,
            kind,
            name: patch.name.clone(),
            content: patch.content.clone(),
            correlation_id: Some(page.id.clone()),
            last_synced_at: Some(now),
            fields: patch.fields.clone(),
        };
        match self.entities.insert(&entity).await {
            Ok(()) => {}
            Err(SyncError::CorrelationConflict { .. }) => {
                // Another worker inserted for this page first. Apply the
                // patch onto the winner instead.
                let Some(mut winner) = self
                    .entities
                    .find_by_correlation(campaign_id, kind, &page.id)
                    .await?
                else {
                    return Err(SyncError::Storage(format!(
                        "no entity holds correlation {} after a claimed conflict",
                        page.id
                    )));
                };
                apply_patch(&mut winner, patch);
                self.entities.update(&winner).await?;
                self.entities.touch_synced_at(winner.id, now).await?;
            }
            Err(err) => return Err(err),
        }
        self.import_page_images(ctx, &page.id).await;
        Ok(())
    }

    /// Best-effort image import; a failure never fails the pull.
    async fn import_page_images(&self, ctx: &ApiContext, page_id: &str) {
        let blocks = match self.workspace.block_children(ctx, page_id).await {
            Ok(blocks) => blocks,
            Err(err) => {
                tracing::warn!(page_id, error = %err, "block fetch failed, skipping image import");
                return;
            }
        };
        if let Err(err) = self.images.import_images(ctx, page_id, blocks).await {
            tracing::warn!(page_id, error = %err, "image import failed");
        }
    }

    /// Routes a failure: an expired credential disconnects the integration,
    /// everything else goes through the throttle. Bookkeeping failures are
    /// logged and swallowed so the original error stays primary.
    async fn handle_failure(&self, campaign_id: Uuid, err: &SyncError) {
        if matches!(err, SyncError::AuthExpired) {
            tracing::warn!(%campaign_id, "credential rejected, disconnecting integration");
            if let Err(status_err) = self
                .integrations
                .set_status(campaign_id, IntegrationStatus::Disconnected)
                .await
            {
                tracing::error!(%campaign_id, error = %status_err, "failed to disconnect integration");
            }
            return;
        }
        if let Err(throttle_err) = self.throttle.record(campaign_id, err).await {
            tracing::error!(%campaign_id, error = %throttle_err, "failed to record sync failure");
        }
    }

    async fn load_scope(&self, campaign_id: Uuid) -> Result<CampaignScope, SyncError> {
        let targets = self.entities.mention_targets(campaign_id).await?;
        Ok(CampaignScope::new(
            campaign_id,
            self.config.app_base_url.clone(),
            targets,
        ))
    }
}

/// Assigns the merged attribute state onto the entity. Correlation state and
/// timestamps stay with the orchestrator.
fn apply_patch(entity: &mut SyncableEntity, patch: AttributePatch) {
    entity.name = patch.name;
    entity.content = patch.content;
    entity.fields = patch.fields;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::atomic::{AtomicBool, Ordering};

    use loreweave_core::config::Deployment;
    use loreweave_core::entity::EntityFields;
    use loreweave_core::external::{Block, BlockKind, PropertyValue, RichTextRun};
    use loreweave_core::integration::Credential;
    use loreweave_core::scope::MentionTarget;
    use loreweave_test_support::{
        CountingMirrorClient, FixedClock, InMemoryAssetMappingRepository, InMemoryEntityRepository,
        InMemoryIntegrationRepository, RecordingDispatcher, ScriptedWorkspaceClient,
    };

    const BASE: &str = "https://app.loreweave.io";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    struct Harness {
        campaign_id: Uuid,
        entities: Arc<InMemoryEntityRepository>,
        integrations: Arc<InMemoryIntegrationRepository>,
        workspace: Arc<ScriptedWorkspaceClient>,
        mirror: Arc<CountingMirrorClient>,
        notifier: Arc<RecordingDispatcher>,
        engine: SyncEngine,
    }

    fn build_engine(
        entities: Arc<dyn EntityRepository>,
        integrations: Arc<InMemoryIntegrationRepository>,
        workspace: Arc<ScriptedWorkspaceClient>,
        mirror: Arc<CountingMirrorClient>,
        notifier: Arc<RecordingDispatcher>,
    ) -> SyncEngine {
        let clock: Arc<dyn Clock> = Arc::new(FixedClock(fixed_now()));
        let config = SyncConfig::for_deployment(Deployment::Development, BASE);
        let images = Arc::new(ImageImporter::new(
            workspace.clone(),
            mirror.clone(),
            Arc::new(InMemoryAssetMappingRepository::new()),
            clock.clone(),
        ));
        let throttle = Arc::new(FailureThrottle::new(
            integrations.clone(),
            notifier,
            clock.clone(),
            &config,
        ));
        SyncEngine::new(
            entities,
            integrations,
            workspace,
            images,
            throttle,
            clock,
            config,
        )
    }

    fn harness() -> Harness {
        let campaign_id = Uuid::new_v4();
        let entities = Arc::new(InMemoryEntityRepository::new());
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        integrations.seed(CampaignIntegration::connected(
            campaign_id,
            Credential::new("token"),
            BTreeMap::from([(EntityKind::Character, "container-ch".to_owned())]),
        ));
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        let mirror = Arc::new(CountingMirrorClient::new());
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = build_engine(
            entities.clone(),
            integrations.clone(),
            workspace.clone(),
            mirror.clone(),
            notifier.clone(),
        );
        Harness {
            campaign_id,
            entities,
            integrations,
            workspace,
            mirror,
            notifier,
            engine,
        }
    }

    fn character(campaign_id: Uuid, name: &str) -> SyncableEntity {
        SyncableEntity {
            id: Uuid::new_v4(),
            campaign_id,
            kind: EntityKind::Character,
            name: name.to_owned(),
            content: None,
            correlation_id: None,
            last_synced_at: None,
            fields: EntityFields::empty(EntityKind::Character),
        }
    }

    fn titled_page(id: &str, name: &str) -> ExternalPage {
        ExternalPage {
            id: id.to_owned(),
            properties: BTreeMap::from([(
                "Name".to_owned(),
                PropertyValue::Title(vec![RichTextRun::text(name)]),
            )]),
        }
    }

    #[tokio::test]
    async fn test_first_push_creates_page_and_claims_correlation() {
        // Arrange
        let h = harness();
        let entity = character(h.campaign_id, "Mira");
        let id = entity.id;
        h.entities.seed(entity);

        // Act
        h.engine.push(id).await.unwrap();

        // Assert
        assert_eq!(h.workspace.create_calls(), 1);
        let stored = h.entities.get(id).unwrap();
        assert_eq!(stored.correlation_id.as_deref(), Some("page-1"));
        assert_eq!(stored.last_synced_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_pushing_twice_creates_exactly_one_page() {
        let h = harness();
        let entity = character(h.campaign_id, "Mira");
        let id = entity.id;
        h.entities.seed(entity);

        h.engine.push(id).await.unwrap();
        h.engine.push(id).await.unwrap();

        assert_eq!(h.workspace.create_calls(), 1);
        assert_eq!(h.workspace.update_calls(), 1);
    }

    #[tokio::test]
    async fn test_correlated_push_updates_in_place() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Mira");
        entity.correlation_id = Some("page-7".to_owned());
        let id = entity.id;
        h.entities.seed(entity);

        h.engine.push(id).await.unwrap();

        assert_eq!(h.workspace.create_calls(), 0);
        assert_eq!(h.workspace.update_calls(), 1);
        assert_eq!(h.entities.get(id).unwrap().last_synced_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_push_skips_disconnected_integration() {
        let h = harness();
        let entity = character(h.campaign_id, "Mira");
        let id = entity.id;
        h.entities.seed(entity);
        h.integrations
            .set_status(h.campaign_id, IntegrationStatus::Disconnected)
            .await
            .unwrap();

        h.engine.push(id).await.unwrap();

        assert_eq!(h.workspace.create_calls(), 0);
        assert!(h.entities.get(id).unwrap().correlation_id.is_none());
    }

    #[tokio::test]
    async fn test_push_without_integration_is_a_noop() {
        let h = harness();
        let entity = character(Uuid::new_v4(), "Mira");
        let id = entity.id;
        h.entities.seed(entity);

        h.engine.push(id).await.unwrap();

        assert_eq!(h.workspace.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_push_failure_notifies_and_flags_integration() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Mira");
        entity.correlation_id = Some("page-7".to_owned());
        let id = entity.id;
        h.entities.seed(entity);
        h.workspace
            .fail_next_update(SyncError::Storage("boom".into()));

        let result = h.engine.push(id).await;

        assert!(matches!(result, Err(SyncError::Storage(_))));
        assert_eq!(h.notifier.notifications().len(), 1);
        assert_eq!(
            h.integrations.get(h.campaign_id).unwrap().status,
            IntegrationStatus::NeedsAttention
        );
    }

    #[tokio::test]
    async fn test_auth_expired_disconnects_without_notifying() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Mira");
        entity.correlation_id = Some("page-7".to_owned());
        let id = entity.id;
        h.entities.seed(entity);
        h.workspace.fail_next_update(SyncError::AuthExpired);

        let result = h.engine.push(id).await;

        assert!(matches!(result, Err(SyncError::AuthExpired)));
        assert!(h.notifier.notifications().is_empty());
        assert_eq!(
            h.integrations.get(h.campaign_id).unwrap().status,
            IntegrationStatus::Disconnected
        );
    }

    #[tokio::test]
    async fn test_rate_limited_failure_does_not_count() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Mira");
        entity.correlation_id = Some("page-7".to_owned());
        let id = entity.id;
        h.entities.seed(entity);
        h.workspace
            .fail_next_update(SyncError::RateLimited { retry_after: None });

        let result = h.engine.push(id).await;

        assert!(matches!(result, Err(SyncError::RateLimited { .. })));
        assert!(h.notifier.notifications().is_empty());
        let integration = h.integrations.get(h.campaign_id).unwrap();
        assert_eq!(integration.status, IntegrationStatus::Working);
        assert_eq!(integration.failure_count, 0);
    }

    /// Delegating repository that claims a different correlation right
    /// before the engine's own claim, simulating a concurrent push winning
    /// the create race.
    struct RacingRepo {
        inner: Arc<InMemoryEntityRepository>,
        raced: AtomicBool,
    }

    #[async_trait]
    impl EntityRepository for RacingRepo {
        async fn find(&self, id: Uuid) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner.find(id).await
        }

        async fn find_by_correlation(
            &self,
            campaign_id: Uuid,
            kind: EntityKind,
            correlation_id: &str,
        ) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner
                .find_by_correlation(campaign_id, kind, correlation_id)
                .await
        }

        async fn find_by_name(
            &self,
            campaign_id: Uuid,
            kind: EntityKind,
            name: &str,
        ) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner.find_by_name(campaign_id, kind, name).await
        }

        async fn mention_targets(
            &self,
            campaign_id: Uuid,
        ) -> Result<Vec<MentionTarget>, SyncError> {
            self.inner.mention_targets(campaign_id).await
        }

        async fn insert(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
            self.inner.insert(entity).await
        }

        async fn update(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
            self.inner.update(entity).await
        }

        async fn set_correlation(
            &self,
            id: Uuid,
            correlation_id: &str,
            synced_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            if !self.raced.swap(true, Ordering::SeqCst) {
                self.inner
                    .set_correlation(id, "page-winner", synced_at)
                    .await?;
            }
            self.inner.set_correlation(id, correlation_id, synced_at).await
        }

        async fn touch_synced_at(
            &self,
            id: Uuid,
            synced_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            self.inner.touch_synced_at(id, synced_at).await
        }
    }

    #[tokio::test]
    async fn test_create_race_loser_converges_on_winning_page() {
        // Arrange
        let campaign_id = Uuid::new_v4();
        let inner = Arc::new(InMemoryEntityRepository::new());
        let entity = character(campaign_id, "Mira");
        let id = entity.id;
        inner.seed(entity);
        let racing = Arc::new(RacingRepo {
            inner: inner.clone(),
            raced: AtomicBool::new(false),
        });
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        integrations.seed(CampaignIntegration::connected(
            campaign_id,
            Credential::new("token"),
            BTreeMap::from([(EntityKind::Character, "container-ch".to_owned())]),
        ));
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        let engine = build_engine(
            racing,
            integrations,
            workspace.clone(),
            Arc::new(CountingMirrorClient::new()),
            Arc::new(RecordingDispatcher::new()),
        );

        // Act
        engine.push(id).await.unwrap();

        // Assert: the page we created is orphaned; state converged on the
        // winner's page via an update.
        assert_eq!(workspace.create_calls(), 1);
        assert_eq!(workspace.update_calls(), 1);
        assert!(workspace.page("page-winner").is_some());
        assert_eq!(
            inner.get(id).unwrap().correlation_id.as_deref(),
            Some("page-winner")
        );
    }

    #[tokio::test]
    async fn test_pull_updates_existing_correlated_entity() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Old Name");
        entity.correlation_id = Some("page-7".to_owned());
        let id = entity.id;
        h.entities.seed(entity);
        h.workspace.set_page(titled_page("page-7", "Mira Renamed"));

        h.engine
            .pull_page(h.campaign_id, EntityKind::Character, "page-7")
            .await
            .unwrap();

        let stored = h.entities.get(id).unwrap();
        assert_eq!(stored.name, "Mira Renamed");
        assert_eq!(stored.last_synced_at, Some(fixed_now()));
        assert_eq!(h.entities.len(), 1);
    }

    #[tokio::test]
    async fn test_pull_adopts_same_name_uncorrelated_entity() {
        let h = harness();
        let entity = character(h.campaign_id, "Mira");
        let id = entity.id;
        h.entities.seed(entity);
        // Case-insensitive adoption.
        h.workspace.set_page(titled_page("page-7", "mira"));

        h.engine
            .pull_page(h.campaign_id, EntityKind::Character, "page-7")
            .await
            .unwrap();

        assert_eq!(h.entities.len(), 1);
        let stored = h.entities.get(id).unwrap();
        assert_eq!(stored.correlation_id.as_deref(), Some("page-7"));
    }

    #[tokio::test]
    async fn test_reconcile_by_name_claims_correlation_for_match() {
        let h = harness();
        let entity = character(h.campaign_id, "Mira");
        let id = entity.id;
        h.entities.seed(entity);

        let adopted = h
            .engine
            .reconcile_by_name(h.campaign_id, EntityKind::Character, "mira", "page-7")
            .await
            .unwrap();

        assert_eq!(adopted.unwrap().id, id);
        let stored = h.entities.get(id).unwrap();
        assert_eq!(stored.correlation_id.as_deref(), Some("page-7"));
        assert_eq!(stored.last_synced_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_reconcile_by_name_skips_already_correlated_entity() {
        let h = harness();
        let mut entity = character(h.campaign_id, "Mira");
        entity.correlation_id = Some("page-1".to_owned());
        let id = entity.id;
        h.entities.seed(entity);

        let adopted = h
            .engine
            .reconcile_by_name(h.campaign_id, EntityKind::Character, "Mira", "page-7")
            .await
            .unwrap();

        assert!(adopted.is_none());
        assert_eq!(h.entities.get(id).unwrap().correlation_id.as_deref(), Some("page-1"));
    }

    #[tokio::test]
    async fn test_pull_creates_entity_for_unknown_page() {
        let h = harness();
        h.workspace.set_page(titled_page("page-7", "Brand New"));

        h.engine
            .pull_page(h.campaign_id, EntityKind::Character, "page-7")
            .await
            .unwrap();

        assert_eq!(h.entities.len(), 1);
        let stored = h
            .entities
            .find_by_correlation(h.campaign_id, EntityKind::Character, "page-7")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.name, "Brand New");
        assert_eq!(stored.last_synced_at, Some(fixed_now()));
    }

    #[tokio::test]
    async fn test_pull_mirrors_page_images() {
        let h = harness();
        h.workspace.set_page(titled_page("page-7", "Mira"));
        h.workspace.set_children(
            "page-7",
            vec![Block {
                id: "block-1".to_owned(),
                kind: BlockKind::Image {
                    url: "https://files.example/map.png".to_owned(),
                },
                has_children: false,
            }],
        );

        h.engine
            .pull_page(h.campaign_id, EntityKind::Character, "page-7")
            .await
            .unwrap();

        assert_eq!(h.mirror.calls(), 1);
    }

    #[tokio::test]
    async fn test_pull_of_missing_page_fails_and_records() {
        let h = harness();

        let result = h
            .engine
            .pull_page(h.campaign_id, EntityKind::Character, "page-gone")
            .await;

        assert!(matches!(result, Err(SyncError::NotFoundExternal(_))));
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_pulls_every_container_page() {
        let h = harness();
        h.workspace.set_container(
            "container-ch",
            vec![titled_page("page-1", "Mira"), titled_page("page-2", "Bren")],
        );

        let report = h.engine.sweep_campaign(h.campaign_id).await.unwrap();

        assert_eq!(report, SweepReport { pulled: 2, failed: 0 });
        assert_eq!(h.entities.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_continues_past_failing_container() {
        // Arrange: two containers; the character query fails, the location
        // query succeeds.
        let h = harness();
        h.integrations.seed(CampaignIntegration::connected(
            h.campaign_id,
            Credential::new("token"),
            BTreeMap::from([
                (EntityKind::Character, "container-ch".to_owned()),
                (EntityKind::Location, "container-lo".to_owned()),
            ]),
        ));
        h.workspace
            .set_container("container-lo", vec![titled_page("page-1", "Kir Harbor")]);
        h.workspace
            .fail_next_query(SyncError::Transport("container query refused".to_owned()));

        // Act
        let report = h.engine.sweep_campaign(h.campaign_id).await.unwrap();

        // Assert: the failure is counted and recorded, the other container
        // is still swept.
        assert_eq!(report, SweepReport { pulled: 1, failed: 1 });
        assert_eq!(h.entities.len(), 1);
        assert_eq!(h.notifier.notifications().len(), 1);
    }

    /// Delegating repository whose first insert fails with a storage error.
    struct FlakyInsertRepo {
        inner: Arc<InMemoryEntityRepository>,
        failed: AtomicBool,
    }

    #[async_trait]
    impl EntityRepository for FlakyInsertRepo {
        async fn find(&self, id: Uuid) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner.find(id).await
        }

        async fn find_by_correlation(
            &self,
            campaign_id: Uuid,
            kind: EntityKind,
            correlation_id: &str,
        ) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner
                .find_by_correlation(campaign_id, kind, correlation_id)
                .await
        }

        async fn find_by_name(
            &self,
            campaign_id: Uuid,
            kind: EntityKind,
            name: &str,
        ) -> Result<Option<SyncableEntity>, SyncError> {
            self.inner.find_by_name(campaign_id, kind, name).await
        }

        async fn mention_targets(
            &self,
            campaign_id: Uuid,
        ) -> Result<Vec<MentionTarget>, SyncError> {
            self.inner.mention_targets(campaign_id).await
        }

        async fn insert(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
            if !self.failed.swap(true, Ordering::SeqCst) {
                return Err(SyncError::Storage("insert failed".into()));
            }
            self.inner.insert(entity).await
        }

        async fn update(&self, entity: &SyncableEntity) -> Result<(), SyncError> {
            self.inner.update(entity).await
        }

        async fn set_correlation(
            &self,
            id: Uuid,
            correlation_id: &str,
            synced_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            self.inner.set_correlation(id, correlation_id, synced_at).await
        }

        async fn touch_synced_at(
            &self,
            id: Uuid,
            synced_at: DateTime<Utc>,
        ) -> Result<(), SyncError> {
            self.inner.touch_synced_at(id, synced_at).await
        }
    }

    #[tokio::test]
    async fn test_sweep_isolates_single_page_failures() {
        // Arrange: the first insert fails, the second page still lands.
        let campaign_id = Uuid::new_v4();
        let inner = Arc::new(InMemoryEntityRepository::new());
        let flaky = Arc::new(FlakyInsertRepo {
            inner: inner.clone(),
            failed: AtomicBool::new(false),
        });
        let integrations = Arc::new(InMemoryIntegrationRepository::new());
        integrations.seed(CampaignIntegration::connected(
            campaign_id,
            Credential::new("token"),
            BTreeMap::from([(EntityKind::Character, "container-ch".to_owned())]),
        ));
        let workspace = Arc::new(ScriptedWorkspaceClient::new());
        workspace.set_container(
            "container-ch",
            vec![titled_page("page-1", "Mira"), titled_page("page-2", "Bren")],
        );
        let notifier = Arc::new(RecordingDispatcher::new());
        let engine = build_engine(
            flaky,
            integrations,
            workspace,
            Arc::new(CountingMirrorClient::new()),
            notifier.clone(),
        );

        // Act
        let report = engine.sweep_campaign(campaign_id).await.unwrap();

        // Assert
        assert_eq!(report, SweepReport { pulled: 1, failed: 1 });
        assert_eq!(inner.len(), 1);
        assert_eq!(notifier.notifications().len(), 1);
    }

    #[tokio::test]
    async fn test_sweep_skips_disconnected_campaign() {
        let h = harness();
        h.workspace
            .set_container("container-ch", vec![titled_page("page-1", "Mira")]);
        h.integrations
            .set_status(h.campaign_id, IntegrationStatus::Disconnected)
            .await
            .unwrap();

        let report = h.engine.sweep_campaign(h.campaign_id).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(h.entities.is_empty());
    }
}
