//! Campaign-scoped mention resolution.
//!
//! A [`CampaignScope`] is a pure, pre-loaded index of one campaign's
//! mentionable entities. The converter and mapping layer resolve against it
//! without touching storage; the orchestrator builds it from the entity
//! repository before each push or pull.

use std::collections::HashMap;

use uuid::Uuid;

use crate::entity::EntityKind;

/// One mentionable entity, as seen by the converter.
#[derive(Debug, Clone)]
pub struct MentionTarget {
    /// The target's kind.
    pub kind: EntityKind,
    /// The target's local id.
    pub id: Uuid,
    /// The target's current display name.
    pub name: String,
    /// The target's external page id, if it has been pushed.
    pub correlation_id: Option<String>,
}

/// Resolution index for one campaign.
///
/// Targets from other campaigns are simply never loaded into a scope, so a
/// cross-campaign reference resolves as unresolved.
#[derive(Debug, Clone)]
pub struct CampaignScope {
    campaign_id: Uuid,
    app_base_url: String,
    targets: Vec<MentionTarget>,
    by_target: HashMap<(EntityKind, Uuid), usize>,
    by_correlation: HashMap<String, usize>,
}

impl CampaignScope {
    /// Builds a scope from pre-loaded targets.
    #[must_use]
    pub fn new(campaign_id: Uuid, app_base_url: impl Into<String>, targets: Vec<MentionTarget>) -> Self {
        let mut by_target = HashMap::with_capacity(targets.len());
        let mut by_correlation = HashMap::new();
        for (index, target) in targets.iter().enumerate() {
            by_target.insert((target.kind, target.id), index);
            if let Some(correlation_id) = &target.correlation_id {
                by_correlation.insert(correlation_id.clone(), index);
            }
        }
        Self {
            campaign_id,
            app_base_url: app_base_url.into(),
            targets,
            by_target,
            by_correlation,
        }
    }

    /// The campaign this scope covers.
    #[must_use]
    pub fn campaign_id(&self) -> Uuid {
        self.campaign_id
    }

    /// Resolves a mention target by kind and local id.
    #[must_use]
    pub fn resolve(&self, kind: EntityKind, id: Uuid) -> Option<&MentionTarget> {
        self.by_target.get(&(kind, id)).map(|&i| &self.targets[i])
    }

    /// Resolves a mention target by its external page id.
    #[must_use]
    pub fn resolve_correlation(&self, correlation_id: &str) -> Option<&MentionTarget> {
        self.by_correlation
            .get(correlation_id)
            .map(|&i| &self.targets[i])
    }

    /// The entity's canonical in-app URL, used as the degraded fallback link
    /// for mentions whose target has no external page yet.
    #[must_use]
    pub fn canonical_url(&self, kind: EntityKind, id: Uuid) -> String {
        format!("{}/{}/{}", self.app_base_url, kind.path_prefix(), id)
    }

    /// Parses a hyperlink back into a mention target when it points at this
    /// application's canonical domain with a recognized kind prefix.
    #[must_use]
    pub fn parse_canonical_url(&self, url: &str) -> Option<(EntityKind, Uuid)> {
        let rest = url.strip_prefix(&self.app_base_url)?;
        let mut parts = rest.trim_start_matches('/').splitn(2, '/');
        let kind = EntityKind::from_path_prefix(parts.next()?)?;
        let id = Uuid::parse_str(parts.next()?).ok()?;
        Some((kind, id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://app.loreweave.io";

    fn scope_with(targets: Vec<MentionTarget>) -> CampaignScope {
        CampaignScope::new(Uuid::new_v4(), BASE, targets)
    }

    #[test]
    fn test_resolve_by_kind_and_id() {
        let id = Uuid::new_v4();
        let scope = scope_with(vec![MentionTarget {
            kind: EntityKind::Character,
            id,
            name: "Alaric".into(),
            correlation_id: Some("page-1".into()),
        }]);

        let target = scope.resolve(EntityKind::Character, id).unwrap();
        assert_eq!(target.name, "Alaric");
        assert!(scope.resolve(EntityKind::Location, id).is_none());
    }

    #[test]
    fn test_resolve_by_correlation_id() {
        let id = Uuid::new_v4();
        let scope = scope_with(vec![MentionTarget {
            kind: EntityKind::Faction,
            id,
            name: "Ember Pact".into(),
            correlation_id: Some("page-7".into()),
        }]);

        assert_eq!(scope.resolve_correlation("page-7").unwrap().id, id);
        assert!(scope.resolve_correlation("page-8").is_none());
    }

    #[test]
    fn test_canonical_url_round_trips() {
        let id = Uuid::new_v4();
        let scope = scope_with(vec![]);

        let url = scope.canonical_url(EntityKind::Location, id);
        assert_eq!(url, format!("{BASE}/locations/{id}"));
        assert_eq!(
            scope.parse_canonical_url(&url),
            Some((EntityKind::Location, id))
        );
    }

    #[test]
    fn test_foreign_urls_do_not_parse_as_canonical() {
        let scope = scope_with(vec![]);
        assert!(scope.parse_canonical_url("https://example.com/characters/abc").is_none());
        assert!(
            scope
                .parse_canonical_url(&format!("{BASE}/spells/{}", Uuid::new_v4()))
                .is_none()
        );
        assert!(scope.parse_canonical_url(&format!("{BASE}/characters/not-a-uuid")).is_none());
    }
}
