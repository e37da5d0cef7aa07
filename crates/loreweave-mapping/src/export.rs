//! Entity -> external page property export.

use std::collections::BTreeMap;

use uuid::Uuid;

use loreweave_core::config::Deployment;
use loreweave_core::entity::{EntityFields, EntityKind, SyncableEntity};
use loreweave_core::external::{PropertyValue, RichTextRun};
use loreweave_core::scope::CampaignScope;
use loreweave_richtext::to_external_runs;

use crate::properties;

/// Builds the external property map for an entity.
///
/// Rich-text fields go through the forward converter. A relation to another
/// entity is included only when the related entity is present in the scope
/// *and* already has a correlation id; otherwise it is silently omitted and
/// self-heals on a later pass. The canonical back-link property is added
/// only for the production deployment.
#[must_use]
pub fn export(
    entity: &SyncableEntity,
    scope: &CampaignScope,
    deployment: Deployment,
) -> BTreeMap<String, PropertyValue> {
    let mut props = BTreeMap::new();
    props.insert(
        properties::NAME.to_owned(),
        PropertyValue::Title(vec![RichTextRun::text(entity.name.clone())]),
    );
    if let Some(content) = &entity.content {
        props.insert(
            properties::CONTENT.to_owned(),
            PropertyValue::RichText(to_external_runs(content, scope)),
        );
    }

    match &entity.fields {
        EntityFields::Character(fields) => {
            props.insert(
                properties::TITLE.to_owned(),
                PropertyValue::Select(fields.title.clone()),
            );
            props.insert(
                properties::AGE.to_owned(),
                PropertyValue::Select(fields.age.clone()),
            );
            props.insert(
                properties::PRONOUNS.to_owned(),
                PropertyValue::Select(fields.pronouns.clone()),
            );
            props.insert(properties::LEVEL.to_owned(), number(fields.level));
            props.insert(
                properties::DEAD.to_owned(),
                PropertyValue::Checkbox(fields.is_dead),
            );
            insert_relation(
                &mut props,
                properties::LOCATION,
                scope,
                EntityKind::Location,
                fields.location_id,
            );
            insert_relation(
                &mut props,
                properties::FACTION,
                scope,
                EntityKind::Faction,
                fields.faction_id,
            );
        }
        EntityFields::Location(fields) => {
            props.insert(
                properties::TYPE.to_owned(),
                PropertyValue::Select(fields.location_type.clone()),
            );
            insert_relation(
                &mut props,
                properties::PARENT_LOCATION,
                scope,
                EntityKind::Location,
                fields.parent_location_id,
            );
        }
        EntityFields::Faction(fields) => {
            props.insert(
                properties::TYPE.to_owned(),
                PropertyValue::Select(fields.faction_type.clone()),
            );
            insert_relation(
                &mut props,
                properties::LOCATION,
                scope,
                EntityKind::Location,
                fields.location_id,
            );
        }
        EntityFields::Journal(fields) => {
            props.insert(
                properties::DATE.to_owned(),
                PropertyValue::Date(fields.journal_date),
            );
            insert_relation(
                &mut props,
                properties::AUTHOR,
                scope,
                EntityKind::Character,
                fields.author_id,
            );
        }
        EntityFields::Vehicle(fields) => {
            props.insert(
                properties::TYPE.to_owned(),
                PropertyValue::Select(fields.vehicle_type.clone()),
            );
            props.insert(properties::PRICE.to_owned(), number(fields.price));
            props.insert(properties::SPEED.to_owned(), number(fields.speed));
        }
    }

    if deployment == Deployment::Production {
        props.insert(
            properties::APP_LINK.to_owned(),
            PropertyValue::Url(Some(scope.canonical_url(entity.kind, entity.id))),
        );
    }

    props
}

#[allow(clippy::cast_precision_loss)]
fn number(value: Option<i64>) -> PropertyValue {
    PropertyValue::Number(value.map(|v| v as f64))
}

/// Adds a relation property when the target is loaded and correlated.
fn insert_relation(
    props: &mut BTreeMap<String, PropertyValue>,
    name: &str,
    scope: &CampaignScope,
    kind: EntityKind,
    id: Option<Uuid>,
) {
    let Some(id) = id else { return };
    let Some(target) = scope.resolve(kind, id) else {
        return;
    };
    let Some(correlation_id) = target.correlation_id.clone() else {
        return;
    };
    props.insert(
        name.to_owned(),
        PropertyValue::Relation(vec![correlation_id]),
    );
}
