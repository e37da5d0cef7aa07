//! External page -> entity attribute import.

use chrono::NaiveDate;
use uuid::Uuid;

use loreweave_core::entity::{EntityFields, EntityKind, SyncableEntity};
use loreweave_core::external::{ExternalPage, PropertyValue, RichTextRun};
use loreweave_core::scope::CampaignScope;
use loreweave_richtext::from_external_runs;

use crate::properties;
use crate::{PLACEHOLDER_NAME, PROTECTED_FIELD_BASELINE};

/// The merged attribute state produced by an import. Applying a patch is
/// assigning `name`, `content`, and `fields` onto the entity; the
/// orchestrator owns correlation state and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributePatch {
    /// Merged display name.
    pub name: String,
    /// Merged authored content.
    pub content: Option<String>,
    /// Merged kind-specific fields.
    pub fields: EntityFields,
}

/// Extracts typed fields from an external page and merges them against the
/// existing entity.
///
/// Merge rules: protected numeric fields keep the local value when it
/// exceeds [`PROTECTED_FIELD_BASELINE`]; an external blank title never
/// overwrites a non-blank local name (and falls back to
/// [`PLACEHOLDER_NAME`] when there is no existing entity); every other
/// field takes the external value when present and stays unchanged
/// otherwise. A property of an unexpected type is skipped like an absent
/// one. Total: never fails, never panics.
#[must_use]
pub fn import(
    page: &ExternalPage,
    kind: EntityKind,
    existing: Option<&SyncableEntity>,
    scope: &CampaignScope,
) -> AttributePatch {
    let name = merge_name(existing.map(|e| e.name.as_str()), title_text(page));
    let content =
        rich_text_markup(page, properties::CONTENT, scope).or_else(|| existing.and_then(|e| e.content.clone()));

    // Start from the existing fields when the kinds agree; a stored entity
    // whose fields variant disagrees with its kind is treated as empty.
    let base = match existing {
        Some(entity) if entity.fields.kind() == kind => entity.fields.clone(),
        _ => EntityFields::empty(kind),
    };
    let fields = merge_fields(base, page, scope);

    AttributePatch {
        name,
        content,
        fields,
    }
}

fn merge_fields(base: EntityFields, page: &ExternalPage, scope: &CampaignScope) -> EntityFields {
    match base {
        EntityFields::Character(mut f) => {
            f.title = select(page, properties::TITLE).or(f.title);
            f.age = select(page, properties::AGE).or(f.age);
            f.pronouns = select(page, properties::PRONOUNS).or(f.pronouns);
            f.level = merge_protected(f.level, number_i64(page, properties::LEVEL));
            if let Some(dead) = checkbox(page, properties::DEAD) {
                f.is_dead = dead;
            }
            f.location_id =
                relation_local_id(page, properties::LOCATION, EntityKind::Location, scope)
                    .or(f.location_id);
            f.faction_id = relation_local_id(page, properties::FACTION, EntityKind::Faction, scope)
                .or(f.faction_id);
            EntityFields::Character(f)
        }
        EntityFields::Location(mut f) => {
            f.location_type = select(page, properties::TYPE).or(f.location_type);
            f.parent_location_id =
                relation_local_id(page, properties::PARENT_LOCATION, EntityKind::Location, scope)
                    .or(f.parent_location_id);
            EntityFields::Location(f)
        }
        EntityFields::Faction(mut f) => {
            f.faction_type = select(page, properties::TYPE).or(f.faction_type);
            f.location_id =
                relation_local_id(page, properties::LOCATION, EntityKind::Location, scope)
                    .or(f.location_id);
            EntityFields::Faction(f)
        }
        EntityFields::Journal(mut f) => {
            f.journal_date = date(page, properties::DATE).or(f.journal_date);
            f.author_id =
                relation_local_id(page, properties::AUTHOR, EntityKind::Character, scope)
                    .or(f.author_id);
            EntityFields::Journal(f)
        }
        EntityFields::Vehicle(mut f) => {
            f.vehicle_type = select(page, properties::TYPE).or(f.vehicle_type);
            f.price = merge_protected(f.price, number_i64(page, properties::PRICE));
            f.speed = number_i64(page, properties::SPEED).or(f.speed);
            EntityFields::Vehicle(f)
        }
    }
}

/// Protected-field merge: an advanced local value beats the external one.
fn merge_protected(local: Option<i64>, external: Option<i64>) -> Option<i64> {
    match (local, external) {
        (Some(local), Some(external)) => Some(if local > PROTECTED_FIELD_BASELINE {
            local
        } else {
            external
        }),
        (Some(local), None) => Some(local),
        (None, external) => external,
    }
}

fn merge_name(local: Option<&str>, external: Option<String>) -> String {
    match external {
        Some(name) => name,
        // External blank never overwrites a non-blank local name.
        None => match local {
            Some(name) if !name.trim().is_empty() => name.to_owned(),
            _ => PLACEHOLDER_NAME.to_owned(),
        },
    }
}

fn title_text(page: &ExternalPage) -> Option<String> {
    let PropertyValue::Title(runs) = page.property(properties::NAME)? else {
        return None;
    };
    let text = plain_text(runs);
    let trimmed = text.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_owned())
    }
}

fn plain_text(runs: &[RichTextRun]) -> String {
    runs.iter()
        .map(|run| match run {
            RichTextRun::Text { content, .. } => content.as_str(),
            RichTextRun::PageMention { label, .. } => label.as_deref().unwrap_or_default(),
            RichTextRun::PlainLabel { plain_text } => plain_text.as_str(),
        })
        .collect()
}

fn rich_text_markup(page: &ExternalPage, name: &str, scope: &CampaignScope) -> Option<String> {
    let PropertyValue::RichText(runs) = page.property(name)? else {
        return None;
    };
    Some(from_external_runs(runs, scope))
}

fn select(page: &ExternalPage, name: &str) -> Option<String> {
    match page.property(name)? {
        PropertyValue::Select(value) => value.clone(),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
fn number_i64(page: &ExternalPage, name: &str) -> Option<i64> {
    match page.property(name)? {
        PropertyValue::Number(value) => value.map(|v| v.round() as i64),
        _ => None,
    }
}

fn checkbox(page: &ExternalPage, name: &str) -> Option<bool> {
    match page.property(name)? {
        PropertyValue::Checkbox(value) => Some(*value),
        _ => None,
    }
}

fn date(page: &ExternalPage, name: &str) -> Option<NaiveDate> {
    match page.property(name)? {
        PropertyValue::Date(value) => *value,
        _ => None,
    }
}

/// Resolves the first related page id back to a local entity of the
/// expected kind. Unknown or cross-kind relations are skipped.
fn relation_local_id(
    page: &ExternalPage,
    name: &str,
    kind: EntityKind,
    scope: &CampaignScope,
) -> Option<Uuid> {
    let PropertyValue::Relation(page_ids) = page.property(name)? else {
        return None;
    };
    let target = scope.resolve_correlation(page_ids.first()?)?;
    (target.kind == kind).then_some(target.id)
}
