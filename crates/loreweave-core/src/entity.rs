//! The syncable entity model.
//!
//! Every domain record that participates in sync is represented here as a
//! [`SyncableEntity`]: a common envelope (id, campaign scope, name, authored
//! content, correlation state) plus per-kind typed fields in a closed
//! [`EntityFields`] enum. Dispatch over kinds is always a `match`; there is
//! deliberately no open registry.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The closed set of entity kinds that participate in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A player or non-player character.
    Character,
    /// A place in the world.
    Location,
    /// An organization, guild, or house.
    Faction,
    /// A narrative log / session journal.
    Journal,
    /// A vehicle, mount, or vessel.
    Vehicle,
}

impl EntityKind {
    /// All kinds, in canonical order.
    pub const ALL: [Self; 5] = [
        Self::Character,
        Self::Location,
        Self::Faction,
        Self::Journal,
        Self::Vehicle,
    ];

    /// The path prefix used in canonical in-app URLs and mention hrefs.
    #[must_use]
    pub fn path_prefix(self) -> &'static str {
        match self {
            Self::Character => "characters",
            Self::Location => "locations",
            Self::Faction => "factions",
            Self::Journal => "journals",
            Self::Vehicle => "vehicles",
        }
    }

    /// Parses a kind back from its path prefix.
    #[must_use]
    pub fn from_path_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.path_prefix() == prefix)
    }

    /// Stable storage identifier for this kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Character => "character",
            Self::Location => "location",
            Self::Faction => "faction",
            Self::Journal => "journal",
            Self::Vehicle => "vehicle",
        }
    }

    /// Parses a kind from its storage identifier.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == value)
    }
}

/// A domain record participating in sync.
///
/// `correlation_id` is the opaque external page id; it is unique among
/// entities of the same kind. `last_synced_at` is set only by the sync
/// orchestrator immediately after a successful push or pull and is
/// monotonically non-decreasing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncableEntity {
    /// Local identifier.
    pub id: Uuid,
    /// Scope boundary: mentions and lookups never cross campaigns.
    pub campaign_id: Uuid,
    /// The entity kind; always agrees with the `fields` variant.
    pub kind: EntityKind,
    /// Display name; doubles as the external page title.
    pub name: String,
    /// Locally-authored markup, if any.
    pub content: Option<String>,
    /// Opaque external page id, once pushed or pulled.
    pub correlation_id: Option<String>,
    /// Timestamp of the last successful push or pull.
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Kind-specific typed fields.
    pub fields: EntityFields,
}

/// Per-kind typed fields, as a closed tagged enum.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntityFields {
    /// Fields for [`EntityKind::Character`].
    Character(CharacterFields),
    /// Fields for [`EntityKind::Location`].
    Location(LocationFields),
    /// Fields for [`EntityKind::Faction`].
    Faction(FactionFields),
    /// Fields for [`EntityKind::Journal`].
    Journal(JournalFields),
    /// Fields for [`EntityKind::Vehicle`].
    Vehicle(VehicleFields),
}

impl EntityFields {
    /// Returns the kind this variant belongs to.
    #[must_use]
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Character(_) => EntityKind::Character,
            Self::Location(_) => EntityKind::Location,
            Self::Faction(_) => EntityKind::Faction,
            Self::Journal(_) => EntityKind::Journal,
            Self::Vehicle(_) => EntityKind::Vehicle,
        }
    }

    /// An empty fields value for the given kind.
    #[must_use]
    pub fn empty(kind: EntityKind) -> Self {
        match kind {
            EntityKind::Character => Self::Character(CharacterFields::default()),
            EntityKind::Location => Self::Location(LocationFields::default()),
            EntityKind::Faction => Self::Faction(FactionFields::default()),
            EntityKind::Journal => Self::Journal(JournalFields::default()),
            EntityKind::Vehicle => Self::Vehicle(VehicleFields::default()),
        }
    }
}

/// Typed fields for characters. `level` is a protected field: an advanced
/// local value is preferred over external updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterFields {
    /// In-world title or epithet.
    pub title: Option<String>,
    /// Free-form age description.
    pub age: Option<String>,
    /// Pronouns, if recorded.
    pub pronouns: Option<String>,
    /// Character level (protected).
    pub level: Option<i64>,
    /// Whether the character is dead.
    pub is_dead: bool,
    /// Current location, if loaded.
    pub location_id: Option<Uuid>,
    /// Primary faction membership, if loaded.
    pub faction_id: Option<Uuid>,
}

/// Typed fields for locations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationFields {
    /// Location category (city, ruin, plane, ...).
    pub location_type: Option<String>,
    /// Containing location, if any.
    pub parent_location_id: Option<Uuid>,
}

/// Typed fields for factions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactionFields {
    /// Faction category (guild, cult, noble house, ...).
    pub faction_type: Option<String>,
    /// Seat of power, if any.
    pub location_id: Option<Uuid>,
}

/// Typed fields for narrative journals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalFields {
    /// In-world date of the entry.
    pub journal_date: Option<NaiveDate>,
    /// Authoring character, if any.
    pub author_id: Option<Uuid>,
}

/// Typed fields for vehicles. `price` is a protected field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VehicleFields {
    /// Vehicle category (ship, wagon, airship, ...).
    pub vehicle_type: Option<String>,
    /// Price in base currency (protected).
    pub price: Option<i64>,
    /// Speed rating.
    pub speed: Option<i64>,
}
