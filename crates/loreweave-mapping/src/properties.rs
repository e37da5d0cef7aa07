//! External property names shared by export and import.
//!
//! One flat namespace: property names are unique within a kind's container,
//! and reusing the same name for the same concept across kinds keeps the
//! external containers uniform.

/// Page title.
pub const NAME: &str = "Name";
/// Rich-text body.
pub const CONTENT: &str = "Content";
/// Category select (location type, faction type, vehicle type).
pub const TYPE: &str = "Type";
/// Character title/epithet.
pub const TITLE: &str = "Title";
/// Character age.
pub const AGE: &str = "Age";
/// Character pronouns.
pub const PRONOUNS: &str = "Pronouns";
/// Character level (protected).
pub const LEVEL: &str = "Level";
/// Character death flag.
pub const DEAD: &str = "Dead";
/// Relation to a location page.
pub const LOCATION: &str = "Location";
/// Relation to a faction page.
pub const FACTION: &str = "Faction";
/// Relation to a parent location page.
pub const PARENT_LOCATION: &str = "Parent Location";
/// Journal in-world date.
pub const DATE: &str = "Date";
/// Relation to the authoring character's page.
pub const AUTHOR: &str = "Author";
/// Vehicle price (protected).
pub const PRICE: &str = "Price";
/// Vehicle speed.
pub const SPEED: &str = "Speed";
/// Canonical back-link into the application (production only).
pub const APP_LINK: &str = "App Link";
