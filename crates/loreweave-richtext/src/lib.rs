//! Loreweave Rich-Text — pure translation between locally-authored markup
//! and the workspace's rich-text run format.
//!
//! Local content is HTML-like markup. An inline cross-reference (a
//! "mention") is an anchor carrying a type discriminator, the referenced
//! local id, a display label, and a path-style href encoding the target
//! kind:
//!
//! ```text
//! <a data-type="mention" data-id="<uuid>" data-label="Alaric"
//!    href="/characters/<uuid>">@Alaric</a>
//! ```
//!
//! Both directions are total functions: malformed input never raises, it
//! degrades to the most literal safe text interpretation. There is no I/O
//! anywhere in this crate; mention resolution goes through a pre-loaded
//! [`CampaignScope`](loreweave_core::scope::CampaignScope).

mod escape;
mod forward;
mod reverse;
mod scan;

pub use forward::to_external_runs;
pub use reverse::from_external_runs;
