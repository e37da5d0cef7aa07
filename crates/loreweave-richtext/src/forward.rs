//! Forward conversion: local markup to workspace rich-text runs.

use loreweave_core::external::RichTextRun;
use loreweave_core::scope::CampaignScope;

use crate::scan::{MentionMarker, Segment, partition};

/// Converts locally-authored markup into an ordered run sequence.
///
/// Plain-text segments become text runs (entity-decoded, block boundaries
/// as `\n`). A marker whose target resolves within the scope and already
/// carries a correlation id becomes a page-reference run; a resolved but
/// uncorrelated target degrades to a literal `@label` text run with a
/// fallback hyperlink to the entity's canonical in-app URL; an unresolved
/// marker (unknown id, or an entity in another campaign) degrades to its
/// visible text.
///
/// An empty or whitespace-only document converts to an empty run sequence
/// for every entity kind. Total over arbitrary input; never panics.
#[must_use]
pub fn to_external_runs(markup: &str, scope: &CampaignScope) -> Vec<RichTextRun> {
    let segments = partition(markup);
    let blank = segments
        .iter()
        .all(|s| matches!(s, Segment::Text(t) if t.trim().is_empty()));
    if blank {
        return Vec::new();
    }

    segments
        .into_iter()
        .map(|segment| match segment {
            Segment::Text(content) => RichTextRun::Text {
                content,
                link: None,
            },
            Segment::Marker(marker) => convert_marker(&marker, scope),
        })
        .collect()
}

fn convert_marker(marker: &MentionMarker, scope: &CampaignScope) -> RichTextRun {
    match scope.resolve(marker.kind, marker.id) {
        Some(target) => match &target.correlation_id {
            Some(page_id) => RichTextRun::PageMention {
                page_id: page_id.clone(),
                label: Some(target.name.clone()),
            },
            // Not pushed yet: degrade to a clickable link into the app so
            // the cross-reference survives instead of disappearing.
            None => RichTextRun::Text {
                content: format!("@{}", marker.label),
                link: Some(scope.canonical_url(marker.kind, marker.id)),
            },
        },
        None => RichTextRun::Text {
            content: marker.visible_text.clone(),
            link: None,
        },
    }
}
