//! Reverse conversion: workspace rich-text runs back to local markup.

use loreweave_core::external::RichTextRun;
use loreweave_core::scope::{CampaignScope, MentionTarget};

use crate::escape::escape_text;

/// Converts a run sequence back into local markup.
///
/// Page-reference runs re-materialize a mention marker using the target's
/// *current* display name, never the externally stored label (which may be
/// stale). A text run whose hyperlink points at the application's own
/// canonical domain with a recognized kind prefix is treated identically,
/// recovering mentions exported before their target had a correlation id.
/// Any other hyperlink is dropped, keeping the text. Legacy flat-label runs
/// degrade to plain text. `\n` becomes a paragraph boundary and literal
/// text is HTML-escaped. Unresolvable ids render as unresolved plain text;
/// this function never fails.
#[must_use]
pub fn from_external_runs(runs: &[RichTextRun], scope: &CampaignScope) -> String {
    let mut fragments = Vec::with_capacity(runs.len());
    for run in runs {
        fragments.push(convert_run(run, scope));
    }
    assemble(fragments)
}

enum Fragment {
    /// Literal text; still needs escaping and paragraph splitting.
    Text(String),
    /// Already-rendered marker markup.
    Markup(String),
}

fn convert_run(run: &RichTextRun, scope: &CampaignScope) -> Fragment {
    match run {
        RichTextRun::PageMention { page_id, label } => match scope.resolve_correlation(page_id) {
            Some(target) => Fragment::Markup(marker_markup(target)),
            None => Fragment::Text(label.clone().unwrap_or_default()),
        },
        RichTextRun::Text { content, link } => {
            match link
                .as_deref()
                .and_then(|url| scope.parse_canonical_url(url))
                .and_then(|(kind, id)| scope.resolve(kind, id))
            {
                Some(target) => Fragment::Markup(marker_markup(target)),
                // Foreign or dead link: keep the text, drop the link.
                None => Fragment::Text(content.clone()),
            }
        }
        RichTextRun::PlainLabel { plain_text } => Fragment::Text(plain_text.clone()),
    }
}

fn marker_markup(target: &MentionTarget) -> String {
    let name = escape_text(&target.name);
    format!(
        "<a data-type=\"mention\" data-id=\"{id}\" data-label=\"{name}\" href=\"/{prefix}/{id}\">@{name}</a>",
        id = target.id,
        prefix = target.kind.path_prefix(),
    )
}

fn assemble(fragments: Vec<Fragment>) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for fragment in fragments {
        match fragment {
            Fragment::Markup(markup) => current.push_str(&markup),
            Fragment::Text(text) => {
                let mut lines = text.split('\n');
                if let Some(first) = lines.next() {
                    current.push_str(&escape_text(first));
                }
                for line in lines {
                    paragraphs.push(std::mem::take(&mut current));
                    current.push_str(&escape_text(line));
                }
            }
        }
    }
    paragraphs.push(current);

    paragraphs
        .into_iter()
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{p}</p>"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loreweave_core::entity::EntityKind;
    use uuid::Uuid;

    const BASE: &str = "https://app.loreweave.io";

    fn scope_with(targets: Vec<MentionTarget>) -> CampaignScope {
        CampaignScope::new(Uuid::new_v4(), BASE, targets)
    }

    #[test]
    fn test_text_runs_reassemble_into_paragraphs() {
        let scope = scope_with(vec![]);
        let runs = vec![RichTextRun::text("First\nSecond & third")];

        let markup = from_external_runs(&runs, &scope);

        assert_eq!(markup, "<p>First</p><p>Second &amp; third</p>");
    }

    #[test]
    fn test_page_mention_uses_current_name_not_stored_label() {
        // Arrange: the entity was renamed after export.
        let id = Uuid::new_v4();
        let scope = scope_with(vec![MentionTarget {
            kind: EntityKind::Character,
            id,
            name: "Alaric the Fallen".into(),
            correlation_id: Some("page-42".into()),
        }]);
        let runs = vec![RichTextRun::PageMention {
            page_id: "page-42".into(),
            label: Some("Alaric the Bold".into()),
        }];

        // Act
        let markup = from_external_runs(&runs, &scope);

        // Assert
        assert!(markup.contains("@Alaric the Fallen"));
        assert!(markup.contains(&format!("data-id=\"{id}\"")));
        assert!(markup.contains(&format!("href=\"/characters/{id}\"")));
        assert!(!markup.contains("Alaric the Bold"));
    }

    #[test]
    fn test_canonical_link_recovers_mention() {
        let id = Uuid::new_v4();
        let scope = scope_with(vec![MentionTarget {
            kind: EntityKind::Location,
            id,
            name: "Kir Harbor".into(),
            correlation_id: None,
        }]);
        let runs = vec![RichTextRun::Text {
            content: "@Kir Harbor".into(),
            link: Some(format!("{BASE}/locations/{id}")),
        }];

        let markup = from_external_runs(&runs, &scope);

        assert!(markup.contains("data-type=\"mention\""));
        assert!(markup.contains(&format!("href=\"/locations/{id}\"")));
    }

    #[test]
    fn test_foreign_link_keeps_text_drops_link() {
        let scope = scope_with(vec![]);
        let runs = vec![RichTextRun::Text {
            content: "see the wiki".into(),
            link: Some("https://example.com/wiki".into()),
        }];

        let markup = from_external_runs(&runs, &scope);

        assert_eq!(markup, "<p>see the wiki</p>");
    }

    #[test]
    fn test_unresolvable_page_mention_renders_stored_label_as_text() {
        let scope = scope_with(vec![]);
        let runs = vec![RichTextRun::PageMention {
            page_id: "page-gone".into(),
            label: Some("Lost One".into()),
        }];

        let markup = from_external_runs(&runs, &scope);

        assert_eq!(markup, "<p>Lost One</p>");
    }

    #[test]
    fn test_legacy_flat_label_degrades_to_plain_text() {
        let scope = scope_with(vec![]);
        let runs = vec![RichTextRun::PlainLabel {
            plain_text: "old label".into(),
        }];

        assert_eq!(from_external_runs(&runs, &scope), "<p>old label</p>");
    }

    #[test]
    fn test_empty_runs_produce_empty_markup() {
        let scope = scope_with(vec![]);
        assert_eq!(from_external_runs(&[], &scope), "");
    }
}
