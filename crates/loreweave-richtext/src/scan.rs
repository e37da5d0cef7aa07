//! Markup scanner: block normalization and mention-marker partitioning.
//!
//! A single pass over the raw markup produces alternating plain-text and
//! marker segments in document order. Paragraph boundaries and explicit
//! line breaks become `\n` in the flattened text; all other tags are
//! dropped. Marker tags are recorded whole, never split.

use uuid::Uuid;

use loreweave_core::entity::EntityKind;

use crate::escape::decode_entities;

/// A well-formed mention marker found in the markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct MentionMarker {
    /// Target kind, decoded from the href path prefix.
    pub kind: EntityKind,
    /// Target local id.
    pub id: Uuid,
    /// The authored display label (may be stale).
    pub label: String,
    /// The marker's visible text, stripped and decoded.
    pub visible_text: String,
}

/// One partition of the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    /// Decoded plain text with `\n` block boundaries.
    Text(String),
    /// A mention marker.
    Marker(MentionMarker),
}

/// Partitions markup into alternating text and marker segments.
///
/// Total over arbitrary input: unclosed tags, stray `<`, and markers with
/// missing attributes all degrade to literal text. Zero characters between
/// two adjacent markers produce no intervening segment.
pub(crate) fn partition(markup: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < markup.len() {
        if markup.as_bytes()[i] != b'<' {
            let next = markup[i..].find('<').map_or(markup.len(), |o| i + o);
            text.push_str(&decode_entities(&markup[i..next]));
            i = next;
            continue;
        }

        let Some(close) = markup[i..].find('>') else {
            // Unclosed tag: the rest is literal text.
            text.push_str(&decode_entities(&markup[i..]));
            break;
        };
        let body = &markup[i + 1..i + close];
        let after = i + close + 1;
        let tag = Tag::parse(body);

        match tag.name.as_str() {
            "p" if tag.closing => push_break(&mut text),
            "br" => push_break(&mut text),
            "a" | "span" if !tag.closing && tag.attr("data-type").as_deref() == Some("mention") => {
                let close_tag = format!("</{}>", tag.name);
                let Some(rel) = markup[after..].find(&close_tag) else {
                    // No closing tag; drop the opener and keep scanning.
                    i = after;
                    continue;
                };
                let inner = &markup[after..after + rel];
                let visible = decode_entities(&strip_tags(inner));

                match parse_marker(&tag, &visible) {
                    Some(marker) => {
                        flush(&mut segments, &mut text);
                        segments.push(Segment::Marker(marker));
                    }
                    // Missing required attributes: not a mention, keep the
                    // visible text as plain stripped content.
                    None => text.push_str(&visible),
                }
                i = after + rel + close_tag.len();
                continue;
            }
            _ => {}
        }
        i = after;
    }

    // Trailing block boundaries carry no content.
    while text.ends_with('\n') {
        text.pop();
    }
    flush(&mut segments, &mut text);
    segments
}

fn push_break(text: &mut String) {
    // Block boundaries collapse: no leading break, no doubled breaks.
    if !text.is_empty() && !text.ends_with('\n') {
        text.push('\n');
    }
}

fn flush(segments: &mut Vec<Segment>, text: &mut String) {
    if !text.is_empty() {
        segments.push(Segment::Text(std::mem::take(text)));
    }
}

fn parse_marker(tag: &Tag, visible: &str) -> Option<MentionMarker> {
    let id = Uuid::parse_str(&tag.attr("data-id")?).ok()?;
    let href = tag.attr("href")?;
    let mut parts = href.trim_start_matches('/').splitn(2, '/');
    let kind = EntityKind::from_path_prefix(parts.next()?)?;
    let label = tag
        .attr("data-label")
        .map(|l| decode_entities(&l))
        .unwrap_or_else(|| visible.trim_start_matches('@').to_owned());
    Some(MentionMarker {
        kind,
        id,
        label,
        visible_text: visible.to_owned(),
    })
}

/// Removes any nested tag spans, keeping their text content.
fn strip_tags(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(open) = rest.find('<') {
        out.push_str(&rest[..open]);
        match rest[open..].find('>') {
            Some(close) => rest = &rest[open + close + 1..],
            None => {
                out.push_str(&rest[open..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

/// A parsed tag body: lowercased name, closing flag, and raw attributes.
struct Tag {
    name: String,
    closing: bool,
    attrs: Vec<(String, String)>,
}

impl Tag {
    fn parse(body: &str) -> Self {
        let body = body.trim().trim_end_matches('/').trim_end();
        let (closing, body) = match body.strip_prefix('/') {
            Some(rest) => (true, rest),
            None => (false, body),
        };
        let name_end = body
            .find(|c: char| c.is_whitespace())
            .unwrap_or(body.len());
        let name = body[..name_end].to_ascii_lowercase();
        let attrs = parse_attrs(&body[name_end..]);
        Self {
            name,
            closing,
            attrs,
        }
    }

    fn attr(&self, name: &str) -> Option<String> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }
}

fn parse_attrs(input: &str) -> Vec<(String, String)> {
    let mut attrs = Vec::new();
    let mut rest = input.trim_start();
    while !rest.is_empty() {
        let eq = match rest.find('=') {
            Some(pos) => pos,
            None => break,
        };
        let key = rest[..eq].trim().to_ascii_lowercase();
        rest = rest[eq + 1..].trim_start();
        let value;
        if let Some(stripped) = rest.strip_prefix('"') {
            let end = stripped.find('"').unwrap_or(stripped.len());
            value = stripped[..end].to_owned();
            rest = &stripped[(end + 1).min(stripped.len())..];
        } else if let Some(stripped) = rest.strip_prefix('\'') {
            let end = stripped.find('\'').unwrap_or(stripped.len());
            value = stripped[..end].to_owned();
            rest = &stripped[(end + 1).min(stripped.len())..];
        } else {
            let end = rest
                .find(|c: char| c.is_whitespace())
                .unwrap_or(rest.len());
            value = rest[..end].to_owned();
            rest = &rest[end..];
        }
        if !key.is_empty() {
            attrs.push((key, value));
        }
        rest = rest.trim_start();
    }
    attrs
}
