//! Markdown parser.
//!
//! Extracts the title, headings, frontmatter-derived tags/category/concepts,
//! outbound links, body text, and content chunks from a Markdown source.
//! Parsing never fails: malformed frontmatter is treated as absent and the
//! rest of the document is processed normally.
//!
//! Frontmatter accepts both YAML lists and comma-separated strings for
//! `tags` and `concepts`:
//!
//! ```markdown
//! ---
//! tags: backup, postgres
//! category: guides
//! concepts:
//!   - kubernetes
//! ---
//! # Title
//! ```

use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::OnceLock;

use crate::chunk::chunk_body;
use crate::models::{LinkKind, ParsedDocument, ParsedLink};

fn link_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[[^\]]*\]\(([^)]+)\)").expect("link regex"))
}

/// Parse a Markdown source into a [`ParsedDocument`].
///
/// `path` supplies the title fallback (file stem) when the body carries no H1.
pub fn parse_markdown(text: &str, path: &Path) -> ParsedDocument {
    let (frontmatter, body) = split_frontmatter(text);

    let (tags, category, concepts) = frontmatter
        .map(parse_frontmatter)
        .unwrap_or((Vec::new(), None, Vec::new()));

    let headings = extract_headings(body);

    let title = headings
        .iter()
        .find(|(level, _)| *level == 1)
        .map(|(_, text)| text.clone())
        .unwrap_or_else(|| {
            path.file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default()
        });

    let links = extract_links(body);
    let chunks = chunk_body(body);

    ParsedDocument {
        title,
        headings,
        tags,
        category,
        concepts,
        links,
        body: body.to_string(),
        chunks,
    }
}

/// Split a leading `---` frontmatter fence from the body.
///
/// Returns `(Some(yaml), rest)` when a closing fence exists, otherwise
/// `(None, text)` with the input untouched.
fn split_frontmatter(text: &str) -> (Option<&str>, &str) {
    let mut lines = text.split_inclusive('\n');
    match lines.next() {
        Some(first) if first.trim_end() == "---" => {}
        _ => return (None, text),
    }

    let fm_start = text.find('\n').map(|i| i + 1).unwrap_or(text.len());
    let mut offset = fm_start;
    for line in text[fm_start..].split_inclusive('\n') {
        if line.trim_end() == "---" {
            let body_start = offset + line.len();
            return (Some(&text[fm_start..offset]), &text[body_start..]);
        }
        offset += line.len();
    }

    (None, text)
}

/// Frontmatter fields we recognize; everything else is ignored.
#[derive(Debug, Default, Deserialize)]
struct Frontmatter {
    #[serde(default)]
    tags: Option<StringOrList>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    concepts: Option<StringOrList>,
}

/// Tags and concepts accept either a YAML list or a comma-separated string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

/// Normalize frontmatter into `(tags, category, concepts)`.
///
/// Malformed YAML yields empty metadata.
fn parse_frontmatter(raw: &str) -> (Vec<String>, Option<String>, Vec<String>) {
    let frontmatter: Frontmatter = serde_yaml::from_str(raw).unwrap_or_default();

    let tags = string_set(frontmatter.tags);
    let concepts = string_set(frontmatter.concepts);
    let category = frontmatter
        .category
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    (tags, category, concepts)
}

/// Flatten to a sorted set, splitting comma-separated strings.
fn string_set(value: Option<StringOrList>) -> Vec<String> {
    let items = match value {
        Some(StringOrList::One(s)) => vec![s],
        Some(StringOrList::Many(list)) => list,
        None => Vec::new(),
    };

    let mut set = BTreeSet::new();
    for item in items {
        for part in item.split(',') {
            let trimmed = part.trim();
            if !trimmed.is_empty() {
                set.insert(trimmed.to_string());
            }
        }
    }
    set.into_iter().collect()
}

/// Collect ATX headings outside fenced code blocks, in document order.
fn extract_headings(body: &str) -> Vec<(u8, String)> {
    let mut headings = Vec::new();
    let mut in_fence = false;

    for line in body.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }

        let level = trimmed.bytes().take_while(|&b| b == b'#').count();
        if (1..=6).contains(&level) {
            let rest = trimmed[level..].trim();
            if !rest.is_empty() {
                headings.push((level as u8, rest.to_string()));
            }
        }
    }

    headings
}

/// Extract inline `[label](target)` links and classify each target.
fn extract_links(body: &str) -> Vec<ParsedLink> {
    link_regex()
        .captures_iter(body)
        .filter_map(|caps| {
            // Drop an optional markdown link title: `(target "title")`.
            let raw = caps.get(1)?.as_str().trim();
            let target = raw.split_whitespace().next().unwrap_or("").to_string();
            if target.is_empty() {
                return None;
            }
            let kind = classify_link(&target);
            Some(ParsedLink { target, kind })
        })
        .collect()
}

fn classify_link(target: &str) -> LinkKind {
    if target.starts_with("http://") || target.starts_with("https://") {
        LinkKind::External
    } else if target.starts_with('#') {
        LinkKind::Anchor
    } else {
        LinkKind::Internal
    }
}
