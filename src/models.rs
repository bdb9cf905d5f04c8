//! Core data models used throughout Markdown Keeper.
//!
//! These types represent the parsed documents, stored rows, and counters
//! that flow through the ingestion and retrieval pipeline.

use serde::Serialize;

/// Classification of an outbound link target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Internal,
    External,
    Anchor,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Internal => "internal",
            LinkKind::External => "external",
            LinkKind::Anchor => "anchor",
        }
    }
}

/// An outbound link extracted from a document body.
#[derive(Debug, Clone)]
pub struct ParsedLink {
    pub target: String,
    pub kind: LinkKind,
}

/// Structured record produced by the Markdown parser for one file.
#[derive(Debug, Clone)]
pub struct ParsedDocument {
    /// First H1, or the file stem when the body has none.
    pub title: String,
    /// Ordered `(level, text)` pairs.
    pub headings: Vec<(u8, String)>,
    pub tags: Vec<String>,
    pub category: Option<String>,
    pub concepts: Vec<String>,
    pub links: Vec<ParsedLink>,
    /// Body text with the frontmatter block removed.
    pub body: String,
    /// Paragraph-scale chunks, ordinals implied by position.
    pub chunks: Vec<String>,
}

/// Normalized document row stored in SQLite.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub category: Option<String>,
    pub modified_at: f64,
}

/// A link row as stored, surfaced by the link checker.
#[derive(Debug, Clone)]
pub struct CheckedLink {
    pub document_id: i64,
    pub target: String,
    pub kind: String,
    pub status: String,
}

/// Counters returned by a queue drain or a one-shot scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainResult {
    pub created: u64,
    pub modified: u64,
    pub deleted: u64,
}

impl DrainResult {
    pub fn merge(&mut self, other: DrainResult) {
        self.created += other.created;
        self.modified += other.modified;
        self.deleted += other.deleted;
    }
}
