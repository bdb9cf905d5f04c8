//! Document retrieval helpers.
//!
//! `get_document` fetches one document with its metadata and an optional
//! token-capped body excerpt; `find_by_concept` lists the documents tagged
//! with a concept. Both are shared by the `mdk` CLI and the RPC server.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};

use crate::models::Document;

/// Full document record as returned to callers.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRecord {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub category: Option<String>,
    pub modified_at: f64,
    pub tags: Vec<String>,
    pub concepts: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Fetch a document by id.
///
/// With `include_content`, the body is attached, truncated to `max_tokens`
/// whitespace tokens when given. Returns `None` when the id is unknown.
pub async fn get_document(
    pool: &SqlitePool,
    id: i64,
    include_content: bool,
    max_tokens: Option<usize>,
) -> Result<Option<DocumentRecord>> {
    let row = sqlx::query(
        "SELECT id, path, title, category, modified_at, body FROM documents WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    let row = match row {
        Some(row) => row,
        None => return Ok(None),
    };

    let tags: Vec<String> = sqlx::query("SELECT tag FROM tags WHERE document_id = ? ORDER BY tag")
        .bind(id)
        .fetch_all(pool)
        .await?
        .iter()
        .map(|r| r.get("tag"))
        .collect();

    let concepts: Vec<String> =
        sqlx::query("SELECT concept FROM concepts WHERE document_id = ? ORDER BY concept")
            .bind(id)
            .fetch_all(pool)
            .await?
            .iter()
            .map(|r| r.get("concept"))
            .collect();

    let content = if include_content {
        let body: String = row.get("body");
        Some(excerpt(&body, max_tokens))
    } else {
        None
    };

    Ok(Some(DocumentRecord {
        id: row.get("id"),
        path: row.get("path"),
        title: row.get("title"),
        category: row.get("category"),
        modified_at: row.get("modified_at"),
        tags,
        concepts,
        content,
    }))
}

/// Cap `body` to `max_tokens` whitespace-separated tokens.
pub fn excerpt(body: &str, max_tokens: Option<usize>) -> String {
    match max_tokens {
        Some(cap) => {
            let tokens: Vec<&str> = body.split_whitespace().take(cap).collect();
            tokens.join(" ")
        }
        None => body.to_string(),
    }
}

/// Documents carrying `concept`, case-insensitive exact match, ordered by
/// title.
pub async fn find_by_concept(
    pool: &SqlitePool,
    concept: &str,
    limit: usize,
) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        r#"
        SELECT d.id, d.path, d.title, d.category, d.modified_at
        FROM documents d
        JOIN concepts c ON c.document_id = d.id
        WHERE LOWER(c.concept) = LOWER(?)
        ORDER BY d.title ASC
        LIMIT ?
        "#,
    )
    .bind(concept)
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| Document {
            id: row.get("id"),
            path: row.get("path"),
            title: row.get("title"),
            category: row.get("category"),
            modified_at: row.get("modified_at"),
        })
        .collect())
}
