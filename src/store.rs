//! Document store operations.
//!
//! All mutations of the index go through this module: the atomic upsert
//! (document row plus wholesale replacement of headings, tags, concepts,
//! chunks, links, and embeddings) and the cascading delete. Embeddings are
//! computed before the write transaction opens so the critical section
//! covers only the SQLite mutations for one document.

use anyhow::Result;
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::embedding::{vec_to_blob, Embedder};
use crate::models::{Document, ParsedDocument};

/// Insert or update the document at `path` from a parsed record.
///
/// Returns `(doc_id, created)` where `created` reports whether a prior row
/// for the path existed. A crash leaves either the previous state or the new
/// state; dependents are replaced inside one transaction.
pub async fn upsert_document(
    pool: &SqlitePool,
    embedder: &Embedder,
    path: &Path,
    parsed: &ParsedDocument,
) -> Result<(i64, bool)> {
    let path_str = path.display().to_string();
    let modified_at = file_mtime(path);
    let content_hash = format!("{:x}", Sha256::digest(parsed.body.as_bytes()));

    // CPU-heavy work stays outside the write transaction.
    let (doc_vector, doc_model) = embedder.embed(&parsed.body);
    let chunk_vectors: Vec<(Vec<f32>, String)> = parsed
        .chunks
        .iter()
        .map(|text| embedder.embed(text))
        .collect();

    let mut tx = pool.begin().await?;

    let existing_id: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
        .bind(&path_str)
        .fetch_optional(&mut *tx)
        .await?;

    sqlx::query(
        r#"
        INSERT INTO documents (path, title, category, modified_at, body, content_hash)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(path) DO UPDATE SET
            title = excluded.title,
            category = excluded.category,
            modified_at = excluded.modified_at,
            body = excluded.body,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(&path_str)
    .bind(&parsed.title)
    .bind(&parsed.category)
    .bind(modified_at)
    .bind(&parsed.body)
    .bind(&content_hash)
    .execute(&mut *tx)
    .await?;

    let doc_id: i64 = match existing_id {
        Some(id) => id,
        None => sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
            .bind(&path_str)
            .fetch_one(&mut *tx)
            .await?,
    };

    delete_dependents(&mut tx, doc_id).await?;

    for (position, (level, text)) in parsed.headings.iter().enumerate() {
        sqlx::query("INSERT INTO headings (document_id, position, level, text) VALUES (?, ?, ?, ?)")
            .bind(doc_id)
            .bind(position as i64)
            .bind(*level as i64)
            .bind(text)
            .execute(&mut *tx)
            .await?;
    }

    for tag in &parsed.tags {
        sqlx::query("INSERT INTO tags (document_id, tag) VALUES (?, ?)")
            .bind(doc_id)
            .bind(tag)
            .execute(&mut *tx)
            .await?;
    }

    for concept in &parsed.concepts {
        sqlx::query("INSERT INTO concepts (document_id, concept) VALUES (?, ?)")
            .bind(doc_id)
            .bind(concept)
            .execute(&mut *tx)
            .await?;
    }

    for link in &parsed.links {
        sqlx::query(
            "INSERT INTO links (document_id, target, kind, status) VALUES (?, ?, ?, 'unknown')",
        )
        .bind(doc_id)
        .bind(&link.target)
        .bind(link.kind.as_str())
        .execute(&mut *tx)
        .await?;
    }

    for (ordinal, text) in parsed.chunks.iter().enumerate() {
        sqlx::query("INSERT INTO chunks (document_id, ordinal, text) VALUES (?, ?, ?)")
            .bind(doc_id)
            .bind(ordinal as i64)
            .bind(text)
            .execute(&mut *tx)
            .await?;
    }

    sqlx::query(
        "INSERT INTO embeddings (scope, document_id, chunk_ordinal, model, vector) \
         VALUES ('document', ?, -1, ?, ?)",
    )
    .bind(doc_id)
    .bind(&doc_model)
    .bind(vec_to_blob(&doc_vector))
    .execute(&mut *tx)
    .await?;

    for (ordinal, (vector, model)) in chunk_vectors.iter().enumerate() {
        sqlx::query(
            "INSERT INTO embeddings (scope, document_id, chunk_ordinal, model, vector) \
             VALUES ('chunk', ?, ?, ?, ?)",
        )
        .bind(doc_id)
        .bind(ordinal as i64)
        .bind(model)
        .bind(vec_to_blob(vector))
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    Ok((doc_id, existing_id.is_none()))
}

/// Remove the document at `path` and cascade to all dependent rows.
///
/// Returns whether a document existed.
pub async fn delete_by_path(pool: &SqlitePool, path: &Path) -> Result<bool> {
    let path_str = path.display().to_string();

    let mut tx = pool.begin().await?;

    let existing_id: Option<i64> = sqlx::query_scalar("SELECT id FROM documents WHERE path = ?")
        .bind(&path_str)
        .fetch_optional(&mut *tx)
        .await?;

    let doc_id = match existing_id {
        Some(id) => id,
        None => {
            tx.commit().await?;
            return Ok(false);
        }
    };

    delete_dependents(&mut tx, doc_id).await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(doc_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(true)
}

async fn delete_dependents(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    doc_id: i64,
) -> Result<()> {
    for table in ["headings", "tags", "concepts", "chunks", "embeddings", "links"] {
        sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", table))
            .bind(doc_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(())
}

/// All documents, ordered by path.
pub async fn list_documents(pool: &SqlitePool) -> Result<Vec<Document>> {
    let rows = sqlx::query(
        "SELECT id, path, title, category, modified_at FROM documents ORDER BY path ASC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_document).collect())
}

/// Single document row by id.
pub async fn get_document_row(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
    let row = sqlx::query("SELECT id, path, title, category, modified_at FROM documents WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    Ok(row.as_ref().map(row_to_document))
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> Document {
    Document {
        id: row.get("id"),
        path: row.get("path"),
        title: row.get("title"),
        category: row.get("category"),
        modified_at: row.get("modified_at"),
    }
}

fn file_mtime(path: &Path) -> f64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or_else(|| chrono::Utc::now().timestamp() as f64)
}
