//! Semantic query engine.
//!
//! Ranks documents by a blend of document-level and chunk-level cosine
//! similarity. The document vector alone blurs topical sections of a long
//! file; the best-chunk term recovers a single strongly matching paragraph.
//! Ordering is deterministic: score descending, then most recent
//! `modified_at`, then id ascending.
//!
//! Only vectors produced by the same model as the query embedding are
//! comparable; rows from another model are skipped.

use anyhow::Result;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;

use crate::embedding::{blob_to_vec, cosine_similarity, Embedder};

/// Weight of the document-level score in the blend.
pub const DOC_CHUNK_ALPHA: f64 = 0.5;

/// A ranked document returned by the query engine.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub id: i64,
    pub path: String,
    pub title: String,
    pub category: Option<String>,
    pub modified_at: f64,
    pub score: f64,
}

/// Rank all documents against `query` and return the top `limit`.
///
/// An empty query yields an empty result set.
pub async fn semantic_search_documents(
    pool: &SqlitePool,
    embedder: &Embedder,
    query: &str,
    limit: usize,
) -> Result<Vec<SearchResult>> {
    if query.trim().is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let (query_vec, query_model) = embedder.embed(query);

    let mut doc_scores: HashMap<i64, f64> = HashMap::new();
    let doc_rows = sqlx::query(
        "SELECT document_id, model, vector FROM embeddings WHERE scope = 'document'",
    )
    .fetch_all(pool)
    .await?;
    for row in &doc_rows {
        let model: String = row.get("model");
        if model != query_model {
            continue;
        }
        let blob: Vec<u8> = row.get("vector");
        let vector = blob_to_vec(&blob);
        let doc_id: i64 = row.get("document_id");
        doc_scores.insert(doc_id, cosine_similarity(&query_vec, &vector) as f64);
    }

    let mut best_chunk: HashMap<i64, f64> = HashMap::new();
    let chunk_rows =
        sqlx::query("SELECT document_id, model, vector FROM embeddings WHERE scope = 'chunk'")
            .fetch_all(pool)
            .await?;
    for row in &chunk_rows {
        let model: String = row.get("model");
        if model != query_model {
            continue;
        }
        let blob: Vec<u8> = row.get("vector");
        let vector = blob_to_vec(&blob);
        let doc_id: i64 = row.get("document_id");
        let score = cosine_similarity(&query_vec, &vector) as f64;
        let entry = best_chunk.entry(doc_id).or_insert(f64::NEG_INFINITY);
        if score > *entry {
            *entry = score;
        }
    }

    let document_rows =
        sqlx::query("SELECT id, path, title, category, modified_at FROM documents")
            .fetch_all(pool)
            .await?;

    let mut results: Vec<SearchResult> = document_rows
        .iter()
        .map(|row| {
            let id: i64 = row.get("id");
            let doc_score = doc_scores.get(&id).copied().unwrap_or(0.0);
            let score = match best_chunk.get(&id) {
                Some(chunk_score) => {
                    DOC_CHUNK_ALPHA * doc_score + (1.0 - DOC_CHUNK_ALPHA) * chunk_score
                }
                None => doc_score,
            };
            SearchResult {
                id,
                path: row.get("path"),
                title: row.get("title"),
                category: row.get("category"),
                modified_at: row.get("modified_at"),
                score,
            }
        })
        .collect();

    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.modified_at
                    .partial_cmp(&a.modified_at)
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.id.cmp(&b.id))
    });

    results.truncate(limit);
    Ok(results)
}
