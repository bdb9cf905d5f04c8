//! Link checker.
//!
//! Validates stored outbound links. Internal targets are resolved relative
//! to the source document's directory (an optional `#fragment` suffix is
//! stripped); anchors within the same document are always `ok`; external
//! links are left `unknown` — the checker does no network I/O. Every checked
//! row gets a `checked_at` timestamp.

use anyhow::Result;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::models::CheckedLink;

/// Check every stored link and persist the outcome.
pub async fn validate_links(pool: &SqlitePool) -> Result<Vec<CheckedLink>> {
    let rows = sqlx::query(
        "SELECT l.document_id, l.target, l.kind, d.path \
         FROM links l JOIN documents d ON d.id = l.document_id \
         ORDER BY l.document_id ASC, l.target ASC",
    )
    .fetch_all(pool)
    .await?;

    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let mut results = Vec::with_capacity(rows.len());

    for row in &rows {
        let document_id: i64 = row.get("document_id");
        let target: String = row.get("target");
        let kind: String = row.get("kind");
        let doc_path: String = row.get("path");

        let status = match kind.as_str() {
            "internal" => check_internal(Path::new(&doc_path), &target),
            "anchor" => "ok",
            _ => "unknown",
        };

        sqlx::query(
            "UPDATE links SET status = ?, checked_at = ? WHERE document_id = ? AND target = ?",
        )
        .bind(status)
        .bind(now)
        .bind(document_id)
        .bind(&target)
        .execute(pool)
        .await?;

        results.push(CheckedLink {
            document_id,
            target,
            kind,
            status: status.to_string(),
        });
    }

    Ok(results)
}

/// Resolve an internal target against the source document's directory.
///
/// Empty and anchor-only targets are `ok`; a `#fragment` suffix is ignored.
pub fn check_internal(doc_path: &Path, target: &str) -> &'static str {
    let without_fragment = target.split('#').next().unwrap_or("");
    if without_fragment.is_empty() {
        return "ok";
    }

    let base = doc_path.parent().unwrap_or_else(|| Path::new("."));
    if base.join(without_fragment).exists() {
        "ok"
    } else {
        "broken"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::Embedder;
    use crate::parser::parse_markdown;
    use crate::schema::initialize_database;
    use crate::store::upsert_document;

    #[tokio::test]
    async fn test_validate_marks_internal_ok_and_broken() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
        initialize_database(&pool).await.unwrap();

        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("exists.md"), "# Exists").unwrap();

        let source = docs.join("source.md");
        std::fs::write(&source, "# S\n[good](./exists.md) [bad](./missing.md)").unwrap();
        let parsed = parse_markdown(&std::fs::read_to_string(&source).unwrap(), &source);
        upsert_document(&pool, &Embedder::fallback(), &source, &parsed)
            .await
            .unwrap();

        let results = validate_links(&pool).await.unwrap();
        let status_of = |target: &str| {
            results
                .iter()
                .find(|l| l.target == target)
                .map(|l| l.status.clone())
                .unwrap()
        };
        assert_eq!(status_of("./exists.md"), "ok");
        assert_eq!(status_of("./missing.md"), "broken");

        let rows = sqlx::query("SELECT checked_at FROM links").fetch_all(&pool).await.unwrap();
        for row in rows {
            let checked_at: Option<f64> = row.get("checked_at");
            assert!(checked_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_validate_empty_database_returns_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
        initialize_database(&pool).await.unwrap();
        assert!(validate_links(&pool).await.unwrap().is_empty());
    }

    #[test]
    fn test_check_internal_anchor_only_is_ok() {
        assert_eq!(check_internal(Path::new("/some/doc.md"), "#section"), "ok");
    }

    #[test]
    fn test_check_internal_empty_target_is_ok() {
        assert_eq!(check_internal(Path::new("/some/doc.md"), ""), "ok");
    }

    #[test]
    fn test_check_internal_strips_fragment() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc = tmp.path().join("doc.md");
        std::fs::write(&doc, "# Doc").unwrap();
        std::fs::write(tmp.path().join("target.md"), "# Target").unwrap();
        assert_eq!(check_internal(&doc, "target.md#section"), "ok");
    }

    #[test]
    fn test_check_internal_missing_is_broken() {
        let tmp = tempfile::TempDir::new().unwrap();
        let doc = tmp.path().join("doc.md");
        std::fs::write(&doc, "# Doc").unwrap();
        assert_eq!(check_internal(&doc, "nope.md"), "broken");
    }
}
