//! Durable event queue.
//!
//! Pending change/delete events live in the `events` table so that a crash
//! between capture and processing cannot lose work. Enqueueing coalesces
//! conflicting events per path (at most one `queued` row per path at any
//! time); draining processes events in id order and records the outcome on
//! each row.

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};

use crate::embedding::Embedder;
use crate::models::DrainResult;
use crate::parser::parse_markdown;
use crate::store;

/// Storage errors are retried on later drains up to this many attempts.
pub const MAX_ATTEMPTS: i64 = 3;

/// Queue change and delete events for the given paths.
///
/// Within a single transaction, any existing `queued` row for a path is
/// replaced by the new event: change-then-delete collapses to delete,
/// delete-then-change collapses to change, repeated changes collapse to one.
/// Empty input is a no-op.
pub async fn enqueue(pool: &SqlitePool, changed: &[PathBuf], deleted: &[PathBuf]) -> Result<()> {
    if changed.is_empty() && deleted.is_empty() {
        return Ok(());
    }

    let now = chrono::Utc::now().timestamp_millis() as f64 / 1000.0;
    let mut tx = pool.begin().await?;

    for (paths, event_type) in [(changed, "change"), (deleted, "delete")] {
        for path in paths {
            let path_str = path.display().to_string();
            sqlx::query("DELETE FROM events WHERE path = ? AND status = 'queued'")
                .bind(&path_str)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "INSERT INTO events (path, event_type, status, enqueued_at, attempts) \
                 VALUES (?, ?, 'queued', ?, 0)",
            )
            .bind(&path_str)
            .bind(event_type)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;
    Ok(())
}

/// Process every `queued` event in ascending id order.
///
/// Each event transitions `queued -> in_progress`, is applied to the store,
/// then moves to `done`. A storage error puts the event back to `queued`
/// (up to [`MAX_ATTEMPTS`]); any other error marks it `failed`. The drain
/// never aborts on a single bad file.
pub async fn drain(pool: &SqlitePool, embedder: &Embedder) -> Result<DrainResult> {
    let pending = sqlx::query(
        "SELECT id, path, event_type, attempts FROM events WHERE status = 'queued' ORDER BY id ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut result = DrainResult::default();

    for row in pending {
        let event_id: i64 = row.get("id");
        let path: String = row.get("path");
        let event_type: String = row.get("event_type");
        let attempts: i64 = row.get("attempts");

        sqlx::query("UPDATE events SET status = 'in_progress' WHERE id = ?")
            .bind(event_id)
            .execute(pool)
            .await?;

        match apply_event(pool, embedder, Path::new(&path), &event_type).await {
            Ok(outcome) => {
                result.merge(outcome);
                sqlx::query("UPDATE events SET status = 'done' WHERE id = ?")
                    .bind(event_id)
                    .execute(pool)
                    .await?;
            }
            Err(e) => {
                let retry = is_storage_error(&e) && attempts + 1 < MAX_ATTEMPTS;
                let status = if retry { "queued" } else { "failed" };
                tracing::warn!(
                    "event {} ({} {}) {}: {:#}",
                    event_id,
                    event_type,
                    path,
                    status,
                    e
                );
                sqlx::query("UPDATE events SET status = ?, attempts = attempts + 1 WHERE id = ?")
                    .bind(status)
                    .bind(event_id)
                    .execute(pool)
                    .await?;
            }
        }
    }

    Ok(result)
}

async fn apply_event(
    pool: &SqlitePool,
    embedder: &Embedder,
    path: &Path,
    event_type: &str,
) -> Result<DrainResult> {
    let mut outcome = DrainResult::default();

    match event_type {
        "change" => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let parsed = parse_markdown(&text, path);
            let (_, created) = store::upsert_document(pool, embedder, path, &parsed).await?;
            if created {
                outcome.created += 1;
            } else {
                outcome.modified += 1;
            }
        }
        "delete" => {
            if store::delete_by_path(pool, path).await? {
                outcome.deleted += 1;
            }
        }
        other => anyhow::bail!("Unknown event type: {}", other),
    }

    Ok(outcome)
}

fn is_storage_error(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| cause.is::<sqlx::Error>())
}

/// Number of events currently in the given status. Used by tests and `mdk scan` reporting.
pub async fn count_events(pool: &SqlitePool, status: &str) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events WHERE status = ?")
        .bind(status)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::schema::initialize_database;

    async fn test_pool(tmp: &tempfile::TempDir) -> SqlitePool {
        let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
        initialize_database(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_enqueue_empty_is_noop() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        enqueue(&pool, &[], &[]).await.unwrap();
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM events")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(total, 0);
    }

    #[tokio::test]
    async fn test_change_then_delete_coalesces_to_delete() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let path = tmp.path().join("flip.md");

        enqueue(&pool, &[path.clone()], &[]).await.unwrap();
        enqueue(&pool, &[], &[path.clone()]).await.unwrap();

        let rows = sqlx::query("SELECT event_type FROM events WHERE status = 'queued'")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("event_type"), "delete");
    }

    #[tokio::test]
    async fn test_delete_then_change_coalesces_to_change() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let path = tmp.path().join("back.md");

        enqueue(&pool, &[], &[path.clone()]).await.unwrap();
        enqueue(&pool, &[path.clone()], &[]).await.unwrap();

        let rows = sqlx::query("SELECT event_type FROM events WHERE status = 'queued'")
            .fetch_all(&pool)
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get::<String, _>("event_type"), "change");
    }

    #[tokio::test]
    async fn test_repeated_changes_keep_one_queued_row() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let path = tmp.path().join("hot.md");

        for _ in 0..5 {
            enqueue(&pool, &[path.clone()], &[]).await.unwrap();
        }

        assert_eq!(count_events(&pool, "queued").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_empty_queue_returns_zero_counts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let result = drain(&pool, &Embedder::fallback()).await.unwrap();
        assert_eq!(result, DrainResult::default());
    }

    #[tokio::test]
    async fn test_drain_processes_change_and_marks_done() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let path = tmp.path().join("queued.md");
        std::fs::write(&path, "# Queued\nbody").unwrap();

        enqueue(&pool, &[path.clone()], &[]).await.unwrap();
        let result = drain(&pool, &Embedder::fallback()).await.unwrap();
        assert_eq!(result.created, 1);

        assert_eq!(count_events(&pool, "queued").await.unwrap(), 0);
        assert_eq!(count_events(&pool, "done").await.unwrap(), 1);

        let docs = store::list_documents(&pool).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert!(docs[0].path.ends_with("queued.md"));
    }

    #[tokio::test]
    async fn test_drain_unreadable_file_marks_failed_and_continues() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let missing = tmp.path().join("missing.md");
        let present = tmp.path().join("present.md");
        std::fs::write(&present, "# Present\nbody").unwrap();

        enqueue(&pool, &[missing, present], &[]).await.unwrap();
        let result = drain(&pool, &Embedder::fallback()).await.unwrap();

        assert_eq!(result.created, 1);
        assert_eq!(count_events(&pool, "failed").await.unwrap(), 1);
        assert_eq!(count_events(&pool, "done").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_drain_delete_for_unknown_path_still_completes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = test_pool(&tmp).await;
        let path = tmp.path().join("never-existed.md");

        enqueue(&pool, &[], &[path]).await.unwrap();
        let result = drain(&pool, &Embedder::fallback()).await.unwrap();

        assert_eq!(result.deleted, 0);
        assert_eq!(count_events(&pool, "done").await.unwrap(), 1);
    }
}
