//! Database schema.
//!
//! Creates all required tables (documents, headings, tags, concepts, chunks,
//! embeddings, links, events) and their indices. Idempotent; run via
//! `mdk init` and again by any entry point that opens a fresh database.

use anyhow::Result;
use sqlx::SqlitePool;

pub async fn initialize_database(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS documents (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            category TEXT,
            modified_at REAL NOT NULL,
            body TEXT NOT NULL,
            content_hash TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS headings (
            document_id INTEGER NOT NULL,
            position INTEGER NOT NULL,
            level INTEGER NOT NULL,
            text TEXT NOT NULL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tags (
            document_id INTEGER NOT NULL,
            tag TEXT NOT NULL,
            UNIQUE(document_id, tag),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS concepts (
            document_id INTEGER NOT NULL,
            concept TEXT NOT NULL,
            UNIQUE(document_id, concept),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            document_id INTEGER NOT NULL,
            ordinal INTEGER NOT NULL,
            text TEXT NOT NULL,
            UNIQUE(document_id, ordinal),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // chunk_ordinal is -1 for document-scoped rows so the uniqueness
    // constraint covers both scopes.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS embeddings (
            scope TEXT NOT NULL CHECK (scope IN ('document', 'chunk')),
            document_id INTEGER NOT NULL,
            chunk_ordinal INTEGER NOT NULL DEFAULT -1,
            model TEXT NOT NULL,
            vector BLOB NOT NULL,
            UNIQUE(scope, document_id, chunk_ordinal),
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS links (
            document_id INTEGER NOT NULL,
            target TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('internal', 'external', 'anchor')),
            status TEXT NOT NULL DEFAULT 'unknown'
                CHECK (status IN ('ok', 'broken', 'unknown')),
            checked_at REAL,
            FOREIGN KEY (document_id) REFERENCES documents(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            path TEXT NOT NULL,
            event_type TEXT NOT NULL CHECK (event_type IN ('change', 'delete')),
            status TEXT NOT NULL DEFAULT 'queued'
                CHECK (status IN ('queued', 'in_progress', 'done', 'failed')),
            enqueued_at REAL NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_headings_document_id ON headings(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_tags_document_id ON tags(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_concepts_document_id ON concepts(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_document_id ON chunks(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_embeddings_document_id ON embeddings(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_links_document_id ON links(document_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_status_id ON events(status, id)")
        .execute(pool)
        .await?;

    Ok(())
}
