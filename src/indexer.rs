//! Markdown index file generator.
//!
//! Writes human-browsable index files derived from the database: a master
//! listing plus by-category, by-tag, and by-concept groupings. Files land in
//! the given output directory (`master.md`, `by-category.md`, `by-tag.md`,
//! `by-concept.md`).

use anyhow::{Context, Result};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

const SUMMARY_CHARS: usize = 150;

/// Generate all four index files; returns their paths.
pub async fn generate_all_indexes(pool: &SqlitePool, out_dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(vec![
        generate_master_index(pool, out_dir).await?,
        generate_category_index(pool, out_dir).await?,
        generate_tag_index(pool, out_dir).await?,
        generate_concept_index(pool, out_dir).await?,
    ])
}

/// `master.md`: every document with title, path, and a one-line summary.
pub async fn generate_master_index(pool: &SqlitePool, out_dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query("SELECT path, title, body FROM documents ORDER BY title ASC")
        .fetch_all(pool)
        .await?;

    let mut content = String::from("# Document Index\n\n");
    if rows.is_empty() {
        content.push_str("No indexed documents found.\n");
    } else {
        for row in &rows {
            let title: String = row.get("title");
            let path: String = row.get("path");
            let body: String = row.get("body");
            let summary = summarize(&body);
            if summary.is_empty() {
                let _ = writeln!(content, "- [{}]({})", title, path);
            } else {
                let _ = writeln!(content, "- [{}]({}): {}", title, path, summary);
            }
        }
    }

    write_index(out_dir, "master.md", &content)
}

/// `by-category.md`: documents grouped by their category.
pub async fn generate_category_index(pool: &SqlitePool, out_dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query(
        "SELECT path, title, COALESCE(category, 'uncategorized') AS category \
         FROM documents ORDER BY category ASC, title ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for row in &rows {
        groups
            .entry(row.get("category"))
            .or_default()
            .push((row.get("title"), row.get("path")));
    }

    let content = grouped_index("Documents by Category", &groups, "No indexed documents found.");
    write_index(out_dir, "by-category.md", &content)
}

/// `by-tag.md`: documents grouped by tag.
pub async fn generate_tag_index(pool: &SqlitePool, out_dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query(
        "SELECT t.tag, d.title, d.path FROM tags t \
         JOIN documents d ON d.id = t.document_id \
         ORDER BY t.tag ASC, d.title ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for row in &rows {
        groups
            .entry(row.get("tag"))
            .or_default()
            .push((row.get("title"), row.get("path")));
    }

    let content = grouped_index("Documents by Tag", &groups, "No tagged documents found.");
    write_index(out_dir, "by-tag.md", &content)
}

/// `by-concept.md`: documents grouped by concept.
pub async fn generate_concept_index(pool: &SqlitePool, out_dir: &Path) -> Result<PathBuf> {
    let rows = sqlx::query(
        "SELECT c.concept, d.title, d.path FROM concepts c \
         JOIN documents d ON d.id = c.document_id \
         ORDER BY c.concept ASC, d.title ASC",
    )
    .fetch_all(pool)
    .await?;

    let mut groups: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
    for row in &rows {
        groups
            .entry(row.get("concept"))
            .or_default()
            .push((row.get("title"), row.get("path")));
    }

    let content = grouped_index("Documents by Concept", &groups, "No concept mappings found.");
    write_index(out_dir, "by-concept.md", &content)
}

fn grouped_index(
    heading: &str,
    groups: &BTreeMap<String, Vec<(String, String)>>,
    placeholder: &str,
) -> String {
    let mut content = format!("# {}\n\n", heading);
    if groups.is_empty() {
        content.push_str(placeholder);
        content.push('\n');
        return content;
    }

    for (group, entries) in groups {
        let _ = writeln!(content, "## {}\n", group);
        for (title, path) in entries {
            let _ = writeln!(content, "- [{}]({})", title, path);
        }
        content.push('\n');
    }
    content
}

fn summarize(body: &str) -> String {
    let flat = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join(" ");
    flat.chars().take(SUMMARY_CHARS).collect()
}

fn write_index(out_dir: &Path, name: &str, content: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create {}", out_dir.display()))?;
    let path = out_dir.join(name);
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::embedding::Embedder;
    use crate::parser::parse_markdown;
    use crate::schema::initialize_database;
    use crate::store::upsert_document;

    async fn empty_pool(tmp: &tempfile::TempDir) -> SqlitePool {
        let pool = db::connect(&tmp.path().join("index.db")).await.unwrap();
        initialize_database(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_generate_all_writes_expected_files() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = empty_pool(&tmp).await;
        let doc = tmp.path().join("a.md");
        std::fs::write(
            &doc,
            "---\ntags: api\ncategory: guides\nconcepts: kubernetes\n---\n# Alpha\nbody",
        )
        .unwrap();
        let parsed = parse_markdown(&std::fs::read_to_string(&doc).unwrap(), &doc);
        upsert_document(&pool, &Embedder::fallback(), &doc, &parsed)
            .await
            .unwrap();

        let out_dir = tmp.path().join("_index");
        let outs = generate_all_indexes(&pool, &out_dir).await.unwrap();
        assert_eq!(outs.len(), 4);
        assert!(out_dir.join("master.md").exists());
        assert!(out_dir.join("by-category.md").exists());
        assert!(out_dir.join("by-tag.md").exists());
        assert!(out_dir.join("by-concept.md").exists());

        let master = std::fs::read_to_string(out_dir.join("master.md")).unwrap();
        assert!(master.contains("Alpha"));
        let by_tag = std::fs::read_to_string(out_dir.join("by-tag.md")).unwrap();
        assert!(by_tag.contains("## api"));
    }

    #[tokio::test]
    async fn test_empty_database_placeholders() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = empty_pool(&tmp).await;
        let out_dir = tmp.path().join("_index");

        let master = generate_master_index(&pool, &out_dir).await.unwrap();
        assert!(std::fs::read_to_string(master)
            .unwrap()
            .contains("No indexed documents found"));

        let category = generate_category_index(&pool, &out_dir).await.unwrap();
        assert!(std::fs::read_to_string(category)
            .unwrap()
            .contains("No indexed documents found"));

        let tag = generate_tag_index(&pool, &out_dir).await.unwrap();
        assert!(std::fs::read_to_string(tag)
            .unwrap()
            .contains("No tagged documents found"));

        let concept = generate_concept_index(&pool, &out_dir).await.unwrap();
        assert!(std::fs::read_to_string(concept)
            .unwrap()
            .contains("No concept mappings found"));
    }

    #[tokio::test]
    async fn test_master_index_includes_summary() {
        let tmp = tempfile::TempDir::new().unwrap();
        let pool = empty_pool(&tmp).await;
        let doc = tmp.path().join("test.md");
        std::fs::write(&doc, "# My Document\nThis is the summary content.").unwrap();
        let parsed = parse_markdown(&std::fs::read_to_string(&doc).unwrap(), &doc);
        upsert_document(&pool, &Embedder::fallback(), &doc, &parsed)
            .await
            .unwrap();

        let out = generate_master_index(&pool, &tmp.path().join("_index")).await.unwrap();
        let content = std::fs::read_to_string(out).unwrap();
        assert!(content.contains("My Document"));
        assert!(content.contains("summary content"));
    }
}
