//! Filesystem watcher.
//!
//! Two complementary mechanisms keep the index reconciled with disk:
//!
//! 1. **Snapshot/diff** — a recursive walk of the configured roots produces a
//!    `path -> mtime` map; diffing against the previous snapshot (or, at
//!    startup, against the snapshot implied by the `documents` table)
//!    classifies paths into changed and deleted.
//! 2. **Live events** — when the platform notifier is available, create,
//!    modify, delete, and move events are buffered by a handler on the
//!    notifier's thread behind a short mutex. The watch loop periodically
//!    flushes that buffer into the durable queue and drains it.
//!
//! Either way, every observation goes through [`crate::queue`] before it
//! touches the store, so a crash between capture and processing loses
//! nothing.

use anyhow::Result;
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::WatchConfig;
use crate::embedding::Embedder;
use crate::models::DrainResult;
use crate::queue;

/// Map of absolute path to filesystem mtime (seconds).
pub type Snapshot = BTreeMap<PathBuf, f64>;

/// Whether `path` carries one of the watched extensions (`.md` style, with
/// the leading dot).
pub fn has_watched_extension(path: &Path, extensions: &[String]) -> bool {
    let ext = match path.extension() {
        Some(e) => format!(".{}", e.to_string_lossy().to_lowercase()),
        None => return false,
    };
    extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext))
}

/// Recursively walk `roots` and collect matching files with their mtimes.
///
/// Nonexistent roots are skipped silently.
pub fn snapshot(roots: &[PathBuf], extensions: &[String]) -> Snapshot {
    let mut snap = Snapshot::new();

    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in walkdir::WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if !has_watched_extension(path, extensions) {
                continue;
            }
            if let Some(mtime) = file_mtime(path) {
                let absolute = path
                    .canonicalize()
                    .unwrap_or_else(|_| path.to_path_buf());
                snap.insert(absolute, mtime);
            }
        }
    }

    snap
}

/// Classify the difference between two snapshots into changed (created or
/// modified) and deleted paths, both in path order.
pub fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> (Vec<PathBuf>, Vec<PathBuf>) {
    let mut changed = Vec::new();
    let mut deleted = Vec::new();

    for (path, mtime) in current {
        match previous.get(path) {
            Some(prev_mtime) if (prev_mtime - mtime).abs() < f64::EPSILON => {}
            _ => changed.push(path.clone()),
        }
    }

    for path in previous.keys() {
        if !current.contains_key(path) {
            deleted.push(path.clone());
        }
    }

    (changed, deleted)
}

/// The snapshot implied by the `documents` table, used to reconcile at
/// startup without any persisted snapshot file.
pub async fn snapshot_from_index(pool: &SqlitePool) -> Result<Snapshot> {
    let rows = sqlx::query("SELECT path, modified_at FROM documents")
        .fetch_all(pool)
        .await?;

    let mut snap = Snapshot::new();
    for row in &rows {
        let path: String = row.get("path");
        let mtime: f64 = row.get("modified_at");
        snap.insert(PathBuf::from(path), mtime);
    }
    Ok(snap)
}

/// One-shot reconcile: snapshot the roots, diff against `previous` (or the
/// index when `None`), enqueue the difference, and drain the queue.
///
/// Returns the fresh snapshot and the drain counters. The drain may also
/// consume events persisted before a previous shutdown.
pub async fn watch_once(
    pool: &SqlitePool,
    embedder: &Embedder,
    roots: &[PathBuf],
    extensions: &[String],
    previous: Option<&Snapshot>,
) -> Result<(Snapshot, DrainResult)> {
    let previous = match previous {
        Some(snap) => snap.clone(),
        None => snapshot_from_index(pool).await?,
    };

    let current = snapshot(roots, extensions);
    let (changed, deleted) = diff_snapshots(&previous, &current);

    queue::enqueue(pool, &changed, &deleted).await?;
    let result = queue::drain(pool, embedder).await?;

    Ok((current, result))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingKind {
    Change,
    Delete,
}

/// Buffers notifier events on the notifier's thread.
///
/// The notifier callback only appends under a short mutex; the watch loop
/// owns draining the buffer. Directory events and foreign extensions are
/// dropped at record time.
#[derive(Clone)]
pub struct WatchHandler {
    extensions: Vec<String>,
    pending: Arc<Mutex<Vec<(PathBuf, PendingKind)>>>,
}

impl WatchHandler {
    pub fn new(extensions: Vec<String>) -> Self {
        Self {
            extensions,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn record_change(&self, path: &Path) {
        self.record(path, PendingKind::Change);
    }

    pub fn record_delete(&self, path: &Path) {
        self.record(path, PendingKind::Delete);
    }

    fn record(&self, path: &Path, kind: PendingKind) {
        if !has_watched_extension(path, &self.extensions) {
            return;
        }
        let mut pending = self.pending.lock().expect("pending events lock");
        pending.push((path.to_path_buf(), kind));
    }

    /// Translate a notifier event into buffered changes/deletes.
    ///
    /// A move records one delete for the old path and one change for the new
    /// path, in that order.
    pub fn handle_event(&self, event: &notify::Event) {
        match &event.kind {
            EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {}
            EventKind::Create(_) | EventKind::Modify(ModifyKind::Data(_) | ModifyKind::Any) => {
                for path in &event.paths {
                    self.record_change(path);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => match mode {
                RenameMode::From => {
                    for path in &event.paths {
                        self.record_delete(path);
                    }
                }
                RenameMode::To => {
                    for path in &event.paths {
                        self.record_change(path);
                    }
                }
                _ => {
                    if event.paths.len() == 2 {
                        self.record_delete(&event.paths[0]);
                        self.record_change(&event.paths[1]);
                    } else {
                        // Ambiguous rename: re-check existence per path.
                        for path in &event.paths {
                            if path.exists() {
                                self.record_change(path);
                            } else {
                                self.record_delete(path);
                            }
                        }
                    }
                }
            },
            EventKind::Remove(_) => {
                for path in &event.paths {
                    self.record_delete(path);
                }
            }
            _ => {}
        }
    }

    /// Drain the buffer, coalescing to the last-recorded kind per path.
    ///
    /// Returns `(changed, deleted)` in first-seen order.
    pub fn take_pending(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let drained: Vec<(PathBuf, PendingKind)> = {
            let mut pending = self.pending.lock().expect("pending events lock");
            std::mem::take(&mut *pending)
        };

        let mut order: Vec<PathBuf> = Vec::new();
        let mut last: BTreeMap<PathBuf, PendingKind> = BTreeMap::new();
        for (path, kind) in drained {
            if !last.contains_key(&path) {
                order.push(path.clone());
            }
            last.insert(path, kind);
        }

        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for path in order {
            match last[&path] {
                PendingKind::Change => changed.push(path),
                PendingKind::Delete => deleted.push(path),
            }
        }
        (changed, deleted)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().expect("pending events lock").len()
    }
}

/// Whether a platform notifier can be constructed at all.
pub fn is_notifier_available() -> bool {
    notify::recommended_watcher(|_: notify::Result<notify::Event>| {}).is_ok()
}

fn start_notifier(roots: &[PathBuf], handler: &WatchHandler) -> Option<RecommendedWatcher> {
    let callback_handler = handler.clone();
    let mut watcher = match notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => callback_handler.handle_event(&event),
            Err(e) => tracing::warn!("notifier error: {}", e),
        }
    }) {
        Ok(w) => w,
        Err(e) => {
            tracing::warn!("notifier unavailable, falling back to polling: {}", e);
            return None;
        }
    };

    for root in roots {
        if !root.exists() {
            continue;
        }
        if let Err(e) = watcher.watch(root, RecursiveMode::Recursive) {
            tracing::warn!("cannot watch {}: {}", root.display(), e);
        }
    }

    Some(watcher)
}

/// Flush the handler buffer into the queue and drain it.
pub async fn flush_pending(
    pool: &SqlitePool,
    embedder: &Embedder,
    handler: &WatchHandler,
) -> Result<DrainResult> {
    let (changed, deleted) = handler.take_pending();
    queue::enqueue(pool, &changed, &deleted).await?;
    queue::drain(pool, embedder).await
}

/// Run the watch loop: reconcile at startup, then tick.
///
/// With a live notifier each tick sleeps the debounce window and flushes the
/// handler buffer; without one each tick sleeps `interval_s` and re-runs the
/// snapshot diff. `iterations` bounds the tick count for tests; `None` runs
/// until the process exits (the queue is durable, so termination between
/// events is safe).
pub async fn watch_loop(
    pool: &SqlitePool,
    embedder: &Embedder,
    watch: &WatchConfig,
    interval_s: f64,
    iterations: Option<u64>,
) -> Result<DrainResult> {
    let mut total = DrainResult::default();

    let (mut snap, startup) =
        watch_once(pool, embedder, &watch.roots, &watch.extensions, None).await?;
    total.merge(startup);
    tracing::info!(
        "startup reconcile: created={} modified={} deleted={}",
        startup.created,
        startup.modified,
        startup.deleted
    );

    let handler = WatchHandler::new(watch.extensions.clone());
    let notifier = start_notifier(&watch.roots, &handler);
    let live = notifier.is_some();

    let tick = if live {
        Duration::from_millis(watch.debounce_ms.max(1))
    } else {
        Duration::from_secs_f64(interval_s.max(0.01))
    };

    let mut remaining = iterations;
    loop {
        if remaining == Some(0) {
            break;
        }

        tokio::time::sleep(tick).await;

        if live {
            let flushed = flush_pending(pool, embedder, &handler).await?;
            total.merge(flushed);
        } else {
            let (new_snap, result) =
                watch_once(pool, embedder, &watch.roots, &watch.extensions, Some(&snap)).await?;
            snap = new_snap;
            total.merge(result);
        }

        if let Some(n) = remaining.as_mut() {
            *n -= 1;
            if *n == 0 {
                break;
            }
        }
    }

    drop(notifier);
    Ok(total)
}

fn file_mtime(path: &Path) -> Option<f64> {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(std::time::SystemTime::UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
}
