//! # Markdown Keeper
//!
//! **A local-first Markdown indexing service with durable ingestion and
//! semantic search.**
//!
//! Markdown Keeper watches one or more filesystem roots, maintains a durable
//! SQLite index of Markdown documents (title, headings, tags, categories,
//! concepts, links, content chunks, and dense vector embeddings), and answers
//! semantic and structured queries over a small local HTTP RPC surface.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Watcher        │──▶│ Event queue │──▶│  SQLite   │
//! │ snapshot+notify│   │  (durable)  │   │ docs+vecs │
//! └───────────────┘   └─────────────┘   └────┬─────┘
//!                                            │
//!                        ┌───────────────────┤
//!                        ▼                   ▼
//!                   ┌──────────┐       ┌──────────┐
//!                   │   CLI    │       │   HTTP   │
//!                   │  (mdk)   │       │  (RPC)   │
//!                   └──────────┘       └──────────┘
//! ```
//!
//! ## Data Flow
//!
//! 1. The **watcher** ([`watcher`]) reconciles the roots against the index at
//!    startup (snapshot/diff) and captures live change/delete/move events.
//! 2. Observations land in the **durable event queue** ([`queue`]), which
//!    coalesces conflicting events per path and survives restarts.
//! 3. The drain turns each event into a parse ([`parser`]), chunking
//!    ([`chunk`]), embedding ([`embedding`]), and an atomic upsert or delete
//!    ([`store`]).
//! 4. The **query engine** ([`search`]) ranks documents by a blend of
//!    document-level and chunk-level cosine similarity.
//! 5. Results are served by the **CLI** (`mdk`) and the **RPC server**
//!    ([`server`]); [`indexer`] and [`links`] derive browsable index files
//!    and link statuses from the same store.
//!
//! ## Quick Start
//!
//! ```bash
//! mdk init                  # create the index database
//! mdk scan                  # one-shot reconcile of the watch roots
//! mdk watch                 # watch loop in the foreground
//! mdk start                 # same, as a background daemon
//! mdk search "pg_dump backup compression"
//! mdk serve                 # start the RPC server
//! ```

pub mod chunk;
pub mod config;
pub mod daemon;
pub mod db;
pub mod embedding;
pub mod get;
pub mod indexer;
pub mod links;
pub mod models;
pub mod parser;
pub mod queue;
pub mod schema;
pub mod search;
pub mod server;
pub mod store;
pub mod watcher;
