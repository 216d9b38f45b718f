//! Offline-first shiny-hunt tracking with optimistic local state and queued
//! remote synchronization.
//!
//! User actions mutate the local snapshot immediately and enqueue remote
//! operations that coalesce per field; the engine drains the queue and
//! re-merges server truth when connectivity returns, without losing offline
//! work or double-applying writes.
//!
//! # Examples
//!
//! In-memory usage with [`core::store::HuntStore`]:
//! ```
//! use huntlog::{
//!     core::store::HuntStore,
//!     hunt::{HuntDraft, HuntPatch},
//!     op::PendingOp,
//! };
//!
//! let mut store = HuntStore::new();
//! let id = store.insert_local(HuntDraft {
//!     species_name: "pikachu".to_string(),
//!     game: "Yellow".to_string(),
//!     sprite_url: String::new(),
//!     types: vec!["electric".to_string()],
//!     target_count: None,
//! });
//!
//! // Two taps while offline coalesce into a single queued update.
//! let count = store.adjust_count(id, 1).expect("adjust");
//! store.enqueue(PendingOp::update(id, HuntPatch::count(count)));
//! let count = store.adjust_count(id, 1).expect("adjust");
//! store.enqueue(PendingOp::update(id, HuntPatch::count(count)));
//!
//! assert_eq!(count, 2);
//! assert_eq!(store.queue_len(), 1);
//! ```
//!
//! Runtime usage with the SQLite sink and the HTTP remote:
//! ```no_run
//! use std::sync::Arc;
//!
//! use huntlog::{
//!     persist::sqlite::SqliteStateSink,
//!     remote::http::HttpRemote,
//!     runtime::handle::{RuntimeConfig, spawn_huntlog},
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let sink = SqliteStateSink::open("huntlog.db").expect("open sqlite");
//! let store = sink.load_store().expect("load");
//! let remote = Arc::new(HttpRemote::new("https://hunts.example/api"));
//!
//! let handle = spawn_huntlog(store, Some(Box::new(sink)), remote, RuntimeConfig::default());
//! handle.set_online(true).await.expect("online");
//! handle.shutdown().await.expect("shutdown");
//! # }
//! ```
#![deny(missing_docs)]

/// In-memory authoritative store.
pub mod core;
/// Hunt domain records, drafts, and patches.
pub mod hunt;
/// Pending mutation model and persistence wrapper types.
pub mod op;
/// Persistence abstraction and SQLite implementation.
pub mod persist;
/// Remote authority contract and HTTP client.
pub mod remote;
/// Single-writer runtime handle and events.
pub mod runtime;
/// Species reference lookup with client-side caching.
pub mod species;
/// Pure projections for user-visible aggregates.
pub mod stats;
/// Shared primitive types.
pub mod types;
