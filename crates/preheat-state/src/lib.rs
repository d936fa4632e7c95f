//! preheat-state: persistent state for the preheat monitor.
//!
//! Backed by [redb](https://docs.rs/redb), stores provider instance
//! metadata and per-task preheat history records.
//!
//! # Architecture
//!
//! Records are JSON-serialized into redb's `&[u8]` value columns. Keys are
//! namespaced as `{namespace}:{id}` so several deployments can share one
//! database file without colliding.
//!
//! The monitor only sees the [`InstanceStore`] and [`HistoryStore`]
//! contracts; [`StateStore`] implements both and is `Clone` + `Send` +
//! `Sync` (backed by `Arc<Database>`).

pub mod error;
pub mod storage;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use storage::{HistoryStore, InstanceStore};
pub use store::{StateStore, DEFAULT_NAMESPACE};
pub use types::*;
