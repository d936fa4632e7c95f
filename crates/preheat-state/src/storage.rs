//! Storage contracts consumed by the monitor.
//!
//! Each operation is a separate read or write; no transaction spans a
//! caller's read-then-update pair, so two concurrent writers to the same
//! key resolve as last-write-wins.

use crate::error::StateResult;
use crate::types::{HistoryRecord, Metadata, QueryParam, TrackStatus};

/// Persists and reads provider instance metadata keyed by instance ID.
pub trait InstanceStore: Send + Sync {
    /// Fetch one instance. Missing IDs are [`StateError::NotFound`](crate::StateError::NotFound).
    fn get(&self, id: &str) -> StateResult<Metadata>;

    /// List instances, optionally filtered and paginated.
    fn list(&self, params: Option<&QueryParam>) -> StateResult<Vec<Metadata>>;

    /// Replace an existing instance record.
    fn update(&self, meta: &Metadata) -> StateResult<()>;

    /// Create or replace an instance record.
    fn save(&self, meta: &Metadata) -> StateResult<()>;

    /// Remove an instance. Returns true if it existed.
    fn delete(&self, id: &str) -> StateResult<bool>;
}

/// Persists and reads preheat history records keyed by task ID.
pub trait HistoryStore: Send + Sync {
    /// Validate and store a new record.
    fn append_history(&self, record: &HistoryRecord) -> StateResult<()>;

    /// Rewrite the status of a stored record, keeping every other field.
    ///
    /// `None` timestamps leave the stored values untouched.
    fn update_status(
        &self,
        task_id: &str,
        status: TrackStatus,
        start_time: Option<i64>,
        finish_time: Option<i64>,
    ) -> StateResult<()>;

    /// List records, optionally filtered and paginated.
    fn load_histories(&self, params: Option<&QueryParam>) -> StateResult<Vec<HistoryRecord>>;

    /// Fetch one record by task ID.
    fn get_history(&self, task_id: &str) -> StateResult<HistoryRecord>;
}
