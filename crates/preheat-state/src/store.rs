//! StateStore: redb-backed persistence for instances and preheat history.
//!
//! All values are JSON-serialized into redb's `&[u8]` value columns under
//! `{namespace}:{id}` keys. The store supports both on-disk and in-memory
//! backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{StateError, StateResult};
use crate::storage::{HistoryStore, InstanceStore};
use crate::tables::*;
use crate::types::*;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "preheat";

type JsonTable = TableDefinition<'static, &'static str, &'static [u8]>;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    namespace: Arc<str>,
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path, namespace: &str) -> StateResult<Self> {
        check_namespace(namespace)?;
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            namespace: Arc::from(namespace),
        };
        store.ensure_tables()?;
        debug!(?path, %namespace, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        Self::open_in_memory_with_namespace(DEFAULT_NAMESPACE)
    }

    /// Create an ephemeral in-memory state store under a specific namespace.
    pub fn open_in_memory_with_namespace(namespace: &str) -> StateResult<Self> {
        check_namespace(namespace)?;
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self {
            db: Arc::new(db),
            namespace: Arc::from(namespace),
        };
        store.ensure_tables()?;
        debug!(%namespace, "in-memory state store opened");
        Ok(store)
    }

    /// The key namespace this store reads and writes under.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(INSTANCES).map_err(map_err!(Table))?;
        txn.open_table(HISTORIES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn key(&self, id: &str) -> String {
        format!("{}:{}", self.namespace, id)
    }

    // ── Generic JSON helpers ───────────────────────────────────────

    fn put_json<T: Serialize>(&self, table: JsonTable, id: &str, value: &T) -> StateResult<()> {
        let key = self.key(id);
        let bytes = serde_json::to_vec(value).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn get_json<T: DeserializeOwned>(&self, table: JsonTable, id: &str) -> StateResult<Option<T>> {
        let key = self.key(id);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        match table.get(key.as_str()).map_err(map_err!(Read))? {
            Some(guard) => {
                let value: T =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Read-modify-write one record inside a single write transaction.
    fn modify_json<T, F>(&self, table: JsonTable, id: &str, modify: F) -> StateResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let key = self.key(id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let updated = {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            let mut current: T = {
                let guard = table
                    .get(key.as_str())
                    .map_err(map_err!(Read))?
                    .ok_or_else(|| StateError::NotFound(id.to_string()))?;
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
            };
            modify(&mut current);
            let bytes = serde_json::to_vec(&current).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), bytes.as_slice())
                .map_err(map_err!(Write))?;
            current
        };
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(updated)
    }

    fn list_json<T: DeserializeOwned>(
        &self,
        table: JsonTable,
        params: Option<&QueryParam>,
    ) -> StateResult<Vec<T>> {
        let prefix = format!("{}:", self.namespace);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                continue;
            }
            let raw: serde_json::Value =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            if params.is_some_and(|p| !p.matches(&raw)) {
                continue;
            }
            let record: T = serde_json::from_value(raw).map_err(map_err!(Deserialize))?;
            results.push(record);
        }
        Ok(match params {
            Some(p) => p.paginate(results),
            None => results,
        })
    }

    fn remove(&self, table: JsonTable, id: &str) -> StateResult<bool> {
        let key = self.key(id);
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(table).map_err(map_err!(Table))?;
            existed = table.remove(key.as_str()).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(existed)
    }
}

fn check_namespace(namespace: &str) -> StateResult<()> {
    if namespace.is_empty() {
        return Err(StateError::EmptyKey("store namespace"));
    }
    if namespace.contains(':') {
        return Err(StateError::InvalidNamespace(namespace.to_string()));
    }
    Ok(())
}

// ── Instances ──────────────────────────────────────────────────────

impl InstanceStore for StateStore {
    fn get(&self, id: &str) -> StateResult<Metadata> {
        if id.is_empty() {
            return Err(StateError::EmptyKey("instance ID"));
        }
        self.get_json(INSTANCES, id)?
            .ok_or_else(|| StateError::NotFound(format!("instance {id}")))
    }

    fn list(&self, params: Option<&QueryParam>) -> StateResult<Vec<Metadata>> {
        self.list_json(INSTANCES, params)
    }

    fn update(&self, meta: &Metadata) -> StateResult<()> {
        if meta.id.is_empty() {
            return Err(StateError::EmptyKey("instance ID"));
        }
        let replacement = meta.clone();
        self.modify_json::<Metadata, _>(INSTANCES, &meta.id, |current| *current = replacement)
            .map_err(|e| match e {
                StateError::NotFound(id) => StateError::NotFound(format!("instance {id}")),
                other => other,
            })?;
        debug!(instance_id = %meta.id, status = %meta.status, "instance updated");
        Ok(())
    }

    fn save(&self, meta: &Metadata) -> StateResult<()> {
        if meta.id.is_empty() {
            return Err(StateError::EmptyKey("instance ID"));
        }
        if meta.provider.is_empty() {
            return Err(StateError::EmptyKey("instance provider"));
        }
        self.put_json(INSTANCES, &meta.id, meta)?;
        debug!(instance_id = %meta.id, provider = %meta.provider, "instance stored");
        Ok(())
    }

    fn delete(&self, id: &str) -> StateResult<bool> {
        let existed = self.remove(INSTANCES, id)?;
        debug!(instance_id = %id, existed, "instance deleted");
        Ok(existed)
    }
}

// ── Histories ──────────────────────────────────────────────────────

impl HistoryStore for StateStore {
    fn append_history(&self, record: &HistoryRecord) -> StateResult<()> {
        record.validate()?;
        if !TrackStatus::valid(&record.status) {
            return Err(StateError::InvalidStatus(record.status.clone()));
        }
        self.put_json(HISTORIES, &record.task_id, record)?;
        debug!(task_id = %record.task_id, image = %record.image, "history appended");
        Ok(())
    }

    fn update_status(
        &self,
        task_id: &str,
        status: TrackStatus,
        start_time: Option<i64>,
        finish_time: Option<i64>,
    ) -> StateResult<()> {
        if task_id.is_empty() {
            return Err(StateError::EmptyKey("task ID of history record"));
        }
        self.modify_json::<HistoryRecord, _>(HISTORIES, task_id, |record| {
            record.status = status.to_string();
            if start_time.is_some() {
                record.start_time = start_time;
            }
            if finish_time.is_some() {
                record.finish_time = finish_time;
            }
        })
        .map_err(|e| match e {
            StateError::NotFound(id) => StateError::NotFound(format!("history record {id}")),
            other => other,
        })?;
        debug!(%task_id, %status, "history status updated");
        Ok(())
    }

    fn load_histories(&self, params: Option<&QueryParam>) -> StateResult<Vec<HistoryRecord>> {
        self.list_json(HISTORIES, params)
    }

    fn get_history(&self, task_id: &str) -> StateResult<HistoryRecord> {
        if task_id.is_empty() {
            return Err(StateError::EmptyKey("task ID of history record"));
        }
        self.get_json(HISTORIES, task_id)?
            .ok_or_else(|| StateError::NotFound(format!("history record {task_id}")))
    }
}
