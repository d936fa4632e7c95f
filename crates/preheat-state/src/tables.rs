//! redb table definitions for the preheat state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized records).
//! Keys follow the pattern `{namespace}:{id}`.

use redb::TableDefinition;

/// Provider instance metadata keyed by `{namespace}:{instance_id}`.
pub const INSTANCES: TableDefinition<&str, &[u8]> = TableDefinition::new("instances");

/// Preheat history records keyed by `{namespace}:{task_id}`.
pub const HISTORIES: TableDefinition<&str, &[u8]> = TableDefinition::new("histories");
