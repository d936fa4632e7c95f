//! Domain types for the preheat state store.
//!
//! These types represent provider instances, preheat history records and
//! the query parameters used to list them. All records are serializable
//! to/from JSON for storage in redb tables.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Unique identifier for a provider instance.
pub type InstanceId = String;

/// Provider-side identifier of a preheat task.
pub type TaskId = String;

/// Health status written when an instance answered its health check.
pub const HEALTH_STATUS_HEALTHY: &str = "healthy";

/// Health status written when an instance could not be checked or
/// reported itself unhealthy.
pub const HEALTH_STATUS_UNHEALTHY: &str = "unhealthy";

/// Replacement shown for credential values outside the store.
pub const REDACTED: &str = "*****";

/// Record fields never matched by keyword or equality filters.
const SECRET_FIELDS: &[&str] = &["auth_data"];

// ── Instance ──────────────────────────────────────────────────────

/// One configured deployment of a distribution provider.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct Metadata {
    /// Unique, immutable after creation.
    pub id: InstanceId,
    /// Provider identifier used to resolve a driver factory.
    pub provider: String,
    /// Service endpoint of this instance.
    pub endpoint: String,
    /// Authentication mode name (`NONE`, `BASIC`, `OAUTH`, `CUSTOM`).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_mode: String,
    /// Credential payload for the auth mode.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub auth_data: HashMap<String, String>,
    /// Last observed health status; empty until the first health sweep.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub status: String,
    pub enabled: bool,
    /// Unix timestamp of instance set-up.
    #[serde(default)]
    pub setup_timestamp: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extensions: HashMap<String, String>,
}

impl Metadata {
    /// Copy with every `auth_data` value masked. Keys are kept so callers
    /// can still see which credential fields are configured.
    pub fn redacted(&self) -> Metadata {
        let mut meta = self.clone();
        for value in meta.auth_data.values_mut() {
            *value = REDACTED.to_string();
        }
        meta
    }
}

// ── History ───────────────────────────────────────────────────────

/// Durable record of one preheat task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct HistoryRecord {
    /// Maps to the provider's own task ID.
    pub task_id: TaskId,
    pub image: String,
    pub timestamp: i64,
    /// String form of [`TrackStatus`].
    pub status: String,
    pub provider: String,
    pub instance: InstanceId,
    /// Unix timestamp the provider reported the task started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<i64>,
    /// Unix timestamp the provider reported the task finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_time: Option<i64>,
}

impl HistoryRecord {
    /// Check that every required field is populated.
    ///
    /// The error lists each missing field, not just the first one.
    pub fn validate(&self) -> Result<(), StateError> {
        let required = [
            ("TaskID", self.task_id.is_empty()),
            ("Image", self.image.is_empty()),
            ("Timestamp", self.timestamp == 0),
            ("Status", self.status.is_empty()),
            ("Provider", self.provider.is_empty()),
            ("Instance", self.instance.is_empty()),
        ];

        let missing: Vec<String> = required
            .iter()
            .filter(|(_, absent)| *absent)
            .map(|(name, _)| name.to_string())
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(StateError::Validation(missing))
        }
    }

    /// Parsed status, if the stored string is one of the known values.
    pub fn track_status(&self) -> Option<TrackStatus> {
        self.status.parse().ok()
    }
}

/// Lifecycle status of a tracked preheat task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrackStatus {
    Pending,
    Running,
    Success,
    Fail,
}

impl TrackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackStatus::Pending => "PENDING",
            TrackStatus::Running => "RUNNING",
            TrackStatus::Success => "SUCCESS",
            TrackStatus::Fail => "FAIL",
        }
    }

    pub fn success(&self) -> bool {
        *self == TrackStatus::Success
    }

    pub fn fail(&self) -> bool {
        *self == TrackStatus::Fail
    }

    /// Terminal: no further polling happens once reached.
    pub fn done(&self) -> bool {
        self.success() || self.fail()
    }

    /// Whether `s` names one of the four statuses.
    pub fn valid(s: &str) -> bool {
        s.parse::<TrackStatus>().is_ok()
    }
}

impl fmt::Display for TrackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackStatus {
    type Err = StateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TrackStatus::Pending),
            "RUNNING" => Ok(TrackStatus::Running),
            "SUCCESS" => Ok(TrackStatus::Success),
            "FAIL" => Ok(TrackStatus::Fail),
            other => Err(StateError::InvalidStatus(other.to_string())),
        }
    }
}

// ── Query ─────────────────────────────────────────────────────────

/// Parameters for listing instances or history records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryParam {
    /// 1-based page number; 0 is treated as the first page.
    #[serde(default)]
    pub page: usize,
    /// Page size; 0 disables pagination.
    #[serde(default)]
    pub page_size: usize,
    /// Case-insensitive substring matched against string fields.
    #[serde(default)]
    pub keyword: Option<String>,
    /// Field name → expected value equality filters.
    #[serde(default)]
    pub additions: HashMap<String, serde_json::Value>,
}

impl QueryParam {
    /// Whether a stored JSON record passes the keyword and addition filters.
    pub fn matches(&self, record: &serde_json::Value) -> bool {
        if let Some(keyword) = self.keyword.as_deref().filter(|k| !k.is_empty()) {
            let keyword = keyword.to_lowercase();
            let found = match record {
                serde_json::Value::Object(map) => map
                    .iter()
                    .filter(|(field, _)| !SECRET_FIELDS.contains(&field.as_str()))
                    .any(|(_, v)| contains_keyword(v, &keyword)),
                other => contains_keyword(other, &keyword),
            };
            if !found {
                return false;
            }
        }

        self.additions.iter().all(|(field, want)| {
            !SECRET_FIELDS.contains(&field.as_str())
                && record
                    .get(field)
                    .is_some_and(|have| field_matches(have, want))
        })
    }

    /// Slice a filtered result set down to the requested page.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        if self.page_size == 0 {
            return items;
        }
        let page = self.page.max(1);
        items
            .into_iter()
            .skip((page - 1) * self.page_size)
            .take(self.page_size)
            .collect()
    }
}

fn contains_keyword(value: &serde_json::Value, keyword: &str) -> bool {
    match value {
        serde_json::Value::String(s) => s.to_lowercase().contains(keyword),
        serde_json::Value::Object(map) => map.values().any(|v| contains_keyword(v, keyword)),
        serde_json::Value::Array(items) => items.iter().any(|v| contains_keyword(v, keyword)),
        _ => false,
    }
}

/// Query strings carry every value as text, so `"true"` matches `true`.
fn field_matches(have: &serde_json::Value, want: &serde_json::Value) -> bool {
    if have == want {
        return true;
    }
    match (have, want) {
        (serde_json::Value::String(_), _) => false,
        (other, serde_json::Value::String(text)) => other.to_string() == *text,
        _ => false,
    }
}
