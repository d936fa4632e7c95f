//! Dragonfly supernode driver.
//!
//! Health is the supernode's `/_ping` endpoint; task progress comes from
//! `/preheats/{id}`, whose statuses (`WAITING`, `RUNNING`, `SUCCESS`,
//! `FAILED`) map onto [`TrackStatus`].

use std::sync::Arc;

use chrono::DateTime;
use preheat_client::{Credential, HttpClient};
use preheat_state::{Metadata, TrackStatus};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::driver::{Driver, DriverFuture, HealthStatus, ProgressStatus};
use crate::error::{ProviderError, ProviderResult};
use crate::registry::Factory;

/// Provider ID the Dragonfly factory is registered under.
pub const DRAGONFLY_PROVIDER: &str = "dragonfly";

const HEALTH_CHECK_SEGMENT: &str = "_ping";
const PREHEAT_TASK_SEGMENT: &str = "preheats";

/// Factory building [`DragonflyDriver`]s that share `client`.
pub fn dragonfly_factory(client: HttpClient) -> Factory {
    Arc::new(move |instance: &Metadata| -> ProviderResult<Arc<dyn Driver>> {
        Ok(Arc::new(DragonflyDriver::new(instance, client.clone())?))
    })
}

/// Preheat task as returned by the supernode.
#[derive(Debug, Deserialize)]
struct PreheatInfo {
    #[serde(rename = "ID", default)]
    id: String,
    status: String,
    #[serde(rename = "startTime", default)]
    start_time: Option<String>,
    #[serde(rename = "finishTime", default)]
    finish_time: Option<String>,
    #[serde(rename = "errorMsg", default)]
    error_msg: Option<String>,
}

#[derive(Debug)]
pub struct DragonflyDriver {
    instance_id: String,
    endpoint: Url,
    credential: Option<Credential>,
    client: HttpClient,
}

impl DragonflyDriver {
    pub fn new(instance: &Metadata, client: HttpClient) -> ProviderResult<Self> {
        let endpoint = instance.endpoint.trim().trim_end_matches('/');
        if endpoint.is_empty() {
            return Err(ProviderError::InvalidInstance(format!(
                "instance {} has no endpoint",
                instance.id
            )));
        }
        let endpoint = Url::parse(endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                ProviderError::InvalidInstance(format!(
                    "instance {} has invalid endpoint {endpoint:?}",
                    instance.id
                ))
            })?;

        let credential = (!instance.auth_mode.is_empty())
            .then(|| Credential::new(instance.auth_mode.clone(), instance.auth_data.clone()));

        Ok(Self {
            instance_id: instance.id.clone(),
            endpoint,
            credential,
            client,
        })
    }

    /// Endpoint with `segments` appended, each percent-encoded as one
    /// path segment.
    fn url(&self, segments: &[&str]) -> String {
        let mut url = self.endpoint.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url.into()
    }

    async fn fetch_progress(&self, task_id: &str) -> ProviderResult<ProgressStatus> {
        if task_id.is_empty() {
            return Err(ProviderError::Driver("empty preheat task ID".to_string()));
        }
        if task_id == "." || task_id == ".." {
            return Err(ProviderError::Driver(format!("invalid preheat task ID {task_id:?}")));
        }

        let url = self.url(&[PREHEAT_TASK_SEGMENT, task_id]);
        let body = self
            .client
            .get(&url, self.credential.as_ref(), &[], &[])
            .await?;
        let info: PreheatInfo =
            serde_json::from_slice(&body).map_err(|e| ProviderError::Decode(e.to_string()))?;

        let status = map_status(&info.status)?;
        if status.fail() {
            warn!(
                instance_id = %self.instance_id,
                %task_id,
                error = info.error_msg.as_deref().unwrap_or(""),
                "dragonfly preheat failed"
            );
        }
        debug!(instance_id = %self.instance_id, %task_id, provider_id = %info.id, %status, "dragonfly progress");

        Ok(ProgressStatus {
            status,
            start_time: parse_time(info.start_time.as_deref()),
            finish_time: parse_time(info.finish_time.as_deref()),
        })
    }

    async fn ping(&self) -> ProviderResult<HealthStatus> {
        self.client
            .get(&self.url(&[HEALTH_CHECK_SEGMENT]), self.credential.as_ref(), &[], &[])
            .await?;
        Ok(HealthStatus::healthy())
    }
}

impl Driver for DragonflyDriver {
    fn check_progress<'a>(&'a self, task_id: &'a str) -> DriverFuture<'a, ProgressStatus> {
        Box::pin(self.fetch_progress(task_id))
    }

    fn get_health(&self) -> DriverFuture<'_, HealthStatus> {
        Box::pin(self.ping())
    }
}

/// Map a supernode status onto [`TrackStatus`]. Canonical names pass through.
fn map_status(raw: &str) -> ProviderResult<TrackStatus> {
    match raw {
        "WAITING" | "PENDING" => Ok(TrackStatus::Pending),
        "RUNNING" => Ok(TrackStatus::Running),
        "SUCCESS" => Ok(TrackStatus::Success),
        "FAILED" | "FAIL" => Ok(TrackStatus::Fail),
        other => Err(ProviderError::InvalidStatus(other.to_string())),
    }
}

/// RFC 3339 to unix seconds. Empty and zero times (`0001-01-01T00:00:00Z`) are absent.
fn parse_time(raw: Option<&str>) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(ts) => Some(ts.timestamp()).filter(|secs| *secs > 0),
        Err(e) => {
            debug!(%raw, error = %e, "unparseable dragonfly timestamp");
            None
        }
    }
}
