//! The driver capability set consumed by the monitor.

use std::future::Future;
use std::pin::Pin;

use preheat_state::{HEALTH_STATUS_HEALTHY, HEALTH_STATUS_UNHEALTHY, TrackStatus};
use serde::{Deserialize, Serialize};

use crate::error::ProviderResult;

/// Boxed future returned by driver calls, so drivers work as `Arc<dyn Driver>`.
pub type DriverFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderResult<T>> + Send + 'a>>;

/// Progress of one preheat task as reported by the provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStatus {
    pub status: TrackStatus,
    /// Unix seconds.
    pub start_time: Option<i64>,
    /// Unix seconds.
    pub finish_time: Option<i64>,
}

impl ProgressStatus {
    pub fn new(status: TrackStatus) -> Self {
        Self {
            status,
            start_time: None,
            finish_time: None,
        }
    }
}

/// Health of one provider instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn healthy() -> Self {
        Self {
            status: HEALTH_STATUS_HEALTHY.to_string(),
        }
    }

    pub fn unhealthy() -> Self {
        Self {
            status: HEALTH_STATUS_UNHEALTHY.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HEALTH_STATUS_HEALTHY
    }
}

/// Adapter between the monitor and one provider's wire protocol.
pub trait Driver: Send + Sync {
    /// Current progress of the provider task `task_id`.
    fn check_progress<'a>(&'a self, task_id: &'a str) -> DriverFuture<'a, ProgressStatus>;

    /// Current health of the instance this driver was built for.
    fn get_health(&self) -> DriverFuture<'_, HealthStatus>;
}
