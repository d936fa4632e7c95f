//! Monitor tuning.

use std::time::Duration;

use crate::error::{MonitorError, MonitorResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    /// Period of the instance health sweep.
    pub health_interval: Duration,
    /// Delay before a non-terminal task is polled again.
    pub progress_interval: Duration,
    /// Capacity of the progress FIFO.
    pub queue_capacity: usize,
    /// Upper bound on in-flight health and progress checks.
    pub max_concurrent_checks: usize,
    /// Consecutive transient poll failures after which a watch is dropped.
    pub max_poll_failures: u32,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            health_interval: Duration::from_secs(30),
            progress_interval: Duration::from_secs(5),
            queue_capacity: 1024,
            max_concurrent_checks: 64,
            max_poll_failures: 3,
        }
    }
}

impl MonitorConfig {
    pub fn validate(&self) -> MonitorResult<()> {
        if self.health_interval.is_zero() {
            return Err(MonitorError::InvalidConfig("health_interval must be > 0".into()));
        }
        if self.progress_interval.is_zero() {
            return Err(MonitorError::InvalidConfig("progress_interval must be > 0".into()));
        }
        if self.queue_capacity == 0 {
            return Err(MonitorError::InvalidConfig("queue_capacity must be > 0".into()));
        }
        if self.max_concurrent_checks == 0 {
            return Err(MonitorError::InvalidConfig(
                "max_concurrent_checks must be > 0".into(),
            ));
        }
        if self.max_poll_failures == 0 {
            return Err(MonitorError::InvalidConfig("max_poll_failures must be > 0".into()));
        }
        Ok(())
    }
}
