//! preheat-monitor: drives preheat tasks to completion and keeps provider
//! instance health current.
//!
//! # Architecture
//!
//! ```text
//! Monitor
//!   ├── health loop      every health_interval: list instances,
//!   │                    one task per instance → get_health → update
//!   ├── progress loop    bounded FIFO of (instance, task) watches,
//!   │                    one task per item → check_progress → update_status
//!   ├── requeue timer    min-heap of not-yet-due watches, re-injected
//!   │                    into the FIFO when due
//!   └── limiter          semaphore bounding in-flight checks
//! ```
//!
//! A watch stays tracked from `watch_progress` until its task reaches
//! `SUCCESS` or `FAIL`, or until it is dropped after a non-retryable error
//! or too many consecutive transient failures. Tracking is in memory only;
//! [`Monitor::resume_pending`] rebuilds it from the history store.

pub mod config;
pub mod error;
pub mod monitor;
mod requeue;

pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use monitor::{Monitor, MonitorTasks, ProgressItem};
