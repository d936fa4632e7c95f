//! preheat-provider: pluggable distribution provider drivers.
//!
//! A [`Driver`] translates generic progress and health queries into one
//! provider's wire protocol. A [`ProviderRegistry`] maps provider IDs to
//! [`Factory`] constructors and builds the driver for an instance from its
//! [`Metadata`](preheat_state::Metadata).
//!
//! # Architecture
//!
//! ```text
//! ProviderRegistry
//!   ├── "dragonfly" → dragonfly_factory(HttpClient)
//!   │                   └── DragonflyDriver
//!   │                         ├── GET {endpoint}/_ping
//!   │                         └── GET {endpoint}/preheats/{task_id}
//!   └── ... further providers registered at start-up
//! ```
//!
//! Factories are pure constructors; all I/O happens inside the driver
//! calls, through the shared [`HttpClient`](preheat_client::HttpClient).

pub mod dragonfly;
pub mod driver;
pub mod error;
pub mod registry;

pub use dragonfly::{DragonflyDriver, DRAGONFLY_PROVIDER, dragonfly_factory};
pub use driver::{Driver, DriverFuture, HealthStatus, ProgressStatus};
pub use error::{ProviderError, ProviderResult};
pub use registry::{Factory, ProviderRegistry};
