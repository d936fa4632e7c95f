//! preheat-client: outbound HTTP plumbing for provider drivers.
//!
//! Provides:
//! - [`AuthRegistry`]: maps an auth mode name to an [`AuthHandler`] that
//!   signs outgoing requests from a [`Credential`]
//! - [`HttpClient`]: a pooled JSON GET/POST transport that authorizes every
//!   request through the registry and surfaces non-success responses with
//!   their status and body
//!
//! Neither type is a process-wide singleton; whoever assembles the
//! monitor constructs them and hands them to the provider registry.

pub mod auth;
pub mod error;
pub mod http;

pub use auth::{AuthHandler, AuthRegistry, Credential};
pub use error::{AuthError, ClientError, ClientResult};
pub use http::{ClientConfig, HttpClient};
