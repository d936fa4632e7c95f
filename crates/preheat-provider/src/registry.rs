//! Provider factory registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use preheat_client::HttpClient;
use preheat_state::Metadata;
use tracing::debug;

use crate::dragonfly::{DRAGONFLY_PROVIDER, dragonfly_factory};
use crate::driver::Driver;
use crate::error::{ProviderError, ProviderResult};

/// Builds a driver from instance metadata. Must not perform I/O.
pub type Factory = Arc<dyn Fn(&Metadata) -> ProviderResult<Arc<dyn Driver>> + Send + Sync>;

/// Maps provider IDs to driver factories.
///
/// Populated once at start-up and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every built-in provider, sharing `client`.
    pub fn with_defaults(client: HttpClient) -> Self {
        let mut registry = Self::new();
        registry.register(DRAGONFLY_PROVIDER, dragonfly_factory(client));
        registry
    }

    /// Register `factory` under `provider_id`, replacing any previous one.
    pub fn register(&mut self, provider_id: impl Into<String>, factory: Factory) {
        let provider_id = provider_id.into();
        debug!(%provider_id, "provider factory registered");
        self.factories.insert(provider_id, factory);
    }

    pub fn resolve(&self, provider_id: &str) -> Option<Factory> {
        self.factories.get(provider_id).cloned()
    }

    /// Registered provider IDs, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Build the driver owning `instance`.
    pub fn driver_for(&self, instance: &Metadata) -> ProviderResult<Arc<dyn Driver>> {
        if instance.id.is_empty() {
            return Err(ProviderError::InvalidInstance("empty instance ID".to_string()));
        }
        let factory = self
            .resolve(&instance.provider)
            .ok_or_else(|| ProviderError::UnknownProvider(instance.provider.clone()))?;
        factory(instance)
    }
}
