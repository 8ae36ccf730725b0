//! Vendor factory registry.
//!
//! New vendors plug in by registering a [`ProviderFactory`]; the resolver
//! never names a vendor directly. The process-wide [`global`] registry is
//! built on first use and read-only afterwards.

use crate::anthropic::AnthropicFactory;
use crate::bedrock::BedrockFactory;
use crate::{Error, ModelConfig, ModelOptions, Provider, Result};
use async_trait::async_trait;
use environment::EnvironmentProvider;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Builds handles for one vendor.
#[async_trait]
pub trait ProviderFactory: Send + Sync {
    /// The provider tag this factory answers to, e.g. `"anthropic"`.
    fn provider(&self) -> &'static str;

    async fn create(
        &self,
        config: &ModelConfig,
        env: Arc<dyn EnvironmentProvider>,
        options: ModelOptions,
    ) -> Result<Arc<dyn Provider>>;
}

/// Lookup table from provider tag to factory.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    factories: HashMap<&'static str, Arc<dyn ProviderFactory>>,
}

static GLOBAL: Lazy<Arc<ProviderRegistry>> = Lazy::new(|| Arc::new(ProviderRegistry::with_defaults()));

/// The registry holding every built-in vendor.
pub fn global() -> Arc<ProviderRegistry> {
    Arc::clone(&GLOBAL)
}

/// Whether catalog entries for this provider id can be turned into handles.
pub fn is_catalog_provider(provider: &str) -> bool {
    GLOBAL.contains(provider)
}

impl ProviderRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in vendors.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(BedrockFactory));
        registry.register(Arc::new(AnthropicFactory));
        registry
    }

    /// Add a factory, replacing any existing one for the same tag.
    pub fn register(&mut self, factory: Arc<dyn ProviderFactory>) {
        self.factories.insert(factory.provider(), factory);
    }

    pub fn get(&self, provider: &str) -> Option<&Arc<dyn ProviderFactory>> {
        self.factories.get(provider)
    }

    pub fn contains(&self, provider: &str) -> bool {
        self.factories.contains_key(provider)
    }

    /// Registered provider tags, sorted.
    pub fn providers(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Build a handle with the factory registered for `config.provider`.
    pub async fn create(
        &self,
        config: &ModelConfig,
        env: Arc<dyn EnvironmentProvider>,
        options: ModelOptions,
    ) -> Result<Arc<dyn Provider>> {
        let factory = self.get(&config.provider).ok_or_else(|| {
            Error::config(format!(
                "unsupported provider '{}' (known: {})",
                config.provider,
                self.providers().join(", ")
            ))
        })?;

        debug!(provider = %config.provider, model = %config.model, "creating provider handle");
        factory.create(config, env, options).await
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use environment::MapProvider;

    #[test]
    fn defaults_include_builtin_vendors() {
        let registry = ProviderRegistry::with_defaults();
        assert_eq!(registry.providers(), vec!["amazon-bedrock", "anthropic"]);
        assert!(is_catalog_provider("anthropic"));
        assert!(!is_catalog_provider("nonexistent"));
    }

    #[tokio::test]
    async fn unknown_provider_is_config_error() {
        let registry = ProviderRegistry::with_defaults();
        let err = registry
            .create(
                &ModelConfig::new("nonexistent", "m"),
                Arc::new(MapProvider::new()),
                ModelOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(err.to_string().contains("nonexistent"));
    }

    #[tokio::test]
    async fn stub_factory_builds_handles() {
        let registry = testing::stub_registry(&["openai"]);
        let handle = registry
            .create(
                &ModelConfig::new("openai", "gpt-4o"),
                Arc::new(MapProvider::new()),
                ModelOptions::new(),
            )
            .await
            .unwrap();
        assert_eq!(handle.id(), "openai/gpt-4o");
    }
}
