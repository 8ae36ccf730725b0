//! Model reference resolution.
//!
//! A reference is one of:
//!
//! - a name from the caller's model map (`fast`),
//! - an inline `provider/model` spec (`anthropic/claude-sonnet-4-5`),
//! - a comma-separated list of either (`openai/gpt-4o, anthropic/claude-sonnet-4-5`),
//!   which resolves to an alloy.
//!
//! Resolution reads the model map and never changes it. Inline references a
//! caller wants to remember go into a separate working copy via
//! [`ModelResolver::register_inline`].

use crate::transport::HttpTransport;
use crate::{Error, ModelConfig, ModelOptions, Provider, ProviderRegistry, Resolved, Result, registry};
use catalog::{CatalogStore, ModelStore};
use environment::EnvironmentProvider;
use futures::FutureExt;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Output-token limit used when neither config nor catalog has one.
pub const DEFAULT_MAX_TOKENS: u64 = 32000;

/// Split a comma-separated reference list, trimming and dropping empty entries.
pub fn split_model_refs(refs: &str) -> Vec<String> {
    refs.split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect()
}

/// True when `reference` lists at least two members and every member is `provider/model`.
pub fn is_inline_alloy_spec(reference: &str) -> bool {
    let refs = split_model_refs(reference);
    refs.len() >= 2 && refs.iter().all(|r| r.contains('/'))
}

/// Turns model references into provider handles.
#[derive(Clone)]
pub struct ModelResolver {
    models: Arc<HashMap<String, ModelConfig>>,
    env: Arc<dyn EnvironmentProvider>,
    registry: Arc<ProviderRegistry>,
    gateway: Option<String>,
    model_store: Option<Arc<dyn ModelStore>>,
    pub(crate) catalog: Option<Arc<dyn CatalogStore>>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ModelResolver {
    /// Resolver over a snapshot of named model configs, using the global registry.
    pub fn new(models: impl Into<Arc<HashMap<String, ModelConfig>>>, env: Arc<dyn EnvironmentProvider>) -> Self {
        Self {
            models: models.into(),
            env,
            registry: registry::global(),
            gateway: None,
            model_store: None,
            catalog: None,
            transport: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<ProviderRegistry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        let gateway = gateway.into();
        self.gateway = (!gateway.trim().is_empty()).then_some(gateway);
        self
    }

    /// Store used for default output-token limits.
    pub fn with_model_store(mut self, store: Arc<dyn ModelStore>) -> Self {
        self.model_store = Some(store);
        self
    }

    /// Catalog used for model choices, and for limits when no model store is set.
    pub fn with_catalog(mut self, catalog: Arc<dyn CatalogStore>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Transport handed to every handle this resolver builds.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn models(&self) -> &HashMap<String, ModelConfig> {
        &self.models
    }

    pub fn env(&self) -> &Arc<dyn EnvironmentProvider> {
        &self.env
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Resolve a reference into one handle or an ordered alloy.
    pub async fn resolve(&self, reference: &str) -> Result<Resolved> {
        let refs = split_model_refs(reference);
        match refs.as_slice() {
            [] => Err(Error::config("empty model reference")),
            [single] => {
                let provider = self.resolve_ref(single).await?;
                info!(model = %provider.id(), "resolved model");
                Ok(Resolved::Single(provider))
            }
            _ => {
                let providers = self.resolve_refs(&refs).await?;
                info!(model_count = providers.len(), "resolved alloy");
                Ok(Resolved::Alloy(providers))
            }
        }
    }

    /// Resolve exactly one reference.
    ///
    /// A stored alloy only resolves here if it expands to a single member.
    pub async fn resolve_ref(&self, reference: &str) -> Result<Arc<dyn Provider>> {
        self.resolve_ref_inner(reference, Vec::new()).await
    }

    /// Resolve several references in order. Any failure aborts the whole list.
    pub async fn resolve_refs(&self, refs: &[String]) -> Result<Vec<Arc<dyn Provider>>> {
        self.resolve_refs_inner(refs, Vec::new()).await
    }

    /// Member references of a stored alloy, or `None` if `name` is not one.
    pub fn alloy_members(&self, name: &str) -> Option<Vec<String>> {
        self.models
            .get(name)
            .filter(|config| config.is_alloy())
            .map(|config| split_model_refs(&config.model))
    }

    fn resolve_ref_inner<'a>(
        &'a self,
        reference: &'a str,
        visiting: Vec<String>,
    ) -> BoxFuture<'a, Result<Arc<dyn Provider>>> {
        async move {
            if let Some(config) = self.models.get(reference) {
                if !config.is_alloy() {
                    return self.create_provider_from_config(config).await;
                }

                if visiting.iter().any(|name| name == reference) {
                    return Err(Error::config(format!("model {reference:?} refers to itself")));
                }
                let mut visiting = visiting;
                visiting.push(reference.to_string());

                let members = split_model_refs(&config.model);
                let mut providers = self.resolve_refs_inner(&members, visiting).await?;
                if providers.len() == 1 {
                    return Ok(providers.remove(0));
                }
                return Err(Error::config(format!(
                    "model {reference:?} resolves to multiple providers; use resolve_refs instead"
                )));
            }

            let config = ModelConfig::parse_inline(reference).ok_or_else(|| {
                Error::config(format!(
                    "invalid model reference {reference:?}: expected a model name from config or 'provider/model' format"
                ))
            })?;
            self.create_provider_from_config(&config).await
        }
        .boxed()
    }

    fn resolve_refs_inner<'a>(
        &'a self,
        refs: &'a [String],
        visiting: Vec<String>,
    ) -> BoxFuture<'a, Result<Vec<Arc<dyn Provider>>>> {
        async move {
            let mut providers = Vec::with_capacity(refs.len());
            for reference in refs {
                let provider = self
                    .resolve_ref_inner(reference, visiting.clone())
                    .await
                    .map_err(|source| Error::Resolution {
                        reference: reference.clone(),
                        source: Box::new(source),
                    })?;
                providers.push(provider);
            }
            Ok(providers)
        }
        .boxed()
    }

    /// Build a handle for a concrete config.
    pub async fn create_provider_from_config(&self, config: &ModelConfig) -> Result<Arc<dyn Provider>> {
        let mut options = ModelOptions::new().with_max_tokens(self.effective_max_tokens(config).await);
        if let Some(gateway) = &self.gateway {
            options = options.with_gateway(gateway);
        }
        if let Some(transport) = &self.transport {
            options = options.with_transport(Arc::clone(transport));
        }

        self.registry.create(config, Arc::clone(&self.env), options).await
    }

    /// Explicit config value, then the catalog's output limit, then [`DEFAULT_MAX_TOKENS`].
    pub async fn effective_max_tokens(&self, config: &ModelConfig) -> u64 {
        if let Some(max_tokens) = config.max_tokens {
            return max_tokens;
        }

        let reference = config.reference();
        let lookup = match (&self.model_store, &self.catalog) {
            (Some(store), _) => Some(store.get_model(&reference).await),
            (None, Some(catalog)) => Some(catalog.get_model(&reference).await),
            (None, None) => None,
        };

        match lookup {
            Some(Ok(model)) if model.limit.output > 0 => model.limit.output,
            Some(Ok(_)) => {
                debug!(model = %reference, "catalog has no output limit, using default");
                DEFAULT_MAX_TOKENS
            }
            Some(Err(err)) => {
                debug!(model = %reference, %err, "catalog lookup failed, using default max tokens");
                DEFAULT_MAX_TOKENS
            }
            None => DEFAULT_MAX_TOKENS,
        }
    }

    /// A mutable copy of the model map for callers that persist inline references.
    pub fn working_copy(&self) -> HashMap<String, ModelConfig> {
        (*self.models).clone()
    }

    /// Record an inline `provider/model` reference in `working` under its own name.
    ///
    /// Returns false if the name is already known or the reference is not inline.
    pub fn register_inline(&self, working: &mut HashMap<String, ModelConfig>, reference: &str) -> bool {
        let reference = reference.trim();
        if self.models.contains_key(reference) || working.contains_key(reference) {
            return false;
        }
        match ModelConfig::parse_inline(reference) {
            Some(config) => {
                working.insert(reference.to_string(), config);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for ModelResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelResolver")
            .field("models", &self.models.len())
            .field("registry", &self.registry)
            .field("gateway", &self.gateway)
            .field("model_store", &self.model_store.is_some())
            .field("catalog", &self.catalog.is_some())
            .finish()
    }
}
