//! Environment provider implementations.

use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Looks up credentials and settings by variable name.
///
/// Implementations must reflect the current state of their source on every
/// call. A present but empty value is still reported as present; use
/// [`get_non_empty`](EnvironmentProvider::get_non_empty) when an empty value
/// should count as missing.
#[async_trait]
pub trait EnvironmentProvider: Send + Sync {
    async fn get(&self, name: &str) -> Option<String>;

    /// Like [`get`](EnvironmentProvider::get), but treats blank values as absent.
    async fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name)
            .await
            .filter(|value| !value.trim().is_empty())
    }
}

#[async_trait]
impl<P: EnvironmentProvider + ?Sized> EnvironmentProvider for Arc<P> {
    async fn get(&self, name: &str) -> Option<String> {
        (**self).get(name).await
    }
}

#[async_trait]
impl<P: EnvironmentProvider + ?Sized> EnvironmentProvider for Box<P> {
    async fn get(&self, name: &str) -> Option<String> {
        (**self).get(name).await
    }
}

/// The live process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEnvProvider;

#[async_trait]
impl EnvironmentProvider for OsEnvProvider {
    async fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// A fixed set of values.
#[derive(Debug, Clone, Default)]
pub struct MapProvider {
    values: HashMap<String, String>,
}

impl MapProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace one value.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for MapProvider {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

#[async_trait]
impl EnvironmentProvider for MapProvider {
    async fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Values read from a dotenv file.
///
/// The file is parsed once at load time. The process environment is left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct EnvFileProvider {
    values: HashMap<String, String>,
}

impl EnvFileProvider {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let to_error = |source| Error::EnvFile {
            path: path.to_path_buf(),
            source,
        };

        let mut values = HashMap::new();
        for item in dotenvy::from_path_iter(path).map_err(to_error)? {
            let (key, value) = item.map_err(to_error)?;
            values.insert(key, value);
        }

        debug!(path = %path.display(), count = values.len(), "loaded env file");
        Ok(Self { values })
    }
}

#[async_trait]
impl EnvironmentProvider for EnvFileProvider {
    async fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

/// Chains several providers in priority order.
#[derive(Default)]
pub struct MultiProvider {
    providers: Vec<Box<dyn EnvironmentProvider>>,
}

impl MultiProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider with lower priority than those already added.
    pub fn with(mut self, provider: impl EnvironmentProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for MultiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}

#[async_trait]
impl EnvironmentProvider for MultiProvider {
    async fn get(&self, name: &str) -> Option<String> {
        for provider in &self.providers {
            if let Some(value) = provider.get(name).await {
                return Some(value);
            }
        }
        None
    }
}
