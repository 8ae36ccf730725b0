//! models.dev database types.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The whole catalog, keyed by provider id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Database {
    pub providers: HashMap<String, CatalogProvider>,
}

/// One vendor and the models it serves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogProvider {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub models: HashMap<String, CatalogModel>,
}

/// A single model entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogModel {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub family: String,
    #[serde(default)]
    pub modalities: Modalities,
    #[serde(default)]
    pub limit: Limit,
}

/// Input and output modalities, e.g. `["text", "image"]`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Modalities {
    #[serde(default)]
    pub input: Vec<String>,
    #[serde(default)]
    pub output: Vec<String>,
}

/// Token limits. Zero means unknown.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Limit {
    #[serde(default)]
    pub context: u64,
    #[serde(default)]
    pub output: u64,
}

impl CatalogModel {
    pub fn outputs_text(&self) -> bool {
        self.modalities.output.iter().any(|m| m == "text")
    }

    /// Embedding models are recognized by name or family.
    pub fn is_embedding(&self) -> bool {
        let family = self.family.to_lowercase();
        let name = self.name.to_lowercase();
        family.contains("embed") || name.contains("embed")
    }
}

impl Database {
    /// Look up a `provider/model` reference.
    ///
    /// Only the first `/` separates provider from model, so model ids that
    /// contain slashes themselves (`openrouter/meta/llama`) resolve.
    pub fn lookup(&self, reference: &str) -> Result<&CatalogModel> {
        let (provider, model) = reference
            .split_once('/')
            .filter(|(p, m)| !p.is_empty() && !m.is_empty())
            .ok_or_else(|| Error::InvalidReference(reference.to_string()))?;

        self.providers
            .get(provider)
            .and_then(|p| p.models.get(model))
            .ok_or_else(|| Error::ModelNotFound(reference.to_string()))
    }

    /// Total number of models across all providers.
    pub fn model_count(&self) -> usize {
        self.providers.values().map(|p| p.models.len()).sum()
    }
}
