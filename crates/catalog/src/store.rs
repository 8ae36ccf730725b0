//! Catalog store traits and the in-memory store.

use crate::{CatalogModel, Database, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Per-model limits lookup.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Look up a model by `provider/model` reference.
    async fn get_model(&self, reference: &str) -> Result<CatalogModel>;
}

/// Full catalog enumeration.
#[async_trait]
pub trait CatalogStore: ModelStore {
    async fn get_database(&self) -> Result<Arc<Database>>;
}

/// A catalog held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    database: Arc<Database>,
}

impl StaticCatalog {
    pub fn new(database: Database) -> Self {
        Self {
            database: Arc::new(database),
        }
    }

    /// Parse a models.dev JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::new(serde_json::from_str(json)?))
    }

    /// Read a models.dev JSON document from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&content)
    }
}

#[async_trait]
impl ModelStore for StaticCatalog {
    async fn get_model(&self, reference: &str) -> Result<CatalogModel> {
        self.database.lookup(reference).cloned()
    }
}

#[async_trait]
impl CatalogStore for StaticCatalog {
    async fn get_database(&self) -> Result<Arc<Database>> {
        Ok(Arc::clone(&self.database))
    }
}
