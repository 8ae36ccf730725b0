//! models.dev catalog with an on-disk cache.

use crate::{CatalogModel, CatalogStore, Database, Error, ModelStore, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

pub const MODELS_DEV_URL: &str = "https://models.dev/api.json";
pub const DEFAULT_CACHE_TTL_HOURS: i64 = 24;

const CACHE_FILE: &str = "models_dev.json";

/// Fetches the models.dev database once per process.
///
/// A fresh on-disk cache is used without touching the network. A stale
/// cache is refreshed, and served anyway if the refresh fails.
#[derive(Debug)]
pub struct ModelsDevStore {
    client: reqwest::Client,
    url: String,
    cache_path: Option<PathBuf>,
    ttl: Duration,
    database: OnceCell<Arc<Database>>,
}

impl Default for ModelsDevStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelsDevStore {
    /// Store pointing at the public endpoint, cached under the user cache dir.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: MODELS_DEV_URL.to_string(),
            cache_path: dirs::cache_dir().map(|dir| dir.join("capstan").join(CACHE_FILE)),
            ttl: Duration::hours(DEFAULT_CACHE_TTL_HOURS),
            database: OnceCell::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Override the cache location. `None` disables caching.
    pub fn with_cache_path(mut self, path: Option<PathBuf>) -> Self {
        self.cache_path = path;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    async fn database(&self) -> Result<Arc<Database>> {
        self.database
            .get_or_try_init(|| async { self.load().await.map(Arc::new) })
            .await
            .cloned()
    }

    async fn load(&self) -> Result<Database> {
        let cached = match &self.cache_path {
            Some(path) => read_cache(path).await,
            None => None,
        };

        if let Some((db, modified)) = &cached {
            if Utc::now() - *modified < self.ttl {
                debug!(models = db.model_count(), "using cached models.dev catalog");
                return Ok(db.clone());
            }
        }

        match self.fetch().await {
            Ok((db, raw)) => {
                if let Some(path) = &self.cache_path {
                    if let Err(err) = write_cache(path, &raw).await {
                        warn!(path = %path.display(), %err, "failed to write catalog cache");
                    }
                }
                Ok(db)
            }
            Err(err) => match cached {
                Some((db, _)) => {
                    warn!(%err, "catalog refresh failed, using stale cache");
                    Ok(db)
                }
                None => Err(err),
            },
        }
    }

    async fn fetch(&self) -> Result<(Database, String)> {
        debug!(url = %self.url, "fetching models.dev catalog");
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status { status });
        }

        let raw = response.text().await?;
        let db = serde_json::from_str(&raw)?;
        Ok((db, raw))
    }
}

async fn read_cache(path: &Path) -> Option<(Database, DateTime<Utc>)> {
    let modified = tokio::fs::metadata(path).await.ok()?.modified().ok()?;
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    match serde_json::from_str(&raw) {
        Ok(db) => Some((db, DateTime::<Utc>::from(modified))),
        Err(err) => {
            warn!(path = %path.display(), %err, "ignoring unreadable catalog cache");
            None
        }
    }
}

async fn write_cache(path: &Path, raw: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, raw).await
}

#[async_trait]
impl ModelStore for ModelsDevStore {
    async fn get_model(&self, reference: &str) -> Result<CatalogModel> {
        self.database().await?.lookup(reference).cloned()
    }
}

#[async_trait]
impl CatalogStore for ModelsDevStore {
    async fn get_database(&self) -> Result<Arc<Database>> {
        self.database().await
    }
}
