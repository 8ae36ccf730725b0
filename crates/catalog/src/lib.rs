//! Model catalog lookups.
//!
//! The catalog answers two questions for the provider layer: how many output
//! tokens a given `provider/model` supports, and which models exist at all so
//! a selection UI can list them. Both are optional. Callers treat any
//! failure here as "no catalog data" and carry on.
//!
//! The data follows the [models.dev](https://models.dev) database layout:
//! providers keyed by id, each with a map of models.
//!
//! - [`StaticCatalog`] serves a database held in memory or read from disk.
//! - [`ModelsDevStore`] downloads the public database and caches it on disk.

mod error;
mod models_dev;
mod store;
mod types;

pub use error::{Error, Result};
pub use models_dev::{DEFAULT_CACHE_TTL_HOURS, MODELS_DEV_URL, ModelsDevStore};
pub use store::{CatalogStore, ModelStore, StaticCatalog};
pub use types::{CatalogModel, CatalogProvider, Database, Limit, Modalities};
