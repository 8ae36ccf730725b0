//! CLI error types.

use crate::config::{CONFIG_FILE, ConfigError};
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration is invalid or could not be read.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Neither `--model` nor a configured default names a model.
    #[error("no model selected: pass --model or set default_model in {CONFIG_FILE}")]
    NoModel,

    /// Every member of an alloy failed to open a stream.
    #[error("no model in '{reference}' could start a stream: {source}")]
    AllModelsFailed {
        reference: String,
        #[source]
        source: provider::Error,
    },

    /// An error occurred in the provider layer.
    #[error(transparent)]
    Provider(#[from] provider::Error),

    /// An error occurred loading the model catalog.
    #[error(transparent)]
    Catalog(#[from] catalog::Error),

    /// An error occurred loading environment variables.
    #[error(transparent)]
    Environment(#[from] environment::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
