use thiserror::Error;

/// Errors from model resolution, handle construction and streaming.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Missing or invalid configuration, including provider-tag mismatch.
    #[error("configuration error: {0}")]
    Config(String),

    /// No usable credential could be found.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// A message, tool or content part could not be converted.
    #[error("translation error: {0}")]
    Translation(String),

    /// The vendor stream produced something this layer does not understand.
    #[error("{vendor} protocol error (model {model}): {message}")]
    Protocol {
        vendor: &'static str,
        model: String,
        message: String,
    },

    /// The HTTP transport failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// A vendor SDK lost its connection while sending or streaming.
    #[error("{vendor} network error: {message}")]
    Connection { vendor: &'static str, message: String },

    /// The vendor answered with a non-success status.
    #[error("{vendor} API error {status}: {body}")]
    Api {
        vendor: &'static str,
        status: u16,
        body: String,
    },

    /// One member of a multi-reference resolution failed.
    #[error("model {reference:?}: {source}")]
    Resolution {
        reference: String,
        #[source]
        source: Box<Error>,
    },

    #[error(transparent)]
    Catalog(#[from] catalog::Error),

    #[error(transparent)]
    Environment(#[from] environment::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    pub fn translation(message: impl Into<String>) -> Self {
        Self::Translation(message.into())
    }

    pub fn protocol(vendor: &'static str, model: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            vendor,
            model: model.into(),
            message: message.into(),
        }
    }

    /// Transport failures, as opposed to errors the vendor reported.
    pub fn is_network(&self) -> bool {
        matches!(self.root(), Self::Network(_) | Self::Connection { .. })
    }

    /// Strip [`Error::Resolution`] wrappers and return the underlying error.
    pub fn root(&self) -> &Error {
        match self {
            Self::Resolution { source, .. } => source.root(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
