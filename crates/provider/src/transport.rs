//! Outbound HTTP transports.
//!
//! Handles send every request through an [`HttpTransport`]. Wrappers that
//! add credentials always work on a clone, so the request a caller built is
//! never modified.

use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use reqwest::{Request, Response};
use std::sync::Arc;

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: &Request) -> Result<Response>;
}

/// Clone a request, failing if its body is a stream.
pub fn clone_request(request: &Request) -> Result<Request> {
    request
        .try_clone()
        .ok_or_else(|| Error::translation("request body cannot be cloned"))
}

/// Plain reqwest client.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        Ok(self.client.execute(clone_request(request)?).await?)
    }
}

/// Sets `Authorization: Bearer <token>` on every request.
pub struct BearerTokenTransport {
    token: String,
    inner: Arc<dyn HttpTransport>,
}

impl BearerTokenTransport {
    pub fn new(token: impl Into<String>, inner: Arc<dyn HttpTransport>) -> Self {
        Self {
            token: token.into(),
            inner,
        }
    }
}

impl std::fmt::Debug for BearerTokenTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerTokenTransport")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl HttpTransport for BearerTokenTransport {
    async fn execute(&self, request: &Request) -> Result<Response> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| Error::authentication("bearer token contains invalid header characters"))?;
        value.set_sensitive(true);

        let mut cloned = clone_request(request)?;
        cloned.headers_mut().insert(AUTHORIZATION, value);
        self.inner.execute(&cloned).await
    }
}
