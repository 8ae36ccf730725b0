//! Construction options shared by every vendor handle.

use crate::transport::{HttpTransport, ReqwestTransport};
use std::sync::Arc;

/// Variable holding the short-lived token for the models gateway.
pub const GATEWAY_TOKEN_ENV: &str = "DOCKER_TOKEN";

/// Options applied on top of a [`ModelConfig`](crate::ModelConfig) when a
/// handle is built.
#[derive(Clone, Default)]
pub struct ModelOptions {
    gateway: Option<String>,
    max_tokens: Option<u64>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl ModelOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route requests through a models gateway. Empty strings are ignored.
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        let gateway = gateway.into();
        self.gateway = (!gateway.trim().is_empty()).then_some(gateway);
        self
    }

    /// Max output tokens to use when the model config has none.
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Replace the outbound HTTP transport.
    pub fn with_transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    pub fn max_tokens(&self) -> Option<u64> {
        self.max_tokens
    }

    /// The configured transport, or a fresh reqwest client.
    pub fn transport(&self) -> Arc<dyn HttpTransport> {
        self.transport
            .clone()
            .unwrap_or_else(|| Arc::new(ReqwestTransport::default()))
    }
}

impl std::fmt::Debug for ModelOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelOptions")
            .field("gateway", &self.gateway)
            .field("max_tokens", &self.max_tokens)
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_gateway_is_ignored() {
        assert_eq!(ModelOptions::new().with_gateway("  ").gateway(), None);
        assert_eq!(
            ModelOptions::new().with_gateway("https://gw.example").gateway(),
            Some("https://gw.example")
        );
    }
}
