//! Model configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration for one concrete backend model.
///
/// Built either from a named entry in the caller's model map or from an
/// inline `provider/model` reference. Once resolved, the two are
/// indistinguishable.
///
/// A stored alloy is a config with an empty `provider` and a
/// comma-separated member list in `model`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    /// Custom endpoint, replacing the vendor default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    /// Vendor-specific settings, e.g. `region` for Bedrock.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provider_opts: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parallel_tool_calls: Option<bool>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Parse an inline `provider/model` reference.
    ///
    /// Splits on the first `/`, so `dmr/ai/qwen3` is provider `dmr`, model
    /// `ai/qwen3`. Both halves must be non-empty.
    pub fn parse_inline(reference: &str) -> Option<Self> {
        let (provider, model) = reference.trim().split_once('/')?;
        let (provider, model) = (provider.trim(), model.trim());
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }

    /// The `provider/model` form of this config.
    pub fn reference(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }

    /// True for a stored alloy: no provider and a comma-separated model list.
    pub fn is_alloy(&self) -> bool {
        self.provider.is_empty() && self.model.contains(',')
    }

    /// A non-empty string provider option.
    pub fn provider_opt_str(&self, key: &str) -> Option<&str> {
        self.provider_opts
            .get(key)
            .and_then(Value::as_str)
            .filter(|value| !value.is_empty())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_provider_opt(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.provider_opts.insert(key.into(), value.into());
        self
    }
}
