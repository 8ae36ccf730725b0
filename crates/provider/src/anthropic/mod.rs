//! Anthropic Messages API.
//!
//! Direct connections authenticate with `ANTHROPIC_API_KEY`. Through a models
//! gateway the short-lived `DOCKER_TOKEN` is re-read for every request and
//! sent as a bearer credential.

mod adapter;
mod convert;
mod sse;

pub use adapter::{AnthropicStream, map_stop_reason};

use crate::registry::ProviderFactory;
use crate::transport::{BearerTokenTransport, HttpTransport};
use crate::{
    BaseConfig, BoxMessageStream, ChatMessage, Error, GATEWAY_TOKEN_ENV, ModelConfig, ModelOptions, OmittedTool,
    Provider, Result, Tool,
};
use async_trait::async_trait;
use convert::{ApiRequest, ApiThinking, convert_messages, convert_tools, system_blocks};
use environment::EnvironmentProvider;
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Method, Request, Url};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const PROVIDER: &str = "anthropic";
pub const API_KEY_ENV: &str = "ANTHROPIC_API_KEY";
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
/// Output budget when neither the config nor the resolver sets one.
pub const DEFAULT_MAX_TOKENS: u64 = 8192;

const API_VERSION: &str = "2023-06-01";
const BETA_HEADER: &str = "fine-grained-tool-streaming-2025-05-14";
const MIN_THINKING_BUDGET: u64 = 1024;

/// How requests are authenticated.
#[derive(Clone)]
pub enum AnthropicAuth {
    /// `x-api-key` header.
    ApiKey(String),
    /// Bearer token from the gateway token variable, read per request.
    Gateway,
}

impl std::fmt::Display for AnthropicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => write!(f, "api_key"),
            Self::Gateway => write!(f, "gateway"),
        }
    }
}

impl std::fmt::Debug for AnthropicAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey(<redacted>)"),
            Self::Gateway => f.write_str("Gateway"),
        }
    }
}

impl AnthropicAuth {
    fn apply_headers(&self, headers: &mut HeaderMap) -> Result<()> {
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        headers.insert("anthropic-beta", HeaderValue::from_static(BETA_HEADER));
        if let Self::ApiKey(key) = self {
            let mut value = HeaderValue::from_str(key)
                .map_err(|_| Error::authentication(format!("{API_KEY_ENV} contains invalid header characters")))?;
            value.set_sensitive(true);
            headers.insert("x-api-key", value);
        }
        Ok(())
    }
}

/// Anthropic provider handle.
pub struct AnthropicClient {
    base: BaseConfig,
    auth: AnthropicAuth,
    endpoint: Url,
    env: Arc<dyn EnvironmentProvider>,
    transport: Arc<dyn HttpTransport>,
}

impl AnthropicClient {
    /// Build a handle. Fails on a missing config, a foreign provider tag, or
    /// a missing credential for the chosen mode.
    pub async fn new(
        config: Option<&ModelConfig>,
        env: Arc<dyn EnvironmentProvider>,
        options: ModelOptions,
    ) -> Result<Self> {
        let config = config.ok_or_else(|| Error::config("model configuration is required"))?;
        if config.provider != PROVIDER {
            return Err(Error::config(format!(
                "model type must be '{PROVIDER}', got '{}'",
                config.provider
            )));
        }

        let (auth, base_url) = match options.gateway() {
            Some(gateway) => {
                if env.get_non_empty(GATEWAY_TOKEN_ENV).await.is_none() {
                    return Err(Error::authentication(format!(
                        "{GATEWAY_TOKEN_ENV} environment variable is required when using a models gateway"
                    )));
                }
                (AnthropicAuth::Gateway, gateway.to_string())
            }
            None => {
                let key = env
                    .get_non_empty(API_KEY_ENV)
                    .await
                    .ok_or_else(|| Error::authentication(format!("{API_KEY_ENV} environment variable is required")))?;
                let base_url = if config.base_url.trim().is_empty() {
                    DEFAULT_BASE_URL.to_string()
                } else {
                    config.base_url.trim().to_string()
                };
                (AnthropicAuth::ApiKey(key), base_url)
            }
        };

        let endpoint = messages_url(&base_url)?;
        info!(provider = PROVIDER, model = %config.model, auth = %auth, "created Anthropic client");
        Ok(Self {
            transport: options.transport(),
            base: BaseConfig::new(config.clone(), options),
            auth,
            endpoint,
            env,
        })
    }

    pub fn auth(&self) -> &AnthropicAuth {
        &self.auth
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Transport for one request. The gateway token may rotate, so it is
    /// looked up every time.
    async fn request_transport(&self) -> Result<Arc<dyn HttpTransport>> {
        match self.auth {
            AnthropicAuth::ApiKey(_) => Ok(Arc::clone(&self.transport)),
            AnthropicAuth::Gateway => {
                let token = self
                    .env
                    .get_non_empty(GATEWAY_TOKEN_ENV)
                    .await
                    .ok_or_else(|| Error::authentication(format!("{GATEWAY_TOKEN_ENV} is no longer set")))?;
                Ok(Arc::new(BearerTokenTransport::new(token, Arc::clone(&self.transport))))
            }
        }
    }

    async fn build_request(&self, messages: &[ChatMessage], tools: &[Tool]) -> Result<(ApiRequest, Vec<OmittedTool>)> {
        let config = &self.base.config;
        let mut max_tokens = self.base.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS);

        let budget = thinking_budget(config).filter(|&budget| {
            if budget < MIN_THINKING_BUDGET {
                warn!(provider = PROVIDER, budget, "thinking_budget below minimum of 1024, ignoring");
            }
            budget >= MIN_THINKING_BUDGET
        });
        if let Some(budget) = budget {
            max_tokens = adjust_max_tokens(max_tokens, budget, config.max_tokens.is_some())?;
        }
        let thinking = budget.and_then(|budget| {
            if budget >= max_tokens {
                warn!(provider = PROVIDER, budget, max_tokens, "thinking_budget must be less than max_tokens, ignoring");
                None
            } else {
                Some(ApiThinking::enabled(budget))
            }
        });

        // Sampling parameters are fixed by the API while thinking is enabled.
        let (temperature, top_p) = if thinking.is_some() {
            if config.temperature.is_some() || config.top_p.is_some() {
                debug!(provider = PROVIDER, "thinking enabled, ignoring temperature and top_p");
            }
            (None, None)
        } else {
            (config.temperature, config.top_p)
        };

        let (api_tools, omitted) = convert_tools(tools);
        let request = ApiRequest {
            model: config.model.clone(),
            max_tokens,
            messages: convert_messages(messages).await?,
            system: system_blocks(messages),
            tools: api_tools,
            thinking,
            temperature,
            top_p,
            stream: true,
        };
        Ok((request, omitted))
    }
}

impl std::fmt::Debug for AnthropicClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicClient")
            .field("id", &self.base.id())
            .field("auth", &self.auth)
            .field("endpoint", &self.endpoint.as_str())
            .finish()
    }
}

/// `<base>/v1/messages`, keeping any query string on the base.
fn messages_url(base: &str) -> Result<Url> {
    let mut url = Url::parse(base).map_err(|err| Error::config(format!("invalid Anthropic endpoint {base:?}: {err}")))?;
    let path = format!("{}/v1/messages", url.path().trim_end_matches('/'));
    url.set_path(&path);
    Ok(url)
}

fn thinking_budget(config: &ModelConfig) -> Option<u64> {
    config
        .provider_opts
        .get("thinking_budget")
        .and_then(Value::as_u64)
        .filter(|budget| *budget > 0)
}

/// `max_tokens` covers thinking and output together, so it must exceed the
/// budget. A value the user chose is never changed silently.
fn adjust_max_tokens(max_tokens: u64, budget: u64, user_set: bool) -> Result<u64> {
    if max_tokens > budget {
        return Ok(max_tokens);
    }
    if user_set {
        return Err(Error::config(format!(
            "max_tokens ({max_tokens}) must be greater than thinking_budget ({budget}); increase max_tokens to at least {}",
            budget + MIN_THINKING_BUDGET
        )));
    }
    let adjusted = budget + DEFAULT_MAX_TOKENS;
    info!(provider = PROVIDER, max_tokens, budget, adjusted, "raising max_tokens to fit thinking_budget");
    Ok(adjusted)
}

#[async_trait]
impl Provider for AnthropicClient {
    fn id(&self) -> String {
        self.base.id()
    }

    fn config(&self) -> &ModelConfig {
        &self.base.config
    }

    async fn create_chat_completion_stream(
        &self,
        cancel: CancellationToken,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<BoxMessageStream> {
        if messages.is_empty() {
            return Err(Error::translation("at least one message is required"));
        }

        let (body, omitted) = self.build_request(messages, tools).await?;
        if body.messages.is_empty() {
            return Err(Error::translation("no message has any content to send"));
        }

        let mut request = Request::new(Method::POST, self.endpoint.clone());
        *request.body_mut() = Some(serde_json::to_vec(&body)?.into());
        let headers = request.headers_mut();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        self.auth.apply_headers(headers)?;

        let transport = self.request_transport().await?;
        debug!(
            provider = PROVIDER,
            model = %body.model,
            messages = body.messages.len(),
            tools = body.tools.len(),
            max_tokens = body.max_tokens,
            thinking = body.thinking.is_some(),
            "starting messages stream"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(provider = PROVIDER, "request cancelled before response");
                return Ok(Box::new(AnthropicStream::ended(&body.model, omitted)));
            }
            response = transport.execute(&request) => response?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = match response.text().await {
                Ok(body) => body,
                Err(err) => {
                    debug!(provider = PROVIDER, %err, "failed to read error response body");
                    String::new()
                }
            };
            return Err(Error::Api {
                vendor: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        let events = sse::parse_sse_stream(response.bytes_stream());
        Ok(Box::new(AnthropicStream::new(events, &body.model, cancel, omitted)))
    }
}

/// Registers `anthropic`.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnthropicFactory;

#[async_trait]
impl ProviderFactory for AnthropicFactory {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn create(
        &self,
        config: &ModelConfig,
        env: Arc<dyn EnvironmentProvider>,
        options: ModelOptions,
    ) -> Result<Arc<dyn Provider>> {
        Ok(Arc::new(AnthropicClient::new(Some(config), env, options).await?))
    }
}
