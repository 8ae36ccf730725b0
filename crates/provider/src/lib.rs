//! LLM provider abstraction.
//!
//! Turns model references into provider handles and vendor streams into
//! canonical deltas.
//!
//! # Overview
//!
//! - **ModelResolver**: resolves a reference such as `"fast"`,
//!   `"anthropic/claude-sonnet-4-5"` or the alloy `"a/x, b/y"` into handles.
//! - **Provider**: one backend connection. `id()` is always `"<provider>/<model>"`.
//! - **MessageStream**: single-consumer stream of [`StreamDelta`]s. Tool-call
//!   arguments surface once, complete, when their content block closes.
//! - **ProviderRegistry**: vendor factories keyed by provider tag. Built-in
//!   vendors are `amazon-bedrock` and `anthropic`.
//!
//! # Example
//!
//! ```ignore
//! use environment::OsEnvProvider;
//! use provider::{ChatMessage, ModelResolver};
//! use std::{collections::HashMap, sync::Arc};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> provider::Result<()> {
//! let resolver = ModelResolver::new(HashMap::new(), Arc::new(OsEnvProvider));
//! let resolved = resolver.resolve("anthropic/claude-sonnet-4-5").await?;
//! let handle = &resolved.providers()[0];
//!
//! let mut stream = handle
//!     .create_chat_completion_stream(CancellationToken::new(), &[ChatMessage::user("Hello!")], &[])
//!     .await?;
//! while let Some(delta) = stream.recv().await? {
//!     print!("{}", delta.content);
//! }
//! # Ok(())
//! # }
//! ```

pub mod anthropic;
pub mod bedrock;
mod chat;
mod choices;
mod config;
mod error;
mod multimodal;
mod options;
mod provider;
pub mod registry;
mod resolver;
mod stream;
mod tools;
pub mod transport;

// Canonical message types
pub use chat::{
    ChatMessage, FileReference, FileSourceType, FinishReason, FunctionCall, ImageUrl, MessagePart, Role,
    StreamDelta, ToolCall, Usage,
};
pub use tools::{OmittedTool, Tool, normalize_schema};

// Configuration
pub use config::ModelConfig;
pub use options::{GATEWAY_TOKEN_ENV, ModelOptions};

// Error types
pub use error::{Error, Result};

// Handles and streams
pub use provider::{BaseConfig, BoxMessageStream, MessageStream, Provider, Resolved, into_stream};
pub use stream::ToolCallAccumulator;
pub use transport::{BearerTokenTransport, HttpTransport, ReqwestTransport};

// Resolution
pub use choices::ModelChoice;
pub use registry::{ProviderFactory, ProviderRegistry};
pub use resolver::{DEFAULT_MAX_TOKENS, ModelResolver, is_inline_alloy_spec, split_model_refs};
