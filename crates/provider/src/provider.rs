//! Provider handle and message stream traits.

use crate::{ChatMessage, ModelConfig, ModelOptions, OmittedTool, Result, StreamDelta, Tool};
use async_trait::async_trait;
use futures::Stream;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// A stream of canonical deltas for one request.
///
/// Single consumer: one task drains it until `Ok(None)`, an error, or
/// cancellation.
#[async_trait]
pub trait MessageStream: Send {
    /// Next delta, or `Ok(None)` once the vendor stream has ended.
    async fn recv(&mut self) -> Result<Option<StreamDelta>>;

    /// Tools that were left out of the request because they could not be converted.
    fn omitted_tools(&self) -> &[OmittedTool] {
        &[]
    }
}

pub type BoxMessageStream = Box<dyn MessageStream>;

/// One concrete backend connection.
#[async_trait]
pub trait Provider: Send + Sync {
    /// `"<provider>/<model>"`.
    fn id(&self) -> String;

    fn config(&self) -> &ModelConfig;

    /// Start a streamed completion.
    ///
    /// Cancelling `cancel` ends the returned stream: the next `recv` yields
    /// `Ok(None)` and any half-built tool calls are dropped.
    async fn create_chat_completion_stream(
        &self,
        cancel: CancellationToken,
        messages: &[ChatMessage],
        tools: &[Tool],
    ) -> Result<BoxMessageStream>;
}

impl std::fmt::Debug for dyn MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("omitted_tools", &self.omitted_tools().len())
            .finish()
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Provider({})", self.id())
    }
}

/// State every vendor handle carries.
#[derive(Debug, Clone)]
pub struct BaseConfig {
    pub config: ModelConfig,
    pub options: ModelOptions,
}

impl BaseConfig {
    pub fn new(config: ModelConfig, options: ModelOptions) -> Self {
        Self { config, options }
    }

    pub fn id(&self) -> String {
        self.config.reference()
    }

    /// Config value first, then whatever the resolver supplied.
    pub fn max_tokens(&self) -> Option<u64> {
        self.config.max_tokens.or(self.options.max_tokens())
    }
}

/// Adapt a [`MessageStream`] into a `futures` stream.
pub fn into_stream(stream: BoxMessageStream) -> impl Stream<Item = Result<StreamDelta>> + Send {
    futures::stream::unfold(Some(stream), |state| async move {
        let mut stream = state?;
        match stream.recv().await {
            Ok(Some(delta)) => Some((Ok(delta), Some(stream))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
}

/// The result of resolving a model reference.
#[derive(Debug, Clone)]
pub enum Resolved {
    Single(Arc<dyn Provider>),
    /// Ordered members of an alloy. Fallback or fan-out policy is up to the caller.
    Alloy(Vec<Arc<dyn Provider>>),
}

impl Resolved {
    pub fn ids(&self) -> Vec<String> {
        self.providers().iter().map(|p| p.id()).collect()
    }

    pub fn providers(&self) -> &[Arc<dyn Provider>] {
        match self {
            Self::Single(provider) => std::slice::from_ref(provider),
            Self::Alloy(providers) => providers,
        }
    }

    pub fn into_providers(self) -> Vec<Arc<dyn Provider>> {
        match self {
            Self::Single(provider) => vec![provider],
            Self::Alloy(providers) => providers,
        }
    }

    pub fn is_alloy(&self) -> bool {
        matches!(self, Self::Alloy(_))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed list of results.
    pub(crate) struct ScriptedStream(pub(crate) VecDeque<Result<StreamDelta>>);

    #[async_trait]
    impl MessageStream for ScriptedStream {
        async fn recv(&mut self) -> Result<Option<StreamDelta>> {
            self.0.pop_front().transpose()
        }
    }

    /// A handle that never talks to a network.
    #[derive(Debug)]
    pub(crate) struct StubProvider {
        pub(crate) base: BaseConfig,
    }

    #[async_trait]
    impl Provider for StubProvider {
        fn id(&self) -> String {
            self.base.id()
        }

        fn config(&self) -> &ModelConfig {
            &self.base.config
        }

        async fn create_chat_completion_stream(
            &self,
            _cancel: CancellationToken,
            _messages: &[ChatMessage],
            _tools: &[Tool],
        ) -> Result<BoxMessageStream> {
            Ok(Box::new(ScriptedStream(VecDeque::from([Ok(StreamDelta::content(
                self.id(),
            ))]))))
        }
    }
}
