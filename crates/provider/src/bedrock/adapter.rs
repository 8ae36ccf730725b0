//! Converse stream events to canonical deltas.

use super::PROVIDER;
use super::events::{ContentDelta, ConverseStreamEvent};
use crate::{
    Error, FinishReason, MessageStream, OmittedTool, Result, Role, StreamDelta, ToolCallAccumulator, Usage,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Map a Converse stop reason onto the canonical set.
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "content_filtered" => FinishReason::ContentFilter,
        other => {
            warn!(provider = PROVIDER, stop_reason = other, "unknown stop reason, treating as stop");
            FinishReason::Stop
        }
    }
}

/// A single Converse response stream.
pub struct BedrockStream {
    events: BoxStream<'static, Result<ConverseStreamEvent>>,
    model: String,
    cancel: CancellationToken,
    accumulator: ToolCallAccumulator,
    omitted: Vec<OmittedTool>,
    done: bool,
}

impl BedrockStream {
    pub fn new<S>(events: S, model: impl Into<String>, cancel: CancellationToken, omitted: Vec<OmittedTool>) -> Self
    where
        S: Stream<Item = Result<ConverseStreamEvent>> + Send + 'static,
    {
        Self {
            events: events.boxed(),
            model: model.into(),
            cancel,
            accumulator: ToolCallAccumulator::new(),
            omitted,
            done: false,
        }
    }

    /// A stream that has already ended, for requests cancelled before the
    /// response arrived.
    pub fn ended(model: impl Into<String>, omitted: Vec<OmittedTool>) -> Self {
        let mut stream = Self::new(futures::stream::empty(), model, CancellationToken::new(), omitted);
        stream.done = true;
        stream
    }

    fn close(&mut self) {
        self.done = true;
        self.events = futures::stream::empty().boxed();
        let discarded = self.accumulator.clear();
        if discarded > 0 {
            debug!(provider = PROVIDER, discarded, "dropped unfinished tool calls");
        }
    }

    fn handle(&mut self, event: ConverseStreamEvent) -> Result<Option<StreamDelta>> {
        let delta = match event {
            ConverseStreamEvent::MessageStart { .. } => Some(StreamDelta::role(Role::Assistant)),
            ConverseStreamEvent::ContentBlockStart { index, tool_use } => tool_use
                .map(|tool| StreamDelta::tool_call(self.accumulator.start(index, tool.tool_use_id, tool.name))),
            ConverseStreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::Text(text) if !text.is_empty() => Some(StreamDelta::content(text)),
                ContentDelta::Reasoning(text) if !text.is_empty() => Some(StreamDelta::reasoning(text)),
                ContentDelta::ToolUseInput(fragment) => {
                    self.accumulator.append(index, &fragment);
                    None
                }
                _ => None,
            },
            ConverseStreamEvent::ContentBlockStop { index } => {
                self.accumulator.finish(index).map(StreamDelta::tool_call)
            }
            ConverseStreamEvent::MessageStop { stop_reason } if stop_reason.is_empty() => None,
            ConverseStreamEvent::MessageStop { stop_reason } => {
                Some(StreamDelta::finish(map_stop_reason(&stop_reason)))
            }
            ConverseStreamEvent::Metadata { usage } => usage.map(|usage| {
                StreamDelta::usage(Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                })
            }),
            ConverseStreamEvent::Unknown(kind) => {
                return Err(Error::protocol(
                    PROVIDER,
                    &self.model,
                    format!("unexpected stream event: {kind}"),
                ));
            }
        };
        Ok(delta)
    }
}

#[async_trait]
impl MessageStream for BedrockStream {
    async fn recv(&mut self) -> Result<Option<StreamDelta>> {
        loop {
            if self.done {
                return Ok(None);
            }

            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!(provider = PROVIDER, model = %self.model, "stream cancelled");
                    self.close();
                    return Ok(None);
                }
                next = self.events.next() => next,
            };

            let result = match next {
                Some(Ok(event)) => self.handle(event),
                Some(Err(err)) => Err(err),
                None => {
                    self.close();
                    return Ok(None);
                }
            };
            match result {
                Ok(Some(delta)) => return Ok(Some(delta)),
                Ok(None) => continue,
                Err(err) => {
                    self.close();
                    return Err(err);
                }
            }
        }
    }

    fn omitted_tools(&self) -> &[OmittedTool] {
        &self.omitted
    }
}

impl std::fmt::Debug for BedrockStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BedrockStream")
            .field("model", &self.model)
            .field("pending_tool_calls", &self.accumulator.len())
            .field("done", &self.done)
            .finish()
    }
}
