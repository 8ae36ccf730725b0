//! Messages API stream events to canonical deltas.

use super::PROVIDER;
use super::sse::SseEvent;
use crate::{
    Error, FinishReason, MessageStream, OmittedTool, Result, Role, StreamDelta, ToolCallAccumulator, Usage,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Map a Messages API stop reason onto the canonical set.
pub fn map_stop_reason(reason: &str) -> FinishReason {
    match reason {
        "end_turn" | "stop_sequence" | "pause_turn" => FinishReason::Stop,
        "max_tokens" => FinishReason::Length,
        "tool_use" => FinishReason::ToolCalls,
        "refusal" => FinishReason::ContentFilter,
        other => {
            warn!(provider = PROVIDER, stop_reason = other, "unknown stop reason, treating as stop");
            FinishReason::Stop
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Event Types
// ─────────────────────────────────────────────────────────────────────────────

const KNOWN_EVENTS: [&str; 8] = [
    "message_start",
    "content_block_start",
    "content_block_delta",
    "content_block_stop",
    "message_delta",
    "message_stop",
    "ping",
    "error",
];

#[derive(Debug, Deserialize)]
struct EventKind {
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    MessageStart {
        message: ApiMessageStart,
    },
    ContentBlockStart {
        index: u32,
        content_block: ApiBlockStart,
    },
    ContentBlockDelta {
        index: u32,
        delta: ApiDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: ApiMessageDelta,
        #[serde(default)]
        usage: Option<ApiUsage>,
    },
    MessageStop,
    Ping,
    Error {
        error: ApiErrorBody,
    },
}

#[derive(Debug, Deserialize)]
struct ApiMessageStart {
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlockStart {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
    },
    Thinking {
        #[serde(default)]
        thinking: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta,
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct ApiMessageDelta {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Adapter
// ─────────────────────────────────────────────────────────────────────────────

/// A single Messages API response stream.
pub struct AnthropicStream {
    events: BoxStream<'static, reqwest::Result<SseEvent>>,
    model: String,
    cancel: CancellationToken,
    accumulator: ToolCallAccumulator,
    input_tokens: u64,
    omitted: Vec<OmittedTool>,
    done: bool,
}

impl AnthropicStream {
    pub fn new<S>(events: S, model: impl Into<String>, cancel: CancellationToken, omitted: Vec<OmittedTool>) -> Self
    where
        S: Stream<Item = reqwest::Result<SseEvent>> + Send + 'static,
    {
        Self {
            events: events.boxed(),
            model: model.into(),
            cancel,
            accumulator: ToolCallAccumulator::new(),
            input_tokens: 0,
            omitted,
            done: false,
        }
    }

    /// A stream that has already ended.
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

    fn protocol(&self, message: impl Into<String>) -> Error {
        Error::protocol(PROVIDER, &self.model, message)
    }

    fn parse(&self, data: &str) -> Result<StreamEvent> {
        let EventKind { kind } = serde_json::from_str(data)
            .map_err(|err| self.protocol(format!("unparseable stream event: {err}")))?;
        if !KNOWN_EVENTS.contains(&kind.as_str()) {
            return Err(self.protocol(format!("unexpected stream event: {kind}")));
        }
        serde_json::from_str(data).map_err(|err| self.protocol(format!("malformed {kind} event: {err}")))
    }

    fn handle(&mut self, event: StreamEvent) -> Result<Option<StreamDelta>> {
        let delta = match event {
            StreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.unwrap_or_default().input_tokens;
                Some(StreamDelta::role(Role::Assistant))
            }
            StreamEvent::ContentBlockStart { index, content_block } => match content_block {
                ApiBlockStart::Text { text } if !text.is_empty() => Some(StreamDelta::content(text)),
                ApiBlockStart::Thinking { thinking } if !thinking.is_empty() => Some(StreamDelta::reasoning(thinking)),
                ApiBlockStart::ToolUse { id, name } => Some(StreamDelta::tool_call(self.accumulator.start(index, id, name))),
                _ => None,
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ApiDelta::TextDelta { text } if !text.is_empty() => Some(StreamDelta::content(text)),
                ApiDelta::ThinkingDelta { thinking } if !thinking.is_empty() => Some(StreamDelta::reasoning(thinking)),
                ApiDelta::InputJsonDelta { partial_json } => {
                    self.accumulator.append(index, &partial_json);
                    None
                }
                _ => None,
            },
            StreamEvent::ContentBlockStop { index } => self.accumulator.finish(index).map(StreamDelta::tool_call),
            StreamEvent::MessageDelta { delta, usage } => {
                let out = StreamDelta {
                    finish_reason: delta.stop_reason.as_deref().map(map_stop_reason),
                    usage: usage.map(|usage| Usage {
                        input_tokens: self.input_tokens.max(usage.input_tokens),
                        output_tokens: usage.output_tokens,
                    }),
                    ..StreamDelta::default()
                };
                (out.finish_reason.is_some() || out.usage.is_some()).then_some(out)
            }
            StreamEvent::MessageStop | StreamEvent::Ping => None,
            StreamEvent::Error { error } => {
                return Err(self.protocol(format!("{}: {}", error.kind, error.message)));
            }
        };
        Ok(delta)
    }
}

#[async_trait]
impl MessageStream for AnthropicStream {
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

            let event = match next {
                Some(Ok(event)) => event,
                Some(Err(err)) => {
                    self.close();
                    return Err(Error::Network(err));
                }
                None => {
                    self.close();
                    return Ok(None);
                }
            };

            let result = self.parse(&event.data).and_then(|parsed| self.handle(parsed));
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

impl std::fmt::Debug for AnthropicStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicStream")
            .field("model", &self.model)
            .field("pending_tool_calls", &self.accumulator.len())
            .field("done", &self.done)
            .finish()
    }
}
