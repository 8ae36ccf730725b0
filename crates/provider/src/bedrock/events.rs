//! Converse stream events and the errors the SDK raises while streaming.

use super::PROVIDER;
use crate::Error;
use aws_sdk_bedrockruntime::types::{
    ContentBlockDelta, ContentBlockStart, ConverseStreamOutput, ReasoningContentBlockDelta,
};
use aws_smithy_runtime_api::client::result::{ConnectorError, SdkError};
use aws_smithy_types::error::display::DisplayErrorContext;

/// One event of a `converse-stream` response.
#[derive(Debug, Clone, PartialEq)]
pub enum ConverseStreamEvent {
    MessageStart {
        role: String,
    },
    ContentBlockStart {
        index: u32,
        tool_use: Option<ToolUseStart>,
    },
    ContentBlockDelta {
        index: u32,
        delta: ContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    /// `stop_reason` is empty when the service sent none.
    MessageStop {
        stop_reason: String,
    },
    Metadata {
        usage: Option<TokenUsage>,
    },
    /// An event type this adapter does not know.
    Unknown(String),
}

impl ConverseStreamEvent {
    pub fn kind(&self) -> &str {
        match self {
            Self::MessageStart { .. } => "messageStart",
            Self::ContentBlockStart { .. } => "contentBlockStart",
            Self::ContentBlockDelta { .. } => "contentBlockDelta",
            Self::ContentBlockStop { .. } => "contentBlockStop",
            Self::MessageStop { .. } => "messageStop",
            Self::Metadata { .. } => "metadata",
            Self::Unknown(kind) => kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolUseStart {
    pub tool_use_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContentDelta {
    Text(String),
    ToolUseInput(String),
    Reasoning(String),
    /// Signatures, redacted reasoning, citations.
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

fn block_index(index: i32) -> u32 {
    u32::try_from(index).unwrap_or_default()
}

fn token_count(count: i32) -> u64 {
    u64::try_from(count).unwrap_or_default()
}

impl From<ConverseStreamOutput> for ConverseStreamEvent {
    fn from(event: ConverseStreamOutput) -> Self {
        match event {
            ConverseStreamOutput::MessageStart(start) => Self::MessageStart {
                role: start.role().as_str().to_string(),
            },
            ConverseStreamOutput::ContentBlockStart(start) => Self::ContentBlockStart {
                index: block_index(start.content_block_index()),
                tool_use: match start.start() {
                    Some(ContentBlockStart::ToolUse(tool)) => Some(ToolUseStart {
                        tool_use_id: tool.tool_use_id().to_string(),
                        name: tool.name().to_string(),
                    }),
                    _ => None,
                },
            },
            ConverseStreamOutput::ContentBlockDelta(event) => Self::ContentBlockDelta {
                index: block_index(event.content_block_index()),
                delta: match event.delta() {
                    Some(ContentBlockDelta::Text(text)) => ContentDelta::Text(text.clone()),
                    Some(ContentBlockDelta::ToolUse(tool)) => ContentDelta::ToolUseInput(tool.input().to_string()),
                    Some(ContentBlockDelta::ReasoningContent(ReasoningContentBlockDelta::Text(text))) => {
                        ContentDelta::Reasoning(text.clone())
                    }
                    _ => ContentDelta::Other,
                },
            },
            ConverseStreamOutput::ContentBlockStop(stop) => Self::ContentBlockStop {
                index: block_index(stop.content_block_index()),
            },
            ConverseStreamOutput::MessageStop(stop) => Self::MessageStop {
                stop_reason: stop.stop_reason().as_str().to_string(),
            },
            ConverseStreamOutput::Metadata(metadata) => Self::Metadata {
                usage: metadata.usage().map(|usage| TokenUsage {
                    input_tokens: token_count(usage.input_tokens()),
                    output_tokens: token_count(usage.output_tokens()),
                }),
            },
            _ => Self::Unknown("unknown".to_string()),
        }
    }
}

/// True when something in the chain failed below HTTP: a refused or reset
/// connection, a timeout, or a body that stopped mid-read.
fn from_transport(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(err) = current {
        if err.is::<ConnectorError>() || err.is::<reqwest::Error>() || err.is::<std::io::Error>() {
            return true;
        }
        current = err.source();
    }
    false
}

/// Classify an SDK failure. Transport failures become [`Error::Connection`];
/// exceptions and undecodable frames become protocol errors.
pub fn sdk_error<E, R>(err: SdkError<E, R>, model: &str) -> Error
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug + 'static,
{
    let message = DisplayErrorContext(&err).to_string();
    let network = match &err {
        SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) => true,
        SdkError::ServiceError(_) => false,
        other => from_transport(other),
    };
    if network {
        Error::Connection {
            vendor: PROVIDER,
            message,
        }
    } else {
        Error::protocol(PROVIDER, model, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_bedrockruntime::types::error::{ConverseStreamOutputError, ThrottlingException};
    use aws_sdk_bedrockruntime::types::{
        ContentBlockDeltaEvent, ContentBlockStartEvent, MessageStopEvent, StopReason, ToolUseBlockDelta,
        ToolUseBlockStart,
    };
    use aws_smithy_types::event_stream::RawMessage;

    type StreamError = SdkError<ConverseStreamOutputError, RawMessage>;

    #[test]
    fn converts_tool_use_start_and_delta() {
        let start = ConverseStreamOutput::ContentBlockStart(
            ContentBlockStartEvent::builder()
                .content_block_index(1)
                .start(ContentBlockStart::ToolUse(
                    ToolUseBlockStart::builder().tool_use_id("t1").name("foo").build().unwrap(),
                ))
                .build()
                .unwrap(),
        );
        assert_eq!(
            ConverseStreamEvent::from(start),
            ConverseStreamEvent::ContentBlockStart {
                index: 1,
                tool_use: Some(ToolUseStart {
                    tool_use_id: "t1".into(),
                    name: "foo".into()
                }),
            }
        );

        let delta = ConverseStreamOutput::ContentBlockDelta(
            ContentBlockDeltaEvent::builder()
                .content_block_index(1)
                .delta(ContentBlockDelta::ToolUse(
                    ToolUseBlockDelta::builder().input("{\"a\":").build().unwrap(),
                ))
                .build()
                .unwrap(),
        );
        assert_eq!(
            ConverseStreamEvent::from(delta),
            ConverseStreamEvent::ContentBlockDelta {
                index: 1,
                delta: ContentDelta::ToolUseInput("{\"a\":".into()),
            }
        );
    }

    #[test]
    fn converts_reasoning_and_stop_reason() {
        let reasoning = ConverseStreamOutput::ContentBlockDelta(
            ContentBlockDeltaEvent::builder()
                .content_block_index(0)
                .delta(ContentBlockDelta::ReasoningContent(ReasoningContentBlockDelta::Text(
                    "hmm".into(),
                )))
                .build()
                .unwrap(),
        );
        assert!(matches!(
            ConverseStreamEvent::from(reasoning),
            ConverseStreamEvent::ContentBlockDelta { delta: ContentDelta::Reasoning(ref t), .. } if t == "hmm"
        ));

        let stop = ConverseStreamOutput::MessageStop(
            MessageStopEvent::builder().stop_reason(StopReason::MaxTokens).build().unwrap(),
        );
        let event = ConverseStreamEvent::from(stop);
        assert_eq!(event.kind(), "messageStop");
        assert_eq!(
            event,
            ConverseStreamEvent::MessageStop {
                stop_reason: "max_tokens".into()
            }
        );
    }

    #[test]
    fn dispatch_failure_is_network_class() {
        let err: StreamError = SdkError::dispatch_failure(ConnectorError::io("connection reset by peer".into()));
        let err = sdk_error(err, "m");
        assert!(matches!(err, Error::Connection { .. }));
        assert!(err.is_network());
    }

    #[test]
    fn body_read_failure_is_network_class() {
        let reset = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "body read failed");
        let err: StreamError = SdkError::response_error(reset, RawMessage::Invalid(None));
        assert!(sdk_error(err, "m").is_network());
    }

    #[test]
    fn stream_exception_is_protocol_error() {
        let exception = ConverseStreamOutputError::ThrottlingException(
            ThrottlingException::builder().message("Too many requests").build(),
        );
        let err: StreamError = SdkError::service_error(exception, RawMessage::Invalid(None));
        let err = sdk_error(err, "anthropic.claude");
        assert!(matches!(err, Error::Protocol { .. }));
        assert!(!err.is_network());
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn undecodable_frame_is_protocol_error() {
        let err: StreamError = SdkError::response_error("invalid prelude checksum", RawMessage::Invalid(None));
        assert!(matches!(sdk_error(err, "m"), Error::Protocol { .. }));
    }
}
