//! Canonical messages and tools to Messages API JSON.

use super::PROVIDER;
use crate::multimodal::{ImageSource, image_format, read_local_image, resolve_image};
use crate::{ChatMessage, Error, ImageUrl, MessagePart, OmittedTool, Result, Role, Tool, normalize_schema};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;
use tracing::{debug, warn};

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct ApiRequest {
    pub model: String,
    pub max_tokens: u64,
    pub messages: Vec<ApiMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub system: Vec<ApiSystemBlock>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ApiTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ApiThinking>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    pub stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ApiSystemBlock {
    #[serde(rename = "type")]
    pub block_type: &'static str,
    pub text: String,
}

impl ApiSystemBlock {
    fn text(text: impl Into<String>) -> Self {
        Self {
            block_type: "text",
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub(crate) struct ApiCacheControl {
    #[serde(rename = "type")]
    pub control_type: &'static str,
}

const EPHEMERAL: ApiCacheControl = ApiCacheControl {
    control_type: "ephemeral",
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ApiMessage {
    pub role: &'static str,
    pub content: Vec<ApiContentBlock>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiContentBlock {
    Text {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<ApiCacheControl>,
    },
    Image {
        source: ApiImageSource,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<ApiCacheControl>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<ApiCacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        cache_control: Option<ApiCacheControl>,
    },
}

impl ApiContentBlock {
    fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            cache_control: None,
        }
    }

    fn image(source: ApiImageSource) -> Self {
        Self::Image {
            source,
            cache_control: None,
        }
    }

    fn set_cache_control(&mut self, control: ApiCacheControl) {
        match self {
            Self::Text { cache_control, .. }
            | Self::Image { cache_control, .. }
            | Self::ToolUse { cache_control, .. }
            | Self::ToolResult { cache_control, .. } => *cache_control = Some(control),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum ApiImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ApiTool {
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    pub input_schema: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct ApiThinking {
    #[serde(rename = "type")]
    pub thinking_type: &'static str,
    pub budget_tokens: u64,
}

impl ApiThinking {
    pub fn enabled(budget_tokens: u64) -> Self {
        Self {
            thinking_type: "enabled",
            budget_tokens,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

/// Trimmed text of every system message, in order.
pub(crate) fn system_blocks(messages: &[ChatMessage]) -> Vec<ApiSystemBlock> {
    let mut blocks = Vec::new();
    for message in messages.iter().filter(|m| m.role == Role::System) {
        if message.multi_content.is_empty() {
            let text = message.content.trim();
            if !text.is_empty() {
                blocks.push(ApiSystemBlock::text(text));
            }
            continue;
        }
        for part in &message.multi_content {
            if let MessagePart::Text { text } = part {
                let text = text.trim();
                if !text.is_empty() {
                    blocks.push(ApiSystemBlock::text(text));
                }
            }
        }
    }
    blocks
}

/// Convert the conversation, excluding system messages.
///
/// Every assistant turn with tool calls must be followed directly by tool
/// results for exactly those calls; consecutive results are grouped into a
/// single user message. The last block of the final two messages is marked
/// for prompt caching.
pub(crate) async fn convert_messages(messages: &[ChatMessage]) -> Result<Vec<ApiMessage>> {
    let mut converted: Vec<ApiMessage> = Vec::with_capacity(messages.len());
    let mut pending: Option<HashSet<String>> = None;

    let mut i = 0;
    while i < messages.len() {
        let message = &messages[i];
        i += 1;

        match message.role {
            Role::System => {}
            Role::User => {
                if pending.is_some() {
                    return Err(unanswered_tool_use());
                }
                let content = user_content(message).await;
                if !content.is_empty() {
                    converted.push(ApiMessage { role: "user", content });
                }
            }
            Role::Assistant => {
                if pending.is_some() {
                    return Err(unanswered_tool_use());
                }
                let mut content = Vec::with_capacity(message.tool_calls.len() + 1);
                let text = message.content.trim();
                if !text.is_empty() {
                    content.push(ApiContentBlock::text(text));
                }
                if !message.tool_calls.is_empty() {
                    let mut ids = HashSet::with_capacity(message.tool_calls.len());
                    for call in &message.tool_calls {
                        if !call.id.is_empty() {
                            ids.insert(call.id.clone());
                        }
                        content.push(ApiContentBlock::ToolUse {
                            id: call.id.clone(),
                            name: call.function.name.clone(),
                            input: tool_input(&call.function.name, &call.function.arguments),
                            cache_control: None,
                        });
                    }
                    pending = Some(ids);
                }
                if !content.is_empty() {
                    converted.push(ApiMessage {
                        role: "assistant",
                        content,
                    });
                }
            }
            Role::Tool => {
                let Some(mut expected) = pending.take() else {
                    return Err(Error::translation(format!(
                        "unexpected tool result without preceding tool_use (tool_use_id={:?})",
                        message.tool_call_id.as_deref().unwrap_or_default()
                    )));
                };

                let mut results = vec![tool_result(message, &mut expected)?];
                while let Some(next) = messages.get(i) {
                    if next.role != Role::Tool {
                        break;
                    }
                    results.push(tool_result(next, &mut expected)?);
                    i += 1;
                }
                if let Some(missing) = expected.iter().next() {
                    return Err(Error::translation(format!(
                        "missing tool_result for tool_use id {missing} (and {} more)",
                        expected.len() - 1
                    )));
                }
                converted.push(ApiMessage {
                    role: "user",
                    content: results,
                });
            }
        }
    }

    if pending.is_some() {
        return Err(Error::translation(
            "assistant tool_use present but no subsequent tool results",
        ));
    }

    apply_cache_control(&mut converted);
    Ok(converted)
}

fn unanswered_tool_use() -> Error {
    Error::translation("assistant tool_use must be immediately followed by tool results")
}

fn tool_result(message: &ChatMessage, expected: &mut HashSet<String>) -> Result<ApiContentBlock> {
    let id = message
        .tool_call_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::translation("tool result is missing tool_use_id"))?;
    if !expected.remove(id) {
        return Err(Error::translation(format!("unexpected tool_result tool_use_id={id:?}")));
    }
    Ok(ApiContentBlock::ToolResult {
        tool_use_id: id.to_string(),
        content: message.content.trim().to_string(),
        cache_control: None,
    })
}

fn tool_input(name: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Map<String, Value>>(arguments) {
        Ok(input) => Value::Object(input),
        Err(err) => {
            warn!(tool = name, %err, "invalid tool arguments, sending {{}}");
            Value::Object(Map::new())
        }
    }
}

fn apply_cache_control(messages: &mut [ApiMessage]) {
    let start = messages.len().saturating_sub(2);
    for message in &mut messages[start..] {
        if let Some(block) = message.content.last_mut() {
            block.set_cache_control(EPHEMERAL);
        }
    }
}

/// Text and image blocks of a user message, in part order.
pub(crate) async fn user_content(message: &ChatMessage) -> Vec<ApiContentBlock> {
    if message.multi_content.is_empty() {
        let text = message.content.trim();
        if text.is_empty() {
            return Vec::new();
        }
        return vec![ApiContentBlock::text(text)];
    }

    let mut blocks = Vec::with_capacity(message.multi_content.len());
    for part in &message.multi_content {
        match part {
            MessagePart::Text { text } => {
                let text = text.trim();
                if !text.is_empty() {
                    blocks.push(ApiContentBlock::text(text));
                }
            }
            MessagePart::ImageUrl { image_url: Some(image) } => {
                if let Some(source) = image_source(image).await {
                    blocks.push(ApiContentBlock::image(source));
                }
            }
            MessagePart::ImageUrl { image_url: None } => {}
        }
    }
    blocks
}

async fn image_source(image: &ImageUrl) -> Option<ApiImageSource> {
    let inline = match resolve_image(image).await? {
        ImageSource::Inline(inline) => inline,
        ImageSource::Remote(url) => return Some(ApiImageSource::Url { url }),
        ImageSource::FileId {
            id,
            local_path: Some(path),
            mime_type,
        } => {
            debug!(provider = PROVIDER, file_id = %id, %path, "sending file reference from its local copy");
            read_local_image(&path, &mime_type).await?
        }
        ImageSource::FileId { id, local_path: None, .. } => {
            debug!(provider = PROVIDER, file_id = %id, "file reference without a local copy, skipping");
            return None;
        }
        ImageSource::FileUri(uri) => {
            debug!(provider = PROVIDER, %uri, "file URIs are not supported, skipping");
            return None;
        }
    };

    if image_format(&inline.mime_type).is_none() {
        warn!(provider = PROVIDER, mime_type = %inline.mime_type, "unsupported image type, skipping");
        return None;
    }
    Some(ApiImageSource::Base64 {
        media_type: inline.mime_type,
        data: inline.data,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

/// Convert tool definitions, setting aside any whose schema is unusable.
pub(crate) fn convert_tools(tools: &[Tool]) -> (Vec<ApiTool>, Vec<OmittedTool>) {
    let mut converted = Vec::with_capacity(tools.len());
    let mut omitted = Vec::new();

    for tool in tools {
        match normalize_schema(&tool.parameters) {
            Ok(schema) => converted.push(ApiTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: Value::Object(schema),
            }),
            Err(err) => {
                warn!(provider = PROVIDER, tool = %tool.name, %err, "omitting tool from request");
                omitted.push(OmittedTool {
                    name: tool.name.clone(),
                    reason: err.to_string(),
                });
            }
        }
    }
    (converted, omitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileReference, ToolCall};
    use serde_json::json;

    #[tokio::test]
    async fn image_sources() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.png");
        std::fs::write(&path, b"\x89PNG").unwrap();

        let message = ChatMessage::parts(
            Role::User,
            vec![
                MessagePart::text("  look  "),
                MessagePart::image(ImageUrl::url("data:image/png;base64,iVBORw0KGgo=")),
                MessagePart::image(ImageUrl::url("https://example.com/cat.jpg")),
                MessagePart::image(ImageUrl::file(FileReference {
                    local_path: path.to_string_lossy().into_owned(),
                    ..FileReference::file_id("file-1", "image/png")
                })),
                MessagePart::image(ImageUrl::file(FileReference::file_id("file-2", "image/png"))),
                MessagePart::image(ImageUrl::file(FileReference::file_uri("gs://b/o.png", "image/png"))),
                MessagePart::image(ImageUrl::url("data:image/png;base64")),
            ],
        );

        let blocks = serde_json::to_value(user_content(&message).await).unwrap();
        assert_eq!(
            blocks,
            json!([
                {"type": "text", "text": "look"},
                {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw0KGgo="}},
                {"type": "image", "source": {"type": "url", "url": "https://example.com/cat.jpg"}},
                {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "iVBORw=="}},
            ])
        );
    }

    #[tokio::test]
    async fn groups_tool_results_and_marks_cache() {
        let messages = vec![
            ChatMessage::system("rules"),
            ChatMessage::user("go"),
            ChatMessage::assistant("").with_tool_calls(vec![
                ToolCall::new("a", "ls", "{}"),
                ToolCall::new("b", "cat", "not json"),
            ]),
            ChatMessage::tool("b", "file body"),
            ChatMessage::tool("a", "dir listing"),
        ];

        let converted = convert_messages(&messages).await.unwrap();
        assert_eq!(converted.len(), 3);
        assert_eq!(
            serde_json::to_value(&converted[1]).unwrap(),
            json!({"role": "assistant", "content": [
                {"type": "tool_use", "id": "a", "name": "ls", "input": {}},
                {"type": "tool_use", "id": "b", "name": "cat", "input": {}, "cache_control": {"type": "ephemeral"}},
            ]})
        );
        assert_eq!(
            serde_json::to_value(&converted[2]).unwrap(),
            json!({"role": "user", "content": [
                {"type": "tool_result", "tool_use_id": "b", "content": "file body"},
                {"type": "tool_result", "tool_use_id": "a", "content": "dir listing", "cache_control": {"type": "ephemeral"}},
            ]})
        );
        assert_eq!(system_blocks(&messages), vec![ApiSystemBlock::text("rules")]);
    }

    #[tokio::test]
    async fn tool_sequence_errors() {
        let orphan = vec![ChatMessage::user("hi"), ChatMessage::tool("x", "result")];
        let err = convert_messages(&orphan).await.unwrap_err();
        assert!(matches!(err, Error::Translation(_)));

        let unanswered = vec![
            ChatMessage::assistant("").with_tool_calls(vec![ToolCall::new("a", "ls", "{}")]),
            ChatMessage::user("never mind"),
        ];
        assert!(convert_messages(&unanswered).await.is_err());

        let partial = vec![
            ChatMessage::assistant("").with_tool_calls(vec![
                ToolCall::new("a", "ls", "{}"),
                ToolCall::new("b", "ls", "{}"),
            ]),
            ChatMessage::tool("a", "ok"),
        ];
        let err = convert_messages(&partial).await.unwrap_err();
        assert!(err.to_string().contains("missing tool_result for tool_use id b"));

        let trailing = vec![ChatMessage::assistant("").with_tool_calls(vec![ToolCall::new("a", "ls", "")])];
        assert!(convert_messages(&trailing).await.is_err());
    }

    #[test]
    fn tools_with_bad_schema_are_omitted() {
        let tools = vec![
            Tool::new("ok", "", Value::Null),
            Tool::new("bad", "", json!([1, 2])),
        ];
        let (converted, omitted) = convert_tools(&tools);
        assert_eq!(converted.len(), 1);
        assert_eq!(converted[0].input_schema, json!({"type": "object", "properties": {}}));
        assert_eq!(omitted.len(), 1);
        assert_eq!(omitted[0].name, "bad");
    }
}
