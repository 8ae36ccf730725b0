//! Canonical messages and tools to Converse request types.

use super::PROVIDER;
use crate::multimodal::{ImageSource, image_format, is_blank, resolve_image};
use crate::{ChatMessage, Error, ImageUrl, MessagePart, OmittedTool, Result, Role, Tool, ToolCall, normalize_schema};
use aws_sdk_bedrockruntime::error::BuildError;
use aws_sdk_bedrockruntime::primitives::Blob;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, ImageBlock, ImageFormat, InferenceConfiguration, Message, SystemContentBlock,
    ToolConfiguration, ToolInputSchema, ToolResultBlock, ToolResultContentBlock, ToolSpecification, ToolUseBlock,
};
use aws_smithy_types::{Document, Number};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Map, Value};
use tracing::{debug, warn};

fn build_error(err: BuildError) -> Error {
    Error::translation(format!("invalid Converse request: {err}"))
}

/// JSON to the SDK's document type.
pub(crate) fn to_document(value: &Value) -> Document {
    match value {
        Value::Null => Document::Null,
        Value::Bool(b) => Document::Bool(*b),
        Value::Number(n) => Document::Number(match (n.as_u64(), n.as_i64()) {
            (Some(u), _) => Number::PosInt(u),
            (None, Some(i)) => Number::NegInt(i),
            (None, None) => Number::Float(n.as_f64().unwrap_or_default()),
        }),
        Value::String(s) => Document::String(s.clone()),
        Value::Array(items) => Document::Array(items.iter().map(to_document).collect()),
        Value::Object(map) => Document::Object(map.iter().map(|(k, v)| (k.clone(), to_document(v))).collect()),
    }
}

/// `None` when nothing is set.
pub(crate) fn inference_config(
    max_tokens: Option<u64>,
    temperature: Option<f64>,
    top_p: Option<f64>,
) -> Option<InferenceConfiguration> {
    if max_tokens.is_none() && temperature.is_none() && top_p.is_none() {
        return None;
    }
    Some(
        InferenceConfiguration::builder()
            .set_max_tokens(max_tokens.map(|t| i32::try_from(t).unwrap_or(i32::MAX)))
            .set_temperature(temperature.map(|t| t as f32))
            .set_top_p(top_p.map(|p| p as f32))
            .build(),
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────────────────

fn message(role: ConversationRole, content: Vec<ContentBlock>) -> Result<Message> {
    Message::builder()
        .role(role)
        .set_content(Some(content))
        .build()
        .map_err(build_error)
}

/// Split canonical messages into Converse messages and system blocks.
///
/// Consecutive tool results are coalesced into one user message. Messages
/// that produce no content blocks are dropped.
pub(crate) async fn convert_messages(messages: &[ChatMessage]) -> Result<(Vec<Message>, Vec<SystemContentBlock>)> {
    let mut converted = Vec::with_capacity(messages.len());
    let mut system = Vec::new();

    let mut i = 0;
    while i < messages.len() {
        let current = &messages[i];
        i += 1;

        match current.role {
            Role::System => {
                system.extend(text_blocks(current).into_iter().map(SystemContentBlock::Text));
            }
            Role::Tool if current.tool_call_id.is_some() => {
                let mut results = vec![tool_result(current)?];
                while let Some(next) = messages.get(i) {
                    if next.role != Role::Tool || next.tool_call_id.is_none() {
                        break;
                    }
                    results.push(tool_result(next)?);
                    i += 1;
                }
                converted.push(message(ConversationRole::User, results)?);
            }
            Role::Assistant if !current.tool_calls.is_empty() => {
                let mut content = Vec::with_capacity(current.tool_calls.len() + 1);
                if !is_blank(&current.content) {
                    content.push(ContentBlock::Text(current.content.clone()));
                }
                for call in &current.tool_calls {
                    content.push(tool_use(call)?);
                }
                converted.push(message(ConversationRole::Assistant, content)?);
            }
            role => {
                let content = content_blocks(current).await?;
                if content.is_empty() {
                    debug!(role = %role, "skipping message without content");
                    continue;
                }
                let role = if role == Role::Assistant {
                    ConversationRole::Assistant
                } else {
                    ConversationRole::User
                };
                converted.push(message(role, content)?);
            }
        }
    }

    Ok((converted, system))
}

fn text_blocks(message: &ChatMessage) -> Vec<String> {
    if message.multi_content.is_empty() {
        return (!is_blank(&message.content))
            .then(|| message.content.clone())
            .into_iter()
            .collect();
    }
    message
        .multi_content
        .iter()
        .filter_map(|part| match part {
            MessagePart::Text { text } if !is_blank(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Text and image blocks of a user or assistant message, in part order.
pub(crate) async fn content_blocks(message: &ChatMessage) -> Result<Vec<ContentBlock>> {
    if message.multi_content.is_empty() {
        if is_blank(&message.content) {
            return Ok(Vec::new());
        }
        return Ok(vec![ContentBlock::Text(message.content.clone())]);
    }

    let mut blocks = Vec::with_capacity(message.multi_content.len());
    for part in &message.multi_content {
        match part {
            MessagePart::Text { text } => {
                if !is_blank(text) {
                    blocks.push(ContentBlock::Text(text.clone()));
                }
            }
            MessagePart::ImageUrl { image_url: Some(image) } => {
                if let Some(block) = image_block(image).await? {
                    blocks.push(block);
                }
            }
            MessagePart::ImageUrl { image_url: None } => {}
        }
    }
    Ok(blocks)
}

async fn image_block(image: &ImageUrl) -> Result<Option<ContentBlock>> {
    let Some(source) = resolve_image(image).await else {
        return Ok(None);
    };
    match source {
        ImageSource::Inline(inline) => {
            let Some(format) = image_format(&inline.mime_type) else {
                warn!(provider = PROVIDER, mime_type = %inline.mime_type, "unsupported image format, skipping");
                return Ok(None);
            };
            let bytes = match STANDARD.decode(&inline.data) {
                Ok(bytes) => bytes,
                Err(err) => {
                    warn!(provider = PROVIDER, %err, "image data is not valid base64, skipping");
                    return Ok(None);
                }
            };
            let block = ImageBlock::builder()
                .format(ImageFormat::from(format))
                .source(aws_sdk_bedrockruntime::types::ImageSource::Bytes(Blob::new(bytes)))
                .build()
                .map_err(build_error)?;
            Ok(Some(ContentBlock::Image(block)))
        }
        ImageSource::Remote(url) => {
            debug!(provider = PROVIDER, %url, "remote image URLs are not supported, skipping");
            Ok(None)
        }
        ImageSource::FileId { id, .. } => {
            debug!(provider = PROVIDER, file_id = %id, "file references are not supported, skipping");
            Ok(None)
        }
        ImageSource::FileUri(uri) => {
            debug!(provider = PROVIDER, %uri, "file URIs are not supported, skipping");
            Ok(None)
        }
    }
}

fn tool_result(message: &ChatMessage) -> Result<ContentBlock> {
    ToolResultBlock::builder()
        .tool_use_id(message.tool_call_id.clone().unwrap_or_default())
        .content(ToolResultContentBlock::Text(message.content.clone()))
        .build()
        .map(ContentBlock::ToolResult)
        .map_err(build_error)
}

fn tool_use(call: &ToolCall) -> Result<ContentBlock> {
    ToolUseBlock::builder()
        .tool_use_id(call.id.clone())
        .name(call.function.name.clone())
        .input(to_document(&tool_input(&call.function.name, &call.function.arguments)))
        .build()
        .map(ContentBlock::ToolUse)
        .map_err(build_error)
}

/// Parse call arguments into a JSON object, falling back to `{}`.
pub(crate) fn tool_input(name: &str, arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return Value::Object(Map::new());
    }
    match serde_json::from_str::<Value>(arguments) {
        Ok(value @ Value::Object(_)) => value,
        Ok(other) => {
            warn!(tool = name, kind = json_kind(&other), "tool arguments are not an object, sending {{}}");
            Value::Object(Map::new())
        }
        Err(err) => {
            warn!(tool = name, %err, "invalid tool arguments, sending {{}}");
            Value::Object(Map::new())
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tools
// ─────────────────────────────────────────────────────────────────────────────

fn valid_tool_name(name: &str) -> bool {
    (1..=64).contains(&name.len())
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Build the tool config. Tools that cannot be expressed are returned
/// separately and left out of the request.
pub(crate) fn convert_tools(tools: &[Tool]) -> Result<(Option<ToolConfiguration>, Vec<OmittedTool>)> {
    let mut entries = Vec::with_capacity(tools.len());
    let mut omitted = Vec::new();

    for tool in tools {
        if !valid_tool_name(&tool.name) {
            omitted.push(OmittedTool {
                name: tool.name.clone(),
                reason: "name must match [A-Za-z0-9_-]{1,64}".to_string(),
            });
            continue;
        }
        let mut schema = match normalize_schema(&tool.parameters) {
            Ok(schema) => schema,
            Err(err) => {
                omitted.push(OmittedTool {
                    name: tool.name.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };
        schema.remove("additionalProperties");

        let spec = ToolSpecification::builder()
            .name(tool.name.clone())
            .set_description((!tool.description.is_empty()).then(|| tool.description.clone()))
            .input_schema(ToolInputSchema::Json(to_document(&Value::Object(schema))))
            .build()
            .map_err(build_error)?;
        entries.push(aws_sdk_bedrockruntime::types::Tool::ToolSpec(spec));
    }

    for tool in &omitted {
        warn!(provider = PROVIDER, tool = %tool.name, reason = %tool.reason, "omitting tool from request");
    }

    if entries.is_empty() {
        return Ok((None, omitted));
    }
    let config = ToolConfiguration::builder()
        .set_tools(Some(entries))
        .build()
        .map_err(build_error)?;
    Ok((Some(config), omitted))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileReference;
    use aws_sdk_bedrockruntime::types::ImageSource as BytesSource;
    use serde_json::json;

    fn image(url: &str) -> MessagePart {
        MessagePart::image(ImageUrl::url(url))
    }

    async fn blocks(parts: Vec<MessagePart>) -> Vec<ContentBlock> {
        content_blocks(&ChatMessage::parts(Role::User, parts)).await.unwrap()
    }

    fn image_bytes(block: &ContentBlock) -> (&ImageFormat, &[u8]) {
        let ContentBlock::Image(image) = block else {
            panic!("expected image block, got {block:?}");
        };
        let Some(BytesSource::Bytes(blob)) = image.source() else {
            panic!("expected inline bytes, got {:?}", image.source());
        };
        (image.format(), blob.as_ref())
    }

    #[tokio::test]
    async fn plain_text_yields_one_block_unless_blank() {
        assert_eq!(
            content_blocks(&ChatMessage::user("Hello world")).await.unwrap(),
            vec![ContentBlock::Text("Hello world".into())]
        );
        assert!(content_blocks(&ChatMessage::user("   ")).await.unwrap().is_empty());
        assert!(content_blocks(&ChatMessage::user("")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_url_becomes_raw_image_bytes() {
        let result = blocks(vec![image("data:image/png;base64,iVBORw0KGgo=")]).await;
        assert_eq!(result.len(), 1);
        let (format, bytes) = image_bytes(&result[0]);
        assert_eq!(*format, ImageFormat::Png);
        assert_eq!(bytes, b"\x89PNG\r\n\x1a\n");
    }

    #[tokio::test]
    async fn unsupported_image_sources_yield_nothing() {
        assert!(blocks(vec![image("https://example.com/cat.png")]).await.is_empty());
        assert!(blocks(vec![image("data:image/png;base64")]).await.is_empty());
        assert!(blocks(vec![image("data:image/bmp;base64,Qk0=")]).await.is_empty());
        assert!(
            blocks(vec![MessagePart::image(ImageUrl::file(FileReference::file_id(
                "file-1",
                "image/png"
            )))])
            .await
            .is_empty()
        );
        assert!(
            blocks(vec![MessagePart::image(ImageUrl::file(FileReference::file_uri(
                "gs://bucket/cat.png",
                "image/png"
            )))])
            .await
            .is_empty()
        );
    }

    #[tokio::test]
    async fn missing_local_file_keeps_text() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.png");
        let result = blocks(vec![
            MessagePart::text("what is this?"),
            MessagePart::image(ImageUrl::file(FileReference::local(
                missing.to_string_lossy(),
                "image/png",
            ))),
        ])
        .await;
        assert_eq!(result, vec![ContentBlock::Text("what is this?".into())]);
    }

    #[tokio::test]
    async fn local_file_is_embedded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pixel.gif");
        std::fs::write(&path, b"GIF89a").unwrap();

        let result = blocks(vec![MessagePart::image(ImageUrl::file(FileReference::local(
            path.to_string_lossy(),
            "image/gif",
        )))])
        .await;
        let (format, bytes) = image_bytes(&result[0]);
        assert_eq!(*format, ImageFormat::Gif);
        assert_eq!(bytes, b"GIF89a");
    }

    #[tokio::test]
    async fn coalesces_consecutive_tool_results() {
        let messages = vec![
            ChatMessage::system("be brief"),
            ChatMessage::user("weather?"),
            ChatMessage::assistant("checking").with_tool_calls(vec![
                ToolCall::new("t1", "weather", r#"{"city":"Paris"}"#),
                ToolCall::new("t2", "weather", ""),
            ]),
            ChatMessage::tool("t1", "sunny"),
            ChatMessage::tool("t2", "rainy"),
            ChatMessage::assistant("   "),
        ];

        let (converted, system) = convert_messages(&messages).await.unwrap();
        assert_eq!(system, vec![SystemContentBlock::Text("be brief".into())]);
        assert_eq!(converted.len(), 3);

        let assistant = &converted[1];
        assert_eq!(*assistant.role(), ConversationRole::Assistant);
        assert_eq!(assistant.content()[0], ContentBlock::Text("checking".into()));
        let calls: Vec<_> = assistant.content()[1..]
            .iter()
            .map(|block| match block {
                ContentBlock::ToolUse(call) => (call.tool_use_id(), call.input().clone()),
                other => panic!("expected tool use, got {other:?}"),
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                ("t1", to_document(&json!({"city": "Paris"}))),
                ("t2", to_document(&json!({}))),
            ]
        );

        let results = &converted[2];
        assert_eq!(*results.role(), ConversationRole::User);
        let ids: Vec<_> = results
            .content()
            .iter()
            .map(|block| match block {
                ContentBlock::ToolResult(result) => {
                    assert_eq!(result.content().len(), 1);
                    result.tool_use_id()
                }
                other => panic!("expected tool result, got {other:?}"),
            })
            .collect();
        assert_eq!(ids, vec!["t1", "t2"]);
    }

    #[test]
    fn malformed_arguments_become_empty_object() {
        assert_eq!(tool_input("t", "{not json"), json!({}));
        assert_eq!(tool_input("t", "[1,2]"), json!({}));
        assert_eq!(tool_input("t", r#"{"a":1}"#), json!({"a": 1}));
    }

    #[test]
    fn documents_keep_number_kinds() {
        let doc = to_document(&json!({"n": -3, "u": 7, "f": 0.5, "list": [true, null, "x"]}));
        let Document::Object(map) = doc else {
            panic!("expected object");
        };
        assert_eq!(map["n"], Document::Number(Number::NegInt(-3)));
        assert_eq!(map["u"], Document::Number(Number::PosInt(7)));
        assert_eq!(map["f"], Document::Number(Number::Float(0.5)));
        assert_eq!(
            map["list"],
            Document::Array(vec![Document::Bool(true), Document::Null, Document::String("x".into())])
        );
    }

    #[test]
    fn tools_are_normalized_or_omitted() {
        let tools = vec![
            Tool::new(
                "search",
                "Search the web",
                json!({"type": "object", "properties": {"q": {"type": "string"}}, "additionalProperties": false, "required": null}),
            ),
            Tool::new("bad name!", "", json!({})),
            Tool::new("scalar", "", json!("string")),
        ];

        let (config, omitted) = convert_tools(&tools).unwrap();
        let config = config.unwrap();
        assert_eq!(config.tools().len(), 1);

        let aws_sdk_bedrockruntime::types::Tool::ToolSpec(spec) = &config.tools()[0] else {
            panic!("expected tool spec");
        };
        assert_eq!(spec.name(), "search");
        assert_eq!(spec.description(), Some("Search the web"));
        assert_eq!(
            spec.input_schema(),
            Some(&ToolInputSchema::Json(to_document(
                &json!({"type": "object", "properties": {"q": {"type": "string"}}})
            )))
        );

        let names: Vec<_> = omitted.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["bad name!", "scalar"]);
    }

    #[test]
    fn no_convertible_tools_means_no_tool_config() {
        let (config, omitted) = convert_tools(&[Tool::new("bad name!", "", json!({}))]).unwrap();
        assert!(config.is_none());
        assert_eq!(omitted.len(), 1);
    }

    #[test]
    fn inference_config_is_omitted_when_empty() {
        assert_eq!(inference_config(None, None, None), None);
        let config = inference_config(Some(1024), None, Some(0.9)).unwrap();
        assert_eq!(config.max_tokens(), Some(1024));
        assert_eq!(config.temperature(), None);
        assert_eq!(config.top_p(), Some(0.9));
    }
}
