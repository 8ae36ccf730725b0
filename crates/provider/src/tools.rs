//! Tool definitions and JSON-schema normalization.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool definition supplied by the toolset layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON schema for the tool's arguments. `null` means "no arguments".
    #[serde(default)]
    pub parameters: Value,
}

impl Tool {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A tool left out of a request because it could not be converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OmittedTool {
    pub name: String,
    pub reason: String,
}

/// Normalize a tool parameter schema into an object schema.
///
/// - `null` becomes an empty object schema.
/// - A missing `type` defaults to `"object"`, missing `properties` to `{}`.
/// - `"required": null` is removed.
/// - Every property without a `type` gets `"object"`, recursing through
///   nested `properties` and array `items`.
///
/// Anything other than a JSON object or `null` is rejected.
pub fn normalize_schema(parameters: &Value) -> Result<Map<String, Value>> {
    let mut schema = match parameters {
        Value::Null => Map::new(),
        Value::Object(map) => map.clone(),
        other => {
            return Err(Error::translation(format!(
                "tool schema must be a JSON object, got {}",
                json_kind(other)
            )));
        }
    };

    if schema.get("type").is_none_or(Value::is_null) {
        schema.insert("type".into(), Value::String("object".into()));
    }
    if schema.get("properties").is_none_or(Value::is_null) {
        schema.insert("properties".into(), Value::Object(Map::new()));
    }
    if schema.get("required").is_some_and(Value::is_null) {
        schema.remove("required");
    }

    ensure_property_types(&mut schema);
    Ok(schema)
}

fn ensure_property_types(schema: &mut Map<String, Value>) {
    let Some(Value::Object(properties)) = schema.get_mut("properties") else {
        return;
    };

    for property in properties.values_mut() {
        let Value::Object(property) = property else {
            continue;
        };

        if property.get("type").is_none_or(Value::is_null) {
            property.insert("type".into(), Value::String("object".into()));
        }

        ensure_property_types(property);

        if let Some(Value::Object(items)) = property.get_mut("items") {
            ensure_property_types(items);
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
