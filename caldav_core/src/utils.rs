use crate::error::ConnectorError;
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use std::sync::Arc;

/// Typed tool parameters: deserialized from the call arguments, then checked
/// for constraints the type system cannot express.
pub trait ToolParams: DeserializeOwned + JsonSchema {
    fn validate(&self) -> Result<(), ConnectorError> {
        Ok(())
    }
}

/// Deserialize and validate tool arguments. Nothing external has been touched
/// when this fails.
pub fn parse_params<T: ToolParams>(arguments: Option<JsonObject>) -> Result<T, ConnectorError> {
    let value = JsonValue::Object(arguments.unwrap_or_default());
    let params: T =
        serde_json::from_value(value).map_err(|e| ConnectorError::InvalidParams(e.to_string()))?;
    params.validate()?;
    Ok(params)
}

/// JSON Schema for a parameter type, inlined so clients never chase `$ref`s.
pub fn input_schema_for<T: JsonSchema>() -> Arc<JsonObject> {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();

    let mut map = match serde_json::to_value(schema) {
        Ok(JsonValue::Object(map)) => map,
        _ => JsonObject::new(),
    };
    map.remove("title");
    map.remove("definitions");
    map.entry("type".to_string())
        .or_insert_with(|| JsonValue::String("object".to_string()));
    map.entry("properties".to_string())
        .or_insert_with(|| JsonValue::Object(JsonObject::new()));
    Arc::new(map)
}

/// Tool definition whose input schema is derived from `T`.
pub fn tool<T: JsonSchema>(name: &'static str, title: &str, description: &'static str) -> Tool {
    Tool {
        name: Cow::Borrowed(name),
        title: Some(title.to_string()),
        description: Some(Cow::Borrowed(description)),
        input_schema: input_schema_for::<T>(),
        output_schema: None,
        annotations: None,
        icons: None,
    }
}

/// Wrap plain text in the uniform tool envelope.
pub fn text_result(text: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(text.into())],
        structured_content: None,
        is_error: Some(false),
        meta: None,
    }
}

/// Failed tool call carrying a human-readable message.
pub fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult {
        content: vec![Content::text(message.into())],
        structured_content: None,
        is_error: Some(true),
        meta: None,
    }
}

pub fn json_text_result<T: Serialize>(data: &T) -> Result<CallToolResult, ConnectorError> {
    Ok(text_result(serde_json::to_string(data)?))
}

pub fn pretty_json_text_result<T: Serialize>(data: &T) -> Result<CallToolResult, ConnectorError> {
    Ok(text_result(serde_json::to_string_pretty(data)?))
}

/// Strict ISO-8601 date-time with an offset (`2025-06-15T10:00:00Z`).
pub fn parse_iso_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ConnectorError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            ConnectorError::InvalidParams(format!(
                "{} must be an ISO-8601 date-time, got '{}': {}",
                field, value, e
            ))
        })
}

/// Lenient date parsing for range bounds.
///
/// Accepts RFC 3339, RFC 2822, a naive `YYYY-MM-DDTHH:MM[:SS]` (local time)
/// or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_loose_datetime(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Local
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc));
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

pub fn required_datetime(field: &str, value: &str) -> Result<DateTime<Utc>, ConnectorError> {
    parse_loose_datetime(value).ok_or_else(|| {
        ConnectorError::InvalidParams(format!("{} is not a parseable date: '{}'", field, value))
    })
}
