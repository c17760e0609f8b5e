//! Tool descriptors, annotation hints, and call results.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::content::Content;

/// Tool definition advertised through `tools/list`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Tool {
    /// Unique tool name.
    pub name: String,
    /// What the tool does, for the client model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input.
    pub input_schema: ToolInputSchema,
    /// Advisory behavior hints.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<ToolAnnotations>,
}

impl Tool {
    /// Create a new tool with an empty object schema.
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: Some(description.into()),
            input_schema: ToolInputSchema::object(),
            annotations: None,
        }
    }

    /// Replace the input schema.
    pub fn with_schema(mut self, schema: ToolInputSchema) -> Self {
        self.input_schema = schema;
        self
    }

    /// Set the annotation hints.
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = Some(annotations);
        self
    }
}

/// Advisory hints about a tool's behavior.
///
/// Purely informational for clients; the server enforces nothing through
/// them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// Tool does not mutate anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_only_hint: Option<bool>,
    /// Tool may destroy data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destructive_hint: Option<bool>,
    /// Repeating the call with the same arguments has no further effect.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotent_hint: Option<bool>,
    /// Tool reaches out beyond the local environment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_world_hint: Option<bool>,
}

impl ToolAnnotations {
    /// Hints for a read-only, idempotent tool.
    pub fn read_only() -> Self {
        Self {
            read_only_hint: Some(true),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: None,
        }
    }

    /// Hints for a mutating but non-destructive, idempotent tool.
    pub fn idempotent_write() -> Self {
        Self {
            read_only_hint: Some(false),
            destructive_hint: Some(false),
            idempotent_hint: Some(true),
            open_world_hint: None,
        }
    }

    /// Hints for a destructive tool.
    pub fn destructive() -> Self {
        Self {
            read_only_hint: Some(false),
            destructive_hint: Some(true),
            idempotent_hint: Some(true),
            open_world_hint: None,
        }
    }

    /// Mark the tool as reaching external services.
    pub fn open_world(mut self) -> Self {
        self.open_world_hint = Some(true);
        self
    }
}

/// JSON Schema describing a tool's arguments object.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ToolInputSchema {
    /// Schema type (always "object" for tool inputs).
    #[serde(rename = "type")]
    pub schema_type: String,
    /// Named argument schemas.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<HashMap<String, PropertySchema>>,
    /// Arguments the caller must supply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
    /// Whether unknown properties are accepted.
    #[serde(
        skip_serializing_if = "Option::is_none",
        rename = "additionalProperties"
    )]
    pub additional_properties: Option<bool>,
}

impl ToolInputSchema {
    /// Create an object schema that rejects unknown properties.
    pub fn object() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: Some(HashMap::new()),
            required: None,
            additional_properties: Some(false),
        }
    }

    /// Add a property.
    pub fn property(mut self, name: impl Into<String>, schema: PropertySchema) -> Self {
        if let Some(ref mut props) = self.properties {
            props.insert(name.into(), schema);
        }
        self
    }

    /// Mark arguments as required.
    pub fn required(mut self, required: Vec<impl Into<String>>) -> Self {
        self.required = Some(required.into_iter().map(Into::into).collect());
        self
    }
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self::object()
    }
}

/// JSON Schema for one property.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PropertySchema {
    /// JSON type name.
    #[serde(rename = "type")]
    pub schema_type: String,
    /// What this argument means.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Value used when the argument is omitted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    /// Enum values for string properties.
    #[serde(skip_serializing_if = "Option::is_none", rename = "enum")]
    pub enum_values: Option<Vec<String>>,
    /// Minimum value for numeric properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    /// Maximum value for numeric properties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

impl PropertySchema {
    /// A string property.
    pub fn string() -> Self {
        Self::typed("string")
    }

    /// An integer property.
    pub fn integer() -> Self {
        Self::typed("integer")
    }

    /// A boolean property.
    pub fn boolean() -> Self {
        Self::typed("boolean")
    }

    fn typed(schema_type: &str) -> Self {
        Self {
            schema_type: schema_type.to_string(),
            description: None,
            default: None,
            enum_values: None,
            minimum: None,
            maximum: None,
        }
    }

    /// Describe this argument.
    pub fn description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Set the default value.
    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Restrict to an enumerated set.
    pub fn enum_values(mut self, values: Vec<impl Into<String>>) -> Self {
        self.enum_values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    /// Set the minimum.
    pub fn min(mut self, min: f64) -> Self {
        self.minimum = Some(min);
        self
    }

    /// Set the maximum.
    pub fn max(mut self, max: f64) -> Self {
        self.maximum = Some(max);
        self
    }
}

/// `tools/list` result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListToolsResult {
    /// Every registered tool.
    pub tools: Vec<Tool>,
}

impl ListToolsResult {
    /// Create a new result.
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }
}

/// `tools/call` parameters.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CallToolParams {
    /// Tool to invoke.
    pub name: String,
    /// Arguments object for the tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// `tools/call` result.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CallToolResult {
    /// Result content items.
    pub content: Vec<Content>,
    /// The same payload as structured JSON, when available.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<Value>,
    /// Set only on failures.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl CallToolResult {
    /// Success result with plain text content.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(text)],
            structured_content: None,
            is_error: None,
        }
    }

    /// Success result carrying a structured payload; the text content is
    /// the serialized payload.
    pub fn structured(value: Value) -> Self {
        let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
        Self {
            content: vec![Content::text(text)],
            structured_content: Some(value),
            is_error: None,
        }
    }

    /// Error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message)],
            structured_content: None,
            is_error: Some(true),
        }
    }

    /// Whether this result reports an error.
    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_with_annotations_serializes_camel_case() {
        let tool = Tool::new("list_channels", "List channels")
            .with_annotations(ToolAnnotations::read_only().open_world());

        let json = serde_json::to_value(&tool).unwrap();
        assert_eq!(json["annotations"]["readOnlyHint"], json!(true));
        assert_eq!(json["annotations"]["idempotentHint"], json!(true));
        assert_eq!(json["annotations"]["openWorldHint"], json!(true));
        assert_eq!(json["inputSchema"]["type"], json!("object"));
    }

    #[test]
    fn test_schema_builder() {
        let schema = ToolInputSchema::object()
            .property("channel_id", PropertySchema::string().description("Channel"))
            .property("limit", PropertySchema::integer().min(1.0).max(200.0))
            .required(vec!["channel_id"]);

        assert_eq!(schema.properties.as_ref().unwrap().len(), 2);
        assert_eq!(schema.required.as_ref().unwrap(), &["channel_id"]);
        assert_eq!(schema.additional_properties, Some(false));
    }

    #[test]
    fn test_structured_result_mirrors_payload() {
        let payload = json!({"channels": [{"id": "C1", "name": "general"}]});
        let result = CallToolResult::structured(payload.clone());

        assert!(!result.is_error());
        assert_eq!(result.structured_content, Some(payload.clone()));
        let text = result.content[0].as_text().unwrap();
        let reparsed: Value = serde_json::from_str(text).unwrap();
        assert_eq!(reparsed, payload);
    }

    #[test]
    fn test_error_result() {
        let result = CallToolResult::error("Error: channel_not_found - no such channel");
        assert!(result.is_error());
        assert!(result.structured_content.is_none());
    }
}
