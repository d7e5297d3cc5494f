//! Conversation and generation types
//!
//! These model the chat-completions wire shape directly: the conversation is
//! serialized as-is into the request body.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Function payload of an assistant tool call on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded argument object
    pub arguments: String,
}

/// Tool call as recorded on an assistant message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionCall,
}

impl AssistantToolCall {
    pub fn from_call(id: impl Into<String>, call: &ToolCall) -> Self {
        Self {
            id: id.into(),
            kind: "function".to_string(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: Value::Object(call.arguments.clone()).to_string(),
            },
        }
    }
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<AssistantToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    fn plain(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        debug!("Message::system: called");
        Self::plain(Role::System, text.into())
    }

    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self::plain(Role::User, text.into())
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        debug!("Message::assistant: called");
        Self::plain(Role::Assistant, text.into())
    }

    /// Assistant message carrying the tool calls it requested
    pub fn assistant_with_calls(text: impl Into<String>, tool_calls: Vec<AssistantToolCall>) -> Self {
        debug!(call_count = tool_calls.len(), "Message::assistant_with_calls: called");
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, text.into())
        }
    }

    /// Tool-role message answering one call
    pub fn tool(name: impl Into<String>, tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        debug!("Message::tool: called");
        Self {
            tool_call_id: Some(tool_call_id.into()),
            name: Some(name.into()),
            ..Self::plain(Role::Tool, content.into())
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("raw".to_string(), other);
                map
            }
        };
        Self {
            name: name.into(),
            arguments,
        }
    }
}

/// Result of one generation call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationResult {
    pub assistant_text: String,
    pub tool_calls: Vec<ToolCall>,
}

impl GenerationResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            assistant_text: text.into(),
            tool_calls: Vec::new(),
        }
    }

    pub fn with_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            assistant_text: text.into(),
            tool_calls,
        }
    }
}

/// Decoding overrides merged into the request body
///
/// Accepts kebab-case keys from config files; always emits the snake_case
/// wire keys. Absent and null values are never sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(alias = "top-p", skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,

    #[serde(alias = "max-tokens", skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Provider-specific extras passed through verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DecodingConfig {
    /// Wire-level overrides with null values removed
    pub fn overrides(&self) -> Map<String, Value> {
        debug!("DecodingConfig::overrides: called");
        let mut out = Map::new();
        if let Ok(Value::Object(map)) = serde_json::to_value(self) {
            for (key, value) in map {
                if !value.is_null() {
                    out.insert(key, value);
                }
            }
        }
        out
    }
}

/// Tool definition offered to the model
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        let name = name.into();
        let description = description.into();
        debug!(%name, "ToolDefinition::new: called");
        Self {
            name,
            description,
            input_schema,
        }
    }

    /// Convert to the OpenAI function-tool schema format
    pub fn to_openai_schema(&self) -> Value {
        debug!(%self.name, "ToolDefinition::to_openai_schema: called");
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.input_schema,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_message_serializes_wire_shape() {
        let msg = Message::tool("bash", "call_0_0", "{\"returncode\":0}");
        let value = serde_json::to_value(&msg).unwrap();

        assert_eq!(value["role"], "tool");
        assert_eq!(value["name"], "bash");
        assert_eq!(value["tool_call_id"], "call_0_0");
        assert!(value.get("tool_calls").is_none());
    }

    #[test]
    fn test_assistant_tool_call_encodes_arguments_as_string() {
        let call = ToolCall::new("workspace_open", json!({"path": "src/lib.rs"}));
        let wire = AssistantToolCall::from_call("call_3_1", &call);
        let value = serde_json::to_value(&wire).unwrap();

        assert_eq!(value["type"], "function");
        assert_eq!(value["function"]["name"], "workspace_open");
        let args: Value = serde_json::from_str(value["function"]["arguments"].as_str().unwrap()).unwrap();
        assert_eq!(args["path"], "src/lib.rs");
    }

    #[test]
    fn test_tool_call_wraps_non_object_arguments() {
        let call = ToolCall::new("bash", json!([1, 2]));
        assert_eq!(call.arguments["raw"], json!([1, 2]));

        let call = ToolCall::new("bash", Value::Null);
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_decoding_overrides_drop_nulls() {
        let decoding: DecodingConfig = serde_yaml::from_str(
            "temperature: 0.2\ntop-p: 0.9\nreasoning: null\nprovider:\n  order: [a]\n",
        )
        .unwrap();

        let overrides = decoding.overrides();
        assert_eq!(overrides["temperature"], json!(0.2));
        assert_eq!(overrides["top_p"], json!(0.9));
        assert!(!overrides.contains_key("reasoning"));
        assert!(!overrides.contains_key("max_tokens"));
        assert_eq!(overrides["provider"]["order"], json!(["a"]));
    }

    #[test]
    fn test_tool_definition_to_openai_schema() {
        let tool = ToolDefinition::new("submit", "Submit", json!({"type": "object"}));
        let schema = tool.to_openai_schema();

        assert_eq!(schema["type"], "function");
        assert_eq!(schema["function"]["name"], "submit");
        assert!(schema["function"]["parameters"].is_object());
    }
}
