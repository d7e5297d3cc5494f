//! Tool trait definition

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::ToolError;
use super::context::ToolContext;

/// A sandboxed operation the model can call
///
/// Tool-domain failures (bad path, missing file, failed patch) come back as an
/// `Ok` result carrying an `error` key. `Err` is reserved for failures of the
/// execution machinery itself, such as a timed out subprocess.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name (matches the function name offered to the model)
    fn name(&self) -> &'static str;

    /// Human-readable description
    fn description(&self) -> &'static str;

    /// JSON Schema for input parameters
    fn input_schema(&self) -> Value;

    /// Execute the tool
    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError>;
}

/// Result of a tool execution
///
/// `payload` is the JSON object handed back to the model. A result produced
/// by the termination tool also carries the accepted artifact in `submission`.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    pub payload: Map<String, Value>,
    pub submission: Option<String>,
}

impl ToolResult {
    /// Create a result from a JSON object (non-objects are wrapped under "value")
    pub fn ok(payload: Value) -> Self {
        let payload = match payload {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("value".to_string(), other);
                map
            }
        };
        Self {
            payload,
            submission: None,
        }
    }

    /// Create a structured error result
    pub fn error(message: impl Into<String>) -> Self {
        let message = message.into();
        debug!(%message, "ToolResult::error: called");
        Self::ok(json!({ "error": message }))
    }

    /// Create an accepted submission
    pub fn submitted(artifact: impl Into<String>, preview: impl Into<String>) -> Self {
        debug!("ToolResult::submitted: called");
        let mut payload = Map::new();
        payload.insert("submitted".to_string(), Value::Bool(true));
        payload.insert("artifact_preview".to_string(), Value::String(preview.into()));
        Self {
            payload,
            submission: Some(artifact.into()),
        }
    }

    /// Argument-shape mismatch, listing the keys the caller actually sent
    pub fn invalid_arguments(tool: &str, reason: impl std::fmt::Display, provided: &Map<String, Value>) -> Self {
        debug!(%tool, "ToolResult::invalid_arguments: called");
        let mut keys: Vec<&String> = provided.keys().collect();
        keys.sort();
        Self::ok(json!({
            "error": format!("invalid arguments for {}: {}", tool, reason),
            "provided_keys": keys,
        }))
    }

    pub fn is_error(&self) -> bool {
        self.payload.contains_key("error")
    }

    /// Integer `returncode`, if the result reports one
    pub fn returncode(&self) -> Option<i64> {
        self.payload.get("returncode").and_then(Value::as_i64)
    }

    /// True only when the result explicitly reports `success: false`
    pub fn reports_failure(&self) -> bool {
        self.payload.get("success") == Some(&Value::Bool(false))
    }

    /// Whether the result signals an accepted submission
    pub fn is_submission(&self) -> bool {
        self.submission.is_some() || self.payload.get("submitted").and_then(Value::as_bool) == Some(true)
    }

    /// Serialized form sent back to the model
    pub fn to_content(&self) -> String {
        Value::Object(self.payload.clone()).to_string()
    }
}

/// Deserialize tool arguments into their typed shape
///
/// Mismatches become an `invalid_arguments` result rather than an error.
pub fn parse_args<T: DeserializeOwned>(tool: &str, input: &Map<String, Value>) -> Result<T, ToolResult> {
    serde_json::from_value(Value::Object(input.clone())).map_err(|e| {
        debug!(%tool, error = %e, "parse_args: argument mismatch");
        ToolResult::invalid_arguments(tool, e, input)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct PathArgs {
        path: String,
    }

    #[test]
    fn test_error_result() {
        let result = ToolResult::error("file not found");
        assert!(result.is_error());
        assert_eq!(result.payload["error"], "file not found");
        assert!(!result.is_submission());
    }

    #[test]
    fn test_submission_result() {
        let result = ToolResult::submitted("diff --git a/x b/x", "diff");
        assert!(result.is_submission());
        assert_eq!(result.payload["submitted"], true);
        assert_eq!(result.submission.as_deref(), Some("diff --git a/x b/x"));
    }

    #[test]
    fn test_returncode_and_failure_flags() {
        let result = ToolResult::ok(json!({"returncode": 2, "output": ""}));
        assert_eq!(result.returncode(), Some(2));
        assert!(!result.reports_failure());

        let result = ToolResult::ok(json!({"success": false, "output": "hunk FAILED"}));
        assert!(result.reports_failure());
        assert_eq!(result.returncode(), None);
    }

    #[test]
    fn test_parse_args_reports_provided_keys() {
        let input = json!({"zeta": 1, "alpha": 2}).as_object().cloned().unwrap();
        let err = parse_args::<PathArgs>("workspace_open", &input).unwrap_err();

        let message = err.payload["error"].as_str().unwrap();
        assert!(message.starts_with("invalid arguments for workspace_open"));
        assert_eq!(err.payload["provided_keys"], json!(["alpha", "zeta"]));
    }

    #[test]
    fn test_parse_args_accepts_exact_shape() {
        let input = json!({"path": "src"}).as_object().cloned().unwrap();
        let args: PathArgs = parse_args("workspace_list", &input).unwrap();
        assert_eq!(args.path, "src");
    }
}
