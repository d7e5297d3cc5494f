//! submit tool - hand the final artifact to the controller

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::truncate_chars;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// Submit the final artifact
///
/// The artifact travels back in [`ToolResult::submission`]; the tool itself
/// has no side effects.
pub struct SubmitTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SubmitArgs {
    final_artifact: String,
}

#[async_trait]
impl Tool for SubmitTool {
    fn name(&self) -> &'static str {
        "submit"
    }

    fn description(&self) -> &'static str {
        "Submit final artifact (patch or text)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "final_artifact": {"type": "string", "description": "The final artifact, e.g. a unified diff"}
            },
            "required": ["final_artifact"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        let args: SubmitArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };
        debug!(task_id = %ctx.task_id, artifact_len = args.final_artifact.len(), "SubmitTool::execute: called");

        let preview = truncate_chars(&args.final_artifact, ctx.limits.artifact_preview_chars);
        Ok(ToolResult::submitted(args.final_artifact, preview))
    }
}
