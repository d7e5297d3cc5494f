//! workspace_write tool - overwrite a file

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::ESCAPE_ERROR;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// Write full content to a workspace file
pub struct WriteFileTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct WriteArgs {
    path: String,
    content: String,
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &'static str {
        "workspace_write"
    }

    fn description(&self) -> &'static str {
        "Write full content to a file (overwrite)"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the workspace root"},
                "content": {"type": "string", "description": "Complete new file content"}
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(task_id = %ctx.task_id, "WriteFileTool::execute: called");
        let args: WriteArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Ok(target) = ctx.validate_path(Path::new(&args.path)) else {
            return Ok(ToolResult::error(ESCAPE_ERROR));
        };
        if target.is_dir() {
            return Ok(ToolResult::error("path is a directory"));
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, args.content.as_bytes()).await?;
        debug!(?target, bytes = args.content.len(), "WriteFileTool::execute: written");

        Ok(ToolResult::ok(json!({ "written": ctx.relative(&target) })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_write_creates_parents() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path(), "t");

        let result = WriteFileTool
            .execute(&args(json!({"path": "a/b/c.txt", "content": "hi"})), &ctx)
            .await
            .unwrap();

        assert_eq!(result.payload["written"], "a/b/c.txt");
        assert_eq!(fs::read_to_string(temp.path().join("a/b/c.txt")).unwrap(), "hi");
    }

    #[tokio::test]
    async fn test_write_outside_is_rejected() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path().join("."), "t");

        let result = WriteFileTool
            .execute(&args(json!({"path": "../escape.txt", "content": "x"})), &ctx)
            .await
            .unwrap();

        assert_eq!(result.payload["error"], ESCAPE_ERROR);
        assert!(!temp.path().parent().unwrap().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_write_missing_content() {
        let temp = tempdir().unwrap();
        let ctx = ToolContext::new(temp.path(), "t");

        let result = WriteFileTool.execute(&args(json!({"path": "x"})), &ctx).await.unwrap();
        assert!(result.payload["error"].as_str().unwrap().contains("content"));
    }
}
