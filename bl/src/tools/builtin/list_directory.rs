//! workspace_list tool - list a directory

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::ESCAPE_ERROR;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// List the entries of a workspace directory
pub struct ListDirectoryTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ListArgs {
    path: String,
}

#[async_trait]
impl Tool for ListDirectoryTool {
    fn name(&self) -> &'static str {
        "workspace_list"
    }

    fn description(&self) -> &'static str {
        "List files under a path relative to the workspace root"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory path relative to the workspace root ('.' for the root)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?input, "ListDirectoryTool::execute: called");
        let args: ListArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Ok(target) = ctx.validate_path(Path::new(&args.path)) else {
            return Ok(ToolResult::error(ESCAPE_ERROR));
        };
        if !target.exists() {
            debug!(?target, "ListDirectoryTool::execute: path not found");
            return Ok(ToolResult::error("path not found"));
        }
        if !target.is_dir() {
            return Ok(ToolResult::error("path is not a directory"));
        }

        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&target).await?;
        while let Some(entry) = dir.next_entry().await? {
            let is_dir = tokio::fs::metadata(entry.path()).await.map(|m| m.is_dir()).unwrap_or(false);
            entries.push((entry.file_name().to_string_lossy().to_string(), is_dir));
        }
        entries.sort();
        debug!(count = entries.len(), "ListDirectoryTool::execute: listed");

        let entries: Vec<Value> = entries
            .into_iter()
            .map(|(name, is_dir)| json!({"name": name, "type": if is_dir { "dir" } else { "file" }}))
            .collect();
        Ok(ToolResult::ok(json!({ "entries": entries })))
    }
}
