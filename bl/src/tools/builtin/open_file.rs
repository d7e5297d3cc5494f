//! workspace_open tool - read a line range from a file

use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::ESCAPE_ERROR;
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// Open a file and return selected lines
pub struct OpenFileTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OpenArgs {
    path: String,
    #[serde(default)]
    start_line: Option<i64>,
    #[serde(default)]
    end_line: Option<i64>,
}

/// Select 1-based inclusive `[start, end]`; a negative end counts from the back
fn select_lines(lines: &[&str], start: i64, end: i64) -> String {
    let total = lines.len() as i64;
    let from = (start - 1).clamp(0, total);
    let to = if end < 0 { (total + end).max(0) } else { end.min(total) };
    if to <= from {
        return String::new();
    }
    lines[from as usize..to as usize].concat()
}

#[async_trait]
impl Tool for OpenFileTool {
    fn name(&self) -> &'static str {
        "workspace_open"
    }

    fn description(&self) -> &'static str {
        "Open a file and return selected lines"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path relative to the workspace root"},
                "start_line": {"type": "integer", "description": "First line to return (1-based, default 1)"},
                "end_line": {"type": "integer", "description": "Last line to return (inclusive, default end of file)"}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?input, "OpenFileTool::execute: called");
        let args: OpenArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let Ok(target) = ctx.validate_path(Path::new(&args.path)) else {
            return Ok(ToolResult::error(ESCAPE_ERROR));
        };
        if !target.is_file() {
            debug!(?target, "OpenFileTool::execute: not a file");
            return Ok(ToolResult::error("file not found"));
        }

        let bytes = tokio::fs::read(&target).await?;
        let text = String::from_utf8_lossy(&bytes);
        let lines: Vec<&str> = text.split_inclusive('\n').collect();

        let start = args.start_line.unwrap_or(1).max(1);
        let end = args.end_line.unwrap_or(lines.len() as i64);
        let content = select_lines(&lines, start, end);
        debug!(start, end, content_len = content.len(), "OpenFileTool::execute: read range");

        Ok(ToolResult::ok(json!({
            "content": content,
            "start_line": start,
            "end_line": end,
        })))
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

    fn setup() -> (tempfile::TempDir, ToolContext) {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("f.txt"), "one\ntwo\nthree\nfour\n").unwrap();
        let ctx = ToolContext::new(temp.path(), "t");
        (temp, ctx)
    }

    #[tokio::test]
    async fn test_open_whole_file() {
        let (_temp, ctx) = setup();
        let result = OpenFileTool.execute(&args(json!({"path": "f.txt"})), &ctx).await.unwrap();

        assert_eq!(result.payload["content"], "one\ntwo\nthree\nfour\n");
        assert_eq!(result.payload["start_line"], 1);
        assert_eq!(result.payload["end_line"], 4);
    }

    #[tokio::test]
    async fn test_open_range_clamps_start() {
        let (_temp, ctx) = setup();
        let result = OpenFileTool
            .execute(&args(json!({"path": "f.txt", "start_line": 0, "end_line": 2})), &ctx)
            .await
            .unwrap();

        assert_eq!(result.payload["content"], "one\ntwo\n");
        assert_eq!(result.payload["start_line"], 1);
    }

    #[tokio::test]
    async fn test_open_range_past_end() {
        let (_temp, ctx) = setup();
        let result = OpenFileTool
            .execute(&args(json!({"path": "f.txt", "start_line": 3, "end_line": 99})), &ctx)
            .await
            .unwrap();
        assert_eq!(result.payload["content"], "three\nfour\n");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let (_temp, ctx) = setup();
        let result = OpenFileTool.execute(&args(json!({"path": "nope.txt"})), &ctx).await.unwrap();
        assert_eq!(result.payload["error"], "file not found");
    }

    #[tokio::test]
    async fn test_open_rejects_extra_keys() {
        let (_temp, ctx) = setup();
        let result = OpenFileTool
            .execute(&args(json!({"path": "f.txt", "mode": "r"})), &ctx)
            .await
            .unwrap();
        assert!(result.is_error());
        assert_eq!(result.payload["provided_keys"], json!(["mode", "path"]));
    }

    #[test]
    fn test_select_lines_negative_end() {
        let lines = vec!["a\n", "b\n", "c\n"];
        assert_eq!(select_lines(&lines, 1, -1), "a\nb\n");
        assert_eq!(select_lines(&lines, 3, 2), "");
    }
}
