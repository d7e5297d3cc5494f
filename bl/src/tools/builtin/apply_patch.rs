//! workspace_apply_patch tool - apply a unified diff with `patch`

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::debug;

use super::{run_process, truncate_bytes};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// Apply a unified diff relative to the workspace root
pub struct ApplyPatchTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ApplyPatchArgs {
    unified_diff: String,
}

/// Strip level for `patch`: 1 for git-style `a/` and `b/` headers, else 0
pub fn strip_level(diff: &str) -> u8 {
    let git_style = diff.lines().any(|l| l.starts_with("diff --git a/"))
        || (diff.lines().any(|l| l.starts_with("--- a/") || l.starts_with("--- /dev/null"))
            && diff.lines().any(|l| l.starts_with("+++ b/")));
    if git_style { 1 } else { 0 }
}

#[async_trait]
impl Tool for ApplyPatchTool {
    fn name(&self) -> &'static str {
        "workspace_apply_patch"
    }

    fn description(&self) -> &'static str {
        "Apply a unified diff patch relative to workspace root"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "unified_diff": {"type": "string", "description": "Unified diff to apply"}
            },
            "required": ["unified_diff"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(task_id = %ctx.task_id, "ApplyPatchTool::execute: called");
        let args: ApplyPatchArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let level = strip_level(&args.unified_diff);
        debug!(level, diff_len = args.unified_diff.len(), "ApplyPatchTool::execute: applying");

        let mut command = Command::new("patch");
        command
            .arg(format!("-p{}", level))
            .arg("--batch")
            .arg("-d")
            .arg(&ctx.workspace_root)
            .current_dir(&ctx.workspace_root);

        let out = run_process(
            command,
            "patch",
            Some(args.unified_diff.as_bytes()),
            Duration::from_secs(ctx.limits.bash_timeout_s),
        )
        .await?;

        Ok(ToolResult::ok(json!({
            "success": out.returncode == 0,
            "output": truncate_bytes(&out.output, ctx.limits.output_truncate_bytes),
        })))
    }
}
