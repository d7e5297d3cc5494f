//! bash tool - run a shell command in the workspace

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::process::Command;
use tracing::debug;

use super::{run_process, truncate_bytes};
use crate::tools::{Tool, ToolContext, ToolError, ToolResult, parse_args};

/// Run a shell command inside the workspace root
pub struct BashTool;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct BashArgs {
    cmd: String,
    #[serde(default)]
    timeout_s: Option<u64>,
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &'static str {
        "bash"
    }

    fn description(&self) -> &'static str {
        "Run a bash command inside the workspace root"
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "cmd": {"type": "string", "description": "Shell command to execute"},
                "timeout_s": {"type": "integer", "description": "Timeout in seconds"}
            },
            "required": ["cmd"]
        })
    }

    async fn execute(&self, input: &Map<String, Value>, ctx: &ToolContext) -> Result<ToolResult, ToolError> {
        debug!(?input, "BashTool::execute: called");
        let args: BashArgs = match parse_args(self.name(), input) {
            Ok(args) => args,
            Err(result) => return Ok(result),
        };

        let timeout_s = args.timeout_s.filter(|t| *t > 0).unwrap_or(ctx.limits.bash_timeout_s);

        let mut command = Command::new("sh");
        command.arg("-c").arg(&args.cmd).current_dir(&ctx.workspace_root);

        let out = run_process(command, &args.cmd, None, Duration::from_secs(timeout_s)).await?;
        debug!(returncode = out.returncode, "BashTool::execute: command finished");

        Ok(ToolResult::ok(json!({
            "returncode": out.returncode,
            "output": truncate_bytes(&out.output, ctx.limits.output_truncate_bytes),
        })))
    }
}
