//! Built-in workspace tools

mod apply_patch;
mod bash;
mod list_directory;
mod open_file;
mod search;
mod submit;
mod write_file;

pub use apply_patch::ApplyPatchTool;
pub use bash::BashTool;
pub use list_directory::ListDirectoryTool;
pub use open_file::OpenFileTool;
pub use search::SearchTool;
pub use submit::SubmitTool;
pub use write_file::WriteFileTool;

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::ToolError;

/// Error message for any path resolving outside the workspace
pub(crate) const ESCAPE_ERROR: &str = "path escapes workspace";

/// Cut `text` to at most `max_bytes`, backing off to a char boundary
pub(crate) fn truncate_bytes(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Cut `text` to at most `max_chars` characters
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Exit code and combined output of a finished subprocess
#[derive(Debug)]
pub(crate) struct ProcessOutput {
    pub returncode: i64,
    /// stdout followed by stderr
    pub output: String,
}

/// Run a subprocess to completion under a timeout
///
/// The child is killed if the timeout fires. stdin is fed from `input` when
/// given, otherwise it is closed.
pub(crate) async fn run_process(
    mut command: Command,
    label: &str,
    input: Option<&[u8]>,
    timeout: Duration,
) -> Result<ProcessOutput, ToolError> {
    debug!(%label, ?timeout, "run_process: called");
    command
        .stdin(if input.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = command.as_std().get_program().to_string_lossy().to_string();
    let mut child = command.spawn().map_err(|source| ToolError::Spawn { program, source })?;

    let stdin = child.stdin.take();
    let run = async move {
        if let (Some(bytes), Some(mut stdin)) = (input, stdin) {
            stdin.write_all(bytes).await?;
        }
        child.wait_with_output().await
    };

    let output = match tokio::time::timeout(timeout, run).await {
        Ok(result) => result?,
        Err(_) => {
            debug!(%label, "run_process: timed out");
            return Err(ToolError::CommandTimeout {
                command: label.to_string(),
                timeout_s: timeout.as_secs(),
            });
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    let returncode = exit_code(&output.status);
    debug!(returncode, output_len = combined.len(), "run_process: finished");
    Ok(ProcessOutput {
        returncode,
        output: combined,
    })
}

#[cfg(unix)]
fn exit_code(status: &std::process::ExitStatus) -> i64 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code as i64,
        (None, Some(signal)) => -(signal as i64),
        (None, None) => -1,
    }
}

#[cfg(not(unix))]
fn exit_code(status: &std::process::ExitStatus) -> i64 {
    status.code().map_or(-1, |code| code as i64)
}
