//! Tool error types

use std::path::PathBuf;
use thiserror::Error;

/// Failures of the tool execution machinery
///
/// These escape the executor and are recorded as execution exceptions by the
/// turn controller. Ordinary tool-domain failures are structured results.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Path {path} escapes workspace {root}")]
    SandboxViolation { path: PathBuf, root: PathBuf },

    #[error("Command '{command}' timed out after {timeout_s}s")]
    CommandTimeout { command: String, timeout_s: u64 },

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ToolError {
    /// Short class name used in execution-exception messages
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SandboxViolation { .. } => "SandboxViolation",
            Self::CommandTimeout { .. } => "CommandTimeout",
            Self::Spawn { .. } => "SpawnError",
            Self::Io(_) => "IoError",
        }
    }
}
