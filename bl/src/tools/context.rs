//! ToolContext - execution context for tools

use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ToolError;

/// Limits applied by the builtin tools
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolLimits {
    /// Default timeout for `bash` and `workspace_apply_patch`
    #[serde(rename = "bash-timeout-s")]
    pub bash_timeout_s: u64,

    /// Cap on captured stdout+stderr
    #[serde(rename = "output-truncate-bytes")]
    pub output_truncate_bytes: usize,

    /// Cap on `workspace_search` matches
    #[serde(rename = "search-max-matches")]
    pub search_max_matches: usize,

    /// Cap on the preview echoed back by `submit`
    #[serde(rename = "artifact-preview-chars")]
    pub artifact_preview_chars: usize,
}

impl Default for ToolLimits {
    fn default() -> Self {
        Self {
            bash_timeout_s: 60,
            output_truncate_bytes: 4000,
            search_max_matches: 50,
            artifact_preview_chars: 2000,
        }
    }
}

/// Execution context for tools - scoped to a single task
///
/// Every path-bearing operation resolves against `workspace_root` and is
/// rejected if the resolution lands outside it.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Canonical workspace root
    pub workspace_root: PathBuf,

    /// Task this context belongs to (for log correlation)
    pub task_id: String,

    pub limits: ToolLimits,
}

impl ToolContext {
    /// Create a new tool context
    pub fn new(workspace_root: impl Into<PathBuf>, task_id: impl Into<String>) -> Self {
        Self::with_limits(workspace_root, task_id, ToolLimits::default())
    }

    pub fn with_limits(workspace_root: impl Into<PathBuf>, task_id: impl Into<String>, limits: ToolLimits) -> Self {
        let workspace_root = workspace_root.into();
        let task_id = task_id.into();
        debug!(?workspace_root, %task_id, "ToolContext::with_limits: called");
        let workspace_root = workspace_root.canonicalize().unwrap_or(workspace_root);
        Self {
            workspace_root,
            task_id,
            limits,
        }
    }

    /// Validate path is within the workspace (sandbox enforcement)
    ///
    /// `..` segments are folded lexically, then the deepest existing ancestor
    /// is canonicalized so symlinks cannot smuggle a path outside the root.
    /// Paths that do not exist yet are accepted when they stay inside.
    pub fn validate_path(&self, path: &Path) -> Result<PathBuf, ToolError> {
        debug!(?path, "ToolContext::validate_path: called");
        let joined = self.workspace_root.join(path);
        let resolved = canonicalize_existing_prefix(&normalize_lexically(&joined));

        if resolved.starts_with(&self.workspace_root) {
            debug!(?resolved, "ToolContext::validate_path: path is within workspace");
            Ok(resolved)
        } else {
            debug!(?resolved, "ToolContext::validate_path: sandbox violation detected");
            Err(ToolError::SandboxViolation {
                path: path.to_path_buf(),
                root: self.workspace_root.clone(),
            })
        }
    }

    /// Workspace-relative display form of a resolved path
    pub fn relative(&self, path: &Path) -> String {
        path.strip_prefix(&self.workspace_root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

fn canonicalize_existing_prefix(path: &Path) -> PathBuf {
    let mut existing = path.to_path_buf();
    let mut missing = Vec::new();
    loop {
        if let Ok(mut canonical) = existing.canonicalize() {
            for name in missing.iter().rev() {
                canonical.push(name);
            }
            return canonical;
        }
        match (existing.file_name().map(|n| n.to_os_string()), existing.parent()) {
            (Some(name), Some(parent)) => {
                missing.push(name);
                existing = parent.to_path_buf();
            }
            _ => return path.to_path_buf(),
        }
    }
}
