//! ToolExecutor - dispatches tool calls for one task workspace

use std::collections::HashSet;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;

use crate::llm::ToolDefinition;

use super::builtin::{
    ApplyPatchTool, BashTool, ListDirectoryTool, OpenFileTool, SearchTool, SubmitTool, WriteFileTool,
};
use super::{Tool, ToolContext, ToolError, ToolResult};

/// The closed set of workspace operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    List,
    Open,
    Search,
    ApplyPatch,
    Write,
    Bash,
    Submit,
}

impl ToolKind {
    /// All operations, in schema order
    pub const ALL: [ToolKind; 7] = [
        ToolKind::List,
        ToolKind::Open,
        ToolKind::Search,
        ToolKind::ApplyPatch,
        ToolKind::Write,
        ToolKind::Bash,
        ToolKind::Submit,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn name(&self) -> &'static str {
        self.tool().name()
    }

    /// Implementation backing this operation
    pub fn tool(&self) -> &'static dyn Tool {
        match self {
            Self::List => &ListDirectoryTool,
            Self::Open => &OpenFileTool,
            Self::Search => &SearchTool,
            Self::ApplyPatch => &ApplyPatchTool,
            Self::Write => &WriteFileTool,
            Self::Bash => &BashTool,
            Self::Submit => &SubmitTool,
        }
    }

    pub fn definition(&self) -> ToolDefinition {
        let tool = self.tool();
        ToolDefinition::new(tool.name(), tool.description(), tool.input_schema())
    }
}

/// Dispatch seam used by the turn controller
///
/// `Ok` covers every tool-domain outcome, including unknown names and bad
/// arguments. `Err` means the dispatch itself blew up.
#[async_trait]
pub trait ToolDispatch: Send + Sync {
    async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError>;
}

/// Executes tools against one workspace
#[derive(Debug, Clone)]
pub struct ToolExecutor {
    ctx: ToolContext,
}

impl ToolExecutor {
    pub fn new(ctx: ToolContext) -> Self {
        debug!(root = ?ctx.workspace_root, task_id = %ctx.task_id, "ToolExecutor::new: called");
        Self { ctx }
    }

    pub fn context(&self) -> &ToolContext {
        &self.ctx
    }

    /// Get tool definitions for the model
    pub fn definitions() -> Vec<ToolDefinition> {
        debug!("ToolExecutor::definitions: called");
        ToolKind::ALL.iter().map(ToolKind::definition).collect()
    }

    /// Get definitions for the allowed subset, in schema order
    pub fn definitions_for(allowed: &HashSet<String>) -> Vec<ToolDefinition> {
        debug!(?allowed, "ToolExecutor::definitions_for: called");
        ToolKind::ALL
            .iter()
            .filter(|kind| allowed.contains(kind.name()))
            .map(ToolKind::definition)
            .collect()
    }

    /// Execute a tool call
    pub async fn execute(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        debug!(%name, "ToolExecutor::execute: called");
        match ToolKind::from_name(name) {
            Some(kind) => kind.tool().execute(arguments, &self.ctx).await,
            None => {
                debug!(%name, "ToolExecutor::execute: unknown tool");
                Ok(ToolResult::error(format!("unknown tool {}", name)))
            }
        }
    }
}

#[async_trait]
impl ToolDispatch for ToolExecutor {
    async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
        self.execute(name, arguments).await
    }
}
