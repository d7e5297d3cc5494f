//! Tool-call telemetry emitted by the turn controller

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Execution mode of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum RunMode {
    /// The model answers with the artifact directly; only `submit` is allowed
    #[default]
    PatchOnly,
    /// The model may explore and edit the workspace through tools
    ToolsEnabled,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PatchOnly => "patch_only",
            Self::ToolsEnabled => "tools_enabled",
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    /// Strict: no aliases are accepted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "patch_only" => Ok(Self::PatchOnly),
            "tools_enabled" => Ok(Self::ToolsEnabled),
            other => Err(format!(
                "Unsupported mode '{}'. Use one of: patch_only, tools_enabled.",
                other
            )),
        }
    }
}

impl TryFrom<String> for RunMode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why the turn loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopExitReason {
    Submitted,
    NoToolCalls,
    ToolBudgetExhausted,
    WallTimeExhausted,
    #[default]
    Unknown,
}

impl LoopExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::NoToolCalls => "no_tool_calls",
            Self::ToolBudgetExhausted => "tool_budget_exhausted",
            Self::WallTimeExhausted => "wall_time_exhausted",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for LoopExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome classification of a single tool call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    None,
    NotAllowed,
    #[default]
    ToolError,
    NonzeroReturncode,
    ExecutionException,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::NotAllowed => "not_allowed",
            Self::ToolError => "tool_error",
            Self::NonzeroReturncode => "nonzero_returncode",
            Self::ExecutionException => "execution_exception",
        }
    }
}

/// One tool call offered by the model, denied or executed
///
/// `allowed == false` implies `executed == false`, which implies
/// `success == false`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallEvent {
    pub turn_index: u32,
    pub call_index: u32,
    pub tool_name: String,
    pub is_termination_tool: bool,
    pub allowed: bool,
    pub executed: bool,
    pub success: bool,
    pub error_code: ErrorCode,
    pub args_size_bytes: u64,
    pub result_size_bytes: u64,
    pub latency_ms: u64,
    pub return_code: Option<i64>,
}

impl ToolCallEvent {
    /// A fresh event for a call that has not been dispatched yet
    pub fn pending(
        turn_index: u32,
        call_index: u32,
        tool_name: impl Into<String>,
        is_termination_tool: bool,
        args_size_bytes: u64,
    ) -> Self {
        let tool_name = tool_name.into();
        debug!(turn_index, call_index, %tool_name, "ToolCallEvent::pending: called");
        Self {
            turn_index,
            call_index,
            tool_name,
            is_termination_tool,
            allowed: false,
            executed: false,
            success: false,
            error_code: ErrorCode::ToolError,
            args_size_bytes,
            result_size_bytes: 0,
            latency_ms: 0,
            return_code: None,
        }
    }

    /// Mark the event as rejected by the allow-list
    pub fn deny(mut self) -> Self {
        debug!(tool_name = %self.tool_name, "ToolCallEvent::deny: called");
        self.allowed = false;
        self.executed = false;
        self.success = false;
        self.error_code = ErrorCode::NotAllowed;
        self
    }

    pub fn is_denied(&self) -> bool {
        self.error_code == ErrorCode::NotAllowed || !self.allowed
    }

    /// Check the allowed/executed/success implication chain
    pub fn is_consistent(&self) -> bool {
        (self.allowed || !self.executed) && (self.executed || !self.success)
    }
}

/// Telemetry block exposed to external persistence and scoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeTelemetry {
    pub mode: RunMode,
    pub loop_exit_reason: LoopExitReason,
    pub budget_exhausted: bool,
    pub wall_time_exhausted: bool,
    pub termination_ack: bool,
    pub events: Vec<ToolCallEvent>,
}
