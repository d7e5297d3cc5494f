//! Turn loop configuration

use std::collections::HashSet;
use std::time::Duration;

use crate::domain::RunMode;

/// Budgets and tool policy for one controller run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Tool calls allowed across all turns (checked at turn start)
    pub max_tool_calls: u32,

    /// Wall-clock budget (checked at turn start)
    pub max_wall_time: Duration,

    /// Tool whose accepted result ends the loop
    pub termination_tool: String,

    /// Names the model may call; `None` or an empty set allows everything
    pub allowed_tools: Option<HashSet<String>>,

    /// Recorded in telemetry
    pub mode: RunMode,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_tool_calls: 20,
            max_wall_time: Duration::from_secs(600),
            termination_tool: "submit".to_string(),
            allowed_tools: None,
            mode: RunMode::PatchOnly,
        }
    }
}

impl LoopConfig {
    /// Check a tool name against the allow-list
    pub fn is_allowed(&self, name: &str) -> bool {
        match &self.allowed_tools {
            Some(allowed) if !allowed.is_empty() => allowed.contains(name),
            _ => true,
        }
    }
}
