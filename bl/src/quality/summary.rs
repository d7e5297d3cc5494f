//! Summary records produced by the scorer

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ComponentScores, QualityWeights};
use crate::domain::{LoopExitReason, RunMode, ToolCallEvent};

fn score_text(score: Option<f64>) -> String {
    score.map_or_else(|| "n/a".to_string(), |s| format!("{:.4}", s))
}

/// Per-task tool-quality summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskQualitySummary {
    pub task_id: String,
    pub mode: RunMode,
    pub applicable: bool,
    pub tool_calls_total: u64,
    pub tool_calls_success: u64,
    pub tool_calls_failed: u64,
    pub tool_calls_denied: u64,
    pub termination_ack: bool,
    pub budget_exhausted: bool,
    pub wall_time_exhausted: bool,
    pub loop_exit_reason: LoopExitReason,
    pub components: ComponentScores,
    pub score: Option<f64>,
}

impl fmt::Display for TaskQualitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tool_quality task={} applicable={} score={} calls={}/{} denied={} failed={} termination_ack={} budget_exhausted={} exit={}",
            self.task_id,
            self.applicable,
            score_text(self.score),
            self.tool_calls_success,
            self.tool_calls_total,
            self.tool_calls_denied,
            self.tool_calls_failed,
            self.termination_ack,
            self.budget_exhausted,
            self.loop_exit_reason,
        )
    }
}

/// Raw counts behind a run summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub tool_calls_total: u64,
    pub tool_calls_success: u64,
    pub tool_calls_failed: u64,
    pub tool_calls_denied: u64,
    pub tasks_total: u64,
    pub tasks_applicable: u64,
    pub tasks_budget_exhausted: u64,
    pub tasks_termination_ack: u64,
}

/// Run-level tool-quality summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunQualitySummary {
    pub version: String,
    pub applicable: bool,
    pub score: Option<f64>,
    pub weights: QualityWeights,
    pub components: ComponentScores,
    pub counts: RunCounts,
}

impl fmt::Display for RunQualitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = &self.counts;
        write!(
            f,
            "tool_quality summary applicable={} score={} tasks_applicable={}/{} calls={}/{} denied={} failed={} termination_ack={} budget_exhausted={}",
            self.applicable,
            score_text(self.score),
            c.tasks_applicable,
            c.tasks_total,
            c.tool_calls_success,
            c.tool_calls_total,
            c.tool_calls_denied,
            c.tool_calls_failed,
            c.tasks_termination_ack,
            c.tasks_budget_exhausted,
        )
    }
}

/// One tool-call event flattened with its run and task context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRow {
    pub row_type: String,
    pub run_id: String,
    pub task_id: String,
    pub mode: RunMode,
    #[serde(flatten)]
    pub event: ToolCallEvent,
}

impl ToolCallRow {
    pub fn new(run_id: impl Into<String>, task_id: impl Into<String>, mode: RunMode, event: &ToolCallEvent) -> Self {
        Self {
            row_type: "tool_call".to_string(),
            run_id: run_id.into(),
            task_id: task_id.into(),
            mode,
            event: event.clone(),
        }
    }

    /// Rows for every event of one task, in call order
    pub fn for_task(run_id: &str, task_id: &str, mode: RunMode, events: &[ToolCallEvent]) -> Vec<Self> {
        events.iter().map(|e| Self::new(run_id, task_id, mode, e)).collect()
    }
}
