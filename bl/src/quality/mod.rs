//! Tool-quality scoring
//!
//! Reads the per-call telemetry a finished loop produced and reduces it to
//! four component scores in `[0, 1]` plus their weighted sum, first per task
//! and then across a run. Scoring only applies to tools-enabled tasks that made
//! at least one call; everything else reports null components.

mod summary;

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::{RunMode, RuntimeTelemetry};

pub use summary::{RunCounts, RunQualitySummary, TaskQualitySummary, ToolCallRow};

/// Version tag written into run summaries
pub const SCORING_VERSION: &str = "v1";

/// Weights applied to the four components
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityWeights {
    pub execution: f64,
    pub policy: f64,
    pub termination: f64,
    pub budget: f64,
}

impl Default for QualityWeights {
    fn default() -> Self {
        Self {
            execution: 0.45,
            policy: 0.25,
            termination: 0.20,
            budget: 0.10,
        }
    }
}

impl QualityWeights {
    pub fn sum(&self) -> f64 {
        self.execution + self.policy + self.termination + self.budget
    }

    /// Reject negative or non-finite weights; a sum away from 1.0 only warns
    pub fn validate(&self) -> Result<()> {
        debug!(?self, "QualityWeights::validate: called");
        let named = [
            ("execution", self.execution),
            ("policy", self.policy),
            ("termination", self.termination),
            ("budget", self.budget),
        ];
        for (name, weight) in named {
            if !weight.is_finite() || weight < 0.0 {
                return Err(eyre!("tool-quality weight '{}' must be a non-negative number, got {}", name, weight));
            }
        }
        let sum = self.sum();
        if (sum - 1.0).abs() > 1e-6 {
            warn!(sum, "QualityWeights::validate: weights do not sum to 1.0");
        }
        Ok(())
    }
}

/// The four component scores; all `None` when scoring does not apply
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentScores {
    pub execution_quality: Option<f64>,
    pub policy_quality: Option<f64>,
    pub termination_quality: Option<f64>,
    pub budget_quality: Option<f64>,
}

impl ComponentScores {
    fn new(execution: f64, policy: f64, termination: f64, budget: f64) -> Self {
        Self {
            execution_quality: Some(execution),
            policy_quality: Some(policy),
            termination_quality: Some(termination),
            budget_quality: Some(budget),
        }
    }

    /// Weighted linear sum, or `None` if any component is missing
    pub fn weighted(&self, weights: &QualityWeights) -> Option<f64> {
        Some(
            self.execution_quality? * weights.execution
                + self.policy_quality? * weights.policy
                + self.termination_quality? * weights.termination
                + self.budget_quality? * weights.budget,
        )
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Score one task from its runtime telemetry
pub fn score_task(
    task_id: &str,
    telemetry: &RuntimeTelemetry,
    weights: &QualityWeights,
    enabled: bool,
) -> TaskQualitySummary {
    debug!(%task_id, events = telemetry.events.len(), enabled, "score_task: called");
    let events = &telemetry.events;
    let total = events.len() as u64;
    let success = events.iter().filter(|e| e.success).count() as u64;
    let denied = events.iter().filter(|e| e.is_denied()).count() as u64;

    let applicable = enabled && telemetry.mode == RunMode::ToolsEnabled && total > 0;
    let components = if applicable {
        ComponentScores::new(
            ratio(success, total),
            1.0 - ratio(denied, total),
            if telemetry.termination_ack { 1.0 } else { 0.0 },
            if telemetry.budget_exhausted { 0.0 } else { 1.0 },
        )
    } else {
        ComponentScores::default()
    };
    let score = components.weighted(weights);

    TaskQualitySummary {
        task_id: task_id.to_string(),
        mode: telemetry.mode,
        applicable,
        tool_calls_total: total,
        tool_calls_success: success,
        tool_calls_failed: total.saturating_sub(success),
        tool_calls_denied: denied,
        termination_ack: telemetry.termination_ack,
        budget_exhausted: telemetry.budget_exhausted,
        wall_time_exhausted: telemetry.wall_time_exhausted,
        loop_exit_reason: telemetry.loop_exit_reason,
        components,
        score,
    }
}

/// Aggregate task summaries into a run summary
///
/// Call counts are summed over every task. Termination and budget rates only
/// look at applicable tasks.
pub fn score_run(summaries: &[TaskQualitySummary], weights: &QualityWeights, enabled: bool) -> RunQualitySummary {
    debug!(tasks = summaries.len(), enabled, "score_run: called");
    let mut counts = RunCounts {
        tasks_total: summaries.len() as u64,
        ..RunCounts::default()
    };
    for summary in summaries {
        counts.tool_calls_total += summary.tool_calls_total;
        counts.tool_calls_success += summary.tool_calls_success;
        counts.tool_calls_failed += summary.tool_calls_failed;
        counts.tool_calls_denied += summary.tool_calls_denied;
        if summary.applicable {
            counts.tasks_applicable += 1;
            counts.tasks_budget_exhausted += u64::from(summary.budget_exhausted);
            counts.tasks_termination_ack += u64::from(summary.termination_ack);
        }
    }

    let applicable = enabled && counts.tasks_applicable > 0;
    let components = if applicable {
        ComponentScores::new(
            ratio(counts.tool_calls_success, counts.tool_calls_total),
            1.0 - ratio(counts.tool_calls_denied, counts.tool_calls_total),
            ratio(counts.tasks_termination_ack, counts.tasks_applicable),
            1.0 - ratio(counts.tasks_budget_exhausted, counts.tasks_applicable),
        )
    } else {
        ComponentScores::default()
    };

    RunQualitySummary {
        version: SCORING_VERSION.to_string(),
        applicable,
        score: components.weighted(weights),
        weights: *weights,
        components,
        counts,
    }
}
