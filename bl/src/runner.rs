//! Per-task pipeline: loop, artifact policy, scoring

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::artifact::{self, ArtifactPolicyResult};
use crate::config::Config;
use crate::domain::{OutputType, RunMode, Task, TaskMetadata, TaskResult};
use crate::llm::{GenerationClient, ToolDefinition};
use crate::quality::{self, RunQualitySummary, TaskQualitySummary, ToolCallRow};
use crate::r#loop::{LoopOutcome, TurnController};
use crate::tools::{ToolContext, ToolExecutor};

/// Everything produced for one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub result: TaskResult,

    /// Artifact handed to the evaluation harness: raw for patches, normalized otherwise
    pub prediction: String,

    pub artifact_policy: ArtifactPolicyResult,
    pub quality: TaskQualitySummary,
}

impl TaskReport {
    /// Telemetry rows for every tool call the task made
    pub fn tool_call_rows(&self, run_id: &str) -> Vec<ToolCallRow> {
        let telemetry = &self.result.metadata.tool_quality_runtime;
        ToolCallRow::for_task(run_id, &self.result.task_id, telemetry.mode, &telemetry.events)
    }
}

/// Runs tasks one at a time against a shared generation client
pub struct TaskRunner {
    config: Config,
    client: Arc<dyn GenerationClient>,
    mode: RunMode,
}

impl TaskRunner {
    pub fn new(config: Config, client: Arc<dyn GenerationClient>) -> Self {
        let mode = config.runtime.mode;
        debug!(%mode, "TaskRunner::new: called");
        Self { config, client, mode }
    }

    /// Override the configured run mode
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Schemas offered to the model; patch-only runs send none
    fn tool_definitions(&self, allowed: Option<&HashSet<String>>) -> Vec<ToolDefinition> {
        match (self.mode, allowed) {
            (RunMode::PatchOnly, _) => Vec::new(),
            (RunMode::ToolsEnabled, Some(allowed)) if !allowed.is_empty() => ToolExecutor::definitions_for(allowed),
            (RunMode::ToolsEnabled, _) => ToolExecutor::definitions(),
        }
    }

    /// Run one task inside `workspace_root`
    ///
    /// Only generation failures (retries exhausted or a fatal protocol error)
    /// and prompt-loading problems come back as errors.
    pub async fn run_task(&self, task: &Task, workspace_root: &Path) -> Result<TaskReport> {
        info!(task_id = %task.task_id, mode = %self.mode, ?workspace_root, "TaskRunner::run_task: starting");
        let started_at = Utc::now();

        let ctx = ToolContext::with_limits(workspace_root, task.task_id.as_str(), self.config.tools.clone());
        let executor = Arc::new(ToolExecutor::new(ctx));
        let loop_config = self.config.runtime.loop_config(self.mode);
        let tool_definitions = self.tool_definitions(loop_config.allowed_tools.as_ref());
        let system_prompt = self.config.system_prompt()?;

        let controller = TurnController::new(self.client.clone(), executor, loop_config);
        let outcome = controller
            .run(task, &system_prompt, &tool_definitions, &self.config.decoding)
            .await
            .with_context(|| format!("Task {} failed during generation", task.task_id))?;

        let report = self.build_report(task, outcome, started_at.to_rfc3339());
        info!("{}", report.quality);
        info!(
            task_id = %task.task_id,
            artifact_valid = report.artifact_policy.valid,
            artifact_reason = %report.artifact_policy.reason,
            "TaskRunner::run_task: finished"
        );
        Ok(report)
    }

    fn build_report(&self, task: &Task, outcome: LoopOutcome, started_at: String) -> TaskReport {
        debug!(task_id = %task.task_id, "TaskRunner::build_report: called");
        let telemetry = outcome.telemetry();

        let final_artifact = match outcome.submitted_artifact {
            Some(submitted) if !submitted.is_empty() => submitted,
            _ => outcome.final_artifact,
        };
        let artifact_policy = artifact::normalize(&final_artifact, task.expected_output_type);
        let prediction = match task.expected_output_type {
            OutputType::Patch => final_artifact.clone(),
            _ => artifact_policy.artifact.clone(),
        };

        let tq = &self.config.tool_quality;
        let quality = quality::score_task(&task.task_id, &telemetry, &tq.weights, tq.enabled);

        TaskReport {
            result: TaskResult {
                task_id: task.task_id.clone(),
                final_artifact,
                metadata: TaskMetadata {
                    terminated: outcome.terminated,
                    completed_without_explicit_submission: outcome.completed_without_explicit_submission,
                    repo: task.repo().map(str::to_string),
                    started_at,
                    finished_at: Utc::now().to_rfc3339(),
                    tool_quality_runtime: telemetry,
                },
            },
            prediction,
            artifact_policy,
            quality,
        }
    }
}

/// Aggregate task reports into a run summary
pub fn score_reports(reports: &[TaskReport], config: &Config) -> RunQualitySummary {
    debug!(reports = reports.len(), "score_reports: called");
    let summaries: Vec<TaskQualitySummary> = reports.iter().map(|r| r.quality.clone()).collect();
    let summary = quality::score_run(&summaries, &config.tool_quality.weights, config.tool_quality.enabled);
    info!("{}", summary);
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::ArtifactReason;
    use crate::domain::{ErrorCode, LoopExitReason};
    use crate::llm::client::mock::ScriptedClient;
    use crate::llm::{GenerationResult, LlmError, ToolCall};
    use serde_json::json;
    use tempfile::TempDir;

    const PATCH: &str = "diff --git a/a.txt b/a.txt\n--- a/a.txt\n+++ b/a.txt\n@@ -1 +1 @@\n-old\n+new\n";

    fn runner(client: Arc<ScriptedClient>, mode: RunMode) -> TaskRunner {
        TaskRunner::new(Config::default(), client).with_mode(mode)
    }

    #[tokio::test]
    async fn test_patch_only_sends_no_schemas_and_passes_patch_through() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new(vec![GenerationResult::text(format!(
            "Here you go\n```diff\n{}```",
            PATCH
        ))]));
        let task = Task::new("t-patch", "fix a.txt")
            .with_output_type(OutputType::Patch)
            .with_resource("repo", json!("org/repo"));

        let report = runner(client.clone(), RunMode::PatchOnly)
            .run_task(&task, temp.path())
            .await
            .unwrap();

        assert_eq!(client.tool_counts(), vec![0]);
        assert!(report.artifact_policy.valid);
        assert_eq!(report.artifact_policy.artifact, PATCH);
        assert!(report.prediction.starts_with("Here you go"));
        assert_eq!(report.result.metadata.repo.as_deref(), Some("org/repo"));
        assert!(report.result.metadata.completed_without_explicit_submission);
        assert_eq!(report.result.metadata.tool_quality_runtime.mode, RunMode::PatchOnly);
        assert!(!report.quality.applicable);
    }

    #[tokio::test]
    async fn test_tools_enabled_submission_wins_over_text() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("a.txt"), "old\n").unwrap();
        let client = Arc::new(ScriptedClient::new(vec![
            GenerationResult::with_calls("", vec![ToolCall::new("workspace_list", json!({"path": "."}))]),
            GenerationResult::with_calls("", vec![ToolCall::new("submit", json!({"final_artifact": PATCH}))]),
        ]));
        let task = Task::new("t-tools", "fix a.txt").with_output_type(OutputType::Patch);

        let report = runner(client.clone(), RunMode::ToolsEnabled)
            .run_task(&task, temp.path())
            .await
            .unwrap();

        assert_eq!(client.tool_counts(), vec![7, 7]);
        assert_eq!(report.result.final_artifact, PATCH);
        assert_eq!(report.prediction, PATCH);
        assert!(report.artifact_policy.valid);
        let telemetry = &report.result.metadata.tool_quality_runtime;
        assert_eq!(telemetry.loop_exit_reason, LoopExitReason::Submitted);
        assert!(telemetry.termination_ack);
        assert!(telemetry.events.iter().all(|e| e.error_code == ErrorCode::None));
        assert!(report.quality.applicable);
        assert_eq!(report.quality.score, Some(1.0));
        assert_eq!(report.tool_call_rows("run-1").len(), 2);
    }

    #[tokio::test]
    async fn test_configured_allow_list_filters_schemas() {
        let temp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.runtime.allowed_tools = Some(vec!["workspace_open".to_string(), "submit".to_string()]);
        let client = Arc::new(ScriptedClient::new(vec![
            GenerationResult::with_calls("", vec![ToolCall::new("bash", json!({"cmd": "ls"}))]),
            GenerationResult::text("gave up"),
        ]));
        let task = Task::new("t-allow", "look around");

        let report = TaskRunner::new(config, client.clone())
            .with_mode(RunMode::ToolsEnabled)
            .run_task(&task, temp.path())
            .await
            .unwrap();

        assert_eq!(client.tool_counts(), vec![2, 2]);
        let events = &report.result.metadata.tool_quality_runtime.events;
        assert_eq!(events[0].error_code, ErrorCode::NotAllowed);
        assert_eq!(report.quality.tool_calls_denied, 1);
        assert_eq!(report.prediction, "gave up");
    }

    #[tokio::test]
    async fn test_json_output_is_normalized() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new(vec![GenerationResult::text("{\"b\": 1, \"a\": 2}")]));
        let task = Task::new("t-json", "answer in json").with_output_type(OutputType::Json);

        let report = runner(client, RunMode::PatchOnly).run_task(&task, temp.path()).await.unwrap();

        assert_eq!(report.prediction, r#"{"a":2,"b":1}"#);
        assert_eq!(report.artifact_policy.reason, ArtifactReason::Ok);
    }

    #[tokio::test]
    async fn test_generation_failure_is_an_error() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::from_results(vec![Err(LlmError::Fatal {
            status: 401,
            detail: "bad key".to_string(),
        })]));
        let task = Task::new("t-fail", "anything");

        let err = runner(client, RunMode::PatchOnly)
            .run_task(&task, temp.path())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("t-fail"));
    }

    #[tokio::test]
    async fn test_score_reports_aggregates() {
        let temp = TempDir::new().unwrap();
        let client = Arc::new(ScriptedClient::new(vec![
            GenerationResult::with_calls("", vec![ToolCall::new("submit", json!({"final_artifact": "x"}))]),
            GenerationResult::text("no tools"),
        ]));
        let runner = runner(client, RunMode::ToolsEnabled);
        let a = runner.run_task(&Task::new("a", "one"), temp.path()).await.unwrap();
        let b = runner.run_task(&Task::new("b", "two"), temp.path()).await.unwrap();

        let summary = score_reports(&[a, b], &Config::default());
        assert!(summary.applicable);
        assert_eq!(summary.counts.tasks_total, 2);
        assert_eq!(summary.counts.tasks_applicable, 1);
        assert_eq!(summary.counts.tasks_termination_ack, 1);
        assert_eq!(summary.score, Some(1.0));
    }
}
