//! Task and TaskResult value objects

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::RuntimeTelemetry;

/// Expected type of a task's final artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum OutputType {
    Patch,
    Json,
    #[default]
    Text,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Patch => "patch",
            Self::Json => "json",
            Self::Text => "text",
        }
    }
}

impl From<String> for OutputType {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl std::str::FromStr for OutputType {
    type Err = std::convert::Infallible;

    /// Unknown or empty names fall back to `Text`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = match s.trim().to_lowercase().as_str() {
            "patch" => Self::Patch,
            "json" => Self::Json,
            _ => Self::Text,
        };
        Ok(parsed)
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One benchmark task, as supplied by an external task-loading adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,

    /// Instruction text handed to the model as the first user message
    pub instruction: String,

    /// Free-form resources (may carry a `repo` identifier)
    #[serde(default)]
    pub resources: Map<String, Value>,

    #[serde(default)]
    pub constraints: Map<String, Value>,

    #[serde(default)]
    pub expected_output_type: OutputType,
}

impl Task {
    pub fn new(task_id: impl Into<String>, instruction: impl Into<String>) -> Self {
        let task_id = task_id.into();
        debug!(%task_id, "Task::new: called");
        Self {
            task_id,
            instruction: instruction.into(),
            resources: Map::new(),
            constraints: Map::new(),
            expected_output_type: OutputType::default(),
        }
    }

    pub fn with_output_type(mut self, output_type: OutputType) -> Self {
        self.expected_output_type = output_type;
        self
    }

    pub fn with_resource(mut self, key: impl Into<String>, value: Value) -> Self {
        self.resources.insert(key.into(), value);
        self
    }

    /// Repository identifier from the resource map, if present
    pub fn repo(&self) -> Option<&str> {
        self.resources.get("repo").and_then(Value::as_str)
    }
}

/// Metadata attached to a task result for persistence, scoring and reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMetadata {
    pub terminated: bool,

    pub completed_without_explicit_submission: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,

    pub started_at: String,

    pub finished_at: String,

    pub tool_quality_runtime: RuntimeTelemetry,
}

/// Terminal output of one task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: String,
    pub final_artifact: String,
    pub metadata: TaskMetadata,
}
