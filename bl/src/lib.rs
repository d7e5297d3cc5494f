//! Benchloop - bounded tool-use agent loop for benchmark tasks
//!
//! Drives a model through a turn-based tool-use loop to produce one artifact
//! per task (usually a unified diff), normalizes that artifact against the
//! task's expected output type, and scores how well the model used its tools.
//!
//! # Core Concepts
//!
//! - **Bounded turns**: tool-call and wall-clock budgets are checked at every turn boundary
//! - **Explicit termination**: a designated tool's accepted submission ends the loop
//! - **Contained tool failures**: tool errors and panics become telemetry, never task failures
//! - **Telemetry first**: every offered tool call yields exactly one event for the scorer
//!
//! # Modules
//!
//! - [`llm`] - Generation client trait, chat-completions implementation and retry policy
//! - [`tools`] - Sandboxed workspace tools and the executor that dispatches them
//! - [`r#loop`] - Turn controller and loop budgets
//! - [`artifact`] - Artifact normalization and validation
//! - [`quality`] - Tool-quality scoring
//! - [`runner`] - Per-task pipeline tying the pieces together
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod artifact;
pub mod cli;
pub mod config;
pub mod domain;
pub mod llm;
pub mod quality;
pub mod runner;
pub mod tools;

// Note: 'loop' is a reserved keyword, so we use r#loop
#[path = "loop/mod.rs"]
pub mod r#loop;

// Re-export commonly used types
pub use artifact::{ArtifactPolicyResult, ArtifactReason, normalize};
pub use config::Config;
pub use domain::{
    ErrorCode, LoopExitReason, OutputType, RunMode, RuntimeTelemetry, Task, TaskMetadata, TaskResult, ToolCallEvent,
};
pub use llm::{ChatCompletionsClient, GenerationClient, GenerationResult, LlmError, ToolCall, create_client};
pub use quality::{QualityWeights, RunQualitySummary, TaskQualitySummary, score_run, score_task};
pub use r#loop::{LoopConfig, LoopOutcome, TurnController};
pub use runner::{TaskReport, TaskRunner, score_reports};
pub use tools::{ToolContext, ToolError, ToolExecutor, ToolResult};
