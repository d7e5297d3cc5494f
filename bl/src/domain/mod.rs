//! Domain types shared across the loop, the runner and the scorer
//!
//! - [`Task`] / [`TaskResult`] - the value objects exchanged with task loaders
//!   and persistence adapters
//! - [`ToolCallEvent`] / [`RuntimeTelemetry`] - per-call telemetry emitted by
//!   the turn controller and consumed by the quality scorer

mod task;
mod telemetry;

pub use task::{OutputType, Task, TaskMetadata, TaskResult};
pub use telemetry::{ErrorCode, LoopExitReason, RunMode, RuntimeTelemetry, ToolCallEvent};
