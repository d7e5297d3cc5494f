//! Turn loop module
//!
//! One `TurnController::run` per task: generate, dispatch the requested tool
//! calls in order, check budgets at the next turn boundary, repeat until the
//! termination tool accepts a submission or a budget runs out.

mod config;
mod engine;

pub use config::LoopConfig;
pub use engine::{LoopOutcome, TurnController};
