//! LLM error types

use thiserror::Error;

/// Errors that escape a generation call
///
/// Only two shapes are fatal to a task: exhausting the retry budget on a
/// retryable condition, and a non-retryable protocol error.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Generation failed after {attempts} attempts ({status}): {detail}")]
    RetriesExhausted {
        attempts: u32,
        status: String,
        detail: String,
    },

    #[error("API error {status}: {detail}")]
    Fatal { status: u16, detail: String },

    #[error("Client configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
}

impl LlmError {
    /// Check if the error came from a retryable condition whose budget ran out
    pub fn is_exhausted(&self) -> bool {
        matches!(self, LlmError::RetriesExhausted { .. })
    }

    /// HTTP status attached to the error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Fatal { status, .. } => Some(*status),
            LlmError::RetriesExhausted { status, .. } => status.parse().ok(),
            _ => None,
        }
    }
}
