//! Generation client module
//!
//! Sends a conversation to a chat-completions endpoint and returns assistant
//! text plus structured tool calls, retrying transient failures.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod no_tool;
pub mod openrouter;
pub mod retry;
mod types;

pub use client::GenerationClient;
pub use error::LlmError;
pub use no_tool::NoToolClient;
pub use openrouter::{ChatCompletionsClient, HttpReply, ReqwestTransport, Transport};
pub use retry::{AttemptFailure, FixedJitter, JitterSource, RetryObserver, RetryPolicy, SeededJitter, TracingObserver};
pub use types::{
    AssistantToolCall, DecodingConfig, FunctionCall, GenerationResult, Message, Role, ToolCall, ToolDefinition,
};

use crate::config::LlmConfig;

/// Create a generation client based on the provider specified in config
///
/// Supports "openrouter" and "no-tool".
pub fn create_client(config: &LlmConfig) -> Result<Arc<dyn GenerationClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    match config.provider.as_str() {
        "openrouter" => {
            debug!("create_client: creating chat-completions client");
            Ok(Arc::new(ChatCompletionsClient::from_config(config)?))
        }
        "no-tool" => {
            debug!("create_client: creating no-tool client");
            Ok(Arc::new(NoToolClient))
        }
        other => {
            debug!(provider = %other, "create_client: unknown provider");
            Err(LlmError::Config(format!(
                "Unknown LLM provider: '{}'. Supported: openrouter, no-tool",
                other
            )))
        }
    }
}
