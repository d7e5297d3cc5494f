//! GenerationClient trait definition

use async_trait::async_trait;

use super::{DecodingConfig, GenerationResult, LlmError, Message, ToolDefinition};

/// Stateless generation client
///
/// Every call carries the full conversation. An empty `tools` slice means the
/// request is sent without any tool schemas. Implementations retry transient
/// failures internally; an `Err` is terminal for the calling task.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        decoding: &DecodingConfig,
    ) -> Result<GenerationResult, LlmError>;
}
