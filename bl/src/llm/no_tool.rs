//! Offline client that never requests tools

use async_trait::async_trait;
use tracing::debug;

use super::{DecodingConfig, GenerationClient, GenerationResult, LlmError, Message, Role, ToolDefinition};

/// Echoes the most recent user message back as assistant text
///
/// Useful for dry runs of the patch-only pipeline without network access.
#[derive(Debug, Default)]
pub struct NoToolClient;

#[async_trait]
impl GenerationClient for NoToolClient {
    async fn generate(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
        _decoding: &DecodingConfig,
    ) -> Result<GenerationResult, LlmError> {
        debug!(message_count = messages.len(), "NoToolClient::generate: called");
        let content = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_default();
        Ok(GenerationResult::text(content))
    }
}
