//! Chat-completions client for OpenRouter-style endpoints
//!
//! The HTTP hop is a [`Transport`] so the retry loop can be driven by a
//! scripted transport in tests. Retry decisions come from [`RetryPolicy`];
//! this module only performs IO and sleeps.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::retry::{AttemptFailure, JitterSource, RetryDecision, RetryObserver, RetryPolicy, SeededJitter, ThreadRngJitter, TracingObserver};
use super::{DecodingConfig, GenerationClient, GenerationResult, LlmError, Message, ToolCall, ToolDefinition};
use crate::config::LlmConfig;

/// Default API base URL
pub const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// Raw HTTP reply
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// One authenticated JSON POST
///
/// `Err` is reserved for failures that produced no HTTP response at all.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> Result<HttpReply, String>;
}

/// Production transport backed by reqwest
pub struct ReqwestTransport {
    http: Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, LlmError> {
        debug!(?timeout, "ReqwestTransport::new: called");
        let http = Client::builder().timeout(timeout).build().map_err(LlmError::Network)?;
        Ok(Self { http })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, url: &str, api_key: &str, body: &Value) -> Result<HttpReply, String> {
        debug!(%url, "ReqwestTransport::post_json: called");
        let response = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("content-type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| e.to_string())?;
        Ok(HttpReply { status, body })
    }
}

/// Prefix bare qwen model ids with their provider namespace
pub fn normalize_model_id(model: &str) -> String {
    if !model.contains('/') && model.starts_with("qwen") {
        format!("qwen/{}", model)
    } else {
        model.to_string()
    }
}

/// Generation client speaking the chat-completions wire format
pub struct ChatCompletionsClient {
    model: String,
    api_key: String,
    url: String,
    policy: RetryPolicy,
    transport: Arc<dyn Transport>,
    jitter: Arc<dyn JitterSource>,
    observer: Arc<dyn RetryObserver>,
}

impl ChatCompletionsClient {
    pub fn new(
        model: &str,
        api_key: impl Into<String>,
        base_url: &str,
        policy: RetryPolicy,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let model = normalize_model_id(model);
        debug!(%model, %base_url, "ChatCompletionsClient::new: called");
        Self {
            model,
            api_key: api_key.into(),
            url: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            policy,
            transport,
            jitter: Arc::new(ThreadRngJitter),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Create a client from configuration
    pub fn from_config(config: &LlmConfig) -> Result<Self, LlmError> {
        debug!(model = %config.model, "ChatCompletionsClient::from_config: called");
        let api_key = config.get_api_key().map_err(|e| LlmError::Config(e.to_string()))?;
        let transport = Arc::new(ReqwestTransport::new(config.timeout())?);
        let client = Self::new(&config.model, api_key, &config.base_url, config.retry_policy(), transport);
        Ok(match config.jitter_seed {
            Some(seed) => client.with_jitter(Arc::new(SeededJitter::new(seed))),
            None => client,
        })
    }

    pub fn with_jitter(mut self, jitter: Arc<dyn JitterSource>) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn RetryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Build the request body
    fn build_request_body(&self, messages: &[Message], tools: &[ToolDefinition], decoding: &DecodingConfig) -> Value {
        debug!(message_count = messages.len(), tool_count = tools.len(), "build_request_body: called");
        let mut body = Map::new();
        body.insert("model".to_string(), json!(self.model));
        body.insert("messages".to_string(), json!(messages));
        if !tools.is_empty() {
            body.insert(
                "tools".to_string(),
                Value::Array(tools.iter().map(|t| t.to_openai_schema()).collect()),
            );
        }
        body.extend(decoding.overrides());
        Value::Object(body)
    }
}

/// Parse a 2xx body into a generation result
///
/// Only the structured `tool_calls` field is read; assistant text is never
/// mined for tool syntax.
pub fn parse_response_body(body: &str) -> Result<GenerationResult, AttemptFailure> {
    debug!(body_len = body.len(), "parse_response_body: called");
    let data: Value =
        serde_json::from_str(body).map_err(|e| AttemptFailure::MalformedBody(format!("response is not JSON: {}", e)))?;
    let Value::Object(data) = data else {
        return Err(AttemptFailure::MalformedBody("non-object JSON response".to_string()));
    };

    let message = data
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"));

    let Some(message) = message else {
        debug!("parse_response_body: no choices");
        return Ok(GenerationResult::default());
    };

    let assistant_text = message.get("content").and_then(Value::as_str).unwrap_or_default().to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| calls.iter().filter_map(parse_tool_call).collect())
        .unwrap_or_default();

    Ok(GenerationResult::with_calls(assistant_text, tool_calls))
}

fn parse_tool_call(raw: &Value) -> Option<ToolCall> {
    let function = raw.get("function")?;
    let name = function.get("name").and_then(Value::as_str).filter(|n| !n.is_empty())?;
    let arguments = match function.get("arguments") {
        Some(Value::String(text)) => serde_json::from_str::<Value>(text).unwrap_or_else(|_| json!({"raw": text})),
        Some(other) => other.clone(),
        None => Value::Null,
    };
    debug!(%name, "parse_tool_call: parsed");
    Some(ToolCall::new(name, arguments))
}

#[async_trait]
impl GenerationClient for ChatCompletionsClient {
    async fn generate(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
        decoding: &DecodingConfig,
    ) -> Result<GenerationResult, LlmError> {
        debug!(%self.model, message_count = messages.len(), "generate: called");
        let body = self.build_request_body(messages, tools, decoding);

        let mut attempt = 0u32;
        loop {
            let failure = match self.transport.post_json(&self.url, &self.api_key, &body).await {
                Err(e) => {
                    debug!(attempt, error = %e, "generate: transport error");
                    AttemptFailure::Transport(e)
                }
                Ok(reply) if reply.status >= 400 => {
                    debug!(attempt, status = reply.status, "generate: error status");
                    AttemptFailure::status(reply.status, &reply.body)
                }
                Ok(reply) => match parse_response_body(&reply.body) {
                    Ok(result) => {
                        debug!(attempt, tool_calls = result.tool_calls.len(), "generate: success");
                        return Ok(result);
                    }
                    Err(failure) => failure,
                },
            };

            match self.policy.decide(attempt, failure.clone(), self.jitter.as_ref()) {
                RetryDecision::Retry { delay } => {
                    self.observer.on_retry(attempt, delay, &failure);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    attempt += 1;
                }
                RetryDecision::GiveUp(error) => {
                    self.observer.on_give_up(attempt + 1, &error);
                    return Err(error);
                }
            }
        }
    }
}
