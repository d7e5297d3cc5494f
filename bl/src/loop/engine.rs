//! TurnController - drives the generate/dispatch loop for one task

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{ErrorCode, LoopExitReason, RunMode, RuntimeTelemetry, Task, ToolCallEvent};
use crate::llm::{AssistantToolCall, DecodingConfig, GenerationClient, LlmError, Message, ToolCall, ToolDefinition};
use crate::tools::{ToolDispatch, ToolResult};

use super::LoopConfig;

/// Everything a finished loop hands back to the caller
#[derive(Debug, Clone, PartialEq)]
pub struct LoopOutcome {
    pub terminated: bool,

    /// True exactly when the loop ended because the model stopped calling tools
    pub completed_without_explicit_submission: bool,

    pub final_artifact: String,

    /// Artifact from the most recent accepted submission, if any
    pub submitted_artifact: Option<String>,

    pub loop_exit_reason: LoopExitReason,
    pub budget_exhausted: bool,
    pub wall_time_exhausted: bool,
    pub termination_ack: bool,
    pub events: Vec<ToolCallEvent>,

    /// Generation calls made
    pub turns: u32,
    pub tool_calls_made: u32,
    pub mode: RunMode,
}

impl LoopOutcome {
    fn new(mode: RunMode) -> Self {
        Self {
            terminated: false,
            completed_without_explicit_submission: false,
            final_artifact: String::new(),
            submitted_artifact: None,
            loop_exit_reason: LoopExitReason::Unknown,
            budget_exhausted: false,
            wall_time_exhausted: false,
            termination_ack: false,
            events: Vec::new(),
            turns: 0,
            tool_calls_made: 0,
            mode,
        }
    }

    /// Telemetry block for persistence and scoring
    pub fn telemetry(&self) -> RuntimeTelemetry {
        RuntimeTelemetry {
            mode: self.mode,
            loop_exit_reason: self.loop_exit_reason,
            budget_exhausted: self.budget_exhausted,
            wall_time_exhausted: self.wall_time_exhausted,
            termination_ack: self.termination_ack,
            events: self.events.clone(),
        }
    }
}

/// How one dispatched call ended
enum Dispatched {
    Completed(ToolResult),
    Exception(String),
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn json_size(map: &Map<String, Value>) -> u64 {
    serde_json::to_vec(map).map(|bytes| bytes.len() as u64).unwrap_or(0)
}

/// Classify a completed result: error key, then nonzero returncode, then explicit `success: false`
fn classify(result: &ToolResult) -> (bool, ErrorCode) {
    if result.is_error() {
        (false, ErrorCode::ToolError)
    } else if result.returncode().is_some_and(|code| code != 0) {
        (false, ErrorCode::NonzeroReturncode)
    } else if result.reports_failure() {
        (false, ErrorCode::ToolError)
    } else {
        (true, ErrorCode::None)
    }
}

/// Turn-based loop interleaving generation with tool dispatch
///
/// Budgets are checked only at the start of a turn. Every tool call the model
/// requests yields exactly one [`ToolCallEvent`], except calls that follow an
/// accepted submission in the same turn, which are never looked at.
pub struct TurnController {
    client: Arc<dyn GenerationClient>,
    tools: Arc<dyn ToolDispatch>,
    config: LoopConfig,
}

impl TurnController {
    pub fn new(client: Arc<dyn GenerationClient>, tools: Arc<dyn ToolDispatch>, config: LoopConfig) -> Self {
        debug!(?config, "TurnController::new: called");
        Self { client, tools, config }
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Run the loop to completion for one task
    ///
    /// Only generation failures escape; every tool-side problem is folded into
    /// the outcome.
    pub async fn run(
        &self,
        task: &Task,
        system_prompt: &str,
        tool_definitions: &[ToolDefinition],
        decoding: &DecodingConfig,
    ) -> Result<LoopOutcome, LlmError> {
        info!(task_id = %task.task_id, mode = %self.config.mode, tools = tool_definitions.len(), "TurnController::run: starting");
        let started = Instant::now();
        let mut messages = vec![Message::system(system_prompt), Message::user(task.instruction.as_str())];
        let mut outcome = LoopOutcome::new(self.config.mode);
        let mut turn_index: u32 = 0;

        loop {
            if started.elapsed() > self.config.max_wall_time {
                debug!(task_id = %task.task_id, turn_index, "TurnController::run: wall time exhausted");
                outcome.wall_time_exhausted = true;
                outcome.loop_exit_reason = LoopExitReason::WallTimeExhausted;
                break;
            }
            if outcome.tool_calls_made >= self.config.max_tool_calls {
                debug!(task_id = %task.task_id, turn_index, "TurnController::run: tool budget exhausted");
                outcome.budget_exhausted = true;
                outcome.loop_exit_reason = LoopExitReason::ToolBudgetExhausted;
                break;
            }

            debug!(task_id = %task.task_id, turn_index, "TurnController::run: generating");
            let generation = self.client.generate(&messages, tool_definitions, decoding).await?;
            outcome.turns += 1;

            let made_at_turn_start = outcome.tool_calls_made;
            let call_ids: Vec<String> = (0..generation.tool_calls.len())
                .map(|idx| format!("call_{}_{}", made_at_turn_start, idx))
                .collect();
            let wire_calls = generation
                .tool_calls
                .iter()
                .zip(&call_ids)
                .map(|(call, id)| AssistantToolCall::from_call(id.as_str(), call))
                .collect();
            messages.push(Message::assistant_with_calls(generation.assistant_text.as_str(), wire_calls));

            if generation.tool_calls.is_empty() {
                debug!(task_id = %task.task_id, turn_index, "TurnController::run: no tool calls, finishing");
                outcome.final_artifact = generation.assistant_text;
                outcome.terminated = true;
                outcome.completed_without_explicit_submission = true;
                outcome.loop_exit_reason = LoopExitReason::NoToolCalls;
                break;
            }

            for (idx, (call, call_id)) in generation.tool_calls.iter().zip(&call_ids).enumerate() {
                outcome.tool_calls_made += 1;
                let mut event = ToolCallEvent::pending(
                    turn_index,
                    idx as u32,
                    call.name.as_str(),
                    call.name == self.config.termination_tool,
                    json_size(&call.arguments),
                );

                if !self.config.is_allowed(&call.name) {
                    debug!(tool = %call.name, "TurnController::run: tool not allowed");
                    outcome.events.push(event.deny());
                    messages.push(Message::tool(
                        call.name.as_str(),
                        call_id.as_str(),
                        format!("Tool {} not allowed", call.name),
                    ));
                    continue;
                }

                event.allowed = true;
                let dispatch_started = Instant::now();
                let dispatched = self.dispatch(call).await;
                event.latency_ms = dispatch_started.elapsed().as_millis() as u64;
                event.executed = true;

                let result = match dispatched {
                    Dispatched::Completed(result) => {
                        let (success, error_code) = classify(&result);
                        event.success = success;
                        event.error_code = error_code;
                        event.return_code = result.returncode();
                        result
                    }
                    Dispatched::Exception(message) => {
                        warn!(tool = %call.name, %message, "TurnController::run: tool execution exception");
                        event.success = false;
                        event.error_code = ErrorCode::ExecutionException;
                        ToolResult::error(message)
                    }
                };

                let content = result.to_content();
                event.result_size_bytes = content.len() as u64;
                let exception = event.error_code == ErrorCode::ExecutionException;
                debug!(tool = %call.name, success = event.success, error_code = event.error_code.as_str(), "TurnController::run: tool finished");
                outcome.events.push(event);
                messages.push(Message::tool(call.name.as_str(), call_id.as_str(), content));

                if exception {
                    continue;
                }

                if let Some(artifact) = &result.submission {
                    outcome.submitted_artifact = Some(artifact.clone());
                }

                if call.name == self.config.termination_tool && result.is_submission() {
                    outcome.final_artifact = result.submission.clone().unwrap_or_else(|| {
                        call.arguments
                            .get("final_artifact")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string()
                    });
                    outcome.terminated = true;
                    outcome.termination_ack = true;
                    outcome.loop_exit_reason = LoopExitReason::Submitted;
                    break;
                }
            }

            if outcome.terminated {
                break;
            }
            turn_index += 1;
        }

        info!(
            task_id = %task.task_id,
            exit = %outcome.loop_exit_reason,
            turns = outcome.turns,
            tool_calls = outcome.tool_calls_made,
            "TurnController::run: finished"
        );
        Ok(outcome)
    }

    /// Dispatch one call inside the exception boundary
    async fn dispatch(&self, call: &ToolCall) -> Dispatched {
        debug!(tool = %call.name, "TurnController::dispatch: called");
        match AssertUnwindSafe(self.tools.dispatch(&call.name, &call.arguments))
            .catch_unwind()
            .await
        {
            Ok(Ok(result)) => Dispatched::Completed(result),
            Ok(Err(e)) => Dispatched::Exception(format!("tool execution exception: {}: {}", e.kind(), e)),
            Err(payload) => Dispatched::Exception(format!(
                "tool execution exception: panic: {}",
                panic_message(payload.as_ref())
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ErrorCode;
    use crate::llm::client::mock::ScriptedClient;
    use crate::llm::{GenerationResult, Role};
    use crate::tools::ToolError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::time::Duration;

    type Handler = Box<dyn Fn(&str, &Map<String, Value>) -> Result<ToolResult, ToolError> + Send + Sync>;

    /// Dispatcher answering through a closure and logging call names
    struct ScriptedDispatch {
        handler: Handler,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedDispatch {
        fn new(handler: impl Fn(&str, &Map<String, Value>) -> Result<ToolResult, ToolError> + Send + Sync + 'static) -> Arc<Self> {
            Arc::new(Self {
                handler: Box::new(handler),
                calls: Mutex::new(Vec::new()),
            })
        }

        /// Submit accepts; everything else succeeds with returncode 0
        fn standard() -> Arc<Self> {
            Self::new(|name, args| {
                if name == "submit" {
                    let artifact = args.get("final_artifact").and_then(Value::as_str).unwrap_or_default();
                    Ok(ToolResult::submitted(artifact, artifact))
                } else {
                    Ok(ToolResult::ok(json!({"returncode": 0, "output": "ok"})))
                }
            })
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ToolDispatch for ScriptedDispatch {
        async fn dispatch(&self, name: &str, arguments: &Map<String, Value>) -> Result<ToolResult, ToolError> {
            self.calls.lock().unwrap().push(name.to_string());
            (self.handler)(name, arguments)
        }
    }

    fn call(name: &str, args: Value) -> ToolCall {
        ToolCall::new(name, args)
    }

    fn turn(calls: Vec<ToolCall>) -> GenerationResult {
        GenerationResult::with_calls("", calls)
    }

    fn config(max_tool_calls: u32, allowed: Option<&[&str]>) -> LoopConfig {
        LoopConfig {
            max_tool_calls,
            allowed_tools: allowed.map(|names| names.iter().map(|n| n.to_string()).collect::<HashSet<_>>()),
            mode: RunMode::ToolsEnabled,
            ..LoopConfig::default()
        }
    }

    async fn run(client: Arc<ScriptedClient>, tools: Arc<ScriptedDispatch>, config: LoopConfig) -> LoopOutcome {
        let controller = TurnController::new(client, tools, config);
        controller
            .run(&Task::new("t-1", "fix it"), "system", &[], &DecodingConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_budget_exhaustion() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("bash", json!({"cmd": "ls"}))]),
            turn(vec![call("bash", json!({"cmd": "ls"}))]),
            turn(vec![call("bash", json!({"cmd": "ls"}))]),
        ]));
        let outcome = run(client.clone(), ScriptedDispatch::standard(), config(2, None)).await;

        assert_eq!(outcome.loop_exit_reason, LoopExitReason::ToolBudgetExhausted);
        assert!(outcome.budget_exhausted);
        assert!(!outcome.terminated);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.tool_calls_made, 2);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_budget_checked_only_at_turn_start() {
        let client = Arc::new(ScriptedClient::new(vec![turn(vec![
            call("bash", json!({"cmd": "a"})),
            call("bash", json!({"cmd": "b"})),
            call("bash", json!({"cmd": "c"})),
        ])]));
        let outcome = run(client, ScriptedDispatch::standard(), config(2, None)).await;

        assert_eq!(outcome.events.len(), 3);
        assert_eq!(outcome.tool_calls_made, 3);
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::ToolBudgetExhausted);
    }

    #[tokio::test]
    async fn test_denied_calls_are_recorded_not_executed() {
        let client = Arc::new(ScriptedClient::new(vec![turn(vec![
            call("bash", json!({"cmd": "rm -rf /"})),
            call("submit", json!({"final_artifact": "answer"})),
        ])]));
        let tools = ScriptedDispatch::standard();
        let outcome = run(client.clone(), tools.clone(), config(20, Some(&["submit"]))).await;

        assert_eq!(tools.calls(), vec!["submit"]);
        let denied = &outcome.events[0];
        assert!(!denied.allowed && !denied.executed && !denied.success);
        assert_eq!(denied.error_code, ErrorCode::NotAllowed);
        assert!(outcome.events.iter().all(ToolCallEvent::is_consistent));
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::Submitted);
        assert_eq!(outcome.final_artifact, "answer");
    }

    #[tokio::test]
    async fn test_denial_message_reaches_model() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("bash", json!({"cmd": "ls"}))]),
            GenerationResult::text("giving up"),
        ]));
        run(client.clone(), ScriptedDispatch::standard(), config(20, Some(&["submit"]))).await;

        let second = &client.conversations()[1];
        let tool_msg = second.iter().find(|m| m.role == Role::Tool).unwrap();
        assert_eq!(tool_msg.content, "Tool bash not allowed");
        assert_eq!(tool_msg.tool_call_id.as_deref(), Some("call_0_0"));
    }

    #[tokio::test]
    async fn test_execution_exception_is_contained() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("bash", json!({"cmd": "sleep 999"}))]),
            turn(vec![call("submit", json!({"final_artifact": "done"}))]),
        ]));
        let tools = ScriptedDispatch::new(|name, args| match name {
            "bash" => Err(ToolError::CommandTimeout {
                command: "sleep 999".to_string(),
                timeout_s: 60,
            }),
            _ => Ok(ToolResult::submitted(
                args["final_artifact"].as_str().unwrap_or_default(),
                "",
            )),
        });
        let outcome = run(client.clone(), tools, config(20, None)).await;

        let failed = &outcome.events[0];
        assert!(failed.allowed && failed.executed && !failed.success);
        assert_eq!(failed.error_code, ErrorCode::ExecutionException);
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::Submitted);

        let tool_msg = client.conversations()[1].iter().find(|m| m.role == Role::Tool).cloned().unwrap();
        assert!(tool_msg.content.contains("tool execution exception: CommandTimeout"));
    }

    #[tokio::test]
    async fn test_panicking_tool_is_contained() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("bash", json!({"cmd": "boom"}))]),
            GenerationResult::text("stopped"),
        ]));
        let tools = ScriptedDispatch::new(|_, _| panic!("tool blew up"));
        let outcome = run(client, tools, config(20, None)).await;

        assert_eq!(outcome.events[0].error_code, ErrorCode::ExecutionException);
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::NoToolCalls);
    }

    #[tokio::test]
    async fn test_submission_stops_remaining_calls_in_turn() {
        let client = Arc::new(ScriptedClient::new(vec![turn(vec![
            call("bash", json!({"cmd": "ls"})),
            call("submit", json!({"final_artifact": "diff --git a/x b/x"})),
            call("bash", json!({"cmd": "never"})),
        ])]));
        let tools = ScriptedDispatch::standard();
        let outcome = run(client.clone(), tools.clone(), config(20, None)).await;

        assert_eq!(tools.calls(), vec!["bash", "submit"]);
        assert_eq!(outcome.events.len(), 2);
        assert_eq!(outcome.tool_calls_made, 2);
        assert!(outcome.terminated && outcome.termination_ack);
        assert!(!outcome.completed_without_explicit_submission);
        assert!(outcome.events[1].is_termination_tool);
        assert_eq!(outcome.final_artifact, "diff --git a/x b/x");
        assert_eq!(outcome.submitted_artifact.as_deref(), Some("diff --git a/x b/x"));
        assert_eq!(client.call_count(), 1);
    }

    #[tokio::test]
    async fn test_no_tool_calls_finishes_without_submission() {
        let client = Arc::new(ScriptedClient::new(vec![GenerationResult::text("here is my answer")]));
        let outcome = run(client, ScriptedDispatch::standard(), config(20, None)).await;

        assert!(outcome.terminated);
        assert!(outcome.completed_without_explicit_submission);
        assert!(!outcome.termination_ack);
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::NoToolCalls);
        assert_eq!(outcome.final_artifact, "here is my answer");
        assert!(outcome.events.is_empty());
    }

    #[tokio::test]
    async fn test_result_classification_priority() {
        let client = Arc::new(ScriptedClient::new(vec![turn(vec![
            call("a", json!({})),
            call("b", json!({})),
            call("c", json!({})),
            call("d", json!({})),
            call("e", json!({})),
        ])]));
        let tools = ScriptedDispatch::new(|name, _| {
            Ok(ToolResult::ok(match name {
                "a" => json!({"error": "boom", "returncode": 3}),
                "b" => json!({"returncode": 1, "success": true}),
                "c" => json!({"success": false}),
                "d" => json!({"returncode": 0}),
                _ => json!({"entries": []}),
            }))
        });
        let outcome = run(client, tools, config(5, None)).await;

        let codes: Vec<ErrorCode> = outcome.events.iter().map(|e| e.error_code).collect();
        assert_eq!(
            codes,
            vec![
                ErrorCode::ToolError,
                ErrorCode::NonzeroReturncode,
                ErrorCode::ToolError,
                ErrorCode::None,
                ErrorCode::None
            ]
        );
        assert_eq!(outcome.events[0].return_code, Some(3));
        assert_eq!(outcome.events[3].return_code, Some(0));
        assert_eq!(outcome.events[4].return_code, None);
        assert!(outcome.events[3].success);
    }

    #[tokio::test]
    async fn test_rejected_submission_does_not_terminate() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("submit", json!({"artifact": "wrong key"}))]),
            GenerationResult::text("fallback"),
        ]));
        let tools = ScriptedDispatch::new(|_, args| {
            Ok(ToolResult::invalid_arguments("submit", "missing field `final_artifact`", args))
        });
        let outcome = run(client, tools, config(20, None)).await;

        assert!(!outcome.termination_ack);
        assert_eq!(outcome.loop_exit_reason, LoopExitReason::NoToolCalls);
        assert_eq!(outcome.final_artifact, "fallback");
    }

    #[tokio::test]
    async fn test_call_ids_and_conversation_shape() {
        let client = Arc::new(ScriptedClient::new(vec![
            turn(vec![call("bash", json!({"cmd": "a"})), call("bash", json!({"cmd": "b"}))]),
            turn(vec![call("bash", json!({"cmd": "c"}))]),
            GenerationResult::text("done"),
        ]));
        let outcome = run(client.clone(), ScriptedDispatch::standard(), config(20, None)).await;

        let third = &client.conversations()[2];
        assert_eq!(third[0].role, Role::System);
        assert_eq!(third[1].role, Role::User);
        assert_eq!(third[1].content, "fix it");
        assert_eq!(third[2].tool_calls[0].id, "call_0_0");
        assert_eq!(third[2].tool_calls[1].id, "call_0_1");
        assert_eq!(third[5].tool_calls[0].id, "call_2_0");
        assert_eq!(third[6].tool_call_id.as_deref(), Some("call_2_0"));

        assert_eq!(outcome.turns, 3);
        assert_eq!(outcome.events[2].turn_index, 1);
        assert_eq!(outcome.events[1].call_index, 1);
        assert_eq!(outcome.events[0].args_size_bytes, br#"{"cmd":"a"}"#.len() as u64);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wall_time_checked_at_turn_boundary() {
        let client = Arc::new(
            ScriptedClient::new(vec![
                turn(vec![call("bash", json!({"cmd": "a"}))]),
                turn(vec![call("bash", json!({"cmd": "b"}))]),
                turn(vec![call("bash", json!({"cmd": "c"}))]),
            ])
            .with_delay(Duration::from_secs(400)),
        );
        let config = LoopConfig {
            max_wall_time: Duration::from_secs(600),
            ..config(20, None)
        };
        let outcome = run(client.clone(), ScriptedDispatch::standard(), config).await;

        assert_eq!(outcome.loop_exit_reason, LoopExitReason::WallTimeExhausted);
        assert!(outcome.wall_time_exhausted);
        assert!(!outcome.terminated);
        assert_eq!(client.call_count(), 2);
        assert_eq!(outcome.events.len(), 2);
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let client = Arc::new(ScriptedClient::from_results(vec![Err(LlmError::Fatal {
            status: 400,
            detail: "Invalid request body".to_string(),
        })]));
        let controller = TurnController::new(client, ScriptedDispatch::standard(), config(20, None));

        let err = controller
            .run(&Task::new("t", "x"), "sys", &[], &DecodingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Fatal { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_telemetry_mirrors_outcome() {
        let client = Arc::new(ScriptedClient::new(vec![turn(vec![call(
            "submit",
            json!({"final_artifact": "x"}),
        )])]));
        let outcome = run(client, ScriptedDispatch::standard(), config(20, None)).await;
        let telemetry = outcome.telemetry();

        assert_eq!(telemetry.mode, RunMode::ToolsEnabled);
        assert_eq!(telemetry.loop_exit_reason, LoopExitReason::Submitted);
        assert!(telemetry.termination_ack);
        assert_eq!(telemetry.events, outcome.events);
    }
}
