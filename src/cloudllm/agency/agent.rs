//! Bounded tool-calling conversational unit (§4.4).
//!
//! `Agent` owns its history and nothing else mutable; the provider and tool registry it is handed
//! per turn are borrowed, not owned, so the same `Agent` can be driven serially by an `Agency` or
//! wrapped by an [`IsolatedAgentWorker`](super::worker::IsolatedAgentWorker) without changing a
//! line of this file.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::events::{emit, preview, AgencyEvent, AgentTurnEvent, EventHandler};
use super::handoff::HandoffDescriptor;
use super::provider::{AgentConfig, FinishReason, Message, Provider, ProviderError, Role};
use super::tool_context::TODOS_KEY;
use super::tool_registry::{ToolOutcome, ToolRegistry};

const SKIPPED_ONE_BY_ONE: &str =
    "Tool execution skipped: ONE-BY-ONE enforcement is active. Please complete the current task before starting the next one.";
const SKIPPED_AFTER_HANDOFF: &str =
    "Tool execution skipped: a handoff was requested earlier in this turn.";

/// Callback invoked when `max_turns` is exhausted; returning `true` resets the per-call budget
/// to 30 and continues the same conversation with an empty user input (§4.4).
pub type MaxTurnsCallback = Arc<dyn Fn() -> bool + Send + Sync>;

/// What one `process_with_tools` call produced.
///
/// Replaces reading-and-clearing a registry-side "pending handoff" slot: the descriptor, if any,
/// travels back to the caller directly as part of the return value.
#[derive(Debug, Clone)]
pub enum TurnOutcome {
    Completed(String),
    Handoff { response_text: String, descriptor: HandoffDescriptor },
}

impl TurnOutcome {
    pub fn response_text(&self) -> &str {
        match self {
            TurnOutcome::Completed(s) => s,
            TurnOutcome::Handoff { response_text, .. } => response_text,
        }
    }
}

/// A named conversational unit with private history and model configuration.
///
/// `Clone` is derived so `Agency::get_agent` can hand callers an independent snapshot (history and
/// all) without exposing the live instance a runner is driving.
#[derive(Clone)]
pub struct Agent {
    pub name: String,
    pub role: String,
    pub config: AgentConfig,
    pub system_prompt: String,
    pub history: Vec<Message>,
    provider: Arc<dyn Provider>,
}

impl Agent {
    pub fn new(
        name: impl Into<String>,
        role: impl Into<String>,
        system_prompt: impl Into<String>,
        config: AgentConfig,
        provider: Arc<dyn Provider>,
    ) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
            config,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            provider,
        }
    }

    /// Empties history without touching the system prompt.
    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Plain conversational turn, no tools. Retries the provider call up to `max_retries` times
    /// with `retry_delay` back-off; only this path retries (§4.4, §7).
    pub async fn process(&mut self, user_input: &str) -> String {
        self.history.push(Message::user(user_input));

        let mut last_err: Option<ProviderError> = None;
        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                log::debug!(
                    "agent '{}': retrying provider call (attempt {} of {})",
                    self.name,
                    attempt + 1,
                    self.config.max_retries
                );
                tokio::time::sleep(self.config.retry_delay).await;
            }
            match self
                .provider
                .create_completion(&self.history, &self.system_prompt, &self.config, &[])
                .await
            {
                Ok(resp) => {
                    let content = resp.content.unwrap_or_else(|| "I've completed the task.".to_string());
                    self.history.push(Message::assistant(Some(content.clone()), Vec::new()));
                    return content;
                }
                Err(e) => {
                    log::warn!("agent '{}': provider call failed: {}", self.name, e);
                    last_err = Some(e);
                }
            }
        }

        format!(
            "I apologize, but I encountered an error: {}",
            last_err.map(|e| e.to_string()).unwrap_or_else(|| "unknown provider error".to_string())
        )
    }

    /// The primary entry point: a bounded REQUEST/OBSERVE/GATE/DISPATCH/HANDOFF-CHECK/NEXT loop.
    /// See SPEC_FULL.md §4.4 for the full state table.
    pub fn process_with_tools<'a>(
        &'a mut self,
        user_input: &'a str,
        tool_executor: &'a ToolRegistry,
        event_handler: &'a Option<Arc<dyn EventHandler>>,
        on_max_turns: &'a Option<MaxTurnsCallback>,
    ) -> Pin<Box<dyn Future<Output = TurnOutcome> + Send + 'a>> {
        Box::pin(async move {
            self.process_with_tools_budgeted(user_input, tool_executor, event_handler, on_max_turns, None)
                .await
        })
    }

    fn process_with_tools_budgeted<'a>(
        &'a mut self,
        user_input: &'a str,
        tool_executor: &'a ToolRegistry,
        event_handler: &'a Option<Arc<dyn EventHandler>>,
        on_max_turns: &'a Option<MaxTurnsCallback>,
        max_turns_override: Option<u32>,
    ) -> Pin<Box<dyn Future<Output = TurnOutcome> + Send + 'a>> {
        Box::pin(async move {
            self.history.push(Message::user(user_input));

            let max_turns = max_turns_override.unwrap_or_else(|| self.config.resolved_max_turns());
            let tools = tool_executor.schemas().await;

            for turn in 0..max_turns {
                log::debug!("agent '{}': turn {} of {} (REQUEST)", self.name, turn + 1, max_turns);

                // REQUEST
                let response = match self
                    .provider
                    .create_completion(&self.history, &self.system_prompt, &self.config, &tools)
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        log::warn!("agent '{}': provider error mid-loop: {}", self.name, e);
                        return TurnOutcome::Completed(format!(
                            "I apologize, but I encountered an error: {}",
                            e
                        ));
                    }
                };

                // OBSERVE
                self.history.push(Message::assistant(response.content.clone(), response.tool_calls.clone()));

                match response.finish_reason {
                    FinishReason::Stop => {
                        return TurnOutcome::Completed(
                            response.content.unwrap_or_else(|| "I've completed the task.".to_string()),
                        );
                    }
                    FinishReason::ToolCalls => {
                        // fall through to GATE/DISPATCH below
                    }
                    FinishReason::Length | FinishReason::Error => {
                        return TurnOutcome::Completed(response.content.unwrap_or_else(|| {
                            "The model returned an unexpected or incomplete response.".to_string()
                        }));
                    }
                }

                // GATE
                let todos = tool_executor.context_snapshot().await.get_or(TODOS_KEY, Value::from(Vec::<Value>::new()));
                let has_active_todo = todos
                    .as_array()
                    .map(|arr| {
                        arr.iter().any(|t| {
                            matches!(
                                t.get("status").and_then(Value::as_str),
                                Some("pending") | Some("in_progress")
                            )
                        })
                    })
                    .unwrap_or(false);
                let non_todo_count = response.tool_calls.iter().filter(|tc| tc.name != "todo_write").count();
                let gate_active = has_active_todo && non_todo_count > 1;

                // DISPATCH + HANDOFF-CHECK
                let mut results: Vec<Message> = Vec::new();
                let mut first_non_todo_kept = false;
                let mut handoff: Option<HandoffDescriptor> = None;

                for tc in &response.tool_calls {
                    emit(
                        event_handler,
                        AgencyEvent::Turn(AgentTurnEvent::ToolCall {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            args_preview: preview(&tc.arguments.to_string(), 200),
                        }),
                    )
                    .await;

                    if handoff.is_some() {
                        results.push(Message::tool_result(tc.id.clone(), SKIPPED_AFTER_HANDOFF));
                        continue;
                    }

                    if gate_active && tc.name != "todo_write" {
                        if first_non_todo_kept {
                            results.push(Message::tool_result(tc.id.clone(), SKIPPED_ONE_BY_ONE));
                            continue;
                        }
                        first_non_todo_kept = true;
                    }

                    let outcome = tool_executor.execute(&tc.name, tc.arguments.clone()).await;
                    let text = outcome.as_tool_result_text();

                    emit(
                        event_handler,
                        AgencyEvent::Turn(AgentTurnEvent::ToolResult {
                            id: tc.id.clone(),
                            name: tc.name.clone(),
                            result_preview: preview(&text, 2000),
                            success: !text.starts_with("Error executing tool:"),
                        }),
                    )
                    .await;

                    results.push(Message::tool_result(tc.id.clone(), text.clone()));

                    match outcome {
                        ToolOutcome::Handoff(descriptor) => handoff = Some(descriptor),
                        ToolOutcome::Text(_) if tc.name == "handoff_to_agent" => {
                            // The sentinel only ever returns `Text` when it refused the request
                            // (parallel-branch nesting) or the model omitted every target; either
                            // way that's worth surfacing as a warning, not just a tool result the
                            // model alone sees.
                            emit(event_handler, AgencyEvent::Warning { message: text }).await;
                        }
                        ToolOutcome::Text(_) => {}
                    }
                }

                // NEXT (or HANDOFF-CHECK's early return)
                self.history.extend(results);

                if let Some(descriptor) = handoff {
                    let status = format!("Handing off to {:?}.", descriptor.targets);
                    return TurnOutcome::Handoff { response_text: status, descriptor };
                }
            }

            // Budget exhaustion
            if let Some(cb) = on_max_turns {
                if cb() {
                    log::debug!("agent '{}': max_turns exhausted, continuing with reset budget", self.name);
                    return self
                        .process_with_tools_budgeted(
                            "",
                            tool_executor,
                            event_handler,
                            on_max_turns,
                            Some(30),
                        )
                        .await;
                }
            }

            TurnOutcome::Completed(
                "I've reached the maximum number of processing steps. The task may be too complex \
                 or I may need different tools to complete it."
                    .to_string(),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::provider::ProviderId;
    use crate::cloudllm::agency::tool_registry::{ToolBody, ToolSchema};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex as TokioMutex;

    struct ScriptedProvider {
        responses: StdMutex<Vec<super::super::provider::ProviderResponse>>,
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn create_completion(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            _config: &AgentConfig,
            _tools: &[ToolSchema],
        ) -> Result<super::super::provider::ProviderResponse, ProviderError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Err(ProviderError::Protocol("script exhausted".to_string()));
            }
            Ok(responses.remove(0))
        }

        fn provider_name(&self) -> &str {
            "scripted"
        }
    }

    struct CountingEchoTool {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ToolBody for CountingEchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::function("bash", "stub bash", json!({"type": "object", "properties": {}}))
        }

        async fn execute(
            &self,
            _ctx: Arc<TokioMutex<crate::cloudllm::agency::tool_context::ToolContext>>,
            args: Value,
        ) -> Result<String, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("Exit code: 0\n{}", args.get("command").and_then(Value::as_str).unwrap_or("")))
        }
    }

    fn stop_response(content: &str) -> super::super::provider::ProviderResponse {
        super::super::provider::ProviderResponse {
            content: Some(content.to_string()),
            tool_calls: vec![],
            finish_reason: FinishReason::Stop,
            raw: None,
        }
    }

    fn tool_call_response(calls: Vec<(&str, &str, Value)>) -> super::super::provider::ProviderResponse {
        super::super::provider::ProviderResponse {
            content: None,
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| super::super::provider::ToolCall {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments,
                    thought_signature: None,
                })
                .collect(),
            finish_reason: FinishReason::ToolCalls,
            raw: None,
        }
    }

    #[tokio::test]
    async fn single_tool_call_then_stop_matches_s1() {
        let provider = Arc::new(ScriptedProvider {
            responses: StdMutex::new(vec![
                tool_call_response(vec![("t1", "bash", json!({"command": "echo hi"}))]),
                stop_response("done"),
            ]),
        });
        let mut agent = Agent::new(
            "A",
            "worker",
            "You are A",
            AgentConfig::new("stub-model", ProviderId::Openai),
            provider,
        );
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(CountingEchoTool { calls: AtomicUsize::new(0) })).await.unwrap();

        let outcome = agent.process_with_tools("do it", &registry, &None, &None).await;
        assert_eq!(outcome.response_text(), "done");

        // user, assistant(t1), tool(t1), assistant("done")
        assert_eq!(agent.history.len(), 4);
        assert_eq!(agent.history[0].role, Role::User);
        assert_eq!(agent.history[1].tool_calls[0].id, "t1");
        assert_eq!(agent.history[2].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(agent.history[2].content.as_deref(), Some("Exit code: 0\necho hi"));
        assert_eq!(agent.history[3].content.as_deref(), Some("done"));
    }

    #[tokio::test]
    async fn one_by_one_gate_skips_second_non_todo_call() {
        let provider = Arc::new(ScriptedProvider {
            responses: StdMutex::new(vec![
                tool_call_response(vec![
                    ("t1", "bash", json!({"command": "a"})),
                    ("t2", "bash", json!({"command": "b"})),
                    ("t3", "todo_write", json!({"todos": []})),
                ]),
                stop_response("done"),
            ]),
        });
        let mut agent = Agent::new(
            "A",
            "worker",
            "sys",
            AgentConfig::new("stub-model", ProviderId::Openai),
            provider,
        );
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(CountingEchoTool { calls: AtomicUsize::new(0) })).await.unwrap();
        registry
            .context_set(
                TODOS_KEY,
                json!([{"task": "x", "status": "in_progress", "priority": "high"}]),
            )
            .await;

        let _ = agent.process_with_tools("go", &registry, &None, &None).await;

        let tool_messages: Vec<&Message> = agent.history.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 3);
        assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("t1"));
        assert!(tool_messages[0].content.as_deref().unwrap().starts_with("Exit code"));
        assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("t2"));
        assert_eq!(tool_messages[1].content.as_deref(), Some(SKIPPED_ONE_BY_ONE));
        assert_eq!(tool_messages[2].tool_call_id.as_deref(), Some("t3"));
    }

    #[tokio::test]
    async fn handoff_call_ends_the_turn_and_later_calls_are_skipped() {
        let provider = Arc::new(ScriptedProvider {
            responses: StdMutex::new(vec![tool_call_response(vec![
                ("t1", "handoff_to_agent", json!({"agent_name": "Planner", "message": "plan it"})),
                ("t2", "bash", json!({"command": "should not run"})),
            ])]),
        });
        let mut agent = Agent::new(
            "Coder",
            "worker",
            "sys",
            AgentConfig::new("stub-model", ProviderId::Openai),
            provider,
        );
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(CountingEchoTool { calls: AtomicUsize::new(0) })).await.unwrap();

        let outcome = agent.process_with_tools("go", &registry, &None, &None).await;
        match outcome {
            TurnOutcome::Handoff { descriptor, .. } => {
                assert_eq!(descriptor.targets, vec!["Planner".to_string()]);
            }
            TurnOutcome::Completed(_) => panic!("expected a handoff outcome"),
        }

        let tool_messages: Vec<&Message> = agent.history.iter().filter(|m| m.role == Role::Tool).collect();
        assert_eq!(tool_messages.len(), 2);
        assert_eq!(tool_messages[1].content.as_deref(), Some(SKIPPED_AFTER_HANDOFF));
    }
}
