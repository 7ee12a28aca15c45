//! One isolated worker loop per agent, used only by the thread-pool backend (§4.6, §9).
//!
//! A worker owns its `Agent` and a tool registry forked for it alone. It never talks to another
//! worker directly — every task arrives through its mailbox and every result leaves through the
//! shared [`HandoffQueue`]'s response rendezvous, so two workers processing concurrently can
//! never interleave state beyond what `ToolRegistry`'s shared write lock already serializes.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use super::agent::{Agent, MaxTurnsCallback, TurnOutcome};
use super::events::EventHandler;
use super::queue::{HandoffQueue, QueueMessage, QueueMessageKind, WorkerResult};
use super::tool_registry::ToolRegistry;

pub struct IsolatedAgentWorker {
    agent: Agent,
    tool_registry: ToolRegistry,
    queue: Arc<HandoffQueue>,
    mailbox: mpsc::UnboundedReceiver<QueueMessage>,
    event_handler: Option<Arc<dyn EventHandler>>,
    on_max_turns: Option<MaxTurnsCallback>,
}

impl IsolatedAgentWorker {
    pub fn new(
        agent: Agent,
        tool_registry: ToolRegistry,
        queue: Arc<HandoffQueue>,
        mailbox: mpsc::UnboundedReceiver<QueueMessage>,
        event_handler: Option<Arc<dyn EventHandler>>,
        on_max_turns: Option<MaxTurnsCallback>,
    ) -> Self {
        Self {
            agent,
            tool_registry,
            queue,
            mailbox,
            event_handler,
            on_max_turns,
        }
    }

    /// Run until a `shutdown` message arrives or the mailbox closes. Intended to be spawned as
    /// its own task by whichever `AgentRunner` owns the thread pool.
    pub async fn run(mut self) {
        let name = self.agent.name.clone();
        while let Some(msg) = self.mailbox.recv().await {
            match msg.kind {
                QueueMessageKind::Shutdown => {
                    log::debug!("agency::worker '{}': shutdown received", name);
                    break;
                }
                QueueMessageKind::Response { .. } => {
                    // Workers only ever receive tasks and shutdowns; a response routed here would
                    // be a misrouted message from a bug elsewhere. Drop and keep serving.
                    log::warn!("agency::worker '{}': ignoring unexpected response message", name);
                }
                QueueMessageKind::Task { input } => {
                    let started = Instant::now();
                    let outcome = self
                        .agent
                        .process_with_tools(&input, &self.tool_registry, &self.event_handler, &self.on_max_turns)
                        .await;
                    let elapsed = started.elapsed();

                    let result = match outcome {
                        TurnOutcome::Completed(text) => WorkerResult {
                            response: text,
                            success: true,
                            error: None,
                            processing_time: elapsed,
                            pending_handoff: None,
                            context: None,
                        },
                        TurnOutcome::Handoff { response_text, descriptor } => WorkerResult {
                            response: response_text,
                            success: true,
                            error: None,
                            processing_time: elapsed,
                            pending_handoff: Some(descriptor),
                            context: None,
                        },
                    };

                    self.queue
                        .fulfil_response_waiter(
                            &msg.id,
                            QueueMessage {
                                id: msg.id.clone(),
                                from: name.clone(),
                                to: msg.from.clone(),
                                kind: QueueMessageKind::Response { result },
                            },
                        )
                        .await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::provider::{AgentConfig, FinishReason, Message, Provider, ProviderError, ProviderId, ProviderResponse};
    use crate::cloudllm::agency::tool_registry::ToolSchema;
    use async_trait::async_trait;

    struct StopImmediately;

    #[async_trait]
    impl Provider for StopImmediately {
        async fn create_completion(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            _config: &AgentConfig,
            _tools: &[ToolSchema],
        ) -> Result<ProviderResponse, ProviderError> {
            Ok(ProviderResponse {
                content: Some("all done".to_string()),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                raw: None,
            })
        }

        fn provider_name(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn task_message_yields_a_response_on_the_queue() {
        let queue = Arc::new(HandoffQueue::new());
        let mailbox = queue.register_agent("Coder").await;
        let agent = Agent::new(
            "Coder",
            "worker",
            "sys",
            AgentConfig::new("stub-model", ProviderId::Openai),
            Arc::new(StopImmediately),
        );
        let registry = ToolRegistry::new_root("Coder");

        let worker = IsolatedAgentWorker::new(agent, registry, queue.clone(), mailbox, None, None);
        let handle = tokio::spawn(worker.run());

        let rx = queue.register_response_waiter("task-1").await;
        queue
            .send(QueueMessage {
                id: "task-1".to_string(),
                from: "Agency".to_string(),
                to: "Coder".to_string(),
                kind: QueueMessageKind::Task { input: "go".to_string() },
            })
            .await;

        let response = queue
            .wait_for_response("Coder", "task-1", rx, Duration::from_secs(2))
            .await
            .unwrap();
        match response.kind {
            QueueMessageKind::Response { result } => assert_eq!(result.response, "all done"),
            _ => panic!("expected a response message"),
        }

        queue.shutdown_all().await;
        let _ = handle.await;
    }
}
