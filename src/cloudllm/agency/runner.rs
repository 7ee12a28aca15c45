//! Pluggable execution backends for one agent turn (§9's re-architecture note).
//!
//! `Agency` is written against `Box<dyn AgentRunner>` and never knows which backend is underneath:
//! [`SerialRunner`] calls `Agent::process_with_tools` directly in-process; [`ThreadPoolRunner`]
//! dispatches through a [`HandoffQueue`] to a pool of [`IsolatedAgentWorker`]s, one per agent,
//! each on its own spawned task. Both satisfy the same trait, so choosing between them is a
//! construction-time decision (`AgencyConfig::use_thread_pool`), not a branch anywhere else.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::agent::{Agent, MaxTurnsCallback, TurnOutcome};
use super::error::AgencyError;
use super::events::EventHandler;
use super::queue::{HandoffQueue, QueueMessage, QueueMessageKind};
use super::tool_registry::ToolRegistry;
use super::worker::IsolatedAgentWorker;

/// One dispatch target: the agent to run and the message it should process.
pub type RunTarget = (String, String);

#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn run_one(&self, agent_name: &str, input: &str, tool_registry: &ToolRegistry) -> Result<TurnOutcome, AgencyError>;

    async fn run_parallel(
        &self,
        targets: &[RunTarget],
        tool_registry: &ToolRegistry,
    ) -> Vec<(String, Result<TurnOutcome, AgencyError>)>;

    fn agent_names(&self) -> Vec<String>;

    /// An independent snapshot of one agent's current state, for `Agency::get_agent`. Only
    /// [`SerialRunner`] can answer this cheaply (its agents sit behind an `Arc<Mutex<Agent>>` this
    /// process can lock); [`ThreadPoolRunner`]'s agents live inside their own worker tasks with no
    /// side channel back out, so it always returns `None`.
    async fn agent_snapshot(&self, _agent_name: &str) -> Option<Agent> {
        None
    }

    /// Clean shutdown hook. A no-op for [`SerialRunner`] (there is nothing to join); overridden by
    /// [`ThreadPoolRunner`] to send every worker a `shutdown` message and join its task.
    async fn shutdown(&self) {}
}

/// Direct in-process execution: one `Arc<Mutex<Agent>>` per name so distinct agents in a parallel
/// fan-out genuinely run concurrently, while repeated access to the same agent still serializes
/// (an agent cannot meaningfully run two turns at once anyway).
pub struct SerialRunner {
    agents: HashMap<String, Arc<Mutex<Agent>>>,
    event_handler: Option<Arc<dyn EventHandler>>,
    on_max_turns: Option<MaxTurnsCallback>,
}

impl SerialRunner {
    pub fn new(
        agents: HashMap<String, Agent>,
        event_handler: Option<Arc<dyn EventHandler>>,
        on_max_turns: Option<MaxTurnsCallback>,
    ) -> Self {
        Self {
            agents: agents.into_iter().map(|(k, v)| (k, Arc::new(Mutex::new(v)))).collect(),
            event_handler,
            on_max_turns,
        }
    }

    fn agent_handle(&self, agent_name: &str) -> Result<Arc<Mutex<Agent>>, AgencyError> {
        self.agents
            .get(agent_name)
            .cloned()
            .ok_or_else(|| AgencyError::InvalidGraph(format!("unknown agent '{}'", agent_name)))
    }
}

#[async_trait]
impl AgentRunner for SerialRunner {
    /// A single-target turn (entry turn or after a serial handoff) shares the Agency's one
    /// `tool_executor` directly — no fork. Only a parallel fan-out isolates context per branch
    /// (see `run_parallel` below); this is the one point where this crate's `ToolRegistry` usage
    /// matches the source's "one `tool_executor` per Agency" data model exactly.
    async fn run_one(&self, agent_name: &str, input: &str, tool_registry: &ToolRegistry) -> Result<TurnOutcome, AgencyError> {
        let handle = self.agent_handle(agent_name)?;
        let mut agent = handle.lock().await;
        Ok(agent
            .process_with_tools(input, tool_registry, &self.event_handler, &self.on_max_turns)
            .await)
    }

    async fn run_parallel(
        &self,
        targets: &[RunTarget],
        tool_registry: &ToolRegistry,
    ) -> Vec<(String, Result<TurnOutcome, AgencyError>)> {
        let futures = targets.iter().map(|(name, input)| async move {
            let result = match self.agent_handle(name) {
                Ok(handle) => {
                    let forked = tool_registry.fork(name, true).await;
                    let mut agent = handle.lock().await;
                    Ok(agent.process_with_tools(input, &forked, &self.event_handler, &self.on_max_turns).await)
                }
                Err(e) => Err(e),
            };
            (name.clone(), result)
        });
        join_all(futures).await
    }

    fn agent_names(&self) -> Vec<String> {
        self.agents.keys().cloned().collect()
    }

    async fn agent_snapshot(&self, agent_name: &str) -> Option<Agent> {
        let handle = self.agents.get(agent_name)?;
        Some(handle.lock().await.clone())
    }
}

/// Queue-and-worker execution: every agent got its own [`IsolatedAgentWorker`] task at
/// construction. A turn becomes a `task` message plus a blocking wait on the response rendezvous,
/// bounded by `response_timeout`.
pub struct ThreadPoolRunner {
    queue: Arc<HandoffQueue>,
    agent_names: Vec<String>,
    response_timeout: Duration,
    worker_handles: Mutex<Vec<tokio::task::JoinHandle<()>>>,
}

impl ThreadPoolRunner {
    /// Registers every agent's mailbox and spawns its worker loop. Async because mailbox
    /// registration goes through the same `HandoffQueue` a running agency already shares.
    pub async fn new(
        agents: HashMap<String, Agent>,
        tool_registry_factory: impl Fn(&str) -> ToolRegistry,
        event_handler: Option<Arc<dyn EventHandler>>,
        on_max_turns: Option<MaxTurnsCallback>,
        response_timeout: Duration,
    ) -> Self {
        let queue = Arc::new(HandoffQueue::new());
        let mut agent_names = Vec::new();
        let mut worker_handles = Vec::new();

        for (name, agent) in agents {
            let rx = queue.register_agent(name.clone()).await;
            agent_names.push(name.clone());
            let registry = tool_registry_factory(&name);
            let worker = IsolatedAgentWorker::new(agent, registry, queue.clone(), rx, event_handler.clone(), on_max_turns.clone());
            worker_handles.push(tokio::spawn(worker.run()));
        }

        Self { queue, agent_names, response_timeout, worker_handles: Mutex::new(worker_handles) }
    }

    async fn dispatch(&self, agent_name: &str, input: &str) -> Result<TurnOutcome, AgencyError> {
        let message_id = Uuid::new_v4().to_string();
        let rx = self.queue.register_response_waiter(&message_id).await;
        self.queue
            .send(QueueMessage {
                id: message_id.clone(),
                from: "Agency".to_string(),
                to: agent_name.to_string(),
                kind: QueueMessageKind::Task { input: input.to_string() },
            })
            .await;

        let response = self
            .queue
            .wait_for_response(agent_name, &message_id, rx, self.response_timeout)
            .await?;

        match response.kind {
            QueueMessageKind::Response { result } => Ok(match result.pending_handoff {
                Some(descriptor) => TurnOutcome::Handoff { response_text: result.response, descriptor },
                None => TurnOutcome::Completed(result.response),
            }),
            _ => Err(AgencyError::InvalidGraph(format!(
                "agent '{}' mailbox produced a non-response message",
                agent_name
            ))),
        }
    }

}

#[async_trait]
impl AgentRunner for ThreadPoolRunner {
    async fn run_one(&self, agent_name: &str, input: &str, _tool_registry: &ToolRegistry) -> Result<TurnOutcome, AgencyError> {
        self.dispatch(agent_name, input).await
    }

    async fn run_parallel(
        &self,
        targets: &[RunTarget],
        _tool_registry: &ToolRegistry,
    ) -> Vec<(String, Result<TurnOutcome, AgencyError>)> {
        let futures = targets.iter().map(|(name, input)| async move {
            (name.clone(), self.dispatch(name, input).await)
        });
        join_all(futures).await
    }

    fn agent_names(&self) -> Vec<String> {
        self.agent_names.clone()
    }

    async fn shutdown(&self) {
        self.queue.shutdown_all().await;
        let handles = std::mem::take(&mut *self.worker_handles.lock().await);
        for handle in handles {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::provider::{AgentConfig, FinishReason, Message, Provider, ProviderError, ProviderId, ProviderResponse};
    use crate::cloudllm::agency::tool_registry::ToolSchema;

    struct StopImmediately(&'static str);

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
                content: Some(self.0.to_string()),
                tool_calls: vec![],
                finish_reason: FinishReason::Stop,
                raw: None,
            })
        }

        fn provider_name(&self) -> &str {
            "stub"
        }
    }

    fn stub_agent(name: &str, reply: &'static str) -> Agent {
        Agent::new(name, "worker", "sys", AgentConfig::new("stub-model", ProviderId::Openai), Arc::new(StopImmediately(reply)))
    }

    #[tokio::test]
    async fn serial_runner_runs_distinct_agents_concurrently() {
        let mut agents = HashMap::new();
        agents.insert("A".to_string(), stub_agent("A", "a done"));
        agents.insert("B".to_string(), stub_agent("B", "b done"));
        let runner = SerialRunner::new(agents, None, None);
        let root = ToolRegistry::new_root("root");

        let results = runner
            .run_parallel(&[("A".to_string(), "go".to_string()), ("B".to_string(), "go".to_string())], &root)
            .await;
        assert_eq!(results.len(), 2);
        for (_, r) in results {
            assert!(r.is_ok());
        }
    }

    #[tokio::test]
    async fn serial_runner_unknown_agent_is_invalid_graph() {
        let runner = SerialRunner::new(HashMap::new(), None, None);
        let root = ToolRegistry::new_root("root");
        let err = runner.run_one("Ghost", "hi", &root).await.unwrap_err();
        matches!(err, AgencyError::InvalidGraph(_));
    }
}
