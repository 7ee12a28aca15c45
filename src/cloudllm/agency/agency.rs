//! The control loop (§4.7): seeds the entry agent, runs turns through whichever
//! [`AgentRunner`](super::runner::AgentRunner) backend was chosen at construction, validates and
//! routes handoffs against the declared graph, and aggregates parallel fan-outs.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

use super::agent::{Agent, MaxTurnsCallback, TurnOutcome};
use super::error::AgencyError;
use super::events::{emit, preview, AgencyEvent, EventHandler};
use super::handoff::{HandoffDescriptor, HandoffMode};
use super::runner::{AgentRunner, SerialRunner, ThreadPoolRunner};
use super::tool_registry::ToolRegistry;

/// Construction-time settings (§3, ambient — no file-format parsing, matching `CloudLLMConfig`'s
/// own minimalism).
#[derive(Debug, Clone)]
pub struct AgencyConfig {
    pub name: String,
    pub max_handoffs: u32,
    /// `None` resolves to 1000 at the Agent level, same sentinel convention as `AgentConfig`.
    pub max_turns: Option<u32>,
    pub thread_response_timeout: Duration,
    pub use_thread_pool: bool,
    pub shared_instructions_path: Option<PathBuf>,
}

impl Default for AgencyConfig {
    fn default() -> Self {
        Self {
            name: "agency".to_string(),
            max_handoffs: 10,
            max_turns: Some(100),
            thread_response_timeout: Duration::from_secs(600),
            use_thread_pool: false,
            shared_instructions_path: None,
        }
    }
}

impl AgencyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn with_max_handoffs(mut self, max_handoffs: u32) -> Self {
        self.max_handoffs = max_handoffs;
        self
    }

    pub fn with_thread_pool(mut self, use_thread_pool: bool) -> Self {
        self.use_thread_pool = use_thread_pool;
        self
    }

    pub fn with_shared_instructions_path(mut self, path: PathBuf) -> Self {
        self.shared_instructions_path = Some(path);
        self
    }
}

/// One agent transition recorded for a single `process` call — single-target or the aggregation
/// step that closes out a parallel fan-out.
#[derive(Debug, Clone)]
pub struct HandoffResult {
    pub from: String,
    pub to: String,
    pub mode: HandoffMode,
    pub success: bool,
    pub error: Option<String>,
    pub elapsed: Duration,
}

/// One branch's outcome inside a parallel fan-out.
#[derive(Debug, Clone)]
pub struct ParallelResult {
    pub agent: String,
    pub response: String,
    pub success: bool,
    pub error: Option<String>,
    pub duration: Duration,
}

/// What `Agency::process` returns.
#[derive(Debug, Clone)]
pub struct AgencyResponse {
    pub response: String,
    pub agents_used: Vec<String>,
    pub handoffs: Vec<HandoffResult>,
    pub total_time: Duration,
    pub final_agent: String,
    pub parallel_results: Option<Vec<ParallelResult>>,
}

/// A named collection of agents, a directed handoff graph, and the control loop that drives both.
pub struct Agency {
    config: AgencyConfig,
    entry_agent: String,
    agent_names: HashSet<String>,
    flows: HashMap<String, HashSet<String>>,
    shared_context: Option<String>,
    shared_state: Mutex<HashMap<String, Value>>,
    runner: Box<dyn AgentRunner>,
    tool_registry: ToolRegistry,
    event_handler: Option<Arc<dyn EventHandler>>,
    handoff_history: Mutex<Vec<HandoffResult>>,
}

impl Agency {
    /// Validates the handoff graph, optionally loads `shared_instructions_path` into
    /// `shared_context`, and — in thread-pool mode — spins up one [`IsolatedAgentWorker`]
    /// (via [`ThreadPoolRunner`]) per agent. Async because only that last step needs to be.
    ///
    /// [`IsolatedAgentWorker`]: super::worker::IsolatedAgentWorker
    pub async fn new(
        config: AgencyConfig,
        entry_agent: impl Into<String>,
        agents: Vec<Agent>,
        flows: Vec<(String, String)>,
        tool_registry: ToolRegistry,
        event_handler: Option<Arc<dyn EventHandler>>,
        on_max_turns: Option<MaxTurnsCallback>,
    ) -> Result<Self, AgencyError> {
        let entry_agent = entry_agent.into();
        let agent_names: HashSet<String> = agents.iter().map(|a| a.name.clone()).collect();

        if !agent_names.contains(&entry_agent) {
            return Err(AgencyError::InvalidGraph(format!(
                "entry agent '{}' is not in the agent set",
                entry_agent
            )));
        }

        let mut flow_map: HashMap<String, HashSet<String>> = HashMap::new();
        for (src, tgt) in flows {
            if !agent_names.contains(&src) {
                return Err(AgencyError::InvalidGraph(format!(
                    "handoff flow names unknown source agent '{}'",
                    src
                )));
            }
            if !agent_names.contains(&tgt) {
                return Err(AgencyError::InvalidGraph(format!(
                    "handoff flow names unknown target agent '{}'",
                    tgt
                )));
            }
            flow_map.entry(src).or_default().insert(tgt);
        }

        let shared_context = match &config.shared_instructions_path {
            Some(path) if path.exists() => tokio::fs::read_to_string(path).await.ok(),
            _ => None,
        };

        let agents_map: HashMap<String, Agent> = agents.into_iter().map(|a| (a.name.clone(), a)).collect();

        let runner: Box<dyn AgentRunner> = if config.use_thread_pool {
            Box::new(
                ThreadPoolRunner::new(
                    agents_map,
                    |name| tool_registry.fork_uncontended(name, false),
                    event_handler.clone(),
                    on_max_turns.clone(),
                    config.thread_response_timeout,
                )
                .await,
            )
        } else {
            Box::new(SerialRunner::new(agents_map, event_handler.clone(), on_max_turns.clone()))
        };

        Ok(Self {
            config,
            entry_agent,
            agent_names,
            flows: flow_map,
            shared_context,
            shared_state: Mutex::new(HashMap::new()),
            runner,
            tool_registry,
            event_handler,
            handoff_history: Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn can_handoff(&self, from: &str, to: &str) -> bool {
        self.flows.get(from).map(|targets| targets.contains(to)).unwrap_or(false)
    }

    pub fn get_allowed_handoffs(&self, agent_name: &str) -> Vec<String> {
        self.flows.get(agent_name).map(|s| s.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn list_agents(&self) -> Vec<String> {
        self.runner.agent_names()
    }

    pub async fn get_agent(&self, name: &str) -> Option<Agent> {
        self.runner.agent_snapshot(name).await
    }

    pub async fn shared_state_get(&self, key: &str) -> Option<Value> {
        self.shared_state.lock().await.get(key).cloned()
    }

    pub async fn shared_state_set(&self, key: impl Into<String>, value: Value) {
        self.shared_state.lock().await.insert(key.into(), value);
    }

    pub async fn shared_state_clear(&self) {
        self.shared_state.lock().await.clear();
    }

    pub async fn shutdown(&self) {
        self.runner.shutdown().await;
    }

    /// `"[Shared Context]\n{shared}\n\n"` prefix (if set) wrapping `"[Handoff from {from}]\n\n
    /// {message}"` plus an optional `"[Additional Context]\n{context}"` suffix (§4.7.c.iii).
    fn build_handoff_message(&self, from: &str, descriptor: &HandoffDescriptor) -> String {
        let mut message = format!("[Handoff from {}]\n\n{}", from, descriptor.message);
        if let Some(context) = &descriptor.context {
            if !context.is_empty() {
                message.push_str(&format!("\n\n[Additional Context]\n{}", context));
            }
        }
        if let Some(shared) = &self.shared_context {
            if !shared.is_empty() {
                message = format!("[Shared Context]\n{}\n\n{}", shared, message);
            }
        }
        message
    }

    fn build_aggregation_prompt(&self, original_request: &str, handoff_message: &str, branches: &[ParallelResult]) -> String {
        let mut prompt = format!(
            "You requested parallel help with: {}\n\nOriginal request: {}\n\n",
            handoff_message, original_request
        );
        for branch in branches {
            if branch.success {
                prompt.push_str(&format!("--- {} ---\n{}\n\n", branch.agent, branch.response));
            } else {
                prompt.push_str(&format!(
                    "--- {} (failed: {}) ---\n\n",
                    branch.agent,
                    branch.error.as_deref().unwrap_or("unknown error")
                ));
            }
        }
        prompt.push_str("Synthesize these results into one coherent response and continue the task.");
        prompt
    }

    /// The primary entry point (§4.7's algorithm). Reset-then-run: `handoff_history` is cleared at
    /// the start of every call, matching the data model's invariant that history only lives for
    /// one `process` invocation.
    pub async fn process(&self, user_input: &str) -> Result<AgencyResponse, AgencyError> {
        self.handoff_history.lock().await.clear();
        let started = Instant::now();

        let seeded = match &self.shared_context {
            Some(ctx) if !ctx.is_empty() => format!("{}\n\n{}", ctx, user_input),
            _ => user_input.to_string(),
        };

        let mut current_agent = self.entry_agent.clone();
        let mut current_message = seeded;
        let mut handoff_count = 0u32;
        let mut agents_used = vec![self.entry_agent.clone()];
        let mut parallel_results: Option<Vec<ParallelResult>> = None;

        emit(&self.event_handler, AgencyEvent::AgentStart { agent: current_agent.clone() }).await;
        emit(&self.event_handler, AgencyEvent::AgentSwitch { from: None, to: current_agent.clone() }).await;

        let final_response = loop {
            let outcome = self.runner.run_one(&current_agent, &current_message, &self.tool_registry).await?;
            emit(
                &self.event_handler,
                AgencyEvent::AgentProgress {
                    agent: current_agent.clone(),
                    response_preview: preview(outcome.response_text(), 200),
                },
            )
            .await;

            let (response_text, descriptor) = match outcome {
                TurnOutcome::Completed(text) => break text,
                TurnOutcome::Handoff { response_text, descriptor } => (response_text, descriptor),
            };

            if handoff_count >= self.config.max_handoffs {
                break response_text;
            }

            match descriptor.mode {
                HandoffMode::Parallel => {
                    let allowed = self.flows.get(&current_agent).cloned().unwrap_or_default();
                    let mut valid_targets = Vec::new();
                    for target in &descriptor.targets {
                        if allowed.contains(target) && self.agent_names.contains(target) {
                            valid_targets.push(target.clone());
                        } else {
                            emit(
                                &self.event_handler,
                                AgencyEvent::Warning {
                                    message: format!(
                                        "parallel handoff from '{}' to '{}' is not an allowed edge; dropped",
                                        current_agent, target
                                    ),
                                },
                            )
                            .await;
                        }
                    }
                    if valid_targets.is_empty() {
                        break response_text;
                    }

                    emit(
                        &self.event_handler,
                        AgencyEvent::ParallelStart { from: current_agent.clone(), targets: valid_targets.clone() },
                    )
                    .await;

                    let branch_message = self.build_handoff_message(&current_agent, &descriptor);
                    let run_targets: Vec<(String, String)> =
                        valid_targets.iter().map(|name| (name.clone(), branch_message.clone())).collect();

                    for name in &valid_targets {
                        emit(&self.event_handler, AgencyEvent::ParallelBranchStart { agent: name.clone() }).await;
                    }

                    let branch_started = Instant::now();
                    let raw_results = self.runner.run_parallel(&run_targets, &self.tool_registry).await;

                    let mut branches = Vec::with_capacity(raw_results.len());
                    for (name, result) in raw_results {
                        let duration = branch_started.elapsed();
                        match result {
                            Ok(TurnOutcome::Completed(text)) => {
                                emit(
                                    &self.event_handler,
                                    AgencyEvent::ParallelBranchEnd { agent: name.clone(), success: true, duration_ms: duration.as_millis() },
                                )
                                .await;
                                branches.push(ParallelResult { agent: name, response: text, success: true, error: None, duration });
                            }
                            Ok(TurnOutcome::Handoff { response_text, .. }) => {
                                // A parallel-branch registry always has `is_parallel_branch=true`,
                                // so the sentinel itself refuses and never produces `Handoff` for
                                // branches run through `SerialRunner`. A thread-pool worker has no
                                // such flag (its registry is a plain per-agent fork), so this arm
                                // is what actually discards a nested handoff in that backend.
                                emit(
                                    &self.event_handler,
                                    AgencyEvent::Warning {
                                        message: format!(
                                            "agent '{}' attempted a nested handoff inside a parallel branch; discarded",
                                            name
                                        ),
                                    },
                                )
                                .await;
                                emit(
                                    &self.event_handler,
                                    AgencyEvent::ParallelBranchEnd { agent: name.clone(), success: true, duration_ms: duration.as_millis() },
                                )
                                .await;
                                branches.push(ParallelResult {
                                    agent: name,
                                    response: response_text,
                                    success: true,
                                    error: None,
                                    duration,
                                });
                            }
                            Err(e) => {
                                emit(
                                    &self.event_handler,
                                    AgencyEvent::ParallelBranchEnd { agent: name.clone(), success: false, duration_ms: duration.as_millis() },
                                )
                                .await;
                                branches.push(ParallelResult {
                                    agent: name,
                                    response: String::new(),
                                    success: false,
                                    error: Some(e.to_string()),
                                    duration,
                                });
                            }
                        }
                    }

                    emit(&self.event_handler, AgencyEvent::ParallelEnd { results: branches.len() }).await;

                    let aggregator = if self.can_handoff(&current_agent, &descriptor.aggregation_target)
                        || descriptor.aggregation_target == current_agent
                    {
                        descriptor.aggregation_target.clone()
                    } else {
                        emit(
                            &self.event_handler,
                            AgencyEvent::Warning {
                                message: format!(
                                    "aggregation target '{}' is not reachable from '{}'; falling back to '{}'",
                                    descriptor.aggregation_target, current_agent, current_agent
                                ),
                            },
                        )
                        .await;
                        current_agent.clone()
                    };

                    let aggregation_prompt = self.build_aggregation_prompt(user_input, &descriptor.message, &branches);

                    self.handoff_history.lock().await.push(HandoffResult {
                        from: current_agent.clone(),
                        to: aggregator.clone(),
                        mode: HandoffMode::Parallel,
                        success: true,
                        error: None,
                        elapsed: branch_started.elapsed(),
                    });

                    parallel_results = Some(branches);
                    let previous_agent = current_agent.clone();
                    current_agent = aggregator.clone();
                    current_message = aggregation_prompt;
                    agents_used.push(aggregator.clone());
                    handoff_count += 1;

                    emit(&self.event_handler, AgencyEvent::AgentSwitch { from: Some(previous_agent), to: aggregator }).await;
                }
                HandoffMode::Single => {
                    let target = descriptor.targets.first().cloned().unwrap_or_default();
                    if !self.can_handoff(&current_agent, &target) || !self.agent_names.contains(&target) {
                        emit(
                            &self.event_handler,
                            AgencyEvent::Warning {
                                message: format!(
                                    "handoff from '{}' to '{}' is not an allowed edge",
                                    current_agent, target
                                ),
                            },
                        )
                        .await;
                        break response_text;
                    }

                    let branch_message = self.build_handoff_message(&current_agent, &descriptor);

                    self.handoff_history.lock().await.push(HandoffResult {
                        from: current_agent.clone(),
                        to: target.clone(),
                        mode: HandoffMode::Single,
                        success: true,
                        error: None,
                        elapsed: Duration::from_secs(0),
                    });

                    let previous_agent = current_agent.clone();
                    current_agent = target.clone();
                    current_message = branch_message;
                    agents_used.push(target.clone());
                    handoff_count += 1;

                    emit(&self.event_handler, AgencyEvent::AgentSwitch { from: Some(previous_agent), to: target }).await;
                }
            }
        };

        Ok(AgencyResponse {
            response: final_response,
            agents_used,
            handoffs: self.handoff_history.lock().await.clone(),
            total_time: started.elapsed(),
            final_agent: current_agent,
            parallel_results,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::provider::{AgentConfig, FinishReason, Message, Provider, ProviderError, ProviderId, ProviderResponse, ToolCall};
    use crate::cloudllm::agency::tool_registry::ToolSchema;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    struct ScriptedProvider {
        responses: StdMutex<Vec<ProviderResponse>>,
    }

    impl ScriptedProvider {
        fn new(responses: Vec<ProviderResponse>) -> Arc<Self> {
            Arc::new(Self { responses: StdMutex::new(responses) })
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        async fn create_completion(
            &self,
            _messages: &[Message],
            _system_prompt: &str,
            _config: &AgentConfig,
            _tools: &[ToolSchema],
        ) -> Result<ProviderResponse, ProviderError> {
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

    fn stop(content: &str) -> ProviderResponse {
        ProviderResponse { content: Some(content.to_string()), tool_calls: vec![], finish_reason: FinishReason::Stop, raw: None }
    }

    fn tool_calls(calls: Vec<(&str, &str, Value)>) -> ProviderResponse {
        ProviderResponse {
            content: None,
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCall { id: id.to_string(), name: name.to_string(), arguments, thought_signature: None })
                .collect(),
            finish_reason: FinishReason::ToolCalls,
            raw: None,
        }
    }

    fn agent(name: &str, provider: Arc<dyn Provider>) -> Agent {
        Agent::new(name, "worker", format!("You are {}", name), AgentConfig::new("stub-model", ProviderId::Openai), provider)
    }

    struct EchoBash;

    #[async_trait]
    impl super::super::tool_registry::ToolBody for EchoBash {
        fn schema(&self) -> ToolSchema {
            ToolSchema::function("bash", "stub bash", json!({"type": "object", "properties": {}}))
        }

        async fn execute(
            &self,
            _ctx: Arc<Mutex<super::super::tool_context::ToolContext>>,
            args: Value,
        ) -> Result<String, String> {
            Ok(format!("Exit code: 0\n{}", args.get("command").and_then(Value::as_str).unwrap_or("")))
        }
    }

    async fn registry_with_bash() -> ToolRegistry {
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(EchoBash)).await.unwrap();
        registry
    }

    #[tokio::test]
    async fn s1_single_agent_single_tool() {
        let provider = ScriptedProvider::new(vec![
            tool_calls(vec![("t1", "bash", json!({"command": "echo hi"}))]),
            stop("done"),
        ]);
        let agents = vec![agent("A", provider)];
        let agency = Agency::new(
            AgencyConfig::new("s1"),
            "A",
            agents,
            vec![],
            registry_with_bash().await,
            None,
            None,
        )
        .await
        .unwrap();

        let response = agency.process("do it").await.unwrap();
        assert_eq!(response.response, "done");
        assert_eq!(response.agents_used, vec!["A".to_string()]);
        assert!(response.handoffs.is_empty());
    }

    #[tokio::test]
    async fn s2_serial_handoff() {
        let coder = ScriptedProvider::new(vec![tool_calls(vec![(
            "t1",
            "handoff_to_agent",
            json!({"agent_name": "Planner", "message": "plan it"}),
        )])]);
        let planner = ScriptedProvider::new(vec![stop("plan.md written")]);

        let agents = vec![agent("Coder", coder), agent("Planner", planner)];
        let flows = vec![("Coder".to_string(), "Planner".to_string()), ("Planner".to_string(), "Coder".to_string())];
        let agency = Agency::new(AgencyConfig::new("s2"), "Coder", agents, flows, ToolRegistry::new_root("root"), None, None)
            .await
            .unwrap();

        let response = agency.process("go").await.unwrap();
        assert_eq!(response.agents_used, vec!["Coder".to_string(), "Planner".to_string()]);
        assert_eq!(response.handoffs.len(), 1);
        assert_eq!(response.handoffs[0].from, "Coder");
        assert_eq!(response.handoffs[0].to, "Planner");
        assert!(response.handoffs[0].success);
        assert_eq!(response.response, "plan.md written");
    }

    #[tokio::test]
    async fn s3_unauthorized_handoff_terminates_cleanly() {
        let coder = ScriptedProvider::new(vec![tool_calls(vec![(
            "t1",
            "handoff_to_agent",
            json!({"agent_name": "Planner", "message": "plan it"}),
        )])]);
        let planner = ScriptedProvider::new(vec![tool_calls(vec![(
            "t2",
            "handoff_to_agent",
            json!({"agent_name": "Coder", "message": "back to you"}),
        )])]);

        let agents = vec![agent("Coder", coder), agent("Planner", planner)];
        // Only Coder -> Planner is declared; Planner -> Coder is not.
        let flows = vec![("Coder".to_string(), "Planner".to_string())];

        struct CapturingHandler {
            warnings: StdMutex<Vec<String>>,
        }
        #[async_trait]
        impl EventHandler for CapturingHandler {
            async fn on_event(&self, event: &AgencyEvent) {
                if let AgencyEvent::Warning { message } = event {
                    self.warnings.lock().unwrap().push(message.clone());
                }
            }
        }
        let handler = Arc::new(CapturingHandler { warnings: StdMutex::new(Vec::new()) });

        let agency = Agency::new(
            AgencyConfig::new("s3"),
            "Coder",
            agents,
            flows,
            ToolRegistry::new_root("root"),
            Some(handler.clone() as Arc<dyn EventHandler>),
            None,
        )
        .await
        .unwrap();

        let response = agency.process("go").await.unwrap();
        assert_eq!(response.final_agent, "Planner");
        assert!(handler.warnings.lock().unwrap().iter().any(|w| w.contains("not an allowed edge")));
    }

    #[tokio::test]
    async fn s4_parallel_fanout_with_aggregation() {
        let coder = ScriptedProvider::new(vec![
            tool_calls(vec![(
                "t1",
                "handoff_to_agent",
                json!({"agent_names": ["Planner", "Critic"], "message": "review", "aggregation_target": "Coder"}),
            )]),
            stop("merged"),
        ]);
        let planner = ScriptedProvider::new(vec![stop("P-ok")]);
        let critic = ScriptedProvider::new(vec![stop("C-ok")]);

        let agents = vec![agent("Coder", coder), agent("Planner", planner), agent("Critic", critic)];
        let flows = vec![
            ("Coder".to_string(), "Planner".to_string()),
            ("Coder".to_string(), "Critic".to_string()),
            ("Planner".to_string(), "Coder".to_string()),
            ("Critic".to_string(), "Coder".to_string()),
        ];

        let agency = Agency::new(AgencyConfig::new("s4"), "Coder", agents, flows, ToolRegistry::new_root("root"), None, None)
            .await
            .unwrap();

        let response = agency.process("review this").await.unwrap();
        assert_eq!(response.response, "merged");
        assert_eq!(response.agents_used, vec!["Coder".to_string(), "Coder".to_string()]);
        let branches = response.parallel_results.unwrap();
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|b| b.success));
        let agent_names: HashSet<String> = branches.iter().map(|b| b.agent.clone()).collect();
        assert!(agent_names.contains("Planner"));
        assert!(agent_names.contains("Critic"));
    }

    #[tokio::test]
    async fn s6_nested_handoff_in_branch_is_refused_and_aggregation_still_runs() {
        let coder = ScriptedProvider::new(vec![
            tool_calls(vec![(
                "t1",
                "handoff_to_agent",
                json!({"agent_names": ["Planner", "Critic"], "message": "review", "aggregation_target": "Coder"}),
            )]),
            stop("merged"),
        ]);
        // Planner's branch (forked as a parallel branch) tries to hand off again; the sentinel
        // must refuse, so Planner's turn continues to a normal stop.
        let planner = ScriptedProvider::new(vec![
            tool_calls(vec![("t2", "handoff_to_agent", json!({"agent_name": "Coder", "message": "nested"}))]),
            stop("P-ok-after-refusal"),
        ]);
        let critic = ScriptedProvider::new(vec![stop("C-ok")]);

        let agents = vec![agent("Coder", coder), agent("Planner", planner), agent("Critic", critic)];
        let flows = vec![
            ("Coder".to_string(), "Planner".to_string()),
            ("Coder".to_string(), "Critic".to_string()),
            ("Planner".to_string(), "Coder".to_string()),
            ("Critic".to_string(), "Coder".to_string()),
        ];

        struct CapturingHandler {
            warnings: StdMutex<Vec<String>>,
        }
        #[async_trait]
        impl EventHandler for CapturingHandler {
            async fn on_event(&self, event: &AgencyEvent) {
                if let AgencyEvent::Warning { message } = event {
                    self.warnings.lock().unwrap().push(message.clone());
                }
            }
        }
        let handler = Arc::new(CapturingHandler { warnings: StdMutex::new(Vec::new()) });

        let agency = Agency::new(
            AgencyConfig::new("s6"),
            "Coder",
            agents,
            flows,
            ToolRegistry::new_root("root"),
            Some(handler.clone() as Arc<dyn EventHandler>),
            None,
        )
        .await
        .unwrap();

        let response = agency.process("review this").await.unwrap();
        assert_eq!(response.response, "merged");
        let branches = response.parallel_results.unwrap();
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|b| b.success));
        assert!(handler.warnings.lock().unwrap().iter().any(|w| w.contains("refused")));
    }

    #[tokio::test]
    async fn query_operations_reflect_the_declared_graph() {
        let coder = ScriptedProvider::new(vec![stop("done")]);
        let planner = ScriptedProvider::new(vec![stop("done")]);
        let agents = vec![agent("Coder", coder), agent("Planner", planner)];
        let flows = vec![("Coder".to_string(), "Planner".to_string())];
        let agency = Agency::new(AgencyConfig::new("query"), "Coder", agents, flows, ToolRegistry::new_root("root"), None, None)
            .await
            .unwrap();

        assert!(agency.can_handoff("Coder", "Planner"));
        assert!(!agency.can_handoff("Planner", "Coder"));
        assert_eq!(agency.get_allowed_handoffs("Coder"), vec!["Planner".to_string()]);
        let mut names = agency.list_agents();
        names.sort();
        assert_eq!(names, vec!["Coder".to_string(), "Planner".to_string()]);

        agency.shared_state_set("key", json!(42)).await;
        assert_eq!(agency.shared_state_get("key").await, Some(json!(42)));
        agency.shared_state_clear().await;
        assert_eq!(agency.shared_state_get("key").await, None);
    }

    #[tokio::test]
    async fn invalid_graph_is_rejected_at_construction() {
        let coder = ScriptedProvider::new(vec![stop("done")]);
        let agents = vec![agent("Coder", coder)];
        let flows = vec![("Coder".to_string(), "Ghost".to_string())];
        let err = Agency::new(AgencyConfig::new("bad"), "Coder", agents, flows, ToolRegistry::new_root("root"), None, None)
            .await
            .unwrap_err();
        matches!(err, AgencyError::InvalidGraph(_));
    }
}
