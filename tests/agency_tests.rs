//! End-to-end scenarios S1-S6 for the multi-agent orchestrator, run against the public API
//! rather than the crate-internal unit tests already covering the same ground module-by-module.

use async_trait::async_trait;
use cloudllm::agency::{
    Agency, AgencyConfig, AgencyEvent, AgentConfig, EventHandler, FinishReason, Message, Provider,
    ProviderError, ProviderId, ProviderResponse, Role, ToolCall, ToolRegistry,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex as StdMutex};

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
        _tools: &[cloudllm::agency::ToolSchema],
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

fn agent(name: &str, provider: Arc<dyn Provider>) -> cloudllm::agency::Agent {
    cloudllm::agency::Agent::new(name, "worker", format!("You are {}", name), AgentConfig::new("stub-model", ProviderId::Openai), provider)
}

struct StubBash;

#[async_trait]
impl cloudllm::agency::ToolBody for StubBash {
    fn schema(&self) -> cloudllm::agency::ToolSchema {
        cloudllm::agency::ToolSchema::function("bash", "stub bash", json!({"type": "object", "properties": {}}))
    }

    async fn execute(
        &self,
        _ctx: Arc<tokio::sync::Mutex<cloudllm::agency::ToolContext>>,
        args: Value,
    ) -> Result<String, String> {
        let command = args.get("command").and_then(Value::as_str).unwrap_or_default();
        match command {
            "echo hi" => Ok("Exit code: 0\nhi".to_string()),
            other => Ok(format!("Exit code: 0\n{}", other)),
        }
    }
}

async fn registry_with_bash() -> ToolRegistry {
    let registry = ToolRegistry::new_root("root");
    registry.register(Arc::new(StubBash)).await.unwrap();
    registry
}

#[derive(Default)]
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

/// S1 - Single agent, single tool.
#[tokio::test]
async fn s1_single_agent_single_tool() {
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![("t1", "bash", json!({"command": "echo hi"}))]),
        stop("done"),
    ]);
    let agents = vec![agent("A", provider)];
    let agency = Agency::new(AgencyConfig::new("s1"), "A", agents, vec![], registry_with_bash().await, None, None)
        .await
        .unwrap();

    let response = agency.process("do it").await.unwrap();
    assert_eq!(response.response, "done");
    assert_eq!(response.agents_used, vec!["A".to_string()]);

    let snapshot = agency.get_agent("A").await.unwrap();
    assert_eq!(snapshot.history.len(), 4);
    assert_eq!(snapshot.history[0].role, Role::User);
    assert_eq!(snapshot.history[1].tool_calls[0].id, "t1");
    assert_eq!(snapshot.history[2].tool_call_id.as_deref(), Some("t1"));
    assert_eq!(snapshot.history[2].content.as_deref(), Some("Exit code: 0\nhi"));
    assert_eq!(snapshot.history[3].content.as_deref(), Some("done"));
}

/// S2 - Serial handoff.
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

/// S3 - Unauthorized handoff.
#[tokio::test]
async fn s3_unauthorized_handoff() {
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
    let flows = vec![("Coder".to_string(), "Planner".to_string())];

    let handler = Arc::new(CapturingHandler::default());
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
    assert_eq!(response.response, "Handing off to [\"Coder\"].");
    assert!(handler.warnings.lock().unwrap().iter().any(|w| w.contains("not an allowed edge")));
}

/// S4 - Parallel fan-out with aggregation.
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

    let branches = response.parallel_results.expect("expected parallel results");
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|b| b.success));
    let responses: Vec<&str> = branches.iter().map(|b| b.response.as_str()).collect();
    assert!(responses.contains(&"P-ok"));
    assert!(responses.contains(&"C-ok"));
}

/// S5 - One-by-one gate.
#[tokio::test]
async fn s5_one_by_one_gate() {
    let provider = ScriptedProvider::new(vec![
        tool_calls(vec![
            ("t1", "bash", json!({"command": "a"})),
            ("t2", "bash", json!({"command": "b"})),
            ("t3", "todo_write", json!({"todos": [{"task": "x", "status": "in_progress", "priority": "high"}]})),
        ]),
        stop("done"),
    ]);
    let agents = vec![agent("A", provider)];
    let registry = registry_with_bash().await;
    registry
        .context_set(
            "todos",
            json!([{"task": "x", "status": "in_progress", "priority": "high"}]),
        )
        .await;

    let agency = Agency::new(AgencyConfig::new("s5"), "A", agents, vec![], registry, None, None).await.unwrap();
    agency.process("go").await.unwrap();

    let snapshot = agency.get_agent("A").await.unwrap();
    let tool_messages: Vec<&Message> = snapshot.history.iter().filter(|m| m.role == Role::Tool).collect();
    assert_eq!(tool_messages.len(), 3);
    assert_eq!(tool_messages[0].tool_call_id.as_deref(), Some("t1"));
    assert!(tool_messages[0].content.as_deref().unwrap().starts_with("Exit code"));
    assert_eq!(tool_messages[1].tool_call_id.as_deref(), Some("t2"));
    assert!(tool_messages[1].content.as_deref().unwrap().contains("ONE-BY-ONE"));
    assert_eq!(tool_messages[2].tool_call_id.as_deref(), Some("t3"));
}

/// S6 - Nested handoff refused in a parallel branch; aggregation still runs.
#[tokio::test]
async fn s6_nested_handoff_refused_in_branch() {
    let coder = ScriptedProvider::new(vec![
        tool_calls(vec![(
            "t1",
            "handoff_to_agent",
            json!({"agent_names": ["Planner", "Critic"], "message": "review", "aggregation_target": "Coder"}),
        )]),
        stop("merged"),
    ]);
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

    let handler = Arc::new(CapturingHandler::default());
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

    let branches = response.parallel_results.expect("expected parallel results");
    assert_eq!(branches.len(), 2);
    assert!(branches.iter().all(|b| b.success));
    let planner_branch = branches.iter().find(|b| b.agent == "Planner").unwrap();
    assert_eq!(planner_branch.response, "P-ok-after-refusal");

    assert!(handler.warnings.lock().unwrap().iter().any(|w| w.contains("refused")));
}

/// Query operations reflect the declared handoff graph (§4.7).
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
}

/// An invalid handoff graph (edge naming an unknown agent) is rejected at construction, never at
/// process-time.
#[tokio::test]
async fn invalid_graph_is_rejected_at_construction() {
    let coder = ScriptedProvider::new(vec![stop("done")]);
    let agents = vec![agent("Coder", coder)];
    let flows = vec![("Coder".to_string(), "Ghost".to_string())];
    let err = Agency::new(AgencyConfig::new("bad"), "Coder", agents, flows, ToolRegistry::new_root("root"), None, None)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("invalid handoff graph"));
}
