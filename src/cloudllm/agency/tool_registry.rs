//! Tool registration, schema production, and serialized execution.
//!
//! `ToolRegistry` forks cheaply: `defs`, `mutating_tools`, and `write_lock` are shared `Arc`s
//! across every fork derived from a root, while `context` is deep-copied so branches cannot see
//! each other's reads or writes. This is the crate's realization of the "value semantics with a
//! shared write lock" re-architecture note — the lock lives once, owned by the root Agency, and
//! every fork just holds another handle to it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use super::handoff;
use super::handoff::HandoffDescriptor;
use super::tool_context::ToolContext;

/// Function-tool schema in the provider-neutral form every adapter in [`super::providers`]
/// serializes as-is into its vendor's wire format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    #[serde(rename = "type")]
    pub kind: String,
    pub function: ToolFunctionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolFunctionSchema {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn function(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            kind: "function".to_string(),
            function: ToolFunctionSchema {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

/// Outcome of dispatching one tool call.
///
/// This replaces the source's in-registry "pending handoff" slot: rather than the registry
/// recording state a caller has to remember to read and clear, `execute` returns a tagged value
/// the [`Agent`](super::agent::Agent) matches on directly. Ordinary tools produce `Text`; the
/// `handoff_to_agent` sentinel is the only thing that ever produces `Handoff`.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Text(String),
    Handoff(HandoffDescriptor),
}

impl ToolOutcome {
    /// The string to append as the tool-result message content, regardless of variant — a
    /// handoff still needs a tool-result message in history (see invariant 1).
    pub fn as_tool_result_text(&self) -> String {
        match self {
            ToolOutcome::Text(s) => s.clone(),
            ToolOutcome::Handoff(d) => d.confirmation_text(),
        }
    }
}

/// A registered tool body. `execute` takes a handle to the branch's context so it can read the
/// read-files set or the todos list and mutate either.
#[async_trait]
pub trait ToolBody: Send + Sync {
    fn schema(&self) -> ToolSchema;

    async fn execute(
        &self,
        context: Arc<Mutex<ToolContext>>,
        args: Value,
    ) -> Result<String, String>;
}

/// Dispatcher mapping tool names to bodies, with JSON-schema production and serialized
/// execution of mutating tools.
pub struct ToolRegistry {
    defs: Arc<RwLock<HashMap<String, Arc<dyn ToolBody>>>>,
    context: Arc<Mutex<ToolContext>>,
    write_lock: Arc<RwLock<()>>,
    mutating_tools: Arc<HashSet<String>>,
    name: String,
    is_parallel_branch: bool,
}

impl ToolRegistry {
    /// Build a fresh root registry. `mutating_tools` defaults to `{"edit", "write"}` per §4.2;
    /// pass a wider set if a host registers additional tools that write shared state.
    pub fn new_root(name: impl Into<String>) -> Self {
        let mut mutating = HashSet::new();
        mutating.insert("edit".to_string());
        mutating.insert("write".to_string());
        Self {
            defs: Arc::new(RwLock::new(HashMap::new())),
            context: Arc::new(Mutex::new(ToolContext::new())),
            write_lock: Arc::new(RwLock::new(())),
            mutating_tools: Arc::new(mutating),
            name: name.into(),
            is_parallel_branch: false,
        }
    }

    pub fn with_mutating_tools(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.mutating_tools = Arc::new(names.into_iter().collect());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_parallel_branch(&self) -> bool {
        self.is_parallel_branch
    }

    /// Register a tool. Re-registering the same name with an identical schema is a no-op;
    /// re-registering with a *different* schema is rejected rather than silently replacing the
    /// old definition (§4.2: "duplicate names must not silently overwrite with a different
    /// definition").
    pub async fn register(&self, def: Arc<dyn ToolBody>) -> Result<(), String> {
        let schema = def.schema();
        let mut defs = self.defs.write().await;
        if let Some(existing) = defs.get(&schema.function.name) {
            let existing_schema = serde_json::to_value(existing.schema()).ok();
            let new_schema = serde_json::to_value(&schema).ok();
            if existing_schema != new_schema {
                return Err(format!(
                    "tool '{}' is already registered with a different definition",
                    schema.function.name
                ));
            }
            return Ok(());
        }
        defs.insert(schema.function.name.clone(), def);
        Ok(())
    }

    /// All schemas currently registered, plus the handoff sentinel's fixed schema.
    pub async fn schemas(&self) -> Vec<ToolSchema> {
        let defs = self.defs.read().await;
        let mut out: Vec<ToolSchema> = defs.values().map(|b| b.schema()).collect();
        out.push(handoff::handoff_schema());
        out
    }

    pub async fn get_tool_names(&self) -> Vec<String> {
        self.defs.read().await.keys().cloned().collect()
    }

    /// Dispatch a tool call by name. `handoff_to_agent` is intercepted before any lookup in
    /// `defs`, so nothing can register a tool under that name and shadow the sentinel.
    pub async fn execute(&self, name: &str, args: Value) -> ToolOutcome {
        if name == "handoff_to_agent" {
            return handoff::handoff_to_agent(self.is_parallel_branch, args);
        }

        let body = { self.defs.read().await.get(name).cloned() };
        let Some(body) = body else {
            return ToolOutcome::Text(format!("Error executing tool: unknown tool '{}'", name));
        };

        let result = if self.mutating_tools.contains(name) {
            let _guard = self.write_lock.write().await;
            body.execute(self.context.clone(), args).await
        } else {
            let _guard = self.write_lock.read().await;
            body.execute(self.context.clone(), args).await
        };

        match result {
            Ok(s) => ToolOutcome::Text(s),
            Err(e) => ToolOutcome::Text(format!("Error executing tool: {}", e)),
        }
    }

    /// Derive a branch registry sharing `defs`/`write_lock`/`mutating_tools` but with an
    /// isolated, deep-copied context. `is_parallel_branch` governs whether the handoff sentinel
    /// refuses (see [`handoff::handoff_to_agent`]).
    pub async fn fork(&self, name: impl Into<String>, is_parallel_branch: bool) -> ToolRegistry {
        let cloned_ctx = { self.context.lock().await.clone_for_fork() };
        ToolRegistry {
            defs: self.defs.clone(),
            context: Arc::new(Mutex::new(cloned_ctx)),
            write_lock: self.write_lock.clone(),
            mutating_tools: self.mutating_tools.clone(),
            name: name.into(),
            is_parallel_branch,
        }
    }

    /// Synchronous variant of [`fork`](Self::fork) for use while building an `Agency`, before any
    /// turn has run and the context can't possibly be contended. Used only to hand the thread-pool
    /// backend one independent registry per agent at construction time.
    pub fn fork_uncontended(&self, name: impl Into<String>, is_parallel_branch: bool) -> ToolRegistry {
        let cloned_ctx = self
            .context
            .try_lock()
            .expect("ToolRegistry::fork_uncontended called while the context was locked")
            .clone_for_fork();
        ToolRegistry {
            defs: self.defs.clone(),
            context: Arc::new(Mutex::new(cloned_ctx)),
            write_lock: self.write_lock.clone(),
            mutating_tools: self.mutating_tools.clone(),
            name: name.into(),
            is_parallel_branch,
        }
    }

    /// Read-only snapshot of the branch's context, useful for the Agent's gate logic and for
    /// tests asserting isolation.
    pub async fn context_snapshot(&self) -> ToolContext {
        self.context.lock().await.clone()
    }

    pub async fn context_set(&self, key: impl Into<String>, value: Value) {
        self.context.lock().await.set(key, value);
    }

    pub fn context_handle(&self) -> Arc<Mutex<ToolContext>> {
        self.context.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoTool;

    #[async_trait]
    impl ToolBody for EchoTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::function("echo", "Echoes its input", json!({"type": "object", "properties": {}}))
        }

        async fn execute(&self, _ctx: Arc<Mutex<ToolContext>>, args: Value) -> Result<String, String> {
            Ok(args.to_string())
        }
    }

    struct FailingTool;

    #[async_trait]
    impl ToolBody for FailingTool {
        fn schema(&self) -> ToolSchema {
            ToolSchema::function("boom", "Always fails", json!({"type": "object", "properties": {}}))
        }

        async fn execute(&self, _ctx: Arc<Mutex<ToolContext>>, _args: Value) -> Result<String, String> {
            Err("kaboom".to_string())
        }
    }

    #[tokio::test]
    async fn unknown_tool_produces_error_text_not_panic() {
        let registry = ToolRegistry::new_root("root");
        let outcome = registry.execute("nonexistent", json!({})).await;
        match outcome {
            ToolOutcome::Text(s) => assert!(s.starts_with("Error executing tool:")),
            ToolOutcome::Handoff(_) => panic!("unexpected handoff"),
        }
    }

    #[tokio::test]
    async fn tool_error_is_wrapped_with_prefix() {
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(FailingTool)).await.unwrap();
        let outcome = registry.execute("boom", json!({})).await;
        match outcome {
            ToolOutcome::Text(s) => assert_eq!(s, "Error executing tool: kaboom"),
            ToolOutcome::Handoff(_) => panic!("unexpected handoff"),
        }
    }

    #[tokio::test]
    async fn duplicate_registration_with_same_schema_is_noop() {
        let registry = ToolRegistry::new_root("root");
        registry.register(Arc::new(EchoTool)).await.unwrap();
        registry.register(Arc::new(EchoTool)).await.unwrap();
        assert_eq!(registry.get_tool_names().await.len(), 1);
    }

    #[tokio::test]
    async fn fork_isolates_context_from_parent() {
        let root = ToolRegistry::new_root("root");
        root.context_set("k", json!(1)).await;

        let fork = root.fork("branch-a", true).await;
        fork.context_set("k", json!(2)).await;

        assert_eq!(root.context_snapshot().await.get("k"), Some(&json!(1)));
        assert_eq!(fork.context_snapshot().await.get("k"), Some(&json!(2)));
        assert!(fork.is_parallel_branch());
    }

    #[tokio::test]
    async fn schemas_always_include_handoff_sentinel() {
        let registry = ToolRegistry::new_root("root");
        let schemas = registry.schemas().await;
        assert!(schemas.iter().any(|s| s.function.name == "handoff_to_agent"));
    }
}
