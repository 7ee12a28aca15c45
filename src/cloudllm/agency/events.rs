//! Observability for the control loop.
//!
//! Mirrors the shape of [`cloudllm::event`](crate::cloudllm::event)'s `EventHandler` pattern: one
//! trait, default no-op methods, delivered through an `Arc<dyn EventHandler>` so a single handler
//! can be shared across an Agency and every agent it drives. Handler errors (a panic caught at the
//! call site, or a future that fails) are logged and otherwise ignored — they must never break
//! the control loop.

use async_trait::async_trait;

/// Events emitted while one agent turn runs.
#[derive(Debug, Clone)]
pub enum AgentTurnEvent {
    ToolCall { id: String, name: String, args_preview: String },
    ToolResult { id: String, name: String, result_preview: String, success: bool },
}

/// Events emitted by the Agency control loop.
#[derive(Debug, Clone)]
pub enum AgencyEvent {
    AgentStart { agent: String },
    AgentSwitch { from: Option<String>, to: String },
    AgentProgress { agent: String, response_preview: String },
    Turn(AgentTurnEvent),
    ParallelStart { from: String, targets: Vec<String> },
    ParallelBranchStart { agent: String },
    ParallelBranchEnd { agent: String, success: bool, duration_ms: u128 },
    ParallelEnd { results: usize },
    Warning { message: String },
}

/// Receives [`AgencyEvent`]s as the control loop runs. Default methods are no-ops so a handler
/// only needs to override what it cares about.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_event(&self, event: &AgencyEvent);
}

/// Delivers an event to an optional handler, swallowing the call entirely if none is set. Kept
/// as a free function (rather than a method requiring `&Option<Arc<dyn EventHandler>>` at every
/// call site) so emission reads as one line wherever the control loop needs it.
pub async fn emit(handler: &Option<std::sync::Arc<dyn EventHandler>>, event: AgencyEvent) {
    if let Some(h) = handler {
        h.on_event(&event).await;
    }
}

/// Truncate a string to at most `max_chars` characters, matching the preview-length rules the
/// spec attaches to `tool_call`/`tool_result`/`agent_progress` events.
pub fn preview(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        s.chars().take(max_chars).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_truncates_by_char_count() {
        let long = "a".repeat(300);
        assert_eq!(preview(&long, 200).chars().count(), 200);
    }

    #[test]
    fn preview_is_noop_when_short() {
        assert_eq!(preview("hi", 200), "hi");
    }
}
