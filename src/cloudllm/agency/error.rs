//! Error types for the agency module, in the same plain-enum-plus-`Display` idiom the crate's
//! other error types (`BashError`, `FileSystemError`, `CalculatorError`) already use — no
//! `thiserror`/`anyhow` dependency here, matching the rest of the tree.

use std::fmt;

#[derive(Debug, Clone)]
pub enum AgencyError {
    /// A handoff graph edge, an aggregation target, or a starting agent named something that
    /// isn't a registered agent.
    InvalidGraph(String),
    /// `AgentConfig::provider` named a provider with no adapter registered for it.
    UnknownProvider(String),
    /// The thread-pool backend's response rendezvous for `agent`/`message_id` never completed
    /// within `thread_response_timeout`.
    QueueTimeout { agent: String, message_id: String },
}

impl fmt::Display for AgencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgencyError::InvalidGraph(msg) => write!(f, "invalid handoff graph: {}", msg),
            AgencyError::UnknownProvider(name) => write!(f, "no provider adapter registered for '{}'", name),
            AgencyError::QueueTimeout { agent, message_id } => write!(
                f,
                "timed out waiting for a response from '{}' to message '{}'",
                agent, message_id
            ),
        }
    }
}

impl std::error::Error for AgencyError {}

impl From<super::queue::QueueTimeoutError> for AgencyError {
    fn from(e: super::queue::QueueTimeoutError) -> Self {
        AgencyError::QueueTimeout { agent: e.agent, message_id: e.message_id }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_timeout_displays_agent_and_message_id() {
        let err = AgencyError::QueueTimeout { agent: "Coder".to_string(), message_id: "m1".to_string() };
        let rendered = err.to_string();
        assert!(rendered.contains("Coder"));
        assert!(rendered.contains("m1"));
    }
}
