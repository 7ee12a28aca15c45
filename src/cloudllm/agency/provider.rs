//! The normalized request/response contract every LLM provider adapter speaks.
//!
//! Nothing in this module knows about HTTP, SSE, or any vendor's wire format — that lives in
//! [`super::providers`]. This module is the neutral shape the [`Agent`](super::agent::Agent)
//! programs against, mirroring the separation `cloudllm::client_wrapper` already draws between
//! `Message`/`Role` and the vendor-specific clients in `cloudllm::clients`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::tool_registry::ToolSchema;

/// Closed set of providers an [`AgentConfig`] may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderId {
    Openai,
    Anthropic,
    Ollama,
    Groq,
    Google,
    Mistral,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderId::Openai => "openai",
            ProviderId::Anthropic => "anthropic",
            ProviderId::Ollama => "ollama",
            ProviderId::Groq => "groq",
            ProviderId::Google => "google",
            ProviderId::Mistral => "mistral",
        };
        write!(f, "{}", s)
    }
}

/// Model parameters and retry policy for one [`Agent`](super::agent::Agent).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub model: String,
    pub provider: ProviderId,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
    pub max_retries: u32,
    pub retry_delay: std::time::Duration,
    /// `None` means "absent" per §9's budget semantics and is resolved to 1000 by the Agent, not
    /// here — this struct only carries what the caller actually said.
    pub max_turns: Option<u32>,
}

impl AgentConfig {
    pub fn new(model: impl Into<String>, provider: ProviderId) -> Self {
        Self {
            model: model.into(),
            provider,
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 1.0,
            frequency_penalty: 0.0,
            presence_penalty: 0.0,
            max_retries: 3,
            retry_delay: std::time::Duration::from_millis(500),
            max_turns: Some(30),
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_turns(mut self, max_turns: Option<u32>) -> Self {
        self.max_turns = max_turns;
        self
    }

    /// Absent means 1000, present means as given. No other sentinel is inferred.
    pub fn resolved_max_turns(&self) -> u32 {
        self.max_turns.unwrap_or(1000)
    }
}

/// `role` discriminant of [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
    System,
}

/// One entry in an agent's append-only history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn assistant(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content,
            tool_calls,
            tool_call_id: None,
            name: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }
}

/// A single function-style tool invocation requested by the model.
///
/// `id` is opaque and only required to be unique within one assistant turn; see
/// [`super::providers`] for the deterministic synthesis scheme adapters use when a provider's
/// wire response omits one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
    /// Gemini-specific continuation token; opaque to every other provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<Vec<u8>>,
}

/// Normalized completion reason. Invariant: `tool_calls` non-empty implies `ToolCalls`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    Error,
}

/// What every provider adapter returns from a non-streaming completion.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: FinishReason,
    pub raw: Option<serde_json::Value>,
}

/// Transport/protocol failure from a provider adapter. No retries happen at this layer — see
/// [`Agent::process`](super::agent::Agent::process) and
/// [`Agent::process_with_tools`](super::agent::Agent::process_with_tools).
#[derive(Debug, Clone)]
pub enum ProviderError {
    Transport(String),
    Protocol(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Transport(msg) => write!(f, "provider transport error: {}", msg),
            ProviderError::Protocol(msg) => write!(f, "provider protocol error: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

/// The contract an LLM backend must satisfy to be usable by an [`Agent`](super::agent::Agent).
#[async_trait]
pub trait Provider: Send + Sync {
    async fn create_completion(
        &self,
        messages: &[Message],
        system_prompt: &str,
        config: &AgentConfig,
        tools: &[ToolSchema],
    ) -> Result<ProviderResponse, ProviderError>;

    fn provider_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_turns_resolution_follows_budget_semantics() {
        let absent = AgentConfig::new("gpt-4.1", ProviderId::Openai).with_max_turns(None);
        assert_eq!(absent.resolved_max_turns(), 1000);

        let present = AgentConfig::new("gpt-4.1", ProviderId::Openai).with_max_turns(Some(12));
        assert_eq!(present.resolved_max_turns(), 12);
    }

    #[test]
    fn provider_id_displays_lowercase() {
        assert_eq!(ProviderId::Google.to_string(), "google");
    }
}
