//! Thin per-provider adapter over the crate's existing [`ClientWrapper`] trait (§4.3, §6).
//!
//! The wire-level work — HTTP payload shapes, SSE framing, provider-specific retry/rate-limit
//! headers — already lives in [`cloudllm::clients`](crate::cloudllm::clients) behind
//! [`ClientWrapper`]. This module does not re-implement any of that; it only translates between
//! the agency's neutral [`Message`]/[`ToolCall`] shapes (§3) and `client_wrapper`'s own neutral
//! shapes, which is the one conversion `ClientWrapper` itself doesn't need to do (it's already
//! provider-agnostic at that layer). One adapter struct covers every `ProviderId`: the concrete
//! per-vendor behavior is selected by which `ClientWrapper` impl the caller hands in
//! (`OpenAIClient`, `ClaudeClient`, `GeminiClient`, `GrokClient`, ...), not by branching here.

use async_trait::async_trait;
use std::sync::Arc;

use crate::cloudllm::client_wrapper::{
    ClientWrapper, Message as WrapperMessage, NativeToolCall, Role as WrapperRole, ToolDefinition,
};

use super::provider::{
    AgentConfig, FinishReason, Message, Provider, ProviderError, ProviderResponse, Role, ToolCall,
};
use super::tool_registry::ToolSchema;

/// Adapts any [`ClientWrapper`] (one per vendor) to the agency's [`Provider`] contract.
///
/// `provider_name` is cosmetic (surfaced via [`Provider::provider_name`] for logging) and is
/// independent of the `ProviderId` an [`AgentConfig`] names — an `Agent` is free to run
/// `ProviderId::Groq` against a `GrokClient` or any other wrapper a host constructs, the same way
/// `AgentConfig` only carries the model id string without validating it against the wrapper.
pub struct ClientWrapperProvider {
    client: Arc<dyn ClientWrapper>,
    provider_name: String,
}

impl ClientWrapperProvider {
    pub fn new(client: Arc<dyn ClientWrapper>, provider_name: impl Into<String>) -> Self {
        Self { client, provider_name: provider_name.into() }
    }

    fn to_wrapper_messages(system_prompt: &str, history: &[Message]) -> Vec<WrapperMessage> {
        let mut out = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            out.push(WrapperMessage {
                role: WrapperRole::System,
                content: Arc::from(system_prompt),
                tool_calls: Vec::new(),
            });
        }
        for m in history {
            let role = match m.role {
                Role::System => WrapperRole::System,
                Role::User => WrapperRole::User,
                Role::Assistant => WrapperRole::Assistant,
                Role::Tool => WrapperRole::Tool {
                    call_id: m.tool_call_id.clone().unwrap_or_default(),
                },
            };
            out.push(WrapperMessage {
                role,
                content: Arc::from(m.content.clone().unwrap_or_default().as_str()),
                tool_calls: m.tool_calls.iter().map(to_native_tool_call).collect(),
            });
        }
        out
    }
}

/// Deterministic id synthesis for the rare provider that omits one on a tool call, following
/// §9's open question: SHA-256 of `name || '\0' || canonical-json(arguments)`, hex-encoded and
/// truncated to 16 characters, prefixed `synth_`, so the same call always gets the same id across
/// retries. This diverges from the Python reference's MD5 scheme only because `md5` is not
/// otherwise a dependency of this crate (see DESIGN.md).
pub fn synthesize_tool_call_id(name: &str, arguments: &serde_json::Value) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\0");
    hasher.update(arguments.to_string().as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    format!("synth_{}", &hex[..16])
}

fn to_native_tool_call(tc: &ToolCall) -> NativeToolCall {
    NativeToolCall {
        id: tc.id.clone(),
        name: tc.name.clone(),
        arguments: tc.arguments.clone(),
    }
}

fn from_native_tool_call(tc: &NativeToolCall) -> ToolCall {
    let id = if tc.id.is_empty() {
        synthesize_tool_call_id(&tc.name, &tc.arguments)
    } else {
        tc.id.clone()
    };
    ToolCall { id, name: tc.name.clone(), arguments: tc.arguments.clone(), thought_signature: None }
}

fn to_tool_definition(schema: &ToolSchema) -> ToolDefinition {
    ToolDefinition {
        name: schema.function.name.clone(),
        description: schema.function.description.clone(),
        parameters_schema: schema.function.parameters.clone(),
    }
}

#[async_trait]
impl Provider for ClientWrapperProvider {
    async fn create_completion(
        &self,
        messages: &[Message],
        system_prompt: &str,
        _config: &AgentConfig,
        tools: &[ToolSchema],
    ) -> Result<ProviderResponse, ProviderError> {
        let wrapper_messages = Self::to_wrapper_messages(system_prompt, messages);
        let tool_defs = if tools.is_empty() {
            None
        } else {
            Some(tools.iter().map(to_tool_definition).collect::<Vec<_>>())
        };

        let response = self
            .client
            .send_message(&wrapper_messages, tool_defs)
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let tool_calls: Vec<ToolCall> = response.tool_calls.iter().map(from_native_tool_call).collect();
        let finish_reason = if tool_calls.is_empty() { FinishReason::Stop } else { FinishReason::ToolCalls };
        let content = if response.content.is_empty() { None } else { Some(response.content.to_string()) };

        Ok(ProviderResponse { content, tool_calls, finish_reason, raw: None })
    }

    fn provider_name(&self) -> &str {
        &self.provider_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloudllm::agency::provider::ProviderId;
    use crate::cloudllm::client_wrapper::Message as WrapperMessage;
    use serde_json::json;
    use std::error::Error;

    struct StubWrapper {
        reply: WrapperMessage,
    }

    #[async_trait]
    impl ClientWrapper for StubWrapper {
        async fn send_message(
            &self,
            _messages: &[WrapperMessage],
            _tools: Option<Vec<ToolDefinition>>,
        ) -> Result<WrapperMessage, Box<dyn Error>> {
            Ok(self.reply.clone())
        }

        fn model_name(&self) -> &str {
            "stub-model"
        }
    }

    #[tokio::test]
    async fn text_only_reply_maps_to_stop() {
        let provider = ClientWrapperProvider::new(
            Arc::new(StubWrapper {
                reply: WrapperMessage { role: WrapperRole::Assistant, content: Arc::from("hi there"), tool_calls: vec![] },
            }),
            "stub",
        );
        let config = AgentConfig::new("stub-model", ProviderId::Openai);
        let resp = provider.create_completion(&[], "sys", &config, &[]).await.unwrap();
        assert_eq!(resp.content.as_deref(), Some("hi there"));
        assert_eq!(resp.finish_reason, FinishReason::Stop);
        assert!(resp.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn tool_call_reply_maps_to_tool_calls_and_keeps_ids() {
        let provider = ClientWrapperProvider::new(
            Arc::new(StubWrapper {
                reply: WrapperMessage {
                    role: WrapperRole::Assistant,
                    content: Arc::from(""),
                    tool_calls: vec![NativeToolCall {
                        id: "call_1".to_string(),
                        name: "bash".to_string(),
                        arguments: json!({"command": "echo hi"}),
                    }],
                },
            }),
            "stub",
        );
        let config = AgentConfig::new("stub-model", ProviderId::Openai);
        let resp = provider.create_completion(&[], "sys", &config, &[]).await.unwrap();
        assert_eq!(resp.finish_reason, FinishReason::ToolCalls);
        assert_eq!(resp.tool_calls[0].id, "call_1");
        assert_eq!(resp.content, None);
    }

    #[test]
    fn synthesized_ids_are_stable_for_same_input() {
        let a = synthesize_tool_call_id("bash", &json!({"command": "x"}));
        let b = synthesize_tool_call_id("bash", &json!({"command": "x"}));
        let c = synthesize_tool_call_id("bash", &json!({"command": "y"}));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
