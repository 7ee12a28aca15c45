//! Multi-agent orchestration: named agents with private history, a shared tool registry, and a
//! declarative handoff graph an [`Agency`] routes conversations through.
//!
//! Start with [`Agency`] and [`AgencyConfig`]; build agents with [`Agent`] and [`AgentConfig`]
//! against whichever [`Provider`] wraps the vendor client in play (see [`providers`] for the
//! [`ClientWrapper`](crate::cloudllm::client_wrapper::ClientWrapper) adapter). Built-in tool bodies
//! live in [`tools`].
//!
//! The `Agent` here is unrelated to [`crate::cloudllm::agent::Agent`] — that one drives the
//! crate's older single-agent session loop. Reach for `cloudllm::agency::Agent` when building an
//! `Agency`; both are exported under their full paths rather than re-exported at the crate root,
//! to avoid exactly that ambiguity.

pub mod agency;
pub mod agent;
pub mod error;
pub mod events;
pub mod handoff;
pub mod provider;
pub mod providers;
pub mod queue;
pub mod runner;
pub mod tool_context;
pub mod tool_registry;
pub mod tools;
pub mod worker;

pub use agency::{Agency, AgencyConfig, AgencyResponse, HandoffResult, ParallelResult};
pub use agent::{Agent, MaxTurnsCallback, TurnOutcome};
pub use error::AgencyError;
pub use events::{AgencyEvent, AgentTurnEvent, EventHandler};
pub use handoff::{HandoffDescriptor, HandoffMode};
pub use provider::{AgentConfig, FinishReason, Message, Provider, ProviderError, ProviderId, ProviderResponse, Role, ToolCall};
pub use providers::{synthesize_tool_call_id, ClientWrapperProvider};
pub use runner::{AgentRunner, SerialRunner, ThreadPoolRunner};
pub use tool_context::ToolContext;
pub use tool_registry::{ToolBody, ToolOutcome, ToolRegistry, ToolSchema};
