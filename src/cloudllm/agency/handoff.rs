//! The handoff sentinel: a pseudo-tool that records intent instead of doing work.
//!
//! Unlike the Python reference this crate was modeled on, there is no module-level "current
//! agency" global here — the sentinel only ever needs to know whether it is being called from a
//! parallel branch, which `ToolRegistry::execute` already has in hand and passes in directly.

use serde_json::{json, Value};

use super::tool_registry::{ToolOutcome, ToolSchema};

/// What the model asked for: a single-target or fan-out handoff, not yet validated against the
/// agency's handoff graph (that happens in `Agency::process`, which is the only place that knows
/// the graph).
#[derive(Debug, Clone, PartialEq)]
pub enum HandoffMode {
    Single,
    Parallel,
}

#[derive(Debug, Clone)]
pub struct HandoffDescriptor {
    pub mode: HandoffMode,
    pub message: String,
    pub context: Option<String>,
    pub aggregation_target: String,
    /// Single-target name (`mode == Single`) or the deduplicated fan-out list (`mode ==
    /// Parallel`). Kept as one field, like the source's `agent_name`/`agent_names` pair, but
    /// normalized here so callers never have to check `mode` twice.
    pub targets: Vec<String>,
}

impl HandoffDescriptor {
    /// The confirmation text returned to the model as this tool call's result — never the
    /// eventual handoff outcome, which the Agency produces later.
    pub fn confirmation_text(&self) -> String {
        let preview: String = self.message.chars().take(100).collect();
        match self.mode {
            HandoffMode::Parallel => format!(
                "Parallel handoff scheduled to {:?}. Message: {}...",
                self.targets, preview
            ),
            HandoffMode::Single => format!(
                "Handoff to {} scheduled. Message: {}...",
                self.targets.first().map(String::as_str).unwrap_or(""),
                preview
            ),
        }
    }
}

/// The sentinel's fixed JSON schema (§6): never registered like a normal tool, always appended
/// by [`ToolRegistry::schemas`](super::tool_registry::ToolRegistry::schemas).
pub fn handoff_schema() -> ToolSchema {
    ToolSchema::function(
        "handoff_to_agent",
        "Hand off the conversation to one or more other agents. Does not execute work itself; \
         records the request for the Agency to route.",
        json!({
            "type": "object",
            "properties": {
                "agent_name": {"type": "string", "description": "Single handoff target"},
                "agent_names": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Parallel fan-out targets"
                },
                "message": {"type": "string", "description": "Message for the target agent(s)"},
                "context": {"type": "string", "description": "Additional context to carry over"},
                "aggregation_target": {
                    "type": "string",
                    "description": "Agent that merges parallel branch results (default: Coder)"
                }
            },
            "required": ["message"]
        }),
    )
}

/// Core sentinel logic, invoked by `ToolRegistry::execute` before any ordinary tool lookup.
///
/// `is_parallel_branch` is the only piece of registry state the sentinel needs; it is passed in
/// explicitly rather than reached for through global state (§9).
pub fn handoff_to_agent(is_parallel_branch: bool, args: Value) -> ToolOutcome {
    if is_parallel_branch {
        return ToolOutcome::Text(
            "Nested handoff refused: this agent is running inside a parallel branch and cannot \
             initiate further handoffs."
                .to_string(),
        );
    }

    let agent_name = args.get("agent_name").and_then(Value::as_str).map(str::to_string);
    let agent_names: Vec<String> = args
        .get("agent_names")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let mut targets: Vec<String> = Vec::new();
    let mut seen = std::collections::HashSet::new();
    for candidate in agent_name.into_iter().chain(agent_names.into_iter()) {
        if candidate.is_empty() {
            continue;
        }
        if seen.insert(candidate.clone()) {
            targets.push(candidate);
        }
    }

    if targets.is_empty() {
        return ToolOutcome::Text(
            "Handoff failed: no target agent specified (agent_name or agent_names is required)."
                .to_string(),
        );
    }

    let message = args
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let context = args
        .get("context")
        .and_then(Value::as_str)
        .map(str::to_string);
    let aggregation_target = args
        .get("aggregation_target")
        .and_then(Value::as_str)
        .unwrap_or("Coder")
        .to_string();

    let mode = if targets.len() > 1 {
        HandoffMode::Parallel
    } else {
        HandoffMode::Single
    };

    ToolOutcome::Handoff(HandoffDescriptor {
        mode,
        message,
        context,
        aggregation_target,
        targets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_branch_refuses_and_carries_no_descriptor() {
        let outcome = handoff_to_agent(true, json!({"agent_name": "Planner", "message": "go"}));
        match outcome {
            ToolOutcome::Text(s) => assert!(s.contains("refused")),
            ToolOutcome::Handoff(_) => panic!("parallel branch must not produce a handoff"),
        }
    }

    #[test]
    fn empty_target_list_is_an_error_text() {
        let outcome = handoff_to_agent(false, json!({"message": "go"}));
        match outcome {
            ToolOutcome::Text(s) => assert!(s.contains("no target agent")),
            ToolOutcome::Handoff(_) => panic!("empty targets must not produce a handoff"),
        }
    }

    #[test]
    fn targets_are_deduplicated_preserving_order() {
        let outcome = handoff_to_agent(
            false,
            json!({"agent_name": "Planner", "agent_names": ["Planner", "Critic"], "message": "go"}),
        );
        match outcome {
            ToolOutcome::Handoff(d) => {
                assert_eq!(d.targets, vec!["Planner".to_string(), "Critic".to_string()]);
                assert_eq!(d.mode, HandoffMode::Parallel);
            }
            ToolOutcome::Text(_) => panic!("expected a handoff descriptor"),
        }
    }

    #[test]
    fn single_target_is_mode_single() {
        let outcome = handoff_to_agent(false, json!({"agent_name": "Planner", "message": "go"}));
        match outcome {
            ToolOutcome::Handoff(d) => assert_eq!(d.mode, HandoffMode::Single),
            ToolOutcome::Text(_) => panic!("expected a handoff descriptor"),
        }
    }
}
