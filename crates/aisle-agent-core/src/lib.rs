//! Streaming orchestration of one conversational turn: model stream in,
//! tool calls reassembled and executed through the router, results fed back
//! until the model answers without asking for tools.
use std::collections::BTreeMap;
use std::sync::Arc;

use aisle_ai::{AisleAiError, ChatUsage, LlmClient, Message, ToolChoice};
use aisle_tools::{ErrorCode, ToolRouter};
use serde_json::Value;
use thiserror::Error;

mod context;
mod fragments;
mod runtime_tool_bridge;
mod runtime_turn_loop;
mod sink;

pub use context::{
    build_chat_request, context_message, tool_result_message, tool_unavailable_message,
    DEFAULT_SYSTEM_PROMPT,
};
pub use fragments::{FragmentAccumulator, ToolCallFragment};
pub use sink::{ContentSink, DiscardSink, SinkClosed};

#[derive(Debug, Clone)]
/// Public struct `OrchestratorConfig` used to shape model requests and bound the loop.
pub struct OrchestratorConfig {
    pub model: String,
    pub system_prompt: String,
    /// Maximum model sub-turns per caller turn, tool rounds included.
    pub max_turns: usize,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub tool_choice: ToolChoice,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_turns: 5,
            temperature: Some(0.1),
            max_tokens: Some(1_000),
            tool_choice: ToolChoice::Auto,
        }
    }
}

/// Enumerates supported `OrchestratorError` values.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Model(#[from] AisleAiError),
    #[error("failed to parse arguments for tool '{tool}': {detail}")]
    ArgumentParse { tool: String, detail: String },
    #[error("tool loop exceeded max turns ({0})")]
    RecursionLimitExceeded(usize),
    #[error("turn cancelled: content sink closed")]
    Cancelled,
}

impl OrchestratorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Model(_) => ErrorCode::InternalError,
            Self::ArgumentParse { .. } => ErrorCode::ArgumentParseError,
            Self::RecursionLimitExceeded(_) => ErrorCode::RecursionLimitExceeded,
            Self::Cancelled => ErrorCode::ServerError,
        }
    }
}

/// Enumerates supported `TurnEvent` values.
#[derive(Debug, Clone)]
pub enum TurnEvent {
    TurnStart {
        iteration: usize,
    },
    ContentUpdated {
        iteration: usize,
        chars: usize,
    },
    ToolExecutionStart {
        tool_call_id: String,
        tool_name: String,
        arguments: Value,
    },
    ToolExecutionEnd {
        tool_call_id: String,
        tool_name: String,
        success: bool,
    },
    TurnEnd {
        iteration: usize,
        tool_calls: usize,
        request_duration_ms: u64,
        finish_reason: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq)]
/// Session boundary in: who is talking and what was said so far.
pub struct TurnInput {
    pub visitor_id: String,
    pub messages: Vec<Message>,
}

impl TurnInput {
    pub fn new(visitor_id: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            visitor_id: visitor_id.into(),
            messages,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Per-run record; dropped when the turn finishes or fails.
pub struct TurnState {
    pub messages: Vec<Message>,
    pub fragments: FragmentAccumulator,
    /// Visible content of the current sub-turn.
    pub content: String,
    pub iteration: usize,
    pub tool_outputs: BTreeMap<String, Value>,
    pub usage: ChatUsage,
}

impl TurnState {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Session boundary out.
pub struct TurnOutcome {
    pub content: String,
    pub messages: Vec<Message>,
    /// Successful tool results of this turn keyed by tool name; the latest call wins.
    pub tool_outputs: BTreeMap<String, Value>,
    pub iterations: usize,
    pub usage: ChatUsage,
}

impl TurnOutcome {
    pub fn tool_output(&self, tool_name: &str) -> Option<&Value> {
        self.tool_outputs.get(tool_name)
    }
}

type EventHandler = Arc<dyn Fn(&TurnEvent) + Send + Sync>;

/// Public struct `Orchestrator` shared by every session of a process.
#[derive(Clone)]
pub struct Orchestrator {
    client: Arc<dyn LlmClient>,
    router: Arc<ToolRouter>,
    config: OrchestratorConfig,
    handlers: Vec<EventHandler>,
}

impl Orchestrator {
    pub fn new(client: Arc<dyn LlmClient>, router: Arc<ToolRouter>, config: OrchestratorConfig) -> Self {
        Self {
            client,
            router,
            config,
            handlers: Vec::new(),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn router(&self) -> &Arc<ToolRouter> {
        &self.router
    }

    /// Adds an event subscriber that receives turn lifecycle callbacks.
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&TurnEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    fn emit(&self, event: TurnEvent) {
        for handler in &self.handlers {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&event)));
        }
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("router", &self.router)
            .field("handlers", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
