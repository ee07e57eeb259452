use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use aisle_ai::{
    stream_from_events, AisleAiError, ChatEventStream, ChatRequest, LlmClient, Message,
    MessageRole, StreamEvent, ToolCallDelta,
};
use aisle_tools::{ErrorCode, ToolDescriptor, ToolRegistry, ToolRouter};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc;

use crate::{
    DiscardSink, Orchestrator, OrchestratorConfig, OrchestratorError, TurnEvent, TurnInput,
};

mod streaming_turns;

type Script = Vec<Result<StreamEvent, AisleAiError>>;

/// Replays one scripted stream per model request and records every request.
struct ScriptedClient {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AisleAiError> {
        self.requests.lock().expect("requests lock").push(request);
        let script = self
            .scripts
            .lock()
            .expect("scripts lock")
            .pop_front()
            .ok_or_else(|| AisleAiError::InvalidResponse("script exhausted".to_string()))?;
        Ok(stream_from_events(script))
    }
}

/// Asks for the same tool on every request.
struct AlwaysToolClient {
    tool: String,
    calls: AtomicUsize,
}

#[async_trait]
impl LlmClient for AlwaysToolClient {
    async fn stream_chat(&self, _request: ChatRequest) -> Result<ChatEventStream, AisleAiError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(stream_from_events(vec![
            Ok(StreamEvent::tool_call(ToolCallDelta::start(
                0,
                format!("call_{call}"),
                self.tool.clone(),
            ))),
            Ok(StreamEvent::tool_call(ToolCallDelta::arguments(0, "{}"))),
            Ok(StreamEvent::finished("tool_calls")),
        ]))
    }
}

fn text(value: &str) -> Result<StreamEvent, AisleAiError> {
    Ok(StreamEvent::content(value))
}

fn tool_start(index: usize, id: &str, name: &str) -> Result<StreamEvent, AisleAiError> {
    Ok(StreamEvent::tool_call(ToolCallDelta::start(index, id, name)))
}

fn tool_args(index: usize, fragment: &str) -> Result<StreamEvent, AisleAiError> {
    Ok(StreamEvent::tool_call(ToolCallDelta::arguments(index, fragment)))
}

/// Registry with a `lookup` tool that records the arguments it receives.
fn recording_router(seen: Arc<Mutex<Vec<Value>>>) -> Arc<ToolRouter> {
    let mut registry = ToolRegistry::new();
    registry
        .register(ToolDescriptor::new(
            "lookup",
            "Look up a record by id",
            json!({"type": "object", "properties": {"id": {"type": "string"}}}),
            move |arguments: Value| {
                let seen = Arc::clone(&seen);
                async move {
                    seen.lock().expect("seen lock").push(arguments.clone());
                    Ok(json!({"record": arguments["id"].clone(), "status": "active"}))
                }
            },
        ))
        .expect("register lookup");
    Arc::new(ToolRouter::from_registries([registry]))
}

fn orchestrator(client: Arc<dyn LlmClient>, router: Arc<ToolRouter>) -> Orchestrator {
    Orchestrator::new(client, router, OrchestratorConfig::default())
}

async fn drain(mut receiver: mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Some(chunk) = receiver.recv().await {
        chunks.push(chunk);
    }
    chunks
}

#[test]
fn unit_orchestrator_config_defaults_match_chat_settings() {
    let config = OrchestratorConfig::default();
    assert_eq!(config.model, "gpt-4o-mini");
    assert_eq!(config.max_turns, 5);
    assert_eq!(config.temperature, Some(0.1));
    assert_eq!(config.max_tokens, Some(1_000));
    assert!(config.system_prompt.contains("HTML"));
}

#[test]
fn unit_orchestrator_error_codes_follow_taxonomy() {
    assert_eq!(
        OrchestratorError::RecursionLimitExceeded(5).code(),
        ErrorCode::RecursionLimitExceeded
    );
    assert_eq!(
        OrchestratorError::ArgumentParse {
            tool: "lookup".to_string(),
            detail: "eof".to_string(),
        }
        .code()
        .code(),
        -32003
    );
    assert_eq!(
        OrchestratorError::Model(AisleAiError::MissingApiKey).code(),
        ErrorCode::InternalError
    );
}
