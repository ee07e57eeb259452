use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use aisle_agent_core::{Orchestrator, OrchestratorConfig, TurnInput};
use aisle_ai::{
    stream_from_events, AisleAiError, ChatEventStream, ChatRequest, LlmClient, Message,
    StreamEvent, ToolCallDelta,
};
use aisle_tools::{
    products_registry, visitor_registry, ToolRegistry, ToolRouter, VisitorServiceConfig,
    FETCH_PRODUCTS_TOOL, FETCH_VISITOR_DATA_TOOL,
};
use async_trait::async_trait;
use httpmock::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use tokio::sync::{mpsc, Mutex as AsyncMutex};

type Script = Vec<Result<StreamEvent, AisleAiError>>;

struct ScriptedClient {
    scripts: AsyncMutex<VecDeque<Script>>,
    requests: AsyncMutex<Vec<ChatRequest>>,
}

impl ScriptedClient {
    fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: AsyncMutex::new(VecDeque::from(scripts)),
            requests: AsyncMutex::new(Vec::new()),
        })
    }

    async fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AisleAiError> {
        self.requests.lock().await.push(request);
        let script = self
            .scripts
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AisleAiError::InvalidResponse("scripted stream queue exhausted".into()))?;
        Ok(stream_from_events(script))
    }
}

fn write_catalog() -> (TempDir, PathBuf) {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("products.json");
    std::fs::write(
        &path,
        r#"[
            {"id": 1, "name": "Trail Runner 3", "category": "Footwear", "price": 89.99, "deal": "10% off"},
            {"id": 2, "name": "Packable Rain Shell", "category": "Outerwear", "price": 129.0, "deal": "VIP exclusive: 25% off"}
        ]"#,
    )
    .expect("write catalog");
    (temp, path)
}

fn visitor_config(server: &MockServer) -> VisitorServiceConfig {
    VisitorServiceConfig {
        endpoint: server.base_url(),
        engine_id: "engine-42".to_string(),
        request_timeout_ms: 5_000,
    }
}

/// Both tools requested in one sub-turn with interleaved argument fragments.
fn lookup_both_tools_script() -> Script {
    vec![
        Ok(StreamEvent::tool_call(ToolCallDelta::start(
            0,
            "call_visitor",
            FETCH_VISITOR_DATA_TOOL,
        ))),
        Ok(StreamEvent::tool_call(ToolCallDelta::start(
            1,
            "call_products",
            FETCH_PRODUCTS_TOOL,
        ))),
        Ok(StreamEvent::tool_call(ToolCallDelta::arguments(0, r#"{"visitor"#))),
        Ok(StreamEvent::tool_call(ToolCallDelta::arguments(1, "{}"))),
        Ok(StreamEvent::tool_call(ToolCallDelta::arguments(0, r#"Id":"v-77"}"#))),
        Ok(StreamEvent::finished("tool_calls")),
    ]
}

fn answer_script(chunks: &[&str]) -> Script {
    let mut script: Script = chunks
        .iter()
        .map(|chunk| Ok(StreamEvent::content(*chunk)))
        .collect();
    script.push(Ok(StreamEvent::finished("stop")));
    script
}

fn orchestrator(client: Arc<ScriptedClient>, registries: Vec<ToolRegistry>) -> Orchestrator {
    Orchestrator::new(
        client,
        Arc::new(ToolRouter::from_registries(registries)),
        OrchestratorConfig::default(),
    )
}

fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut chunks = Vec::new();
    while let Ok(chunk) = rx.try_recv() {
        chunks.push(chunk);
    }
    chunks
}

#[tokio::test]
async fn integration_turn_fetches_visitor_and_products_then_streams_answer() {
    let server = MockServer::start();
    let lookup = server.mock(|when, then| {
        when.method(GET)
            .path("/")
            .query_param("attributeId", "5447")
            .query_param("attributeValue", "v-77")
            .header("X-Engine-Id", "engine-42");
        then.status(200).json_body(json!({
            "audiences": ["VIP Shoppers"],
            "badges": ["Early Adopter"],
            "metrics": {"orders": 12}
        }));
    });
    let (_temp, catalog) = write_catalog();

    let client = ScriptedClient::new(vec![
        lookup_both_tools_script(),
        answer_script(&["<div>Welcome back", ", VIP!</div>"]),
    ]);
    let orchestrator = orchestrator(
        client.clone(),
        vec![
            visitor_registry(visitor_config(&server)).expect("visitor registry"),
            products_registry(&catalog).expect("products registry"),
        ],
    );

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let outcome = orchestrator
        .run_turn(
            TurnInput::new("v-77", vec![Message::user("Any deals for me?")]),
            &tx,
        )
        .await
        .expect("turn completes");

    lookup.assert_calls(1);
    assert_eq!(outcome.content, "<div>Welcome back, VIP!</div>");
    assert_eq!(
        drain(&mut rx),
        vec!["<div>Welcome back", "<div>Welcome back, VIP!</div>"]
    );

    let visitor = outcome
        .tool_output(FETCH_VISITOR_DATA_TOOL)
        .expect("visitor data surfaced");
    assert_eq!(visitor["visitorId"], "v-77");
    assert_eq!(visitor["audiences"], json!(["VIP Shoppers"]));
    let products = outcome
        .tool_output(FETCH_PRODUCTS_TOOL)
        .expect("products surfaced");
    assert_eq!(products["products"].as_array().map(Vec::len), Some(2));

    let requests = client.requests().await;
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.len(), 2);
    let follow_up: Vec<&str> = requests[1]
        .messages
        .iter()
        .map(|message| message.content.as_str())
        .collect();
    let visitor_result = follow_up
        .iter()
        .position(|content| content.contains("Tool Result (fetch_visitor_data)"))
        .expect("visitor result in follow-up");
    let products_result = follow_up
        .iter()
        .position(|content| content.contains("Tool Result (fetch_products)"))
        .expect("products result in follow-up");
    assert!(visitor_result < products_result);
    assert!(follow_up[products_result].contains("Trail Runner 3"));

    let last = outcome.messages.last().expect("assistant reply recorded");
    assert_eq!(last, &Message::assistant("<div>Welcome back, VIP!</div>"));
}

#[tokio::test]
async fn integration_failing_visitor_service_degrades_to_unavailable_tool() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/");
        then.status(500).body("upstream down");
    });
    let (_temp, catalog) = write_catalog();

    let client = ScriptedClient::new(vec![
        lookup_both_tools_script(),
        answer_script(&["Here are today's deals."]),
    ]);
    let orchestrator = orchestrator(
        client.clone(),
        vec![
            visitor_registry(visitor_config(&server)).expect("visitor registry"),
            products_registry(&catalog).expect("products registry"),
        ],
    );

    let outcome = orchestrator
        .run_turn(
            TurnInput::new("v-77", vec![Message::user("deals?")]),
            &aisle_agent_core::DiscardSink,
        )
        .await
        .expect("turn completes without visitor data");

    assert_eq!(outcome.content, "Here are today's deals.");
    assert!(outcome.tool_output(FETCH_VISITOR_DATA_TOOL).is_none());
    assert!(outcome.tool_output(FETCH_PRODUCTS_TOOL).is_some());

    let requests = client.requests().await;
    assert!(requests[1]
        .messages
        .iter()
        .any(|message| message.content.contains("Tool Unavailable (fetch_visitor_data)")));
}

#[tokio::test]
async fn integration_products_only_router_serves_catalog_listing_and_calls() {
    let (_temp, catalog) = write_catalog();
    let router = ToolRouter::from_registries([products_registry(&catalog).expect("registry")]);

    let names: Vec<_> = router.catalog().into_iter().map(|spec| spec.name).collect();
    assert_eq!(names, vec![FETCH_PRODUCTS_TOOL]);

    let result = router
        .call(FETCH_PRODUCTS_TOOL, json!({}))
        .await
        .expect("catalog call");
    assert_eq!(result["products"][1]["name"], "Packable Rain Shell");

    let error = router
        .call(FETCH_VISITOR_DATA_TOOL, json!({"visitorId": "v-1"}))
        .await
        .expect_err("visitor tool not registered");
    assert_eq!(error.code().code(), -32001);
}
