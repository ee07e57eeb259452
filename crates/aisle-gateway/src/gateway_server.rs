use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use aisle_agent_core::{
    ContentSink, DiscardSink, Orchestrator, OrchestratorError, SinkClosed, TurnInput, TurnOutcome,
};
use aisle_ai::Message;
use aisle_tools::{
    visitor_id_argument, ErrorCode, RequestId, RpcError, RpcResponse, ToolRouter,
    FETCH_VISITOR_DATA_TOOL, JSONRPC_VERSION,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::StreamExt;
use serde_json::{json, Map, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

mod chat_handlers;
mod stream_response_handler;
mod types;

use chat_handlers::{
    handle_chat, handle_list_tools, handle_not_found, handle_root, handle_visitor_data,
};
use stream_response_handler::handle_chat_stream;
use types::{
    parse_chat_params, parse_gateway_request, GatewayApiError, SseContentSink, SseFrame,
    CHAT_FAILURE_MESSAGE,
};

const ROOT_ENDPOINT: &str = "/";
const TOOLS_LIST_ENDPOINT: &str = "/tools/list";
const VISITOR_DATA_ENDPOINT: &str = "/visitor-data";
const CHAT_ENDPOINT: &str = "/chat";
const CHAT_STREAM_ENDPOINT: &str = "/chat/stream";

pub const DEFAULT_CORS_ORIGINS: &[&str] = &["http://localhost:3002", "http://127.0.0.1:3002"];

#[derive(Debug, Clone)]
/// Public struct `GatewayConfig` used across Aisle components.
pub struct GatewayConfig {
    pub bind: String,
    pub cors_origins: Vec<String>,
    /// Deadline for one whole chat turn; `None` leaves turns unbounded.
    pub turn_timeout_ms: Option<u64>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3001".to_string(),
            cors_origins: DEFAULT_CORS_ORIGINS
                .iter()
                .map(|origin| origin.to_string())
                .collect(),
            turn_timeout_ms: None,
        }
    }
}

#[derive(Clone)]
struct GatewayState {
    orchestrator: Arc<Orchestrator>,
    config: Arc<GatewayConfig>,
}

impl GatewayState {
    fn new(orchestrator: Arc<Orchestrator>, config: GatewayConfig) -> Self {
        Self {
            orchestrator,
            config: Arc::new(config),
        }
    }

    fn router(&self) -> &Arc<ToolRouter> {
        self.orchestrator.router()
    }

    fn turn_timeout(&self) -> Option<Duration> {
        self.config
            .turn_timeout_ms
            .filter(|timeout_ms| *timeout_ms > 0)
            .map(Duration::from_millis)
    }

    /// Runs one turn, bounded by the configured deadline.
    async fn run_turn<S>(&self, input: TurnInput, sink: &S) -> Result<TurnOutcome>
    where
        S: ContentSink + ?Sized,
    {
        let turn = self.orchestrator.run_turn(input, sink);
        let outcome = match self.turn_timeout() {
            Some(timeout) => tokio::time::timeout(timeout, turn)
                .await
                .with_context(|| format!("chat turn timed out after {}ms", timeout.as_millis()))?,
            None => turn.await,
        };
        outcome.map_err(|error: OrchestratorError| {
            anyhow::Error::new(error).context("chat turn failed")
        })
    }
}

/// Assembles the HTTP surface over a shared orchestrator.
pub fn build_gateway_router(orchestrator: Arc<Orchestrator>, config: GatewayConfig) -> Router {
    let cors = build_cors_layer(&config.cors_origins);
    let state = GatewayState::new(orchestrator, config);
    build_gateway_app(state).layer(cors)
}

fn build_gateway_app(state: GatewayState) -> Router {
    Router::new()
        .route(ROOT_ENDPOINT, get(handle_root))
        .route(TOOLS_LIST_ENDPOINT, get(handle_list_tools))
        .route(VISITOR_DATA_ENDPOINT, post(handle_visitor_data))
        .route(CHAT_ENDPOINT, post(handle_chat))
        .route(CHAT_STREAM_ENDPOINT, post(handle_chat_stream))
        .fallback(handle_not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .map(|origin| origin.trim())
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(error) => {
                warn!(origin, %error, "ignoring invalid cors origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Binds the listener and serves until ctrl-c.
pub async fn run_gateway_server(
    orchestrator: Arc<Orchestrator>,
    config: GatewayConfig,
) -> Result<()> {
    let bind_addr: SocketAddr = config
        .bind
        .parse()
        .with_context(|| format!("invalid gateway bind address '{}'", config.bind))?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind aisle gateway on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve aisle gateway bound address")?;

    info!(
        addr = %local_addr,
        tools = orchestrator.router().catalog().len(),
        cors_origins = config.cors_origins.len(),
        "aisle gateway listening"
    );

    let app = build_gateway_router(orchestrator, config);
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("aisle gateway server exited unexpectedly")?;

    info!("aisle gateway stopped");
    Ok(())
}
