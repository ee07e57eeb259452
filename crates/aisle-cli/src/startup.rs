//! Turns a parsed [`Cli`] into the running gateway.

use std::sync::Arc;

use aisle_agent_core::{Orchestrator, OrchestratorConfig, TurnEvent, DEFAULT_SYSTEM_PROMPT};
use aisle_ai::{LlmClient, OpenAiClient, OpenAiConfig, ToolChoice};
use aisle_gateway::{run_gateway_server, GatewayConfig};
use aisle_tools::{products_registry, visitor_registry, ToolRouter, VisitorServiceConfig};
use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::validation::is_configured;
use crate::{validate_cli, Cli};

fn presence(value: Option<&str>) -> &'static str {
    if is_configured(value) {
        "set"
    } else {
        "missing"
    }
}

/// Logs which settings are present without ever logging their values.
pub fn log_configuration_presence(cli: &Cli) {
    info!(
        openai_api_key = presence(cli.openai_api_key.as_deref()),
        moments_api_endpoint = presence(cli.moments_api_endpoint.as_deref()),
        moments_engine_id = presence(cli.moments_engine_id.as_deref()),
        products_path = %cli.products_path.display(),
        model = %cli.model,
        "environment configuration"
    );
}

pub fn build_openai_config(cli: &Cli) -> OpenAiConfig {
    OpenAiConfig {
        api_base: cli.openai_api_base.clone(),
        api_key: cli.openai_api_key.clone().unwrap_or_default(),
        request_timeout_ms: cli.request_timeout_ms,
        max_retries: cli.max_retries,
        ..OpenAiConfig::default()
    }
}

pub fn build_orchestrator_config(cli: &Cli) -> OrchestratorConfig {
    OrchestratorConfig {
        model: cli.model.clone(),
        system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        max_turns: cli.max_turns,
        temperature: Some(cli.temperature),
        max_tokens: Some(cli.max_tokens),
        tool_choice: ToolChoice::Auto,
    }
}

/// Visitor registry first when configured, then the product catalog.
pub fn build_tool_router(cli: &Cli) -> Result<ToolRouter> {
    let mut registries = Vec::new();
    match cli.moments_api_endpoint.as_deref() {
        Some(endpoint) if is_configured(Some(endpoint)) => {
            let registry = visitor_registry(VisitorServiceConfig {
                endpoint: endpoint.trim().to_string(),
                engine_id: cli.moments_engine_id.clone().unwrap_or_default(),
                request_timeout_ms: cli.request_timeout_ms,
            })
            .context("failed to build visitor data registry")?;
            registries.push(registry);
        }
        _ => warn!("MOMENTS_API_ENDPOINT missing; fetch_visitor_data is unavailable"),
    }
    registries.push(
        products_registry(&cli.products_path).context("failed to build product registry")?,
    );
    Ok(ToolRouter::from_registries(registries))
}

pub fn build_orchestrator(cli: &Cli) -> Result<Arc<Orchestrator>> {
    let client = OpenAiClient::new(build_openai_config(cli))
        .context("failed to create OpenAI client")?;
    let router = build_tool_router(cli)?;
    let mut orchestrator = Orchestrator::new(
        Arc::new(client) as Arc<dyn LlmClient>,
        Arc::new(router),
        build_orchestrator_config(cli),
    );
    orchestrator.subscribe(log_turn_event);
    Ok(Arc::new(orchestrator))
}

fn log_turn_event(event: &TurnEvent) {
    match event {
        TurnEvent::ToolExecutionStart {
            tool_call_id,
            tool_name,
            ..
        } => debug!(tool_call_id, tool_name, "tool execution started"),
        TurnEvent::ToolExecutionEnd {
            tool_call_id,
            tool_name,
            success,
        } => debug!(tool_call_id, tool_name, success, "tool execution finished"),
        TurnEvent::TurnEnd {
            iteration,
            tool_calls,
            request_duration_ms,
            finish_reason,
        } => debug!(
            iteration,
            tool_calls,
            request_duration_ms,
            finish_reason = finish_reason.as_deref().unwrap_or("none"),
            "model request finished"
        ),
        TurnEvent::TurnStart { .. } | TurnEvent::ContentUpdated { .. } => {}
    }
}

pub fn build_gateway_config(cli: &Cli) -> GatewayConfig {
    let host = cli.bind_host.trim();
    let bind = if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{}", cli.port)
    } else {
        format!("{host}:{}", cli.port)
    };
    GatewayConfig {
        bind,
        cors_origins: cli
            .cors_origins
            .iter()
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect(),
        turn_timeout_ms: cli.turn_timeout_ms,
    }
}

pub async fn run_server(cli: Cli) -> Result<()> {
    log_configuration_presence(&cli);
    validate_cli(&cli)?;
    let orchestrator = build_orchestrator(&cli)?;
    run_gateway_server(orchestrator, build_gateway_config(&cli)).await
}
