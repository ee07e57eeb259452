//! `fetch_visitor_data`: visitor audiences, badges and metrics from the
//! remote audience-data service.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::registry::{RegistryError, ToolDescriptor, ToolError, ToolRegistry};

pub const FETCH_VISITOR_DATA_TOOL: &str = "fetch_visitor_data";
pub const VISITOR_ID_ATTRIBUTE: &str = "5447";
const ENGINE_ID_HEADER: &str = "X-Engine-Id";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Public struct `VisitorServiceConfig` for the audience-data endpoint.
pub struct VisitorServiceConfig {
    pub endpoint: String,
    pub engine_id: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
/// Public struct `VisitorProfile` surfaced to the model and the caller.
pub struct VisitorProfile {
    pub visitor_id: String,
    pub audiences: Value,
    pub badges: Value,
    pub metrics: Value,
}

#[derive(Debug, Deserialize)]
struct VisitorLookupResponse {
    #[serde(default)]
    audiences: Value,
    #[serde(default)]
    badges: Value,
    #[serde(default)]
    metrics: Value,
}

#[derive(Debug, Clone)]
/// Public struct `VisitorService` performing profile lookups.
pub struct VisitorService {
    client: reqwest::Client,
    config: VisitorServiceConfig,
}

impl VisitorService {
    pub fn new(config: VisitorServiceConfig) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;
        Ok(Self { client, config })
    }

    fn lookup_url(&self) -> String {
        format!("{}/", self.config.endpoint.trim_end_matches('/'))
    }

    pub async fn fetch(&self, visitor_id: &str) -> Result<VisitorProfile, ToolError> {
        let response = self
            .client
            .get(self.lookup_url())
            .query(&[
                ("attributeId", VISITOR_ID_ATTRIBUTE),
                ("attributeValue", visitor_id),
            ])
            .header(ENGINE_ID_HEADER, &self.config.engine_id)
            .send()
            .await
            .map_err(|error| {
                warn!(visitor_id, %error, "visitor lookup request failed");
                ToolError::Failed(format!("visitor lookup request failed: {error}"))
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(visitor_id, status = status.as_u16(), "visitor lookup rejected");
            return Err(ToolError::Failed(format!(
                "visitor lookup returned status {}",
                status.as_u16()
            )));
        }

        let payload: VisitorLookupResponse = response.json().await.map_err(|error| {
            warn!(visitor_id, %error, "visitor lookup returned malformed body");
            ToolError::Failed(format!("visitor lookup returned malformed body: {error}"))
        })?;
        debug!(visitor_id, "fetched visitor profile");

        Ok(VisitorProfile {
            visitor_id: visitor_id.to_string(),
            audiences: payload.audiences,
            badges: payload.badges,
            metrics: payload.metrics,
        })
    }

    pub async fn fetch_visitor_data(&self, arguments: &Value) -> Result<Value, ToolError> {
        let visitor_id = visitor_id_argument(arguments)?;
        let profile = self.fetch(&visitor_id).await?;
        serde_json::to_value(profile).map_err(|error| ToolError::Failed(error.to_string()))
    }

    pub fn descriptor(self) -> ToolDescriptor {
        let service = Arc::new(self);
        ToolDescriptor::new(
            FETCH_VISITOR_DATA_TOOL,
            "Retrieve visitor data including audience and badges",
            json!({
                "type": "object",
                "properties": {
                    "visitorId": {"type": "string", "description": "Visitor ID"}
                },
                "required": ["visitorId"]
            }),
            move |arguments: Value| {
                let service = Arc::clone(&service);
                async move { service.fetch_visitor_data(&arguments).await }
            },
        )
    }
}

/// Accepts string or numeric ids; anything else is an invalid-params failure.
pub fn visitor_id_argument(arguments: &Value) -> Result<String, ToolError> {
    match arguments.get("visitorId") {
        Some(Value::String(id)) if !id.trim().is_empty() => Ok(id.trim().to_string()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(ToolError::InvalidParams("visitorId is required".to_string())),
    }
}

/// Registry holding only the visitor lookup tool.
pub fn visitor_registry(config: VisitorServiceConfig) -> Result<ToolRegistry, VisitorRegistryError> {
    let mut registry = ToolRegistry::new();
    registry.register(VisitorService::new(config)?.descriptor())?;
    Ok(registry)
}

#[derive(Debug, thiserror::Error)]
/// Enumerates supported `VisitorRegistryError` values.
pub enum VisitorRegistryError {
    #[error("failed to build visitor service client: {0}")]
    Client(#[from] reqwest::Error),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}
