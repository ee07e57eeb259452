//! In-process tool registry: named, schema-described tools dispatched by
//! JSON-RPC method name.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use futures_util::FutureExt;
use jsonschema::validator_for;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::jsonrpc::{ErrorCode, RpcRequest, RpcResponse, JSONRPC_VERSION};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Failure reported by a tool executor.
pub enum ToolError {
    #[error("invalid params: {0}")]
    InvalidParams(String),
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::InvalidParams(_) => ErrorCode::InvalidParams,
            Self::Failed(_) => ErrorCode::InternalError,
        }
    }
}

#[async_trait]
/// Trait contract for the capability behind a tool name.
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError>;
}

#[async_trait]
impl<F, Fut> ToolExecutor for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        (self)(arguments).await
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Catalog view of a tool: what the model and `/tools/list` get to see.
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

#[derive(Clone)]
/// Public struct `ToolDescriptor` pairing a catalog entry with its executor.
pub struct ToolDescriptor {
    spec: ToolSpec,
    executor: Arc<dyn ToolExecutor>,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        executor: impl ToolExecutor + 'static,
    ) -> Self {
        Self {
            spec: ToolSpec {
                name: name.into(),
                description: description.into(),
                parameters,
            },
            executor: Arc::new(executor),
        }
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    pub fn parameters(&self) -> &Value {
        &self.spec.parameters
    }

    pub fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    pub async fn execute(&self, arguments: Value) -> Result<Value, ToolError> {
        self.executor.execute(arguments).await
    }
}

impl fmt::Debug for ToolDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolDescriptor")
            .field("name", &self.spec.name)
            .field("description", &self.spec.description)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates how a registry treats a second tool with an existing name.
pub enum DuplicateToolPolicy {
    /// Last registration wins and keeps the first registration's catalog slot.
    #[default]
    Replace,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Enumerates supported `SchemaValidation` values.
pub enum SchemaValidation {
    #[default]
    Off,
    Enforce,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Enumerates supported `RegistryError` values.
pub enum RegistryError {
    #[error("tool '{0}' is already registered")]
    DuplicateTool(String),
}

#[async_trait]
/// Anything that answers tool requests: an in-process registry or a remote provider.
pub trait ToolProvider: Send + Sync {
    fn tools(&self) -> Vec<ToolSpec>;

    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, ToolError>;

    async fn handle_batch(&self, requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, ToolError>;
}

#[derive(Debug, Default)]
/// Public struct `ToolRegistry` holding tools in registration order.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
    duplicate_policy: DuplicateToolPolicy,
    schema_validation: SchemaValidation,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicateToolPolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    pub fn with_schema_validation(mut self, validation: SchemaValidation) -> Self {
        self.schema_validation = validation;
        self
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        match self.index.get(descriptor.name()).copied() {
            Some(slot) => match self.duplicate_policy {
                DuplicateToolPolicy::Replace => {
                    debug!(tool = descriptor.name(), "replacing registered tool");
                    self.tools[slot] = descriptor;
                }
                DuplicateToolPolicy::Reject => {
                    return Err(RegistryError::DuplicateTool(descriptor.name().to_string()));
                }
            },
            None => {
                self.index
                    .insert(descriptor.name().to_string(), self.tools.len());
                self.tools.push(descriptor);
            }
        }
        Ok(())
    }

    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.index.get(name).map(|slot| &self.tools[*slot])
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Dispatches one request. Every failure is recovered into an error response.
    pub async fn handle(&self, request: &RpcRequest) -> RpcResponse {
        let id = request.id.clone();
        if !request.has_supported_version() {
            return RpcResponse::error(
                id,
                ErrorCode::InvalidRequest,
                ErrorCode::InvalidRequest.default_message(),
                Some(json!(format!("jsonrpc must be '{}'", JSONRPC_VERSION))),
            );
        }

        let Some(tool) = self.get(&request.method) else {
            return RpcResponse::error(
                id,
                ErrorCode::MethodNotFound,
                ErrorCode::MethodNotFound.default_message(),
                Some(Value::String(request.method.clone())),
            );
        };

        let arguments = request
            .params
            .clone()
            .filter(|params| !params.is_null())
            .unwrap_or_else(|| json!({}));
        if self.schema_validation == SchemaValidation::Enforce {
            if let Err(detail) = validate_tool_arguments(tool.spec(), &arguments) {
                return RpcResponse::error(
                    id,
                    ErrorCode::InvalidParams,
                    ErrorCode::InvalidParams.default_message(),
                    Some(Value::String(detail)),
                );
            }
        }

        let outcome = AssertUnwindSafe(tool.execute(arguments))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(result)) => RpcResponse::success(id, result),
            Ok(Err(error)) => {
                warn!(tool = tool.name(), %error, "tool execution failed");
                let code = error.code();
                let detail = match error {
                    ToolError::InvalidParams(detail) | ToolError::Failed(detail) => detail,
                };
                RpcResponse::error(
                    id,
                    code,
                    code.default_message(),
                    Some(Value::String(detail)),
                )
            }
            Err(panic) => {
                let detail = panic_message(panic.as_ref());
                warn!(tool = tool.name(), detail = %detail, "tool execution panicked");
                RpcResponse::error(
                    id,
                    ErrorCode::InternalError,
                    ErrorCode::InternalError.default_message(),
                    Some(Value::String(detail)),
                )
            }
        }
    }

    /// Handles each request independently; responses align with `requests`.
    pub async fn handle_batch(&self, requests: &[RpcRequest]) -> Vec<RpcResponse> {
        join_all(requests.iter().map(|request| self.handle(request))).await
    }
}

#[async_trait]
impl ToolProvider for ToolRegistry {
    fn tools(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|tool| tool.spec().clone()).collect()
    }

    async fn handle(&self, request: RpcRequest) -> Result<RpcResponse, ToolError> {
        Ok(ToolRegistry::handle(self, &request).await)
    }

    async fn handle_batch(&self, requests: Vec<RpcRequest>) -> Result<Vec<RpcResponse>, ToolError> {
        Ok(ToolRegistry::handle_batch(self, &requests).await)
    }
}

pub(crate) fn validate_tool_arguments(spec: &ToolSpec, arguments: &Value) -> Result<(), String> {
    let validator = validator_for(&spec.parameters)
        .map_err(|error| format!("invalid JSON schema for '{}': {error}", spec.name))?;

    let mut errors = validator.iter_errors(arguments);
    if let Some(first) = errors.next() {
        return Err(format!("invalid arguments for '{}': {}", spec.name, first));
    }
    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "tool panicked".to_string()
}
