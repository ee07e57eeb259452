//! Ordered composition of tool providers with first-success fallback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::jsonrpc::{ErrorCode, RpcRequest, RpcResponse};
use crate::registry::{ToolProvider, ToolRegistry, ToolSpec};

#[derive(Debug, Clone, PartialEq)]
/// One named invocation inside a batch.
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
/// Enumerates supported `RouterError` values.
pub enum RouterError {
    #[error("tool '{0}' not found in any registry")]
    ToolNotFound(String),
    #[error("no registry satisfied the whole batch of {0} calls")]
    BatchUnsatisfied(usize),
}

impl RouterError {
    pub fn code(&self) -> ErrorCode {
        ErrorCode::ToolNotFound
    }
}

/// Public struct `ToolRouter` resolving calls across providers in order.
///
/// Providers are read-only once the router owns them, so one router can be
/// shared by every concurrent session behind an `Arc`.
pub struct ToolRouter {
    providers: Vec<Arc<dyn ToolProvider>>,
    next_id: AtomicU64,
}

impl ToolRouter {
    pub fn new(providers: Vec<Arc<dyn ToolProvider>>) -> Self {
        Self {
            providers,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn from_registries(registries: impl IntoIterator<Item = ToolRegistry>) -> Self {
        Self::new(
            registries
                .into_iter()
                .map(|registry| Arc::new(registry) as Arc<dyn ToolProvider>)
                .collect(),
        )
    }

    pub fn provider_count(&self) -> usize {
        self.providers.len()
    }

    /// Every provider's tools, provider order first; duplicates are kept.
    pub fn catalog(&self) -> Vec<ToolSpec> {
        self.providers
            .iter()
            .flat_map(|provider| provider.tools())
            .collect()
    }

    pub async fn call(&self, name: &str, arguments: Value) -> Result<Value, RouterError> {
        let request = RpcRequest::new(self.next_request_id(), name, arguments);

        for (position, provider) in self.providers.iter().enumerate() {
            match provider.handle(request.clone()).await {
                Ok(response) => match response.into_result() {
                    Ok(result) => return Ok(result),
                    Err(error) => {
                        debug!(
                            tool = name,
                            provider = position,
                            code = error.code.code(),
                            "provider declined tool call"
                        );
                    }
                },
                Err(error) => {
                    debug!(tool = name, provider = position, %error, "provider faulted");
                }
            }
        }

        Err(RouterError::ToolNotFound(name.to_string()))
    }

    /// Submits the whole batch to one provider at a time; a provider only
    /// wins when every response in its answer is a success.
    pub async fn call_batch(&self, calls: &[ToolCall]) -> Result<Vec<Value>, RouterError> {
        let requests: Vec<RpcRequest> = calls
            .iter()
            .map(|call| {
                RpcRequest::new(self.next_request_id(), call.name.clone(), call.arguments.clone())
            })
            .collect();

        for (position, provider) in self.providers.iter().enumerate() {
            let responses = match provider.handle_batch(requests.clone()).await {
                Ok(responses) => responses,
                Err(error) => {
                    debug!(provider = position, %error, "provider faulted on batch");
                    continue;
                }
            };
            if responses.len() != requests.len() {
                debug!(
                    provider = position,
                    expected = requests.len(),
                    received = responses.len(),
                    "provider answered batch with mismatched length"
                );
                continue;
            }
            if let Some(results) = collect_batch_results(responses) {
                return Ok(results);
            }
            debug!(provider = position, "provider could not satisfy batch");
        }

        Err(RouterError::BatchUnsatisfied(calls.len()))
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

fn collect_batch_results(responses: Vec<RpcResponse>) -> Option<Vec<Value>> {
    responses
        .into_iter()
        .map(|response| response.into_result().ok())
        .collect()
}

impl fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRouter")
            .field("providers", &self.providers.len())
            .field("next_id", &self.next_id.load(Ordering::Relaxed))
            .finish()
    }
}
