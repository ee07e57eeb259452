//! JSON-RPC 2.0 envelope shapes shared by registries, the router and the gateway.
//!
//! Error codes come from the fixed [`ErrorCode`] taxonomy; a response holds
//! exactly one of `result` or `error`, which the flattened [`RpcOutcome`]
//! enforces at the type level.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i64", from = "i64")]
/// Enumerates supported `ErrorCode` values.
pub enum ErrorCode {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    InternalError,
    ServerError,
    ToolNotFound,
    RecursionLimitExceeded,
    ArgumentParseError,
}

impl ErrorCode {
    pub const ALL: [ErrorCode; 9] = [
        ErrorCode::ParseError,
        ErrorCode::InvalidRequest,
        ErrorCode::MethodNotFound,
        ErrorCode::InvalidParams,
        ErrorCode::InternalError,
        ErrorCode::ServerError,
        ErrorCode::ToolNotFound,
        ErrorCode::RecursionLimitExceeded,
        ErrorCode::ArgumentParseError,
    ];

    pub fn code(self) -> i64 {
        match self {
            Self::ParseError => -32700,
            Self::InvalidRequest => -32600,
            Self::MethodNotFound => -32601,
            Self::InvalidParams => -32602,
            Self::InternalError => -32603,
            Self::ServerError => -32000,
            Self::ToolNotFound => -32001,
            Self::RecursionLimitExceeded => -32002,
            Self::ArgumentParseError => -32003,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|candidate| candidate.code() == code)
    }

    pub fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError => "Server error",
            Self::ToolNotFound => "Tool not found",
            Self::RecursionLimitExceeded => "Maximum tool recursion depth exceeded",
            Self::ArgumentParseError => "Failed to parse tool arguments",
        }
    }
}

impl From<ErrorCode> for i64 {
    fn from(code: ErrorCode) -> Self {
        code.code()
    }
}

/// Codes outside the taxonomy, such as server-defined codes from a remote
/// provider, decode as `ServerError`.
impl From<i64> for ErrorCode {
    fn from(value: i64) -> Self {
        Self::from_code(value).unwrap_or(Self::ServerError)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
/// Correlation id of a request. Absent and `null` ids are `None` at use sites.
pub enum RequestId {
    Number(i64),
    String(String),
}

impl From<i64> for RequestId {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<u64> for RequestId {
    fn from(value: u64) -> Self {
        i64::try_from(value)
            .map(Self::Number)
            .unwrap_or_else(|_| Self::String(value.to_string()))
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for RequestId {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `RpcRequest` naming a tool (`method`) and its arguments.
pub struct RpcRequest {
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<RequestId>,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RpcRequest {
    pub fn new(id: impl Into<RequestId>, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id: Some(id.into()),
            method: method.into(),
            params: Some(params),
        }
    }

    pub fn has_supported_version(&self) -> bool {
        self.jsonrpc == JSONRPC_VERSION
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `RpcError` carried by failed responses.
pub struct RpcError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Error carrying the code's canonical message.
    pub fn from_code(code: ErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code.code())?;
        if let Some(data) = &self.data {
            write!(f, ": {data}")?;
        }
        Ok(())
    }
}

impl std::error::Error for RpcError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
/// Exactly one of `result` / `error`.
pub enum RpcOutcome {
    Result(Value),
    Error(RpcError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Public struct `RpcResponse` answering one request.
pub struct RpcResponse {
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    #[serde(flatten)]
    pub outcome: RpcOutcome,
}

impl RpcResponse {
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: RpcOutcome::Result(result),
        }
    }

    pub fn failure(id: Option<RequestId>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            outcome: RpcOutcome::Error(error),
        }
    }

    pub fn error(
        id: Option<RequestId>,
        code: ErrorCode,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        let mut error = RpcError::new(code, message);
        error.data = data;
        Self::failure(id, error)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, RpcOutcome::Error(_))
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            RpcOutcome::Result(value) => Some(value),
            RpcOutcome::Error(_) => None,
        }
    }

    pub fn error_details(&self) -> Option<&RpcError> {
        match &self.outcome {
            RpcOutcome::Result(_) => None,
            RpcOutcome::Error(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.outcome {
            RpcOutcome::Result(value) => Ok(value),
            RpcOutcome::Error(error) => Err(error),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Fire-and-forget call; never answered.
pub struct Notification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Notification {
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// Enumerates supported `Envelope` values.
pub enum Envelope {
    Request(RpcRequest),
    Response(RpcResponse),
    Notification(Notification),
}

impl Envelope {
    /// Parses transport text, mapping malformed JSON to `ParseError`.
    pub fn parse_str(raw: &str) -> Result<Self, RpcError> {
        let value: Value = serde_json::from_str(raw).map_err(|error| {
            RpcError::from_code(ErrorCode::ParseError).with_data(Value::String(error.to_string()))
        })?;
        Self::from_value(value)
    }

    pub fn from_value(value: Value) -> Result<Self, RpcError> {
        let Some(object) = value.as_object() else {
            return Err(invalid_request("envelope must be a JSON object"));
        };

        if object.contains_key("method") {
            if object.contains_key("id") {
                return serde_json::from_value(value)
                    .map(Self::Request)
                    .map_err(|error| invalid_request(error.to_string()));
            }
            return serde_json::from_value(value)
                .map(Self::Notification)
                .map_err(|error| invalid_request(error.to_string()));
        }

        match (object.contains_key("result"), object.contains_key("error")) {
            (true, false) | (false, true) => serde_json::from_value(value)
                .map(Self::Response)
                .map_err(|error| invalid_request(error.to_string())),
            (true, true) => Err(invalid_request(
                "response must not carry both result and error",
            )),
            (false, false) => Err(invalid_request(
                "envelope is neither a request, a response nor a notification",
            )),
        }
    }
}

fn invalid_request(detail: impl Into<String>) -> RpcError {
    RpcError::from_code(ErrorCode::InvalidRequest).with_data(Value::String(detail.into()))
}
