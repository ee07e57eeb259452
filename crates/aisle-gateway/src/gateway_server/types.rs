//! Wire types of the HTTP surface: JSON-RPC error replies, SSE frames and
//! chat request params.

use super::*;

pub(super) const CHAT_FAILURE_MESSAGE: &str =
    "Sorry, an error occurred while processing your request.";

/// JSON-RPC error reply carried with an HTTP status.
#[derive(Debug)]
pub(super) struct GatewayApiError {
    pub(super) status: StatusCode,
    pub(super) id: Option<RequestId>,
    pub(super) error: RpcError,
}

impl GatewayApiError {
    pub(super) fn new(
        status: StatusCode,
        id: Option<RequestId>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            id,
            error: RpcError::new(code, message),
        }
    }

    pub(super) fn bad_request(
        id: Option<RequestId>,
        code: ErrorCode,
        message: impl Into<String>,
    ) -> Self {
        Self::new(StatusCode::BAD_REQUEST, id, code, message)
    }

    pub(super) fn internal(id: Option<RequestId>, message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            id,
            ErrorCode::InternalError,
            message,
        )
    }

    pub(super) fn with_data(mut self, data: Value) -> Self {
        self.error.data = Some(data);
        self
    }
}

impl IntoResponse for GatewayApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(RpcResponse::failure(self.id, self.error)),
        )
            .into_response()
    }
}

/// One `data:` frame of `/chat/stream`.
#[derive(Debug, Clone)]
pub(super) enum SseFrame {
    Content {
        id: Option<RequestId>,
        content: String,
    },
    Done {
        id: Option<RequestId>,
        visitor_data: Value,
    },
    Failed {
        id: Option<RequestId>,
    },
}

impl SseFrame {
    pub(super) fn into_event(self) -> Event {
        let response = match self {
            Self::Content { id, content } => {
                RpcResponse::success(id, json!({ "content": content }))
            }
            Self::Done { id, visitor_data } => RpcResponse::success(
                id,
                json!({ "done": true, "visitorData": visitor_data }),
            ),
            Self::Failed { id } => RpcResponse::failure(
                id,
                RpcError::new(ErrorCode::InternalError, CHAT_FAILURE_MESSAGE),
            ),
        };
        let payload = serde_json::to_value(&response).unwrap_or(Value::Null);
        Event::default().data(payload.to_string())
    }
}

/// Orchestrator sink that wraps each cumulative chunk into an SSE frame.
pub(super) struct SseContentSink {
    pub(super) tx: mpsc::UnboundedSender<SseFrame>,
    pub(super) id: Option<RequestId>,
}

#[async_trait]
impl ContentSink for SseContentSink {
    async fn push(&self, content: String) -> Result<(), SinkClosed> {
        self.tx
            .send(SseFrame::Content {
                id: self.id.clone(),
                content,
            })
            .map_err(|_| SinkClosed)
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Envelope fields the gateway reads from a POST body.
#[derive(Debug, Clone)]
pub(super) struct GatewayRpcRequest {
    pub(super) id: Option<RequestId>,
    pub(super) params: Map<String, Value>,
}

#[derive(Debug, Clone)]
pub(super) struct ChatParams {
    pub(super) visitor_id: String,
    pub(super) messages: Vec<Message>,
}

/// Parses the body and checks the protocol tag.
///
/// A missing or non-object `params` is treated as empty so that each
/// endpoint reports its own `InvalidParams` message.
pub(super) fn parse_gateway_request(body: &[u8]) -> Result<GatewayRpcRequest, GatewayApiError> {
    let value: Value = serde_json::from_slice(body).map_err(|error| {
        GatewayApiError::bad_request(None, ErrorCode::ParseError, "Parse error")
            .with_data(Value::String(error.to_string()))
    })?;
    let Some(object) = value.as_object() else {
        return Err(GatewayApiError::bad_request(
            None,
            ErrorCode::InvalidRequest,
            "Invalid request data",
        ));
    };

    let id = object
        .get("id")
        .cloned()
        .and_then(|id| serde_json::from_value::<Option<RequestId>>(id).ok())
        .flatten();
    if object.get("jsonrpc").and_then(Value::as_str) != Some(JSONRPC_VERSION) {
        return Err(GatewayApiError::bad_request(
            id,
            ErrorCode::InvalidRequest,
            "Invalid JSON-RPC version",
        ));
    }

    let params = match object.get("params") {
        Some(Value::Object(params)) => params.clone(),
        _ => Map::new(),
    };
    Ok(GatewayRpcRequest { id, params })
}

pub(super) fn parse_chat_params(request: &GatewayRpcRequest) -> Result<ChatParams, GatewayApiError> {
    let missing = || {
        GatewayApiError::bad_request(
            request.id.clone(),
            ErrorCode::InvalidParams,
            "Messages and visitorId are required",
        )
    };
    let params = Value::Object(request.params.clone());
    let visitor_id = visitor_id_argument(&params).map_err(|_| missing())?;
    let messages = match request.params.get("messages") {
        Some(messages @ Value::Array(_)) => serde_json::from_value::<Vec<Message>>(messages.clone())
            .map_err(|error| missing().with_data(Value::String(error.to_string())))?,
        _ => return Err(missing()),
    };
    Ok(ChatParams {
        visitor_id,
        messages,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{parse_chat_params, parse_gateway_request, SseFrame};
    use aisle_ai::Message;
    use aisle_tools::{ErrorCode, RequestId};

    #[test]
    fn unit_parse_gateway_request_reports_protocol_errors() {
        let parse = parse_gateway_request(b"{not json").expect_err("parse error");
        assert_eq!(parse.error.code, ErrorCode::ParseError);

        let version = parse_gateway_request(br#"{"jsonrpc":"1.0","id":"x"}"#)
            .expect_err("version error");
        assert_eq!(version.error.code, ErrorCode::InvalidRequest);
        assert_eq!(version.id, Some(RequestId::String("x".to_string())));
        assert_eq!(version.status.as_u16(), 400);
    }

    #[test]
    fn functional_parse_chat_params_reads_messages_and_visitor() {
        let request = parse_gateway_request(
            br#"{"jsonrpc":"2.0","id":1,"params":{"visitorId":"v-1","messages":[{"role":"user","content":"hi"}]}}"#,
        )
        .expect("request");
        let params = parse_chat_params(&request).expect("params");
        assert_eq!(params.visitor_id, "v-1");
        assert_eq!(params.messages, vec![Message::user("hi")]);
    }

    #[test]
    fn regression_parse_chat_params_requires_both_fields() {
        for body in [
            br#"{"jsonrpc":"2.0","id":1,"params":{"visitorId":"v-1"}}"#.as_slice(),
            br#"{"jsonrpc":"2.0","id":1,"params":{"messages":[]}}"#.as_slice(),
            br#"{"jsonrpc":"2.0","id":1}"#.as_slice(),
            br#"{"jsonrpc":"2.0","id":1,"params":{"visitorId":"v","messages":[{"role":"robot","content":"x"}]}}"#.as_slice(),
        ] {
            let request = parse_gateway_request(body).expect("request");
            let error = parse_chat_params(&request).expect_err("missing params");
            assert_eq!(error.error.code, ErrorCode::InvalidParams);
            assert_eq!(error.status.as_u16(), 400);
        }
    }

    #[test]
    fn unit_sse_frames_render_json_rpc_envelopes() {
        let frame = SseFrame::Done {
            id: Some(RequestId::Number(3)),
            visitor_data: json!({"visitorId": "v-1"}),
        };
        let rendered = format!("{:?}", frame.clone().into_event());
        assert!(rendered.contains("done"));
        assert!(rendered.contains("visitorData"));
    }
}
