use super::*;

pub(super) async fn handle_root() -> Json<Value> {
    Json(json!({ "message": "Server is running!" }))
}

pub(super) async fn handle_list_tools(State(state): State<GatewayState>) -> Response {
    let tools = state.router().catalog();
    debug!(tools = tools.len(), "listing tools");
    match serde_json::to_value(&tools) {
        Ok(tools) => Json(RpcResponse::success(None, json!({ "tools": tools }))).into_response(),
        Err(error) => {
            warn!(%error, "failed to serialize tool catalog");
            GatewayApiError::internal(None, "Failed to list tools")
                .with_data(Value::String(error.to_string()))
                .into_response()
        }
    }
}

pub(super) async fn handle_visitor_data(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Response {
    let request = match parse_gateway_request(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let Ok(visitor_id) = visitor_id_argument(&Value::Object(request.params.clone())) else {
        return GatewayApiError::bad_request(
            request.id,
            ErrorCode::InvalidParams,
            "Visitor ID is required",
        )
        .into_response();
    };

    match state
        .router()
        .call(FETCH_VISITOR_DATA_TOOL, json!({ "visitorId": &visitor_id }))
        .await
    {
        Ok(profile) => Json(RpcResponse::success(request.id, profile)).into_response(),
        Err(error) => {
            warn!(%visitor_id, %error, "visitor data lookup failed");
            GatewayApiError::internal(request.id, "Failed to fetch visitor data")
                .with_data(Value::String(error.to_string()))
                .into_response()
        }
    }
}

pub(super) async fn handle_chat(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request = match parse_gateway_request(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let params = match parse_chat_params(&request) {
        Ok(params) => params,
        Err(error) => return error.into_response(),
    };

    let input = TurnInput::new(params.visitor_id.clone(), params.messages);
    match state.run_turn(input, &DiscardSink).await {
        Ok(outcome) => {
            let visitor_data = outcome
                .tool_output(FETCH_VISITOR_DATA_TOOL)
                .cloned()
                .unwrap_or(Value::Null);
            info!(
                visitor_id = %params.visitor_id,
                iterations = outcome.iterations,
                content_chars = outcome.content.chars().count(),
                "chat turn completed"
            );
            Json(RpcResponse::success(
                request.id,
                json!({
                    "content": outcome.content,
                    "visitorData": visitor_data,
                    "messages": outcome.messages,
                }),
            ))
            .into_response()
        }
        Err(error) => {
            warn!(visitor_id = %params.visitor_id, error = %format!("{error:#}"), "chat turn failed");
            GatewayApiError::internal(request.id, "Failed to process chat")
                .with_data(Value::String(error.to_string()))
                .into_response()
        }
    }
}

pub(super) async fn handle_not_found(method: Method, uri: Uri) -> Response {
    let target = uri
        .path_and_query()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string());
    debug!(%method, target, "route not found");
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("Route not found: {method} {target}") })),
    )
        .into_response()
}
