use super::*;

/// Validates the request up front, then streams the turn as SSE frames.
///
/// Validation failures are plain JSON replies; once the stream is open every
/// failure is reported as a single apology frame.
pub(super) async fn handle_chat_stream(
    State(state): State<GatewayState>,
    body: Bytes,
) -> Response {
    let request = match parse_gateway_request(&body) {
        Ok(request) => request,
        Err(error) => return error.into_response(),
    };
    let params = match parse_chat_params(&request) {
        Ok(params) => params,
        Err(error) => return error.into_response(),
    };

    let (tx, rx) = mpsc::unbounded_channel::<SseFrame>();
    let id = request.id;
    tokio::spawn(async move {
        let sink = SseContentSink {
            tx: tx.clone(),
            id: id.clone(),
        };
        let visitor_id = params.visitor_id.clone();
        let input = TurnInput::new(params.visitor_id, params.messages);
        match state.run_turn(input, &sink).await {
            Ok(outcome) => {
                let visitor_data = outcome
                    .tool_output(FETCH_VISITOR_DATA_TOOL)
                    .cloned()
                    .unwrap_or(Value::Null);
                info!(
                    %visitor_id,
                    iterations = outcome.iterations,
                    "streamed chat turn completed"
                );
                let _ = tx.send(SseFrame::Done { id, visitor_data });
            }
            Err(error) => {
                if tx.is_closed() {
                    debug!(%visitor_id, "stream client went away before the turn ended");
                    return;
                }
                warn!(
                    %visitor_id,
                    error = %format!("{error:#}"),
                    apology = CHAT_FAILURE_MESSAGE,
                    "streamed chat turn failed"
                );
                let _ = tx.send(SseFrame::Failed { id });
            }
        }
    });

    let stream = UnboundedReceiverStream::new(rx)
        .map(|frame| Ok::<Event, Infallible>(frame.into_event()));
    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
