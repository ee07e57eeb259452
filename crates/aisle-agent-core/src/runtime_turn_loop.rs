use std::time::Instant;

use aisle_ai::{ChatRequest, Message};
use futures_util::StreamExt;
use tracing::{debug, info, info_span, Instrument};

use crate::context::build_chat_request;
use crate::{
    ContentSink, Orchestrator, OrchestratorError, TurnEvent, TurnInput, TurnOutcome, TurnState,
};

#[derive(Debug, Default)]
struct StreamSummary {
    finish_reason: Option<String>,
}

impl Orchestrator {
    /// Drives one caller turn to DONE or FAILED.
    ///
    /// The sink receives the cumulative content of the current sub-turn after
    /// every content delta. Each tool round increments the iteration counter;
    /// reaching `max_turns` fails with `RecursionLimitExceeded`.
    pub async fn run_turn<S>(
        &self,
        input: TurnInput,
        sink: &S,
    ) -> Result<TurnOutcome, OrchestratorError>
    where
        S: ContentSink + ?Sized,
    {
        let span = info_span!("turn", visitor_id = %input.visitor_id);
        self.run_turn_inner(input, sink).instrument(span).await
    }

    async fn run_turn_inner<S>(
        &self,
        input: TurnInput,
        sink: &S,
    ) -> Result<TurnOutcome, OrchestratorError>
    where
        S: ContentSink + ?Sized,
    {
        let bound = self.config.max_turns.max(1);
        let mut state = TurnState::new(input.messages);

        loop {
            let catalog = self.router.catalog();
            let request =
                build_chat_request(&self.config, &input.visitor_id, &state.messages, &catalog);
            let started = Instant::now();
            self.emit(TurnEvent::TurnStart {
                iteration: state.iteration,
            });
            debug!(
                iteration = state.iteration,
                messages = request.messages.len(),
                tools = request.tools.len(),
                "requesting model stream"
            );

            let summary = self.consume_stream(&mut state, request, sink).await?;
            let calls = std::mem::take(&mut state.fragments).into_calls();
            let request_duration_ms = started.elapsed().as_millis() as u64;

            if calls.is_empty() {
                self.emit(TurnEvent::TurnEnd {
                    iteration: state.iteration,
                    tool_calls: 0,
                    request_duration_ms,
                    finish_reason: summary.finish_reason,
                });
                info!(
                    iterations = state.iteration + 1,
                    chars = state.content.len(),
                    "turn completed"
                );
                let content = std::mem::take(&mut state.content);
                state.messages.push(Message::assistant(content.clone()));
                return Ok(TurnOutcome {
                    content,
                    messages: state.messages,
                    tool_outputs: state.tool_outputs,
                    iterations: state.iteration + 1,
                    usage: state.usage,
                });
            }

            if sink.is_closed() {
                return Err(OrchestratorError::Cancelled);
            }
            let tool_calls = calls.len();
            self.execute_tool_calls(&mut state, calls, sink).await?;
            self.emit(TurnEvent::TurnEnd {
                iteration: state.iteration,
                tool_calls,
                request_duration_ms,
                finish_reason: summary.finish_reason,
            });

            state.iteration += 1;
            if state.iteration >= bound {
                return Err(OrchestratorError::RecursionLimitExceeded(bound));
            }
            if sink.is_closed() {
                return Err(OrchestratorError::Cancelled);
            }
            state.content.clear();
        }
    }

    async fn consume_stream<S>(
        &self,
        state: &mut TurnState,
        request: ChatRequest,
        sink: &S,
    ) -> Result<StreamSummary, OrchestratorError>
    where
        S: ContentSink + ?Sized,
    {
        let mut stream = self.client.stream_chat(request).await?;
        let mut summary = StreamSummary::default();

        while let Some(event) = stream.next().await {
            let event = event?;
            if let Some(text) = event.content.as_deref().filter(|text| !text.is_empty()) {
                state.content.push_str(text);
                if sink.push(state.content.clone()).await.is_err() {
                    debug!(iteration = state.iteration, "sink closed mid-stream");
                    return Err(OrchestratorError::Cancelled);
                }
                self.emit(TurnEvent::ContentUpdated {
                    iteration: state.iteration,
                    chars: state.content.len(),
                });
            }
            for delta in &event.tool_calls {
                state.fragments.apply(delta);
            }
            if let Some(usage) = event.usage {
                state.usage.input_tokens += usage.input_tokens;
                state.usage.output_tokens += usage.output_tokens;
                state.usage.total_tokens += usage.total_tokens;
            }
            if event.finish_reason.is_some() {
                summary.finish_reason = event.finish_reason;
            }
        }

        Ok(summary)
    }
}
