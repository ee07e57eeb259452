use aisle_tools::RouterError;
use tracing::{info, warn};

use crate::context::{tool_result_message, tool_unavailable_message};
use crate::{
    ContentSink, Orchestrator, OrchestratorError, ToolCallFragment, TurnEvent, TurnState,
};

impl Orchestrator {
    /// Runs one sub-turn's tool calls sequentially in index order.
    ///
    /// A closed sink is checked before each dispatch; a call already running
    /// is awaited to completion.
    pub(crate) async fn execute_tool_calls<S>(
        &self,
        state: &mut TurnState,
        calls: Vec<ToolCallFragment>,
        sink: &S,
    ) -> Result<(), OrchestratorError>
    where
        S: ContentSink + ?Sized,
    {
        for call in calls {
            if sink.is_closed() {
                return Err(OrchestratorError::Cancelled);
            }

            let tool_name = call.tool_name().to_string();
            let tool_call_id = call.call_id();
            let arguments =
                call.parse_arguments()
                    .map_err(|error| OrchestratorError::ArgumentParse {
                        tool: tool_name.clone(),
                        detail: error.to_string(),
                    })?;

            info!(
                tool = %tool_name,
                call_id = %tool_call_id,
                iteration = state.iteration,
                "executing tool call"
            );
            self.emit(TurnEvent::ToolExecutionStart {
                tool_call_id: tool_call_id.clone(),
                tool_name: tool_name.clone(),
                arguments: arguments.clone(),
            });

            let success = match self.router.call(&tool_name, arguments).await {
                Ok(result) => {
                    state.messages.push(tool_result_message(&tool_name, &result));
                    state.tool_outputs.insert(tool_name.clone(), result);
                    true
                }
                Err(RouterError::ToolNotFound(_)) | Err(RouterError::BatchUnsatisfied(_)) => {
                    warn!(tool = %tool_name, "no registry answered tool call; continuing without it");
                    state.messages.push(tool_unavailable_message(&tool_name));
                    false
                }
            };

            self.emit(TurnEvent::ToolExecutionEnd {
                tool_call_id,
                tool_name,
                success,
            });
        }
        Ok(())
    }
}
