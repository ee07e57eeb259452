//! Model client surface: conversation types, the streaming `LlmClient`
//! contract and the chat-completions provider.
mod openai;
mod retry;
mod types;

pub use openai::{OpenAiClient, OpenAiConfig};
pub use retry::{
    backoff_ms, backoff_ms_with_jitter, is_retryable_status, parse_retry_after_ms, RetryPolicy,
};
pub use types::{
    stream_from_events, AisleAiError, ChatEventStream, ChatRequest, ChatUsage, LlmClient, Message,
    MessageRole, StreamEvent, ToolCallDelta, ToolChoice, ToolDefinition,
};
