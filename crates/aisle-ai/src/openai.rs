use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::retry::{new_request_id, parse_retry_after_ms, RetryPolicy};
use crate::{
    stream_from_events, AisleAiError, ChatEventStream, ChatRequest, ChatUsage, LlmClient, Message,
    StreamEvent, ToolCallDelta, ToolChoice, ToolDefinition,
};

const STREAM_DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Clone)]
/// Public struct `OpenAiConfig` for chat-completions compatible endpoints.
pub struct OpenAiConfig {
    pub api_base: String,
    pub api_key: String,
    pub organization: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_budget_ms: u64,
    pub retry_jitter: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            organization: None,
            request_timeout_ms: 120_000,
            max_retries: 2,
            retry_budget_ms: 0,
            retry_jitter: true,
        }
    }
}

#[derive(Debug, Clone)]
/// Streaming chat-completions client.
pub struct OpenAiClient {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiClient {
    pub fn new(config: OpenAiConfig) -> Result<Self, AisleAiError> {
        if config.api_key.trim().is_empty() {
            return Err(AisleAiError::MissingApiKey);
        }

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let bearer = format!("Bearer {}", config.api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&bearer).map_err(|e| {
                AisleAiError::InvalidResponse(format!("invalid API key header: {e}"))
            })?,
        );
        if let Some(org) = &config.organization {
            headers.insert(
                "OpenAI-Organization",
                HeaderValue::from_str(org).map_err(|e| {
                    AisleAiError::InvalidResponse(format!("invalid organization header: {e}"))
                })?,
            );
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self { client, config })
    }

    fn chat_completions_url(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            return base.to_string();
        }
        format!("{base}/chat/completions")
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.config.max_retries,
            budget_ms: self.config.retry_budget_ms,
            jitter: self.config.retry_jitter,
        }
    }

    async fn send_with_retry(&self, body: &Value) -> Result<reqwest::Response, AisleAiError> {
        let url = self.chat_completions_url();
        let policy = self.retry_policy();
        let started = Instant::now();
        let mut attempt = 0usize;

        loop {
            let outcome = self
                .client
                .post(&url)
                .header("x-aisle-request-id", new_request_id())
                .header("x-aisle-retry-attempt", attempt.to_string())
                .json(body)
                .send()
                .await;
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match outcome {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retry_after_ms = parse_retry_after_ms(response.headers());
                    let raw = response.text().await?;
                    let delay = policy
                        .should_retry_status(attempt, status)
                        .then(|| policy.next_delay_ms(attempt, elapsed_ms, retry_after_ms))
                        .flatten();
                    let Some(delay_ms) = delay else {
                        return Err(AisleAiError::HttpStatus { status, body: raw });
                    };
                    warn!(status, attempt, delay_ms, "retrying chat completion request");
                    sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(error) => {
                    let delay = policy
                        .should_retry_error(attempt, &error)
                        .then(|| policy.next_delay_ms(attempt, elapsed_ms, None))
                        .flatten();
                    let Some(delay_ms) = delay else {
                        return Err(AisleAiError::Http(error));
                    };
                    warn!(%error, attempt, delay_ms, "retrying chat completion request");
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
            attempt += 1;
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChatEventStream, AisleAiError> {
        let mut body = build_chat_request_body(&request);
        body["stream"] = json!(true);
        let response = self.send_with_retry(&body).await?;

        let is_event_stream = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_ascii_lowercase().contains("text/event-stream"))
            .unwrap_or(false);
        if is_event_stream {
            return Ok(decode_chat_stream(response));
        }

        debug!("provider answered a stream request with a complete response");
        let raw = response.text().await?;
        let events = parse_chat_response_events(&raw)?;
        Ok(stream_from_events(events.into_iter().map(Ok).collect()))
    }
}

pub(crate) fn build_chat_request_body(request: &ChatRequest) -> Value {
    let mut body = json!({
        "model": request.model,
        "messages": to_openai_messages(&request.messages),
    });

    if !request.tools.is_empty() {
        body["tools"] = to_openai_tools(&request.tools);
        if let Some(tool_choice) = request.tool_choice {
            body["tool_choice"] = json!(to_openai_tool_choice(tool_choice));
        }
    }
    if let Some(temperature) = request.temperature {
        body["temperature"] = json!(temperature);
    }
    if let Some(max_tokens) = request.max_tokens {
        body["max_tokens"] = json!(max_tokens);
    }
    body
}

fn to_openai_messages(messages: &[Message]) -> Value {
    Value::Array(
        messages
            .iter()
            .map(|message| {
                json!({
                    "role": message.role.as_str(),
                    "content": message.content,
                })
            })
            .collect(),
    )
}

fn to_openai_tools(tools: &[ToolDefinition]) -> Value {
    Value::Array(
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    )
}

fn to_openai_tool_choice(tool_choice: ToolChoice) -> &'static str {
    match tool_choice {
        ToolChoice::Auto => "auto",
        ToolChoice::None => "none",
        ToolChoice::Required => "required",
    }
}

struct SseDecodeState {
    bytes: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<StreamEvent, AisleAiError>>,
    finished: bool,
}

impl SseDecodeState {
    fn push_chunk(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
        while let Some(pos) = self.buffer.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.push_line(&line);
            if self.finished {
                self.buffer.clear();
                return;
            }
        }
    }

    /// End of body. Anything short of the `[DONE]` sentinel is a dropped
    /// connection, never a complete answer.
    fn flush_trailing(&mut self) {
        let trailing = std::mem::take(&mut self.buffer);
        if !trailing.is_empty() {
            self.push_line(&trailing);
        }
        if !self.finished {
            self.fail(AisleAiError::InvalidResponse(
                "stream ended before [DONE]".to_string(),
            ));
        }
    }

    fn push_line(&mut self, raw: &[u8]) {
        let line = match std::str::from_utf8(raw) {
            Ok(line) => line.trim(),
            Err(error) => {
                self.fail(AisleAiError::InvalidResponse(format!(
                    "invalid UTF-8 in streaming response: {error}"
                )));
                return;
            }
        };
        let Some(data) = line.strip_prefix("data:") else {
            return;
        };
        let data = data.trim();
        if data == STREAM_DONE_SENTINEL {
            self.finished = true;
            return;
        }
        match parse_stream_data(data) {
            Ok(Some(event)) => self.pending.push_back(Ok(event)),
            Ok(None) => {}
            Err(error) => self.fail(error),
        }
    }

    fn fail(&mut self, error: AisleAiError) {
        self.pending.push_back(Err(error));
        self.finished = true;
    }
}

/// Turns an SSE chat-completions body into stream events, one per `data:` frame.
///
/// Frames are split on raw bytes so multi-byte characters that straddle
/// network chunks decode correctly. The first error ends the stream.
fn decode_chat_stream(response: reqwest::Response) -> ChatEventStream {
    let state = SseDecodeState {
        bytes: response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed(),
        buffer: Vec::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(chunk)) => state.push_chunk(&chunk),
                Some(Err(error)) => state.fail(AisleAiError::Http(error)),
                None => state.flush_trailing(),
            }
        }
    }))
}

pub(crate) fn parse_stream_data(data: &str) -> Result<Option<StreamEvent>, AisleAiError> {
    let chunk: OpenAiStreamChunk = serde_json::from_str(data).map_err(|error| {
        AisleAiError::InvalidResponse(format!("failed to parse OpenAI stream chunk: {error}"))
    })?;

    let mut event = StreamEvent {
        usage: chunk.usage.map(ChatUsage::from),
        ..StreamEvent::default()
    };
    for choice in chunk.choices {
        if let Some(reason) = choice.finish_reason {
            event.finish_reason = Some(reason);
        }
        let Some(delta) = choice.delta else {
            continue;
        };
        if let Some(text) = delta.content.filter(|text| !text.is_empty()) {
            event
                .content
                .get_or_insert_with(String::new)
                .push_str(&text);
        }
        for call in delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = call
                .function
                .map(|function| (function.name, function.arguments))
                .unwrap_or_default();
            event.tool_calls.push(ToolCallDelta {
                index: call.index,
                id: call.id.filter(|id| !id.is_empty()),
                name: name.filter(|name| !name.is_empty()),
                arguments,
            });
        }
    }

    Ok((!event.is_empty()).then_some(event))
}

/// Expands a non-streamed completion into the equivalent stream events.
pub(crate) fn parse_chat_response_events(raw: &str) -> Result<Vec<StreamEvent>, AisleAiError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(raw)?;
    let choice = parsed.choices.into_iter().next().ok_or_else(|| {
        AisleAiError::InvalidResponse("chat completion contained no choices".to_string())
    })?;

    let mut events = Vec::new();
    if let Some(text) = choice.message.content.filter(|text| !text.is_empty()) {
        events.push(StreamEvent::content(text));
    }
    for (index, call) in choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
    {
        events.push(StreamEvent::tool_call(ToolCallDelta {
            index,
            id: Some(call.id),
            name: Some(call.function.name),
            arguments: Some(call.function.arguments),
        }));
    }
    events.push(StreamEvent {
        finish_reason: choice.finish_reason,
        usage: parsed.usage.map(ChatUsage::from),
        ..StreamEvent::default()
    });
    Ok(events)
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiToolCall {
    id: String,
    function: OpenAiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct OpenAiFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAiUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl From<OpenAiUsage> for ChatUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    delta: Option<OpenAiStreamDelta>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<OpenAiStreamToolCallDelta>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamToolCallDelta {
    index: usize,
    id: Option<String>,
    function: Option<OpenAiStreamFunctionDelta>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamFunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
