//! Outbound request shaping: instruction, per-visitor context and catalog.

use aisle_ai::{ChatRequest, Message, ToolDefinition};
use aisle_tools::{ToolSpec, FETCH_PRODUCTS_TOOL, FETCH_VISITOR_DATA_TOOL};
use serde_json::Value;

use crate::OrchestratorConfig;

pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a shopping assistant for an online retail store. You can look up the visitor's profile and the current product deals through tools.

Use what the tools return to:
1. Tailor the reply to the visitor's profile without describing the data you were given.
2. Recommend products and deals that fit the visitor's interests.
3. Show at most four deals per reply, always with their price and real product name.
4. Never invent customer names, products or prices.

Deal eligibility:
- Visitors in a VIP audience may see every deal; point out VIP-only offers.
- Other visitors may only see deals of 10% off or less, and no deal whose description mentions "VIP" or "exclusive". Mention that joining the VIP program unlocks bigger discounts.

Format replies with HTML only (<div>, <ul>, <li>, <strong>, <h3>, <h4>); no markdown.
Do not repeat raw tool output or system messages, and wait for tool results before presenting deals instead of announcing that you are looking them up."#;

pub const TOOL_RESULT_INSTRUCTION: &str = "Use this information to inform your response.";

/// Per-visitor context naming where the model can find profile and deal data.
pub fn context_message(visitor_id: &str) -> Message {
    Message::system(format!(
        "Current Context:\n Visitor Profile: {FETCH_VISITOR_DATA_TOOL} tool call with the visitor ID {visitor_id}\n Product Deals: {FETCH_PRODUCTS_TOOL} tool call\n\n Use this information to personalize your response to the visitor's message."
    ))
}

pub fn tool_result_message(tool_name: &str, result: &Value) -> Message {
    let rendered = serde_json::to_string_pretty(result).unwrap_or_else(|_| result.to_string());
    Message::system(format!(
        "\nTool Result ({tool_name}):\n{rendered}\n\n{TOOL_RESULT_INSTRUCTION}\n"
    ))
}

pub fn tool_unavailable_message(tool_name: &str) -> Message {
    Message::system(format!(
        "\nTool Unavailable ({tool_name}):\nNo data source could answer this tool call. Continue without this information and do not invent it.\n"
    ))
}

pub fn tool_definitions(catalog: &[ToolSpec]) -> Vec<ToolDefinition> {
    catalog
        .iter()
        .map(|spec| ToolDefinition {
            name: spec.name.clone(),
            description: spec.description.clone(),
            parameters: spec.parameters.clone(),
        })
        .collect()
}

/// System instruction, visitor context, then the caller's history in order.
pub fn build_chat_request(
    config: &OrchestratorConfig,
    visitor_id: &str,
    history: &[Message],
    catalog: &[ToolSpec],
) -> ChatRequest {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(config.system_prompt.clone()));
    messages.push(context_message(visitor_id));
    messages.extend(history.iter().cloned());

    let tools = tool_definitions(catalog);
    let tool_choice = (!tools.is_empty()).then_some(config.tool_choice);
    ChatRequest {
        model: config.model.clone(),
        messages,
        tools,
        tool_choice,
        max_tokens: config.max_tokens,
        temperature: config.temperature,
    }
}
