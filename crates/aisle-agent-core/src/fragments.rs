//! Reassembly of tool-call requests that arrive split across stream events.

use std::collections::BTreeMap;

use aisle_ai::ToolCallDelta;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
/// Partial tool call at one stream index.
pub struct ToolCallFragment {
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: String,
}

impl ToolCallFragment {
    fn absorb(&mut self, delta: &ToolCallDelta) {
        if self.id.is_none() {
            self.id = delta.id.clone();
        }
        if self.name.is_none() {
            self.name = delta.name.clone();
        }
        if let Some(text) = &delta.arguments {
            self.arguments.push_str(text);
        }
    }

    pub fn tool_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    /// Call id as sent by the model, or a stable index-based fallback.
    pub fn call_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("call_{}", self.index))
    }

    /// An empty (or whitespace-only) buffer means the call takes no arguments.
    pub fn parse_arguments(&self) -> Result<Value, serde_json::Error> {
        if self.arguments.trim().is_empty() {
            return Ok(Value::Object(serde_json::Map::new()));
        }
        serde_json::from_str(&self.arguments)
    }
}

#[derive(Debug, Clone, Default)]
/// Fragments keyed by stream index; iteration is in index order.
pub struct FragmentAccumulator {
    fragments: BTreeMap<usize, ToolCallFragment>,
}

impl FragmentAccumulator {
    pub fn apply(&mut self, delta: &ToolCallDelta) {
        self.fragments
            .entry(delta.index)
            .or_insert_with(|| ToolCallFragment {
                index: delta.index,
                ..ToolCallFragment::default()
            })
            .absorb(delta);
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn get(&self, index: usize) -> Option<&ToolCallFragment> {
        self.fragments.get(&index)
    }

    pub fn into_calls(self) -> Vec<ToolCallFragment> {
        self.fragments.into_values().collect()
    }
}
