//! Payloads of `tools/list`, `tools/call` and the catalogue listing.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::capabilities::Implementation;

/// Arguments of `tools/call`. Missing `arguments` are treated as an empty object.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub content: Vec<ToolContent>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl ToolCallResult {
    pub fn text(text: String) -> Self {
        Self {
            content: vec![ToolContent::Text { text }],
            is_error: false,
        }
    }

    /// Wrap a tool result as a single compact-JSON text block.
    pub fn json(value: &impl Serialize) -> Self {
        let text = serde_json::to_string(value).unwrap_or_else(|e| e.to_string());
        Self::text(text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolListResult {
    pub tools: Vec<ToolDefinition>,
    #[serde(default, rename = "nextCursor", skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

/// Server identity reported by the catalogue listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogueServerInfo {
    #[serde(flatten)]
    pub implementation: Implementation,
    pub protocol: String,
}

/// Side-channel listing of every registered tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCatalogue {
    pub server_info: CatalogueServerInfo,
    pub total_tools: usize,
    pub tools: Vec<ToolDefinition>,
}
