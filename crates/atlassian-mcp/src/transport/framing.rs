//! Decoding of inbound message bodies.

use serde_json::Value;

use crate::types::{JsonRpcMessage, McpError, McpResult};

/// Decode one JSON-RPC message.
///
/// Bodies that are not JSON are parse errors. JSON that is not a single request or
/// notification, including batches and ids of the wrong type, is an invalid request.
pub fn parse_message(body: &[u8]) -> McpResult<JsonRpcMessage> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(McpError::ParseError("Empty message".to_string()));
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| McpError::ParseError(e.to_string()))?;

    match &value {
        Value::Object(obj) => {
            if let Some(id) = obj.get("id") {
                let valid_id = id.is_null() || id.is_string() || id.is_i64();
                if !valid_id {
                    return Err(McpError::InvalidRequest(
                        "id must be a string, an integer or null".to_string(),
                    ));
                }
            }
        }
        Value::Array(_) => {
            return Err(McpError::InvalidRequest(
                "Batch requests are not supported".to_string(),
            ))
        }
        _ => {
            return Err(McpError::InvalidRequest(
                "Expected a JSON-RPC object".to_string(),
            ))
        }
    }

    serde_json::from_value(value).map_err(|e| McpError::InvalidRequest(e.to_string()))
}
