//! MCP tool implementations for Jira and Confluence.

pub mod confluence;
pub mod cql;
pub mod jira;
pub mod registry;
pub mod utils;

pub use registry::{ToolFuture, ToolHandler, ToolMetadata, ToolRegistry};

use std::future::Future;
use std::sync::Arc;

use atlassian_auth::AuthContext;
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::client::{ClientFactory, ClientResult};
use crate::types::{McpError, McpResult};

/// Registry holding the full Jira, Confluence and utility catalogue.
pub fn default_registry(clients: Arc<ClientFactory>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    jira::register(&mut registry, &clients);
    confluence::register(&mut registry, &clients);
    utils::register(&mut registry);
    tracing::debug!("Registered {} tools", registry.len());
    registry
}

/// Adapt an upstream tool function into a registry handler bound to `clients`.
pub(crate) fn bind<F, Fut>(
    clients: &Arc<ClientFactory>,
    tool: F,
) -> impl Fn(AuthContext, Value) -> Fut + Send + Sync + 'static
where
    F: Fn(Arc<ClientFactory>, AuthContext, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = McpResult<Value>> + Send + 'static,
{
    let clients = clients.clone();
    move |auth, arguments| tool(clients.clone(), auth, arguments)
}

/// Decode tool arguments, reporting shape problems as invalid params.
pub(crate) fn parse_params<T: DeserializeOwned>(arguments: Value) -> McpResult<T> {
    serde_json::from_value(arguments).map_err(|e| McpError::InvalidParams(e.to_string()))
}

/// Reject a blank required string argument.
pub(crate) fn require_non_blank(value: &str, name: &str) -> McpResult<()> {
    if value.trim().is_empty() {
        return Err(McpError::InvalidParams(format!("{name} is required")));
    }
    Ok(())
}

/// Accept either a JSON object or a string holding one.
pub(crate) fn object_argument(value: Option<Value>, name: &str) -> McpResult<Option<Map<String, Value>>> {
    let invalid = |detail: String| McpError::InvalidParams(format!("{name} must be a JSON object{detail}"));
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(None),
        Some(Value::String(text)) => match serde_json::from_str(&text) {
            Ok(Value::Object(map)) => Ok(Some(map)),
            Ok(_) => Err(invalid(String::new())),
            Err(e) => Err(invalid(format!(": {e}"))),
        },
        Some(_) => Err(invalid(String::new())),
    }
}

/// Failure payload returned to the caller in place of a protocol error.
pub(crate) fn failure(error: impl std::fmt::Display) -> Value {
    json!({ "success": false, "error": error.to_string() })
}

/// Shape a successful upstream response, or turn its failure into a `success: false` result.
pub(crate) fn settle(result: ClientResult<Value>, shape: impl FnOnce(Value) -> Value) -> McpResult<Value> {
    Ok(match result {
        Ok(body) => shape(body),
        Err(e) => {
            tracing::warn!("Upstream call failed: {e}");
            failure(e)
        }
    })
}

/// Like [`settle`], echoing one identifying argument back in the failure payload.
pub(crate) fn settle_with(
    result: ClientResult<Value>,
    context: (&str, &str),
    shape: impl FnOnce(Value) -> Value,
) -> McpResult<Value> {
    let mut out = settle(result, shape)?;
    if out["success"] == false {
        out[context.0] = Value::String(context.1.to_string());
    }
    Ok(out)
}

/// String at a JSON pointer, or empty.
pub(crate) fn text_at(value: &Value, pointer: &str) -> String {
    match value.pointer(pointer) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientError;
    use crate::config::UpstreamConfig;

    #[test]
    fn test_default_registry_catalogue() {
        let clients = Arc::new(ClientFactory::new(&UpstreamConfig::default()).unwrap());
        let registry = default_registry(clients);

        assert_eq!(registry.len(), 27);
        for name in ["jira_get_issue", "jira_search", "confluence_get_page", "utils_echo"] {
            assert!(registry.metadata_for(name).unwrap().read_only, "{name}");
        }
        for name in [
            "jira_create_issue",
            "jira_delete_issue",
            "jira_transition_issue",
            "confluence_create_page",
            "confluence_add_label",
            "confluence_delete_page",
        ] {
            assert!(!registry.metadata_for(name).unwrap().read_only, "{name}");
        }
        for meta in registry.all_metadata() {
            assert_eq!(meta.input_schema["type"], "object", "{}", meta.name);
        }
    }

    #[test]
    fn test_object_argument() {
        assert!(object_argument(None, "f").unwrap().is_none());
        assert_eq!(
            object_argument(Some(json!({"a": 1})), "f").unwrap().unwrap()["a"],
            1
        );
        assert_eq!(
            object_argument(Some(json!("{\"a\": 2}")), "f").unwrap().unwrap()["a"],
            2
        );
        assert!(matches!(
            object_argument(Some(json!("[1]")), "f"),
            Err(McpError::InvalidParams(_))
        ));
        assert!(matches!(
            object_argument(Some(json!(3)), "f"),
            Err(McpError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_settle_downgrades_upstream_failure() {
        let err = ClientError::Status {
            status: 404,
            body: "gone".into(),
        };
        let out = settle_with(Err(err), ("issue_key", "A-1"), |v| v).unwrap();
        assert_eq!(out["success"], false);
        assert_eq!(out["issue_key"], "A-1");
        assert!(out["error"].as_str().unwrap().contains("404"));

        let ok = settle_with(Ok(json!({"x": 1})), ("issue_key", "A-1"), |v| v).unwrap();
        assert!(ok.get("issue_key").is_none());
    }

    #[test]
    fn test_text_at() {
        let v = json!({"a": {"b": "x", "n": 3, "z": null}});
        assert_eq!(text_at(&v, "/a/b"), "x");
        assert_eq!(text_at(&v, "/a/n"), "3");
        assert_eq!(text_at(&v, "/a/z"), "");
        assert_eq!(text_at(&v, "/missing"), "");
    }
}
