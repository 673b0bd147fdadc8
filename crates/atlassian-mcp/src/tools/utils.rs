//! Tool: utils_echo

use serde_json::{json, Value};

use super::registry::ToolRegistry;

pub fn register(registry: &mut ToolRegistry) {
    registry.register_read_only(
        "utils_echo",
        "Echo the arguments back unchanged",
        json!({ "type": "object", "properties": {} }),
        |_auth, arguments: Value| async move { Ok(arguments) },
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlassian_auth::AuthContext;

    #[tokio::test]
    async fn test_echo_needs_no_credentials() {
        let mut registry = ToolRegistry::new();
        register(&mut registry);
        let out = registry
            .invoke("utils_echo", &AuthContext::open(None, None), json!({"x": [1, 2]}))
            .await
            .unwrap();
        assert_eq!(out, json!({"x": [1, 2]}));
    }
}
