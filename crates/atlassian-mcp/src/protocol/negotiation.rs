//! MCP initialization. The server keeps no handshake state: every call gets the same answer.

use serde_json::Value;

use crate::types::{InitializeParams, InitializeResult, MCP_VERSION};

/// Build the `initialize` result. Client parameters are only logged; malformed or
/// missing parameters never fail the handshake.
pub fn negotiate(params: Option<&Value>) -> InitializeResult {
    let parsed = params
        .cloned()
        .map(serde_json::from_value::<InitializeParams>)
        .transpose();

    match parsed {
        Ok(Some(params)) => {
            if let Some(version) = params
                .protocol_version
                .as_deref()
                .filter(|v| *v != MCP_VERSION)
            {
                tracing::warn!(
                    "Client requested protocol version {version}, server supports {MCP_VERSION}. Proceeding with server version."
                );
            }
            if let Some(client) = params.client_info {
                tracing::info!("Initialized with client: {} v{}", client.name, client.version);
            }
        }
        Ok(None) => tracing::info!("Initialized without client parameters"),
        Err(e) => tracing::debug!("Ignoring unreadable initialize params: {e}"),
    }

    InitializeResult::default_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_negotiate_is_lenient() {
        let full = negotiate(Some(&json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {"name": "test", "version": "1.0"}
        })));
        assert_eq!(full.protocol_version, MCP_VERSION);

        let missing = negotiate(None);
        assert_eq!(missing.server_info.name, crate::types::SERVER_NAME);

        let garbage = negotiate(Some(&json!("not an object")));
        assert_eq!(garbage.protocol_version, MCP_VERSION);
    }
}
