//! Request dispatcher: receives JSON-RPC messages and routes them to protocol methods or tools.

use std::sync::Arc;

use atlassian_auth::{AuthContext, AuthMode};
use serde_json::{Map, Value};

use crate::audit::{AuditRecord, AuditSink, NoopAuditSink};
use crate::tools::ToolRegistry;
use crate::types::*;

use super::negotiation::negotiate;
use super::validator::validate_request;

/// Per-request state handed to the dispatcher alongside each message.
#[derive(Debug, Clone)]
pub struct RequestScope {
    pub auth: AuthContext,
    pub read_only: bool,
}

impl RequestScope {
    pub fn new(auth: AuthContext, read_only: bool) -> Self {
        Self { auth, read_only }
    }
}

/// Method routing. Anything that is not a protocol method is treated as a tool name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method<'a> {
    Initialize,
    Initialized,
    Ping,
    ToolsList,
    ToolsCall,
    Tool(&'a str),
}

impl<'a> Method<'a> {
    fn parse(method: &'a str) -> Self {
        match method {
            "initialize" => Method::Initialize,
            "initialized" | "notifications/initialized" => Method::Initialized,
            "ping" => Method::Ping,
            "tools/list" => Method::ToolsList,
            "tools/call" => Method::ToolsCall,
            other => Method::Tool(other),
        }
    }
}

fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// The main protocol handler that dispatches incoming JSON-RPC messages.
///
/// Holds no per-client state. Credentials and the read-only flag arrive with every
/// message in a [`RequestScope`].
pub struct ProtocolHandler {
    registry: Arc<ToolRegistry>,
    audit: Arc<dyn AuditSink>,
}

impl ProtocolHandler {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self::with_audit(registry, Arc::new(NoopAuditSink))
    }

    pub fn with_audit(registry: Arc<ToolRegistry>, audit: Arc<dyn AuditSink>) -> Self {
        Self { registry, audit }
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Every registered tool, for the side-channel listing.
    pub fn catalogue(&self) -> ToolCatalogue {
        let tools = self.registry.definitions(false);
        ToolCatalogue {
            server_info: CatalogueServerInfo {
                implementation: Implementation::server(),
                protocol: MCP_VERSION.to_string(),
            },
            total_tools: tools.len(),
            tools,
        }
    }

    /// Handle one message. Requests always yield a response; notifications never do.
    pub async fn handle_message(&self, msg: JsonRpcMessage, scope: &RequestScope) -> Option<Value> {
        match msg {
            JsonRpcMessage::Request(req) => Some(self.handle_request(req, scope).await),
            JsonRpcMessage::Notification(notif) => {
                self.handle_notification(notif, scope).await;
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest, scope: &RequestScope) -> Value {
        let id = request.id.clone();
        if let Err(e) = validate_request(&request) {
            return serde_json::to_value(e.to_json_rpc_error(Some(id))).unwrap_or_default();
        }

        match self.dispatch(&request.method, request.params, scope).await {
            Ok(value) => serde_json::to_value(JsonRpcResponse::new(id, value)).unwrap_or_default(),
            Err(e) => {
                tracing::error!("{} failed: {e}", request.method);
                serde_json::to_value(e.to_json_rpc_error(Some(id))).unwrap_or_default()
            }
        }
    }

    async fn handle_notification(&self, notification: JsonRpcNotification, scope: &RequestScope) {
        match self
            .dispatch(&notification.method, notification.params, scope)
            .await
        {
            Ok(_) => tracing::debug!("Handled notification: {}", notification.method),
            Err(e) => tracing::debug!("Notification {} failed: {e}", notification.method),
        }
    }

    async fn dispatch(
        &self,
        method: &str,
        params: Option<Value>,
        scope: &RequestScope,
    ) -> McpResult<Value> {
        match Method::parse(method) {
            Method::Initialize => {
                serde_json::to_value(negotiate(params.as_ref())).map_err(McpError::from)
            }
            Method::Initialized => {
                tracing::info!("MCP handshake complete");
                Ok(empty_object())
            }
            Method::Ping => Ok(empty_object()),
            Method::ToolsList => self.handle_tools_list(scope),
            Method::ToolsCall => self.handle_tools_call(params, scope).await,
            Method::Tool(name) => self.handle_direct_call(name, params, scope).await,
        }
    }

    fn handle_tools_list(&self, scope: &RequestScope) -> McpResult<Value> {
        let result = ToolListResult {
            tools: self.registry.definitions(scope.read_only),
            next_cursor: None,
        };
        serde_json::to_value(result).map_err(|e| McpError::InternalError(e.to_string()))
    }

    async fn handle_tools_call(
        &self,
        params: Option<Value>,
        scope: &RequestScope,
    ) -> McpResult<Value> {
        let call_params: ToolCallParams = params
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::InvalidParams(e.to_string()))?
            .ok_or_else(|| McpError::InvalidParams("Tool call params required".to_string()))?;

        if call_params.name.is_empty() {
            return Err(McpError::InvalidParams("Tool name required".to_string()));
        }
        let name = call_params.name.as_str();
        let arguments = call_params.arguments.unwrap_or_else(empty_object);

        if !self.registry.has(name) {
            return Err(McpError::ToolNotFound(name.to_string()));
        }
        self.check_read_only(name, scope)?;

        let result = self.invoke_audited(name, arguments, scope).await?;
        serde_json::to_value(ToolCallResult::json(&result))
            .map_err(|e| McpError::InternalError(e.to_string()))
    }

    /// A method named after a tool invokes it directly and returns the raw result.
    async fn handle_direct_call(
        &self,
        name: &str,
        params: Option<Value>,
        scope: &RequestScope,
    ) -> McpResult<Value> {
        if !self.registry.has(name) {
            return Err(McpError::MethodNotFound(name.to_string()));
        }
        self.check_read_only(name, scope)?;
        self.invoke_audited(name, params.unwrap_or_else(empty_object), scope)
            .await
    }

    fn check_read_only(&self, name: &str, scope: &RequestScope) -> McpResult<()> {
        let writes = self
            .registry
            .metadata_for(name)
            .is_some_and(|meta| !meta.read_only);
        if scope.read_only && writes {
            tracing::warn!("Blocked write tool {name} in readonly mode");
            return Err(McpError::ReadOnlyViolation {
                tool: name.to_string(),
            });
        }
        Ok(())
    }

    /// Invoke a tool, then record the call when the caller has a verified identity.
    async fn invoke_audited(
        &self,
        name: &str,
        arguments: Value,
        scope: &RequestScope,
    ) -> McpResult<Value> {
        let auditable = match (scope.auth.mode(), scope.auth.user_id()) {
            (AuthMode::Verified, Some(user)) => Some((user, arguments.clone())),
            _ => None,
        };

        let result = self.registry.invoke(name, &scope.auth, arguments).await?;

        if let Some((user, arguments)) = auditable {
            let record = AuditRecord::new(user, name, &arguments);
            if let Err(e) = self.audit.record(&record) {
                tracing::warn!("Failed to write audit record for {name}: {e}");
            }
        }

        Ok(result)
    }
}
