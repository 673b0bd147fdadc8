//! HTTP transport: JSON-RPC over POST, per-request credentials, and /health.

use std::sync::Arc;

use atlassian_auth::{read_only_requested, AuthContext, CredentialResolver};
use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header::WWW_AUTHENTICATE, HeaderMap, StatusCode},
    middleware,
    response::{IntoResponse, Json as AxumJson, Response},
    routing::{get, post},
    Extension, Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::framing::parse_message;
use crate::protocol::{ProtocolHandler, RequestScope};
use crate::types::{McpError, McpResult};

/// Shared server state passed to all handlers via axum State.
pub struct ServerState {
    pub handler: Arc<ProtocolHandler>,
    pub resolver: CredentialResolver,
}

/// HTTP transport for MCP clients.
pub struct HttpTransport {
    state: Arc<ServerState>,
}

impl HttpTransport {
    pub fn new(handler: ProtocolHandler, resolver: CredentialResolver) -> Self {
        Self {
            state: Arc::new(ServerState {
                handler: Arc::new(handler),
                resolver,
            }),
        }
    }

    /// Routes: `/mcp` and `/mcp/tools` behind credential resolution, `/health` open.
    pub fn router(&self) -> Router {
        let state = self.state.clone();

        Router::new()
            .route("/mcp", post(handle_request))
            .route("/mcp/tools", get(handle_tools))
            .layer(middleware::from_fn_with_state(state.clone(), auth_layer))
            .route("/health", get(handle_health))
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
            .with_state(state)
    }

    /// Serve until Ctrl-C.
    pub async fn run(&self, addr: &str) -> McpResult<()> {
        let app = self.router();

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(McpError::Io)?;

        tracing::info!(
            "HTTP transport listening on {addr} ({} mode)",
            self.state.resolver.mode()
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        tracing::info!("HTTP transport stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Resolves credentials and hands them to the route as an [`AuthContext`] extension.
async fn auth_layer(
    State(state): State<Arc<ServerState>>,
    mut request: Request,
    next: middleware::Next,
) -> Response {
    match state.resolver.resolve(request.headers()) {
        Ok(auth) => {
            request.extensions_mut().insert(auth);
            next.run(request).await
        }
        Err(e) => {
            tracing::error!("Authentication failed: {e}");
            (
                StatusCode::UNAUTHORIZED,
                [(WWW_AUTHENTICATE, "Bearer")],
                format!("Unauthorized: {e}"),
            )
                .into_response()
        }
    }
}

/// Handle one JSON-RPC message. Notifications are acknowledged with 202 and no body.
async fn handle_request(
    State(state): State<Arc<ServerState>>,
    Extension(auth): Extension<AuthContext>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let msg = match parse_message(&body) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!("Rejected message: {e}");
            return (StatusCode::BAD_REQUEST, AxumJson(e.to_json_rpc_error(None))).into_response();
        }
    };

    let scope = RequestScope::new(auth, read_only_requested(&headers));
    match state.handler.handle_message(msg, &scope).await {
        Some(response) => AxumJson(response).into_response(),
        None => StatusCode::ACCEPTED.into_response(),
    }
}

/// Every registered tool, independent of the read-only flag.
async fn handle_tools(State(state): State<Arc<ServerState>>) -> Response {
    AxumJson(state.handler.catalogue()).into_response()
}

/// Health check endpoint, no auth required.
async fn handle_health(State(state): State<Arc<ServerState>>) -> AxumJson<serde_json::Value> {
    AxumJson(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.resolver.mode(),
        "tools": state.handler.registry().len(),
    }))
}
