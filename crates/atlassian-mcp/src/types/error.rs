//! Error types and JSON-RPC error codes for the MCP server.

use atlassian_auth::AuthError;

use super::message::{JsonRpcError, RequestId};

/// Standard JSON-RPC 2.0 error codes.
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

/// Implementation-defined server error codes.
pub mod server_error_codes {
    /// Write tool called while the request is in read-only mode.
    pub const WRITE_FORBIDDEN: i32 = -32000;
}

/// All errors that can occur in the MCP server.
#[derive(thiserror::Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    InvalidParams(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Write operations not allowed in readonly mode")]
    ReadOnlyViolation { tool: String },

    /// A tool needed a downstream credential the request did not carry.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Upstream call failed and the tool did not turn it into a business result.
    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A result could not be rendered as JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    pub fn code(&self) -> i32 {
        use error_codes::*;
        use server_error_codes::*;
        match self {
            McpError::ParseError(_) => PARSE_ERROR,
            McpError::InvalidRequest(_) => INVALID_REQUEST,
            McpError::MethodNotFound(_) | McpError::ToolNotFound(_) => METHOD_NOT_FOUND,
            McpError::InvalidParams(_) => INVALID_PARAMS,
            McpError::ReadOnlyViolation { .. } => WRITE_FORBIDDEN,
            McpError::InternalError(_)
            | McpError::Unauthenticated(_)
            | McpError::Upstream(_)
            | McpError::Transport(_)
            | McpError::Io(_)
            | McpError::Json(_) => INTERNAL_ERROR,
        }
    }

    pub fn to_json_rpc_error(&self, id: Option<RequestId>) -> JsonRpcError {
        JsonRpcError::new(id, self.code(), self.to_string())
    }
}

impl From<AuthError> for McpError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingCredential { .. } => McpError::Unauthenticated(e.to_string()),
            other => McpError::InternalError(other.to_string()),
        }
    }
}

pub type McpResult<T> = Result<T, McpError>;
