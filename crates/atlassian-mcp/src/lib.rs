//! Atlassian MCP server: Jira and Confluence tools over JSON-RPC, with credentials
//! resolved per request.

pub mod audit;
pub mod client;
pub mod config;
pub mod protocol;
pub mod tools;
pub mod transport;
pub mod types;

pub use audit::{AuditRecord, AuditSink, MemoryAuditSink, NoopAuditSink, TracingAuditSink};
pub use config::{SecurityMode, ServerConfig, UpstreamConfig};
pub use protocol::{ProtocolHandler, RequestScope};
pub use tools::{default_registry, ToolRegistry};
pub use transport::HttpTransport;
