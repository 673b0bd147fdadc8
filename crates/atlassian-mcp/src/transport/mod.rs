//! Transport layer: HTTP server and message framing.

pub mod framing;
pub mod http;

pub use framing::parse_message;
pub use http::{HttpTransport, ServerState};
