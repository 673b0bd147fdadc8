//! Atlassian auth: per-request credential resolution, bearer forwarding and JWS/JWE verification.

pub mod resolver;
pub mod secret;
pub mod token;
pub mod types;

pub use resolver::{
    read_only_requested, CredentialResolver, AUTHORIZATION_HEADER, CONFLUENCE_TOKEN_HEADER,
    JIRA_TOKEN_HEADER, READ_ONLY_HEADER,
};
pub use secret::{SharedSecret, MIN_SECRET_BYTES};
pub use token::{classify, TokenKind, TokenVerifier, VerifiedClaims};
pub use types::*;
