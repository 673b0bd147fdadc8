//! Core types: authentication modes, downstream systems, and the per-request context.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How inbound requests are authenticated. Selected once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Bearer tokens are forwarded to the downstream systems unverified.
    Open,
    /// The bearer is a signed or encrypted token checked against a shared secret.
    Verified,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Open => write!(f, "open"),
            AuthMode::Verified => write!(f, "verified"),
        }
    }
}

/// A downstream system a tool talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Downstream {
    Jira,
    Confluence,
}

impl Downstream {
    /// Header carrying this system's token.
    pub fn header_name(&self) -> &'static str {
        match self {
            Downstream::Jira => crate::resolver::JIRA_TOKEN_HEADER,
            Downstream::Confluence => crate::resolver::CONFLUENCE_TOKEN_HEADER,
        }
    }
}

impl fmt::Display for Downstream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Downstream::Jira => write!(f, "Jira"),
            Downstream::Confluence => write!(f, "Confluence"),
        }
    }
}

/// Credentials resolved for a single inbound request.
///
/// Built once by the [`CredentialResolver`](crate::CredentialResolver) and handed to the
/// dispatcher by value. Never stored beyond the request that produced it.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthContext {
    mode: AuthMode,
    jira_token: Option<String>,
    confluence_token: Option<String>,
    user_id: Option<String>,
}

impl AuthContext {
    /// Context for OPEN mode. There is never a user identity.
    pub fn open(jira_token: Option<String>, confluence_token: Option<String>) -> Self {
        Self {
            mode: AuthMode::Open,
            jira_token,
            confluence_token,
            user_id: None,
        }
    }

    /// Context for VERIFIED mode, carrying the verified subject.
    pub fn verified(
        user_id: impl Into<String>,
        jira_token: Option<String>,
        confluence_token: Option<String>,
    ) -> Self {
        Self {
            mode: AuthMode::Verified,
            jira_token,
            confluence_token,
            user_id: Some(user_id.into()),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn jira_token(&self) -> Option<&str> {
        self.jira_token.as_deref()
    }

    pub fn confluence_token(&self) -> Option<&str> {
        self.confluence_token.as_deref()
    }

    /// Token for `system`, if the request supplied one.
    pub fn token_for(&self, system: Downstream) -> Option<&str> {
        match system {
            Downstream::Jira => self.jira_token(),
            Downstream::Confluence => self.confluence_token(),
        }
    }

    /// Token for `system`, or an unauthenticated failure naming what the caller must send.
    pub fn require_token(&self, system: Downstream) -> AuthResult<&str> {
        self.token_for(system).ok_or(AuthError::MissingCredential {
            system,
            mode: self.mode,
        })
    }
}

impl fmt::Debug for AuthContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("AuthContext")
            .field("mode", &self.mode)
            .field("jira_token", &redact(&self.jira_token))
            .field("confluence_token", &redact(&self.confluence_token))
            .field("user_id", &self.user_id)
            .finish()
    }
}

fn missing_credential_hint(system: &Downstream, mode: &AuthMode) -> String {
    match mode {
        AuthMode::Verified => format!(
            "{} header required in JWT mode",
            system.header_name().to_ascii_uppercase()
        ),
        AuthMode::Open => "Authorization: Bearer <token> required".to_string(),
    }
}

/// Errors raised while resolving or verifying credentials.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    #[error("Missing Authorization: Bearer header")]
    MissingBearer,

    #[error("Malformed Authorization header")]
    MalformedAuthorization,

    #[error("Malformed token: expected 3 or 5 segments, found {0}")]
    MalformedToken(usize),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Unsupported token algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Token signature verification failed")]
    InvalidSignature,

    #[error("Token decryption failed")]
    DecryptionFailed,

    #[error("Token has expired")]
    Expired,

    #[error("Token is not yet valid")]
    NotYetValid,

    #[error("Token has no subject claim")]
    MissingSubject,

    #[error("Shared secret is too short: {len} bytes, at least {min} required")]
    WeakSecret { len: usize, min: usize },

    #[error("No {system} token. {}", missing_credential_hint(.system, .mode))]
    MissingCredential { system: Downstream, mode: AuthMode },
}

/// Convenience result type.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_tokens() {
        let ctx = AuthContext::verified("alice", Some("jira-secret".into()), None);
        let rendered = format!("{ctx:?}");
        assert!(!rendered.contains("jira-secret"));
        assert!(rendered.contains("<redacted>"));
        assert!(rendered.contains("alice"));
    }

    #[test]
    fn test_open_context_has_no_user() {
        let ctx = AuthContext::open(Some("t".into()), Some("t".into()));
        assert_eq!(ctx.mode(), AuthMode::Open);
        assert!(ctx.user_id().is_none());
    }

    #[test]
    fn test_require_token_messages() {
        let open = AuthContext::open(None, None);
        let err = open.require_token(Downstream::Jira).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No Jira token. Authorization: Bearer <token> required"
        );

        let verified = AuthContext::verified("bob", Some("j".into()), None);
        assert_eq!(verified.require_token(Downstream::Jira).unwrap(), "j");
        let err = verified.require_token(Downstream::Confluence).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No Confluence token. CONFLUENCE_TOKEN header required in JWT mode"
        );
    }
}
