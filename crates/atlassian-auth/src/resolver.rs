//! Turns inbound request headers into an [`AuthContext`].

use http::header::AUTHORIZATION;
use http::HeaderMap;

use crate::secret::SharedSecret;
use crate::token::TokenVerifier;
use crate::types::{AuthContext, AuthError, AuthMode, AuthResult};

pub const AUTHORIZATION_HEADER: &str = "authorization";
pub const JIRA_TOKEN_HEADER: &str = "jira_token";
pub const CONFLUENCE_TOKEN_HEADER: &str = "confluence_token";
pub const READ_ONLY_HEADER: &str = "x-readonly";

const BEARER_PREFIX: &str = "Bearer ";

/// Non-blank, trimmed value of a header.
fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Token following a case-sensitive `Bearer ` prefix, if well formed.
fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(BEARER_PREFIX))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// True when the request asks for read-only execution (`X-Readonly: true`, any case).
pub fn read_only_requested(headers: &HeaderMap) -> bool {
    header_value(headers, READ_ONLY_HEADER).is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

/// Credential resolution strategy. Chosen once at startup.
#[derive(Debug, Clone)]
pub enum CredentialResolver {
    /// Forward bearer tokens as-is.
    Open,
    /// Require a verified token and take downstream tokens from dedicated headers.
    Verified(TokenVerifier),
}

impl CredentialResolver {
    pub fn open() -> Self {
        CredentialResolver::Open
    }

    pub fn verified(secret: SharedSecret) -> Self {
        CredentialResolver::Verified(TokenVerifier::new(secret))
    }

    pub fn mode(&self) -> AuthMode {
        match self {
            CredentialResolver::Open => AuthMode::Open,
            CredentialResolver::Verified(_) => AuthMode::Verified,
        }
    }

    /// Resolve the credentials carried by one request.
    ///
    /// OPEN never fails: absent tokens surface later, when a tool needs them.
    /// VERIFIED fails when the bearer is missing, malformed, or does not verify, or when
    /// the verified token has no subject.
    pub fn resolve(&self, headers: &HeaderMap) -> AuthResult<AuthContext> {
        match self {
            CredentialResolver::Open => Ok(resolve_open(headers)),
            CredentialResolver::Verified(verifier) => resolve_verified(verifier, headers),
        }
    }
}

fn resolve_open(headers: &HeaderMap) -> AuthContext {
    let bearer = bearer_token(headers);
    let jira = header_value(headers, JIRA_TOKEN_HEADER).or_else(|| bearer.clone());
    let confluence = header_value(headers, CONFLUENCE_TOKEN_HEADER).or(bearer);
    AuthContext::open(jira, confluence)
}

fn resolve_verified(verifier: &TokenVerifier, headers: &HeaderMap) -> AuthResult<AuthContext> {
    if !headers.contains_key(AUTHORIZATION) {
        return Err(AuthError::MissingBearer);
    }
    let token = bearer_token(headers).ok_or(AuthError::MalformedAuthorization)?;

    let claims = verifier.verify(&token)?;
    let user_id = claims
        .subject
        .filter(|s| !s.trim().is_empty())
        .ok_or(AuthError::MissingSubject)?;

    tracing::debug!(user = %user_id, kind = ?claims.kind, "verified bearer token");

    Ok(AuthContext::verified(
        user_id,
        header_value(headers, JIRA_TOKEN_HEADER),
        header_value(headers, CONFLUENCE_TOKEN_HEADER),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &[u8] = b"resolver-test-secret-0123456789abcdef";

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            let name = http::HeaderName::from_bytes(name.as_bytes()).unwrap();
            map.insert(name, value.parse().unwrap());
        }
        map
    }

    fn signed(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    fn encrypted(claims: serde_json::Value) -> String {
        crate::token::jwe_fixtures::seal("A256GCM", SECRET, claims.to_string().as_bytes())
    }

    fn verified() -> CredentialResolver {
        CredentialResolver::verified(SharedSecret::new(SECRET.to_vec()).unwrap())
    }

    #[test]
    fn test_open_bearer_fans_out() {
        let ctx = CredentialResolver::open()
            .resolve(&headers(&[("authorization", "Bearer abc")]))
            .unwrap();
        assert_eq!(ctx.jira_token(), Some("abc"));
        assert_eq!(ctx.confluence_token(), Some("abc"));
        assert!(ctx.user_id().is_none());
    }

    #[test]
    fn test_open_specific_header_wins() {
        let ctx = CredentialResolver::open()
            .resolve(&headers(&[
                ("authorization", "Bearer abc"),
                ("jira_token", "xyz"),
            ]))
            .unwrap();
        assert_eq!(ctx.jira_token(), Some("xyz"));
        assert_eq!(ctx.confluence_token(), Some("abc"));
    }

    #[test]
    fn test_open_without_tokens_still_resolves() {
        let ctx = CredentialResolver::open().resolve(&HeaderMap::new()).unwrap();
        assert_eq!(ctx.mode(), AuthMode::Open);
        assert!(ctx.jira_token().is_none());
        assert!(ctx.confluence_token().is_none());
    }

    #[test]
    fn test_open_ignores_blank_and_lowercase_bearer() {
        let ctx = CredentialResolver::open()
            .resolve(&headers(&[
                ("authorization", "bearer abc"),
                ("confluence_token", "   "),
            ]))
            .unwrap();
        assert!(ctx.jira_token().is_none());
        assert!(ctx.confluence_token().is_none());
    }

    #[test]
    fn test_verified_happy_path() {
        let bearer = format!("Bearer {}", signed(json!({"sub": "alice"})));
        let ctx = verified()
            .resolve(&headers(&[
                ("authorization", &bearer),
                ("jira_token", "downstream"),
            ]))
            .unwrap();
        assert_eq!(ctx.mode(), AuthMode::Verified);
        assert_eq!(ctx.user_id(), Some("alice"));
        assert_eq!(ctx.jira_token(), Some("downstream"));
        assert!(ctx.confluence_token().is_none());
    }

    #[test]
    fn test_verified_does_not_forward_bearer() {
        let bearer = format!("Bearer {}", signed(json!({"sub": "alice"})));
        let ctx = verified()
            .resolve(&headers(&[("authorization", &bearer)]))
            .unwrap();
        assert!(ctx.jira_token().is_none());
        assert!(ctx.confluence_token().is_none());
    }

    #[test]
    fn test_verified_rejections() {
        let resolver = verified();
        assert!(matches!(
            resolver.resolve(&HeaderMap::new()),
            Err(AuthError::MissingBearer)
        ));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", "Basic Zm9vOmJhcg==")])),
            Err(AuthError::MalformedAuthorization)
        ));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", "Bearer a.b.c.d")])),
            Err(AuthError::MalformedToken(4))
        ));

        let no_subject = format!("Bearer {}", signed(json!({"scope": "x"})));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", &no_subject)])),
            Err(AuthError::MissingSubject)
        ));

        let blank_subject = format!("Bearer {}", signed(json!({"sub": "  "})));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", &blank_subject)])),
            Err(AuthError::MissingSubject)
        ));
    }

    #[test]
    fn test_verified_encrypted_bearer() {
        let bearer = format!("Bearer {}", encrypted(json!({"sub": "dave"})));
        let ctx = verified()
            .resolve(&headers(&[
                ("authorization", &bearer),
                ("confluence_token", "wiki"),
            ]))
            .unwrap();
        assert_eq!(ctx.mode(), AuthMode::Verified);
        assert_eq!(ctx.user_id(), Some("dave"));
        assert!(ctx.jira_token().is_none());
        assert_eq!(ctx.confluence_token(), Some("wiki"));
    }

    #[test]
    fn test_verified_encrypted_rejections() {
        let resolver = verified();

        let expired = format!("Bearer {}", encrypted(json!({"sub": "dave", "exp": 1000})));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", &expired)])),
            Err(AuthError::Expired)
        ));

        let no_subject = format!("Bearer {}", encrypted(json!({"scope": "x"})));
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", &no_subject)])),
            Err(AuthError::MissingSubject)
        ));

        let foreign = crate::token::jwe_fixtures::seal(
            "A256GCM",
            b"someone-else-entirely-0123456789abcdef",
            br#"{"sub":"mallory"}"#,
        );
        assert!(matches!(
            resolver.resolve(&headers(&[("authorization", &format!("Bearer {foreign}"))])),
            Err(AuthError::DecryptionFailed)
        ));
    }

    #[test]
    fn test_read_only_header() {
        assert!(read_only_requested(&headers(&[("x-readonly", "true")])));
        assert!(read_only_requested(&headers(&[("X-Readonly", "TRUE")])));
        assert!(!read_only_requested(&headers(&[("x-readonly", "yes")])));
        assert!(!read_only_requested(&HeaderMap::new()));
    }
}
