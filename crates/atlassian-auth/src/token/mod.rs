//! Bearer token verification: compact JWS (3 segments) and compact JWE (5 segments).

mod jwe;
mod jws;

#[cfg(test)]
pub(crate) use jwe::fixtures as jwe_fixtures;

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Deserialize;

use crate::secret::SharedSecret;
use crate::types::{AuthError, AuthResult};

/// Structural kind of a compact token, decided by its segment count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// `header.payload.signature`
    Signed,
    /// `header.key.iv.ciphertext.tag`
    Encrypted,
}

/// Classify a compact token by counting `.`-separated segments.
pub fn classify(token: &str) -> AuthResult<TokenKind> {
    match token.split('.').count() {
        3 => Ok(TokenKind::Signed),
        5 => Ok(TokenKind::Encrypted),
        n => Err(AuthError::MalformedToken(n)),
    }
}

/// Claims extracted from a token that passed verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedClaims {
    pub kind: TokenKind,
    pub subject: Option<String>,
    pub expires_at: Option<u64>,
}

/// Registered claims this crate looks at. Everything else in the payload is ignored.
#[derive(Debug, Default, Deserialize)]
struct RegisteredClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    exp: Option<f64>,
    #[serde(default)]
    nbf: Option<f64>,
}

impl RegisteredClaims {
    /// Enforce `exp` and `nbf` when present.
    fn check_time(&self, now: u64, leeway: u64) -> AuthResult<()> {
        let now = now as f64;
        let leeway = leeway as f64;
        if let Some(exp) = self.exp {
            if exp + leeway <= now {
                return Err(AuthError::Expired);
            }
        }
        if let Some(nbf) = self.nbf {
            if nbf - leeway > now {
                return Err(AuthError::NotYetValid);
            }
        }
        Ok(())
    }

    fn into_verified(self, kind: TokenKind) -> VerifiedClaims {
        VerifiedClaims {
            kind,
            subject: self.sub,
            expires_at: self.exp.map(|e| e as u64),
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Verifies bearer tokens against the process-wide shared secret.
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    secret: SharedSecret,
    leeway_secs: u64,
}

impl TokenVerifier {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            leeway_secs: 0,
        }
    }

    /// Clock skew tolerated on `exp` and `nbf`.
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Verify a compact token. Signed tokens have their signature checked, encrypted ones
    /// are decrypted with the shared secret as a direct key. Any other shape is rejected
    /// before either path runs.
    pub fn verify(&self, token: &str) -> AuthResult<VerifiedClaims> {
        let kind = classify(token)?;
        let claims = match kind {
            TokenKind::Signed => jws::verify(token, &self.secret, self.leeway_secs)?,
            TokenKind::Encrypted => {
                let plaintext = jwe::decrypt(token, &self.secret)?;
                let claims: RegisteredClaims = serde_json::from_slice(&plaintext)
                    .map_err(|e| AuthError::InvalidToken(e.to_string()))?;
                claims.check_time(unix_now(), self.leeway_secs)?;
                claims
            }
        };
        Ok(claims.into_verified(kind))
    }
}
