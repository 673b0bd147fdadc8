//! HMAC-signed compact tokens.

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};

use super::RegisteredClaims;
use crate::secret::SharedSecret;
use crate::types::{AuthError, AuthResult};

/// Minimum key length for an HMAC algorithm: the digest size.
fn min_key_len(alg: Algorithm) -> Option<usize> {
    match alg {
        Algorithm::HS256 => Some(32),
        Algorithm::HS384 => Some(48),
        Algorithm::HS512 => Some(64),
        _ => None,
    }
}

pub(super) fn verify(
    token: &str,
    secret: &SharedSecret,
    leeway_secs: u64,
) -> AuthResult<RegisteredClaims> {
    let header = decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

    let min_len = min_key_len(header.alg)
        .ok_or_else(|| AuthError::UnsupportedAlgorithm(format!("{:?}", header.alg)))?;
    if secret.len() < min_len {
        return Err(AuthError::WeakSecret {
            len: secret.len(),
            min: min_len,
        });
    }

    let mut validation = Validation::new(header.alg);
    validation.required_spec_claims.clear();
    validation.validate_aud = false;
    validation.validate_exp = true;
    validation.validate_nbf = true;
    validation.leeway = leeway_secs;

    let data = decode::<RegisteredClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::ImmatureSignature => AuthError::NotYetValid,
        _ => AuthError::InvalidToken(e.to_string()),
    })?;

    Ok(data.claims)
}
