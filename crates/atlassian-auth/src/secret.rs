//! Shared secret used to verify signed tokens and decrypt encrypted ones.

use std::fmt;

use zeroize::Zeroizing;

use crate::types::{AuthError, AuthResult};

/// Minimum secret length accepted at startup.
pub const MIN_SECRET_BYTES: usize = 32;

/// Process-wide symmetric secret. Immutable once constructed.
#[derive(Clone)]
pub struct SharedSecret {
    bytes: Zeroizing<Vec<u8>>,
}

impl SharedSecret {
    /// Validate and wrap a secret. Fails when shorter than [`MIN_SECRET_BYTES`].
    pub fn new(bytes: impl Into<Vec<u8>>) -> AuthResult<Self> {
        let bytes = Zeroizing::new(bytes.into());
        if bytes.len() < MIN_SECRET_BYTES {
            return Err(AuthError::WeakSecret {
                len: bytes.len(),
                min: MIN_SECRET_BYTES,
            });
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Leading `len` bytes, used as a direct content-encryption key.
    pub fn key_prefix(&self, len: usize) -> AuthResult<&[u8]> {
        self.bytes.get(..len).ok_or(AuthError::WeakSecret {
            len: self.bytes.len(),
            min: len,
        })
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret({} bytes)", self.bytes.len())
    }
}
