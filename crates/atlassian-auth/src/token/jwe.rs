//! Directly-keyed compact JWE (`alg: dir`) decryption.
//!
//! The content-encryption key is the leading part of the shared secret, sized for the
//! `enc` algorithm. Both AES-GCM and AES-CBC with HMAC-SHA2 content encryption are
//! accepted.

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::{Sha256, Sha384, Sha512};

use crate::secret::SharedSecret;
use crate::types::{AuthError, AuthResult};

type Aes192Gcm = AesGcm<Aes192, U12>;

const GCM_IV_LEN: usize = 12;
const GCM_TAG_LEN: usize = 16;
const CBC_IV_LEN: usize = 16;

#[derive(Debug, Deserialize)]
struct JweHeader {
    alg: String,
    enc: String,
    #[serde(default)]
    zip: Option<String>,
}

/// Content-encryption algorithms accepted in the `enc` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentEncryption {
    A128Gcm,
    A192Gcm,
    A256Gcm,
    A128CbcHs256,
    A192CbcHs384,
    A256CbcHs512,
}

impl ContentEncryption {
    fn parse(enc: &str) -> AuthResult<Self> {
        match enc {
            "A128GCM" => Ok(Self::A128Gcm),
            "A192GCM" => Ok(Self::A192Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            "A128CBC-HS256" => Ok(Self::A128CbcHs256),
            "A192CBC-HS384" => Ok(Self::A192CbcHs384),
            "A256CBC-HS512" => Ok(Self::A256CbcHs512),
            other => Err(AuthError::UnsupportedAlgorithm(format!("enc {other}"))),
        }
    }

    /// Content-encryption key length in bytes.
    fn key_len(self) -> usize {
        match self {
            Self::A128Gcm => 16,
            Self::A192Gcm => 24,
            Self::A256Gcm => 32,
            Self::A128CbcHs256 => 32,
            Self::A192CbcHs384 => 48,
            Self::A256CbcHs512 => 64,
        }
    }
}

struct Segments<'a> {
    protected: &'a str,
    encrypted_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

fn b64(segment: &str) -> AuthResult<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthError::InvalidToken(format!("bad base64url segment: {e}")))
}

fn split(token: &str) -> AuthResult<Segments<'_>> {
    let parts: Vec<&str> = token.split('.').collect();
    let [protected, key, iv, ciphertext, tag] = parts.as_slice() else {
        return Err(AuthError::MalformedToken(parts.len()));
    };
    Ok(Segments {
        protected: *protected,
        encrypted_key: b64(key)?,
        iv: b64(iv)?,
        ciphertext: b64(ciphertext)?,
        tag: b64(tag)?,
    })
}

/// Decrypt a compact JWE and return its plaintext payload.
pub(super) fn decrypt(token: &str, secret: &SharedSecret) -> AuthResult<Vec<u8>> {
    let segments = split(token)?;
    let header: JweHeader = serde_json::from_slice(&b64(segments.protected)?)
        .map_err(|e| AuthError::InvalidToken(format!("bad JWE header: {e}")))?;

    if header.alg != "dir" {
        return Err(AuthError::UnsupportedAlgorithm(format!("alg {}", header.alg)));
    }
    if let Some(zip) = header.zip {
        return Err(AuthError::UnsupportedAlgorithm(format!("zip {zip}")));
    }
    if !segments.encrypted_key.is_empty() {
        return Err(AuthError::InvalidToken(
            "direct encryption must not carry an encrypted key".to_string(),
        ));
    }

    let enc = ContentEncryption::parse(&header.enc)?;
    let key = secret.key_prefix(enc.key_len())?;
    let aad = segments.protected.as_bytes();

    match enc {
        ContentEncryption::A128Gcm => gcm_decrypt::<Aes128Gcm>(key, &segments, aad),
        ContentEncryption::A192Gcm => gcm_decrypt::<Aes192Gcm>(key, &segments, aad),
        ContentEncryption::A256Gcm => gcm_decrypt::<Aes256Gcm>(key, &segments, aad),
        ContentEncryption::A128CbcHs256
        | ContentEncryption::A192CbcHs384
        | ContentEncryption::A256CbcHs512 => cbc_hmac_decrypt(enc, key, &segments, aad),
    }
}

fn gcm_decrypt<C>(key: &[u8], segments: &Segments<'_>, aad: &[u8]) -> AuthResult<Vec<u8>>
where
    C: Aead + KeyInit,
{
    if segments.iv.len() != GCM_IV_LEN || segments.tag.len() != GCM_TAG_LEN {
        return Err(AuthError::InvalidToken("bad GCM iv or tag length".to_string()));
    }
    let cipher = C::new_from_slice(key).map_err(|_| AuthError::DecryptionFailed)?;

    let mut sealed = Vec::with_capacity(segments.ciphertext.len() + GCM_TAG_LEN);
    sealed.extend_from_slice(&segments.ciphertext);
    sealed.extend_from_slice(&segments.tag);

    cipher
        .decrypt(
            Nonce::<C>::from_slice(&segments.iv),
            Payload {
                msg: &sealed,
                aad,
            },
        )
        .map_err(|_| AuthError::DecryptionFailed)
}

/// MAC input for the CBC-HMAC composite: AAD || IV || ciphertext || AAD bit length.
fn cbc_mac_input(aad: &[u8], iv: &[u8], ciphertext: &[u8]) -> Vec<u8> {
    let al = ((aad.len() as u64) * 8).to_be_bytes();
    let mut input = Vec::with_capacity(aad.len() + iv.len() + ciphertext.len() + al.len());
    input.extend_from_slice(aad);
    input.extend_from_slice(iv);
    input.extend_from_slice(ciphertext);
    input.extend_from_slice(&al);
    input
}

fn tag_matches(enc: ContentEncryption, mac_key: &[u8], input: &[u8], tag: &[u8]) -> bool {
    match enc {
        ContentEncryption::A128CbcHs256 => <Hmac<Sha256> as Mac>::new_from_slice(mac_key)
            .map(|mut mac| {
                mac.update(input);
                mac.verify_truncated_left(tag).is_ok()
            })
            .unwrap_or(false),
        ContentEncryption::A192CbcHs384 => <Hmac<Sha384> as Mac>::new_from_slice(mac_key)
            .map(|mut mac| {
                mac.update(input);
                mac.verify_truncated_left(tag).is_ok()
            })
            .unwrap_or(false),
        ContentEncryption::A256CbcHs512 => <Hmac<Sha512> as Mac>::new_from_slice(mac_key)
            .map(|mut mac| {
                mac.update(input);
                mac.verify_truncated_left(tag).is_ok()
            })
            .unwrap_or(false),
        _ => false,
    }
}

fn cbc_hmac_decrypt(
    enc: ContentEncryption,
    key: &[u8],
    segments: &Segments<'_>,
    aad: &[u8],
) -> AuthResult<Vec<u8>> {
    let half = key.len() / 2;
    let (mac_key, enc_key) = key.split_at(half);

    if segments.iv.len() != CBC_IV_LEN || segments.tag.len() != half {
        return Err(AuthError::InvalidToken("bad CBC iv or tag length".to_string()));
    }

    let input = cbc_mac_input(aad, &segments.iv, &segments.ciphertext);
    if !tag_matches(enc, mac_key, &input, &segments.tag) {
        return Err(AuthError::DecryptionFailed);
    }

    let plaintext = match half {
        16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(enc_key, &segments.iv)
            .map_err(|_| AuthError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(&segments.ciphertext),
        24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(enc_key, &segments.iv)
            .map_err(|_| AuthError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(&segments.ciphertext),
        32 => cbc::Decryptor::<aes::Aes256>::new_from_slices(enc_key, &segments.iv)
            .map_err(|_| AuthError::DecryptionFailed)?
            .decrypt_padded_vec_mut::<Pkcs7>(&segments.ciphertext),
        _ => return Err(AuthError::DecryptionFailed),
    };

    plaintext.map_err(|_| AuthError::DecryptionFailed)
}
