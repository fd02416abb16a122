//! Token encryption using AES-256-GCM with per-call PBKDF2 key derivation.
//!
//! Every call to [`encrypt`] draws a fresh salt and nonce, derives a 256-bit key
//! from the process secret with PBKDF2-HMAC-SHA256, and emits a text envelope:
//!
//! ```text
//! v1:<salt hex>:<iv hex>:<tag hex>:<ciphertext hex>
//! ```
//!
//! The envelope is safe to store in a text column and carries everything
//! [`decrypt`] needs apart from the secret itself.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

const ENVELOPE_VERSION: &str = "v1";
const ENVELOPE_SEPARATOR: &str = ":";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LEN: usize = 32;

/// PBKDF2 rounds used for every derived key.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("decryption failed: {0}")]
    Decryption(String),
}

/// Process-wide token cipher holding the secret in zeroizing memory.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct TokenCipher {
    secret: Vec<u8>,
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

impl TokenCipher {
    /// Create a cipher from the configured secret. Empty secrets are rejected.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, CryptoError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(CryptoError::InvalidInput("key must not be empty"));
        }
        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        encrypt(plaintext, &self.secret)
    }

    pub fn decrypt(&self, envelope: &str) -> Result<String, CryptoError> {
        decrypt(envelope, &self.secret)
    }
}

/// Encrypt `plaintext` under a key derived from `key` and a fresh random salt.
pub fn encrypt(plaintext: &str, key: &[u8]) -> Result<String, CryptoError> {
    if plaintext.is_empty() {
        return Err(CryptoError::InvalidInput("plaintext must not be empty"));
    }
    if key.is_empty() {
        return Err(CryptoError::InvalidInput("key must not be empty"));
    }

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);
    let mut iv = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut iv);

    let derived = derive_key(key, &salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(derived.as_slice()));

    // aes-gcm appends the tag to the ciphertext
    let mut sealed = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|e| CryptoError::Encryption(e.to_string()))?;
    if sealed.len() < TAG_LEN {
        return Err(CryptoError::Encryption("sealed output too short".to_string()));
    }
    let tag = sealed.split_off(sealed.len() - TAG_LEN);

    Ok([
        ENVELOPE_VERSION.to_string(),
        hex::encode(salt),
        hex::encode(iv),
        hex::encode(tag),
        hex::encode(sealed),
    ]
    .join(ENVELOPE_SEPARATOR))
}

/// Decrypt an envelope produced by [`encrypt`].
///
/// Any structural problem or tag mismatch is reported as
/// [`CryptoError::Decryption`]; wrong plaintext is never returned.
pub fn decrypt(envelope: &str, key: &[u8]) -> Result<String, CryptoError> {
    if key.is_empty() {
        return Err(CryptoError::InvalidInput("key must not be empty"));
    }

    let parts = EnvelopeParts::parse(envelope)?;
    let derived = derive_key(key, &parts.salt);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(derived.as_slice()));

    let mut sealed = Vec::with_capacity(parts.ciphertext.len() + TAG_LEN);
    sealed.extend_from_slice(&parts.ciphertext);
    sealed.extend_from_slice(&parts.tag);

    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(&parts.iv), sealed.as_slice())
            .map_err(|_| CryptoError::Decryption("authentication tag mismatch".to_string()))?,
    );

    String::from_utf8(plaintext.to_vec())
        .map_err(|e| CryptoError::Decryption(format!("invalid UTF-8: {e}")))
}

/// Whether `value` looks like an envelope this module produced.
pub fn is_envelope(value: &str) -> bool {
    EnvelopeParts::parse(value).is_ok()
}

fn derive_key(secret: &[u8], salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut derived = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(secret, salt, PBKDF2_ITERATIONS, &mut derived[..]);
    derived
}

struct EnvelopeParts {
    salt: Vec<u8>,
    iv: Vec<u8>,
    tag: Vec<u8>,
    ciphertext: Vec<u8>,
}

impl EnvelopeParts {
    fn parse(envelope: &str) -> Result<Self, CryptoError> {
        let mut segments = envelope.split(ENVELOPE_SEPARATOR);

        match segments.next() {
            Some(ENVELOPE_VERSION) => {}
            Some(other) if !other.is_empty() => {
                return Err(CryptoError::Decryption(format!(
                    "unsupported envelope version '{other}'"
                )));
            }
            _ => return Err(CryptoError::Decryption("missing envelope version".to_string())),
        }

        let salt = decode_segment(segments.next(), "salt", Some(SALT_LEN))?;
        let iv = decode_segment(segments.next(), "iv", Some(NONCE_LEN))?;
        let tag = decode_segment(segments.next(), "tag", Some(TAG_LEN))?;
        let ciphertext = decode_segment(segments.next(), "ciphertext", None)?;

        if segments.next().is_some() {
            return Err(CryptoError::Decryption(
                "unexpected trailing envelope segment".to_string(),
            ));
        }

        Ok(Self {
            salt,
            iv,
            tag,
            ciphertext,
        })
    }
}

fn decode_segment(
    segment: Option<&str>,
    name: &str,
    expected_len: Option<usize>,
) -> Result<Vec<u8>, CryptoError> {
    let segment = segment
        .filter(|s| !s.is_empty())
        .ok_or_else(|| CryptoError::Decryption(format!("missing {name}")))?;
    let bytes =
        hex::decode(segment).map_err(|_| CryptoError::Decryption(format!("malformed {name}")))?;
    if let Some(expected) = expected_len {
        if bytes.len() != expected {
            return Err(CryptoError::Decryption(format!(
                "{name} must be {expected} bytes, got {}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}
