//! Session identifier generation and verification.
//!
//! An identifier is `sid_byte_length` random bytes followed by an
//! HMAC-SHA256 tag over those bytes, encoded as unpadded URL-safe base64.
//! Store records are keyed by the random bytes alone.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256, Sha512};

use crate::error::{ConfigError, VerificationFailure};

type HmacSha256 = Hmac<Sha256>;

/// Length of the HMAC-SHA256 tag appended to the random payload.
pub const SIGNATURE_LEN: usize = 32;

/// Minimum accepted length of a configured signing secret, in bytes.
pub const MIN_KEY_LEN: usize = 16;

const KDF_SALT: &[u8] = b"dynamo-session";
const KDF_INFO: &[u8] = b"session-id-signing-v1";

/// A verified (or freshly generated) session identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionId {
    payload: Vec<u8>,
    encoded: String,
}

impl SessionId {
    /// The external, signed string form handed to clients.
    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    /// The raw random payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Store key: the random payload alone, never the signed string.
    pub fn store_key(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.payload)
    }

    pub fn loggable(&self) -> String {
        loggable_session_id(&self.encoded)
    }
}

impl std::fmt::Debug for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SessionId").field(&self.loggable()).finish()
    }
}

/// One-way SHA-512 digest of an identifier string, safe to log.
pub fn loggable_session_id(sid: &str) -> String {
    hex::encode(Sha512::digest(sid.as_bytes()))
}

/// Derive the HMAC key for a configured secret.
fn derive_signing_key(secret: &[u8]) -> Result<[u8; 32], ConfigError> {
    let hk = Hkdf::<Sha256>::new(Some(KDF_SALT), secret);
    let mut okm = [0u8; 32];
    hk.expand(KDF_INFO, &mut okm)
        .map_err(|e| ConfigError::Invalid(format!("signing key derivation: {e}")))?;
    Ok(okm)
}

/// Generates, signs and verifies session identifiers.
#[derive(Clone)]
pub struct SidCodec {
    byte_length: usize,
    /// Ordered oldest to newest; the last one signs.
    macs: Vec<HmacSha256>,
}

impl SidCodec {
    /// Build a codec from the configured secrets.
    ///
    /// Every secret verifies; the last one in the list signs new identifiers.
    pub fn new<K: AsRef<[u8]>>(byte_length: usize, keys: &[K]) -> Result<Self, ConfigError> {
        if byte_length == 0 {
            return Err(ConfigError::Invalid(
                "sid byte length must be positive".to_string(),
            ));
        }
        if keys.is_empty() {
            return Err(ConfigError::NoSigningKey);
        }

        let mut macs = Vec::with_capacity(keys.len());
        for (idx, key) in keys.iter().enumerate() {
            let key = key.as_ref();
            if key.len() < MIN_KEY_LEN {
                return Err(ConfigError::WeakSigningKey(idx));
            }
            let derived = derive_signing_key(key)?;
            let mac = HmacSha256::new_from_slice(&derived)
                .map_err(|e| ConfigError::Invalid(format!("signing key: {e}")))?;
            macs.push(mac);
        }

        Ok(Self { byte_length, macs })
    }

    pub fn byte_length(&self) -> usize {
        self.byte_length
    }

    /// Length of a decoded identifier: payload plus signature.
    fn decoded_len(&self) -> usize {
        self.byte_length + SIGNATURE_LEN
    }

    /// Generate a new signed identifier.
    ///
    /// # Panics
    ///
    /// Panics if the operating system random source fails.
    pub fn generate(&self) -> SessionId {
        let mut payload = vec![0u8; self.byte_length];
        OsRng.fill_bytes(&mut payload);
        self.sign(payload)
    }

    fn sign(&self, payload: Vec<u8>) -> SessionId {
        // `new` guarantees at least one key.
        let mut mac = self.macs[self.macs.len() - 1].clone();
        mac.update(&payload);
        let tag = mac.finalize().into_bytes();

        let mut raw = Vec::with_capacity(self.decoded_len());
        raw.extend_from_slice(&payload);
        raw.extend_from_slice(&tag);

        SessionId {
            payload,
            encoded: URL_SAFE_NO_PAD.encode(raw),
        }
    }

    /// Decode and verify an identifier received from a client.
    pub fn verify(&self, encoded: &str) -> Result<SessionId, VerificationFailure> {
        let raw = URL_SAFE_NO_PAD
            .decode(encoded.as_bytes())
            .map_err(|_| VerificationFailure)?;
        if raw.len() != self.decoded_len() {
            return Err(VerificationFailure);
        }

        let (payload, tag) = raw.split_at(self.byte_length);
        // Every key is checked; no early exit on a match.
        let mut valid = false;
        for mac in &self.macs {
            let mut mac = mac.clone();
            mac.update(payload);
            valid |= mac.verify_slice(tag).is_ok();
        }
        if !valid {
            return Err(VerificationFailure);
        }

        Ok(SessionId {
            payload: payload.to_vec(),
            encoded: encoded.to_string(),
        })
    }
}

impl std::fmt::Debug for SidCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SidCodec")
            .field("byte_length", &self.byte_length)
            .field("keys", &self.macs.len())
            .finish()
    }
}

/// Generate a random secret suitable for `sidKeys`, hex encoded.
pub fn generate_secret() -> String {
    let mut secret = [0u8; 32];
    OsRng.fill_bytes(&mut secret);
    hex::encode(secret)
}
