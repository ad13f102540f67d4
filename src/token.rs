//! Symmetric token codec: AES-256-CBC encryption around an HMAC-signed
//! JSON envelope with embedded expiry.
//!
//! Tokens are opaque strings of the form `hex(iv):hex(ciphertext)`. The
//! plaintext is a JSON object carrying the caller payload plus `timestamp`,
//! `random`, optionally `exp`, and a `signature` computed over the canonical
//! (key-sorted) JSON of every other field.
//!
//! All verification failures collapse into `Verification::invalid()`; nothing
//! in this module panics or propagates an error out of a request handler.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::security::SecureString;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// Bytes of per-token entropy embedded in the envelope, preventing two
/// identical payloads issued in the same millisecond from colliding.
const RANDOM_BYTES: usize = 16;

/// Opaque decryption failure: malformed input, wrong key, or corrupted
/// ciphertext. Callers must treat any of these as "invalid token".
#[derive(Debug, Error)]
#[error("token decryption failed")]
pub struct DecryptError;

/// How a token's lifetime is bounded.
///
/// Two policies coexist: public tokens embed an absolute `exp` instant,
/// admin session tokens carry only their issuance `timestamp` and are
/// checked against a maximum age at verification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Embed `exp = now + duration` at issuance; verify against the stored instant.
    Absolute(Duration),
    /// No embedded expiry; verify `now - timestamp <= duration`.
    RelativeMaxAge(Duration),
}

/// Outcome of token verification. Never an error: every failure mode is
/// `valid: false` with no payload.
#[derive(Debug, Clone)]
pub struct Verification {
    pub valid: bool,
    pub payload: Option<serde_json::Value>,
}

impl Verification {
    fn invalid() -> Self {
        Self { valid: false, payload: None }
    }
}

/// Symmetric codec keyed by a process-wide secret.
///
/// Pure over its inputs and the secret: no I/O, no shared mutable state,
/// safe to call concurrently without locks.
pub struct TokenCodec {
    /// AES-256 key, derived as SHA-256 of the secret.
    key: [u8; 32],
    /// Raw secret, used directly as the HMAC key.
    secret: SecureString,
}

impl TokenCodec {
    pub fn new(secret: SecureString) -> Self {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(secret.as_bytes()));
        Self { key, secret }
    }

    /// Encrypt arbitrary bytes under a fresh random IV.
    ///
    /// A new IV is generated on every call; reusing one would leak plaintext
    /// relationships under CBC.
    pub fn encrypt(&self, plaintext: &[u8]) -> String {
        let mut iv = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = Aes256CbcEnc::new(&self.key.into(), &iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(plaintext);

        format!("{}:{}", hex::encode(iv), hex::encode(ciphertext))
    }

    /// Decrypt a `hex(iv):hex(ciphertext)` string.
    pub fn decrypt(&self, token: &str) -> Result<Vec<u8>, DecryptError> {
        let (iv_hex, ct_hex) = token.split_once(':').ok_or(DecryptError)?;

        let iv_bytes = hex::decode(iv_hex).map_err(|_| DecryptError)?;
        let ciphertext = hex::decode(ct_hex).map_err(|_| DecryptError)?;

        let iv: [u8; 16] = iv_bytes.try_into().map_err(|_| DecryptError)?;

        Aes256CbcDec::new(&self.key.into(), &iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| DecryptError)
    }

    /// Issue a token for the given payload under the given expiry policy.
    ///
    /// Non-object payloads are wrapped as `{"value": payload}` so the
    /// envelope stays a flat JSON object.
    pub fn issue_token(&self, payload: &serde_json::Value, policy: ExpiryPolicy) -> String {
        self.issue_token_at(payload, policy, now_ms())
    }

    /// Issuance with an explicit clock, the seam expiry tests drive.
    pub fn issue_token_at(
        &self,
        payload: &serde_json::Value,
        policy: ExpiryPolicy,
        now_ms: u64,
    ) -> String {
        let mut envelope: BTreeMap<String, serde_json::Value> = match payload {
            serde_json::Value::Object(map) => {
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
            }
            other => {
                let mut m = BTreeMap::new();
                m.insert("value".to_string(), other.clone());
                m
            }
        };

        let mut random = [0u8; RANDOM_BYTES];
        rand::thread_rng().fill_bytes(&mut random);

        envelope.insert("timestamp".to_string(), serde_json::json!(now_ms));
        envelope.insert("random".to_string(), serde_json::json!(hex::encode(random)));
        if let ExpiryPolicy::Absolute(ttl) = policy {
            let exp = now_ms.saturating_add(ttl.as_millis() as u64);
            envelope.insert("exp".to_string(), serde_json::json!(exp));
        }

        let signature = self.sign(&envelope);
        envelope.insert("signature".to_string(), serde_json::json!(signature));

        // BTreeMap keys are sorted, so serialization is canonical.
        let plaintext = serde_json::to_vec(&envelope).unwrap_or_default();
        self.encrypt(&plaintext)
    }

    /// Verify a token under the given expiry policy.
    ///
    /// Returns the embedded caller payload (envelope minus codec fields)
    /// only when decryption, signature, and expiry all check out.
    pub fn verify_token(&self, token: &str, policy: ExpiryPolicy) -> Verification {
        self.verify_token_at(token, policy, now_ms())
    }

    pub fn verify_token_at(&self, token: &str, policy: ExpiryPolicy, now_ms: u64) -> Verification {
        let plaintext = match self.decrypt(token) {
            Ok(bytes) => bytes,
            Err(_) => return Verification::invalid(),
        };

        let mut envelope: BTreeMap<String, serde_json::Value> =
            match serde_json::from_slice(&plaintext) {
                Ok(map) => map,
                Err(_) => return Verification::invalid(),
            };

        let signature_hex = match envelope.remove("signature") {
            Some(serde_json::Value::String(s)) => s,
            _ => return Verification::invalid(),
        };
        let signature = match hex::decode(&signature_hex) {
            Ok(bytes) => bytes,
            Err(_) => return Verification::invalid(),
        };

        // Constant-time comparison via the Mac verifier.
        let canonical = serde_json::to_vec(&envelope).unwrap_or_default();
        let mut mac = match HmacSha256::new_from_slice(self.secret.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return Verification::invalid(),
        };
        mac.update(&canonical);
        if mac.verify_slice(&signature).is_err() {
            return Verification::invalid();
        }

        let timestamp = match envelope.get("timestamp").and_then(|v| v.as_u64()) {
            Some(ts) => ts,
            None => return Verification::invalid(),
        };

        let fresh = match policy {
            ExpiryPolicy::Absolute(_) => match envelope.get("exp").and_then(|v| v.as_u64()) {
                Some(exp) => now_ms <= exp,
                None => false,
            },
            ExpiryPolicy::RelativeMaxAge(max_age) => {
                now_ms.saturating_sub(timestamp) <= max_age.as_millis() as u64
            }
        };
        if !fresh {
            return Verification::invalid();
        }

        envelope.remove("timestamp");
        envelope.remove("random");
        envelope.remove("exp");

        let payload = serde_json::Value::Object(envelope.into_iter().collect());
        Verification { valid: true, payload: Some(payload) }
    }

    fn sign(&self, envelope: &BTreeMap<String, serde_json::Value>) -> String {
        let canonical = serde_json::to_vec(envelope).unwrap_or_default();
        // HMAC-SHA256 accepts keys of any length, so this cannot fail.
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(&canonical);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
