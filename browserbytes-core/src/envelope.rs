/*!
Passphrase-based encryption envelope for serialized snapshots.

The envelope is the JSON object `{"encrypted": true, "salt", "iv", "data"}`
with standard Base64 fields. The key is derived with PBKDF2-HMAC-SHA256
(100,000 rounds) from the passphrase and a per-envelope random salt, and the
payload is encrypted with AES-256-GCM, so `data` carries the ciphertext
followed by the 16-byte authentication tag.

Every failure while opening an envelope collapses into
[`BrowserBytesError::Decryption`].
*/

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Deserializer, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

use crate::{BrowserBytesError, Result};

/// PBKDF2 rounds used to stretch the passphrase
pub const PBKDF2_ITERATIONS: u32 = 100_000;
/// Salt length in bytes
pub const SALT_LEN: usize = 16;
/// AES-GCM nonce length in bytes
pub const IV_LEN: usize = 12;
/// AES-256 key length in bytes
pub const KEY_LEN: usize = 32;

/// Encrypted wrapper around a serialized snapshot
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    #[serde(deserialize_with = "deserialize_encrypted_flag")]
    encrypted: bool,
    pub salt: String,
    pub iv: String,
    pub data: String,
}

fn deserialize_encrypted_flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    if bool::deserialize(deserializer)? {
        Ok(true)
    } else {
        Err(serde::de::Error::custom("envelope must have \"encrypted\": true"))
    }
}

impl Envelope {
    /// Encrypt `plaintext` under a key derived from `passphrase`.
    ///
    /// A fresh salt and IV are drawn from the OS random source on every call,
    /// so sealing the same input twice gives unrelated envelopes.
    ///
    /// # Errors
    /// * `BrowserBytesError::Validation` - the passphrase is empty
    pub fn seal(plaintext: &str, passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(BrowserBytesError::validation(
                "An encryption key is required to encrypt data",
            ));
        }

        let mut salt = [0u8; SALT_LEN];
        let mut iv = [0u8; IV_LEN];
        OsRng.fill_bytes(&mut salt);
        OsRng.fill_bytes(&mut iv);

        let key = derive_key(passphrase, &salt);
        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| BrowserBytesError::format(format!("AES key init failed: {e}")))?;
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| BrowserBytesError::format("Plaintext could not be encrypted"))?;

        Ok(Self {
            encrypted: true,
            salt: STANDARD.encode(salt),
            iv: STANDARD.encode(iv),
            data: STANDARD.encode(ciphertext),
        })
    }

    /// Decrypt and authenticate the envelope with `passphrase`.
    ///
    /// # Errors
    /// * `BrowserBytesError::Decryption` - wrong passphrase, malformed fields,
    ///   tampered ciphertext or non-UTF-8 plaintext; these are not told apart
    pub fn open(&self, passphrase: &str) -> Result<String> {
        let salt = decode_field(&self.salt)?;
        let iv = decode_field(&self.iv)?;
        let ciphertext = decode_field(&self.data)?;
        if salt.is_empty() || iv.len() != IV_LEN {
            return Err(BrowserBytesError::Decryption);
        }

        let key = derive_key(passphrase, &salt);
        let cipher =
            Aes256Gcm::new_from_slice(&key[..]).map_err(|_| BrowserBytesError::Decryption)?;
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(Nonce::from_slice(&iv), ciphertext.as_ref())
                .map_err(|_| BrowserBytesError::Decryption)?,
        );

        String::from_utf8(plaintext.to_vec()).map_err(|_| BrowserBytesError::Decryption)
    }

    /// True when a JSON value is shaped like an envelope (`"encrypted": true`)
    pub fn is_envelope(value: &serde_json::Value) -> bool {
        value.get("encrypted") == Some(&serde_json::Value::Bool(true))
    }
}

/// Shorthand for [`Envelope::seal`]
pub fn seal(plaintext: &str, passphrase: &str) -> Result<Envelope> {
    Envelope::seal(plaintext, passphrase)
}

/// Shorthand for [`Envelope::open`]
pub fn open(envelope: &Envelope, passphrase: &str) -> Result<String> {
    envelope.open(passphrase)
}

fn decode_field(field: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(field.as_bytes())
        .map_err(|_| BrowserBytesError::Decryption)
}

// Deliberately slow; never cached between calls.
fn derive_key(passphrase: &str, salt: &[u8]) -> Zeroizing<[u8; KEY_LEN]> {
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2::pbkdf2_hmac::<Sha256>(passphrase.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key[..]);
    key
}
