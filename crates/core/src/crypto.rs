//! Token encryption at rest.
//!
//! Gateway tokens are sealed with AES-256-GCM and stored as three base64
//! segments, `iv:ciphertext:tag`, with a 12-byte IV and 16-byte tag. Any
//! decryption failure, including tag mismatch, is an error; a wrong key never
//! yields plausible plaintext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::RngCore;
use std::fmt;
use thiserror::Error;

const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_HEX_LEN: usize = 64;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption key must be {KEY_HEX_LEN} hex characters")]
    InvalidKey,

    #[error("encryption failed")]
    Encrypt,

    /// Covers malformed input and authentication failure alike.
    #[error("decryption failed")]
    Decrypt,
}

/// A 256-bit key for sealing gateway tokens.
#[derive(Clone)]
pub struct EncryptionKey {
    key: [u8; 32],
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl EncryptionKey {
    /// Parses a key from its 64-hex-character form.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        if hex_key.len() != KEY_HEX_LEN {
            return Err(CryptoError::InvalidKey);
        }
        let bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidKey)?;
        let key: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidKey)?;
        Ok(Self { key })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, CryptoError> {
        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let mut iv = [0u8; IV_LEN];
        rand::thread_rng().fill_bytes(&mut iv);

        // aes-gcm appends the tag to the ciphertext; split it back out so the
        // stored form keeps its three segments.
        let sealed = cipher
            .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
            .map_err(|_| CryptoError::Encrypt)?;
        let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LEN);

        Ok(format!(
            "{}:{}:{}",
            STANDARD.encode(iv),
            STANDARD.encode(ciphertext),
            STANDARD.encode(tag)
        ))
    }

    pub fn decrypt(&self, stored: &str) -> Result<String, CryptoError> {
        let parts: Vec<&str> = stored.split(':').collect();
        let [iv, ciphertext, tag] = parts[..] else {
            return Err(CryptoError::Decrypt);
        };
        let iv = STANDARD.decode(iv).map_err(|_| CryptoError::Decrypt)?;
        let ciphertext = STANDARD.decode(ciphertext).map_err(|_| CryptoError::Decrypt)?;
        let tag = STANDARD.decode(tag).map_err(|_| CryptoError::Decrypt)?;
        if iv.len() != IV_LEN || tag.len() != TAG_LEN {
            return Err(CryptoError::Decrypt);
        }

        let mut sealed = ciphertext;
        sealed.extend_from_slice(&tag);

        let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key));
        let plaintext = cipher
            .decrypt(Nonce::from_slice(&iv), sealed.as_ref())
            .map_err(|_| CryptoError::Decrypt)?;
        String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
    }
}

/// Whether a stored value is in the sealed `iv:ciphertext:tag` form.
///
/// Used to tell sealed tokens from plaintext ones written before a key was
/// configured.
pub fn looks_encrypted(value: &str) -> bool {
    let parts: Vec<&str> = value.split(':').collect();
    let [iv, ciphertext, tag] = parts[..] else {
        return false;
    };
    let Ok(iv) = STANDARD.decode(iv) else {
        return false;
    };
    let Ok(tag) = STANDARD.decode(tag) else {
        return false;
    };
    iv.len() == IV_LEN && tag.len() == TAG_LEN && STANDARD.decode(ciphertext).is_ok()
}
