//! # Symmetric Encryption
//!
//! AES-256-GCM for wrapping session keys and sealing message bodies.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MESSAGE SEALING FLOW                               │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. Random session key (32 bytes) per message                          │
//! │  2. Body:    AES-256-GCM(session_key, nonce, plaintext, aad = header)  │
//! │  3. For every recipient:                                               │
//! │       kek     = HKDF(X25519(ephemeral, recipient))                     │
//! │       wrapped = AES-256-GCM(kek, nonce', session_key)                  │
//! │                                                                         │
//! │  Output: nonce + ciphertext + 16-byte tag per sealed item              │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce as AesNonce,
};
use rand::RngCore;
use zeroize::ZeroizeOnDrop;

use crate::error::{Error, Result};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the AES-GCM authentication tag in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of the encryption key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// A nonce (number used once) for AES-GCM encryption
///
/// **NEVER reuse a nonce with the same key!** Every call to [`encrypt`]
/// draws a fresh random nonce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    /// Generate a cryptographically random nonce
    pub fn random() -> Self {
        let mut bytes = [0u8; NONCE_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from a slice that must be exactly [`NONCE_SIZE`] bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; NONCE_SIZE] = slice.try_into().map_err(|_| {
            Error::DecryptionFailed(format!("Nonce must be {} bytes, got {}", NONCE_SIZE, slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; NONCE_SIZE] {
        &self.0
    }
}

/// A shared secret derived from X25519 key exchange
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret {
    bytes: [u8; 32],
}

impl SharedSecret {
    /// Create from raw DH output
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self { bytes }
    }

    /// Derive an encryption key from this shared secret via HKDF-SHA256
    pub fn derive_key(&self, salt: &[u8], info: &[u8]) -> Result<EncryptionKey> {
        use hkdf::Hkdf;
        use sha2::Sha256;

        let hkdf = Hkdf::<Sha256>::new(Some(salt), &self.bytes);
        let mut key = [0u8; KEY_SIZE];
        hkdf.expand(info, &mut key)
            .map_err(|_| Error::KeyDerivationFailed("HKDF expansion failed".into()))?;

        Ok(EncryptionKey(key))
    }
}

/// An AES-256-GCM encryption key
///
/// Zeroized when dropped.
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a random key (used as the per-message session key)
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    /// Create from a slice that must be exactly [`KEY_SIZE`] bytes
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE] = slice.try_into().map_err(|_| {
            Error::DecryptionFailed(format!("Session key must be {} bytes, got {}", KEY_SIZE, slice.len()))
        })?;
        Ok(Self(bytes))
    }

    /// Get the raw key bytes (for wrapping)
    pub fn as_inner(&self) -> [u8; KEY_SIZE] {
        self.0
    }
}

/// Encrypt with AES-256-GCM under a fresh random nonce
///
/// Returns `(nonce, ciphertext_with_tag)`.
pub fn encrypt(key: &EncryptionKey, plaintext: &[u8], aad: &[u8]) -> Result<(Nonce, Vec<u8>)> {
    let nonce = Nonce::random();
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::EncryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let ciphertext = cipher
        .encrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|e| Error::EncryptionFailed(format!("Encryption failed: {}", e)))?;

    Ok((nonce, ciphertext))
}

/// Decrypt with AES-256-GCM
///
/// Fails with `DecryptionFailed` when the key, nonce or AAD is wrong or the
/// ciphertext was tampered with.
pub fn decrypt(
    key: &EncryptionKey,
    nonce: &Nonce,
    ciphertext: &[u8],
    aad: &[u8],
) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| Error::DecryptionFailed(format!("Invalid key: {}", e)))?;

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(AesNonce::from_slice(&nonce.0), payload)
        .map_err(|_| {
            Error::DecryptionFailed("Decryption failed: authentication tag mismatch".into())
        })
}
