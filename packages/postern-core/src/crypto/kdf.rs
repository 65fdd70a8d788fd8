//! # Key Derivation Functions
//!
//! Hashing and HKDF helpers used by the default crypto provider.
//!
//! ## Session Key Wrapping
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  KEY-ENCRYPTION-KEY DERIVATION                          │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ephemeral X25519 secret × recipient X25519 public                     │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  shared secret (32 bytes)                                              │
//! │                  │                                                      │
//! │                  ▼                                                      │
//! │  HKDF-SHA256(                                                          │
//! │    salt = ephemeral_public || recipient_public,                        │
//! │    ikm  = shared secret,                                               │
//! │    info = "postern-session-key-v1"                                     │
//! │  ) → key-encryption key (wraps the per-message session key)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! | Aspect | Design Choice | Rationale |
//! |--------|---------------|-----------|
//! | KDF Algorithm | HKDF-SHA256 | Well-analyzed, recommended by NIST |
//! | Key Separation | Different `info` strings | Prevents key reuse across purposes |
//! | Recipient Binding | `salt` includes both public keys | Wrapped key only opens for its recipient |
//! | Version String | "-v1" suffix | Allows future algorithm upgrades |

use sha2::{Digest, Sha256};

use super::encryption::{EncryptionKey, SharedSecret};
use crate::error::Result;

/// Domain separation strings
pub mod domain {
    /// Signed together with the encryption key and user id
    pub const KEY_BINDING: &[u8] = b"postern-key-binding-v1";

    /// HKDF info for key-encryption keys
    pub const SESSION_KEY: &[u8] = b"postern-session-key-v1";

    /// Prefix hashed into recipient hints
    pub const RECIPIENT_HINT: &[u8] = b"postern-recipient-hint-v1";
}

/// Size of a recipient hint in bytes
pub const RECIPIENT_HINT_SIZE: usize = 8;

/// SHA-256 over `algorithm_tag || key_bytes`
pub fn compute_fingerprint(algorithm_tag: u8, key_bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([algorithm_tag]);
    hasher.update(key_bytes);
    hasher.finalize().into()
}

/// Short, non-secret tag identifying which X25519 key a wrapped session key
/// belongs to, so decryption does not have to try every recipient entry.
pub fn recipient_hint(encryption_public: &[u8; 32]) -> [u8; RECIPIENT_HINT_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(domain::RECIPIENT_HINT);
    hasher.update(encryption_public);
    let digest = hasher.finalize();

    let mut hint = [0u8; RECIPIENT_HINT_SIZE];
    hint.copy_from_slice(&digest[..RECIPIENT_HINT_SIZE]);
    hint
}

/// Derive the key-encryption key for one recipient of a message
pub fn derive_key_encryption_key(
    shared_secret: &SharedSecret,
    ephemeral_public: &[u8; 32],
    recipient_public: &[u8; 32],
) -> Result<EncryptionKey> {
    let mut salt = [0u8; 64];
    salt[..32].copy_from_slice(ephemeral_public);
    salt[32..].copy_from_slice(recipient_public);
    shared_secret.derive_key(&salt, domain::SESSION_KEY)
}
