//! The crypto provider seam.
//!
//! Pipelines never touch primitives directly; they go through a
//! [`CryptoProvider`] so the cipher suite can be swapped without touching the
//! peerstate logic or the MIME handling.

use super::keys::{Key, KeyRing, PrivateKey, PublicKey};
use crate::config::{DEFAULT_KEY_BITS, DEFAULT_PUBLIC_EXPONENT};
use crate::error::Result;

/// Parameters for own keypair generation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyGenParams {
    /// User id bound into the key, normally the own address
    pub user_id: String,
    /// Requested modulus size; advisory for fixed-size algorithms
    pub bits: u32,
    /// Requested RSA public exponent; advisory for non-RSA algorithms
    pub public_exponent: u32,
}

impl KeyGenParams {
    /// Defaults for the given user id
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            bits: DEFAULT_KEY_BITS,
            public_exponent: DEFAULT_PUBLIC_EXPONENT,
        }
    }
}

/// Asymmetric operations used by the encrypt and decrypt pipelines
///
/// Implementations must be usable from several threads at once.
pub trait CryptoProvider: Send + Sync {
    /// Create a fresh keypair
    fn generate_keypair(&self, params: &KeyGenParams) -> Result<(PublicKey, PrivateKey)>;

    /// Whether the key is structurally valid and usable with this provider
    fn validate_key(&self, key: &dyn Key) -> bool;

    /// Encrypt for every key in the ring; returns ASCII-armored ciphertext
    fn encrypt(&self, plaintext: &[u8], recipients: &KeyRing<PublicKey>) -> Result<Vec<u8>>;

    /// Decrypt ASCII-armored ciphertext with any key in the ring
    fn decrypt(&self, ciphertext: &[u8], keys: &KeyRing<PrivateKey>) -> Result<Vec<u8>>;
}
