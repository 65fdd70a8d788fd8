//! # Key Management
//!
//! Opaque key material exchanged through Autocrypt headers and persisted in
//! the key store, plus the concrete Ed25519/X25519 keypairs the default
//! provider builds that material from.
//!
//! ## Key Types
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                            KEY TYPES                                    │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  PublicKey / PrivateKey          (provider independent)                │
//! │  ┌──────────────────────────────────────────────────────────────┐      │
//! │  │  algorithm tag (1 byte)  │  key bytes (provider defined)     │      │
//! │  └──────────────────────────────────────────────────────────────┘      │
//! │         │                                                               │
//! │         ├──► fingerprint = SHA-256(tag || bytes), upper-case hex       │
//! │         └──► key id      = last 8 bytes of the fingerprint             │
//! │                                                                         │
//! │  SigningKeyPair (Ed25519)   ── binds the user id to the key            │
//! │  EncryptionKeyPair (X25519) ── receives message session keys           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::fmt;

use ed25519_dalek::{SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::kdf::compute_fingerprint;
use crate::error::{Error, Result};

/// Number of fingerprint bytes that make up the short key id
pub const KEY_ID_SIZE: usize = 8;

/// Public key algorithms understood by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyAlgorithm {
    /// Ed25519 binding signature plus X25519 encryption subkey
    Curve25519,
}

impl KeyAlgorithm {
    /// Wire and storage tag
    pub fn tag(self) -> u8 {
        match self {
            KeyAlgorithm::Curve25519 => 1,
        }
    }

    /// Look up an algorithm by its tag
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(KeyAlgorithm::Curve25519),
            other => Err(Error::InvalidKey(format!("Unknown key algorithm tag {}", other))),
        }
    }
}

/// Common view over public and private key material
///
/// Crypto providers validate keys through this trait so one
/// `validate_key` entry point covers both halves of a keypair.
pub trait Key {
    /// Algorithm the key bytes belong to
    fn algorithm(&self) -> KeyAlgorithm;

    /// Provider-defined key bytes (without the algorithm tag)
    fn raw_bytes(&self) -> &[u8];

    /// Whether this is secret key material
    fn is_private(&self) -> bool;

    /// Stable fingerprint, upper-case hex of SHA-256 over tag and bytes
    fn fingerprint(&self) -> String {
        hex::encode_upper(compute_fingerprint(self.algorithm().tag(), self.raw_bytes()))
    }

    /// Short key id derived from the fingerprint
    fn key_id(&self) -> String {
        let digest = compute_fingerprint(self.algorithm().tag(), self.raw_bytes());
        hex::encode_upper(&digest[digest.len() - KEY_ID_SIZE..])
    }
}

/// Encode `tag || bytes`
fn to_tagged_bytes(algorithm: KeyAlgorithm, bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(bytes.len() + 1);
    out.push(algorithm.tag());
    out.extend_from_slice(bytes);
    out
}

/// Decode `tag || bytes`
fn from_tagged_bytes(data: &[u8]) -> Result<(KeyAlgorithm, &[u8])> {
    let (tag, rest) = data
        .split_first()
        .ok_or_else(|| Error::InvalidKey("Empty key blob".into()))?;
    if rest.is_empty() {
        return Err(Error::InvalidKey("Key blob has no key bytes".into()));
    }
    Ok((KeyAlgorithm::from_tag(*tag)?, rest))
}

// ============================================================================
// PUBLIC KEY
// ============================================================================

/// A public key as carried by Autocrypt headers and stored in peerstates
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    algorithm: KeyAlgorithm,
    bytes: Vec<u8>,
}

impl PublicKey {
    /// Wrap provider-defined key bytes
    pub fn new(algorithm: KeyAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Serialize as `tag || bytes`
    pub fn to_bytes(&self) -> Vec<u8> {
        to_tagged_bytes(self.algorithm, &self.bytes)
    }

    /// Parse a `tag || bytes` blob
    ///
    /// Only the framing is checked here; whether the bytes form a usable
    /// key is up to the crypto provider.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (algorithm, bytes) = from_tagged_bytes(data)?;
        Ok(Self::new(algorithm, bytes.to_vec()))
    }
}

impl Key for PublicKey {
    fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_private(&self) -> bool {
        false
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm)
            .field("fingerprint", &self.fingerprint())
            .finish()
    }
}

// ============================================================================
// PRIVATE KEY
// ============================================================================

/// Secret key material, zeroized when dropped
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey {
    #[zeroize(skip)]
    algorithm: KeyAlgorithm,
    bytes: Vec<u8>,
}

impl PrivateKey {
    /// Wrap provider-defined secret key bytes
    pub fn new(algorithm: KeyAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Serialize as `tag || bytes`
    ///
    /// Only for the key store. Never log or transmit these bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        to_tagged_bytes(self.algorithm, &self.bytes)
    }

    /// Parse a `tag || bytes` blob
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (algorithm, bytes) = from_tagged_bytes(data)?;
        Ok(Self::new(algorithm, bytes.to_vec()))
    }
}

impl Key for PrivateKey {
    fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    fn raw_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn is_private(&self) -> bool {
        true
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// KEY RING
// ============================================================================

/// Ordered set of candidate keys, built per call and never persisted
#[derive(Debug, Clone)]
pub struct KeyRing<K> {
    keys: Vec<K>,
}

impl<K: Key> KeyRing<K> {
    /// Create an empty ring
    pub fn new() -> Self {
        Self { keys: Vec::new() }
    }

    /// Add a key; a key whose fingerprint is already present is skipped
    pub fn add(&mut self, key: K) {
        let fingerprint = key.fingerprint();
        if !self.keys.iter().any(|k| k.fingerprint() == fingerprint) {
            self.keys.push(key);
        }
    }

    /// Number of keys in the ring
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether the ring holds no keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Iterate over the keys in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.keys.iter()
    }
}

impl<K: Key> Default for KeyRing<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Key> FromIterator<K> for KeyRing<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut ring = Self::new();
        for key in iter {
            ring.add(key);
        }
        ring
    }
}

// ============================================================================
// CURVE25519 KEYPAIRS
// ============================================================================

/// Ed25519 signing keypair
#[derive(ZeroizeOnDrop)]
pub struct SigningKeyPair {
    #[zeroize(skip)] // ed25519_dalek handles its own zeroization
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generate a new random signing keypair
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Get the secret key bytes (for the key store only)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the verifying key
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    pub(crate) fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }
}

/// X25519 encryption keypair for key agreement
#[derive(ZeroizeOnDrop)]
pub struct EncryptionKeyPair {
    #[zeroize(skip)] // x25519_dalek handles its own zeroization
    secret: StaticSecret,
    #[zeroize(skip)]
    public: X25519PublicKey,
}

impl EncryptionKeyPair {
    /// Generate a new random encryption keypair
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        let secret = StaticSecret::from(*bytes);
        let public = X25519PublicKey::from(&secret);
        Self { secret, public }
    }

    /// Get the secret key bytes (for the key store only)
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret.to_bytes()
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public.to_bytes()
    }

    /// Perform Diffie-Hellman key exchange
    pub fn diffie_hellman(&self, their_public: &[u8; 32]) -> [u8; 32] {
        let their_public = X25519PublicKey::from(*their_public);
        self.secret.diffie_hellman(&their_public).to_bytes()
    }
}
