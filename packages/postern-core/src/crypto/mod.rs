//! # Cryptography Module
//!
//! Key material, the [`CryptoProvider`] seam and the default provider.
//!
//! ## Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    CRYPTOGRAPHIC ARCHITECTURE                           │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  Pipelines (encrypt / decrypt)                                         │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  trait CryptoProvider                                           │   │
//! │  │    generate_keypair · validate_key · encrypt · decrypt          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │        │                                                                │
//! │        ▼                                                                │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Curve25519Provider                                             │   │
//! │  │                                                                 │   │
//! │  │  Keys:       Ed25519 binding signature over X25519 subkey       │   │
//! │  │  Key wrap:   ephemeral X25519 ECDH → HKDF-SHA256 → AES-256-GCM │   │
//! │  │  Body:       AES-256-GCM under a random session key             │   │
//! │  │  Transport:  "-----BEGIN PGP MESSAGE-----" ASCII armor          │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Algorithm Choices
//!
//! | Algorithm | Purpose | Why Chosen |
//! |-----------|---------|------------|
//! | Ed25519 | Key binding | Fast, small keys, widely audited |
//! | X25519 | Key agreement | Fast ECDH, same curve as Ed25519 |
//! | AES-256-GCM | Encryption | Hardware acceleration, AEAD |
//! | HKDF-SHA256 | Key derivation | Industry standard, well-analyzed |
//! | SHA-256 | Fingerprints | Stable identifiers for key rings |
//!
//! ## Security Considerations
//!
//! 1. **Key Zeroization**: Private keys and session keys are zeroized when dropped
//! 2. **Constant-Time Operations**: Using dalek for constant-time crypto
//! 3. **Secure Random**: Using `rand::rngs::OsRng` for cryptographic randomness
//! 4. **No Key Reuse**: Fresh ephemeral key, session key and nonces per message

mod armor;
mod curve25519;
mod encryption;
mod kdf;
mod keys;
mod provider;
mod signing;

pub use armor::{armor_message, dearmor_message, has_pgp_message_armor, MESSAGE_BEGIN, MESSAGE_END};
pub use curve25519::{Curve25519Provider, MIN_PUBLIC_KEY_SIZE, PRIVATE_KEY_SIZE};
pub use encryption::{decrypt, encrypt, EncryptionKey, Nonce, SharedSecret, NONCE_SIZE};
pub use kdf::{compute_fingerprint, recipient_hint};
pub use keys::{
    EncryptionKeyPair, Key, KeyAlgorithm, KeyRing, PrivateKey, PublicKey, SigningKeyPair,
    KEY_ID_SIZE,
};
pub use provider::{CryptoProvider, KeyGenParams};
pub use signing::{sign, verify, Signature, SIGNATURE_SIZE};
