//! # Postern Core
//!
//! Opportunistic end-to-end encryption for e-mail following the Autocrypt
//! convention: public keys travel in a message header, and mail to a
//! correspondent whose key is known gets encrypted automatically.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        POSTERN CORE MODULES                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                           E2ee                                   │  │
//! │  │   encrypt(recipients, message)      decrypt(message)             │  │
//! │  └──────┬─────────────────┬──────────────────┬──────────────────────┘  │
//! │         │                 │                  │                         │
//! │  ┌──────▼──────┐  ┌───────▼───────┐  ┌───────▼───────┐                 │
//! │  │  Peerstate  │  │   Autocrypt   │  │     MIME      │                 │
//! │  │             │  │    Header     │  │               │                 │
//! │  │ - apply     │  │ - render      │  │ - parse       │                 │
//! │  │ - degrade   │  │ - parse       │  │ - write       │                 │
//! │  │ - init      │  │               │  │ - QP / base64 │                 │
//! │  └──────┬──────┘  └───────────────┘  └───────────────┘                 │
//! │         │                                                               │
//! │  ┌──────▼──────┐  ┌───────────────────────────────────────────────┐    │
//! │  │   Storage   │  │                  Crypto                       │    │
//! │  │             │  │                                               │    │
//! │  │ - SQLite    │  │ - CryptoProvider trait                        │    │
//! │  │ - keypairs  │  │ - Curve25519Provider (X25519 + AES-256-GCM,   │    │
//! │  │ - peerstates│  │   Ed25519 key binding, PGP-style armor)       │    │
//! │  │ - config    │  │                                               │    │
//! │  └─────────────┘  └───────────────────────────────────────────────┘    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Hierarchy
//!
//! - [`error`] - Error types for the entire library
//! - [`crypto`] - Keys, the crypto provider seam and the default provider
//! - [`storage`] - SQLite key store (config, own keypairs, peerstates)
//! - [`peerstate`] - Per-correspondent key and preference tracking
//! - [`aheader`] - The `Autocrypt` header codec
//! - [`mime`] - MIME message tree, parser and writer
//! - [`e2ee`] - Encrypt and decrypt pipelines
//! - [`events`] - Progress and failure notifications
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use postern_core::{config, Curve25519Provider, E2ee, KeyStore, MimeMessage};
//!
//! let store = KeyStore::open(Some("postern.db"))?;
//! store.lock().set_config(config::keys::CONFIGURED_ADDR, "alice@example.org")?;
//! let e2ee = E2ee::new(Arc::new(store), Arc::new(Curve25519Provider::new()));
//!
//! let mut message = MimeMessage::parse(b"From: alice@example.org\r\n\r\nhi")?;
//! let outcome = e2ee.encrypt(&["bob@example.org"], &mut message);
//! println!("encrypted: {}", outcome.encrypted);
//! # Ok::<(), postern_core::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

// ============================================================================
// MODULE DECLARATIONS
// ============================================================================

pub mod aheader;
pub mod config;
pub mod crypto;
pub mod e2ee;
pub mod error;
pub mod events;
pub mod mime;
pub mod peerstate;
pub mod storage;
/// Message dates and the current time.
pub mod time;

// ============================================================================
// RE-EXPORTS
// ============================================================================

pub use aheader::AutocryptHeader;
pub use crypto::{CryptoProvider, Curve25519Provider, KeyRing, PrivateKey, PublicKey};
pub use e2ee::{DecryptOutcome, E2ee, EncryptOutcome, EncryptSkip};
pub use error::{Error, Result};
pub use events::{Event, EventCallback, PeerstateChange};
pub use mime::{MimeBody, MimeMessage, MimePart};
pub use peerstate::{PeerState, PreferEncrypted};
pub use storage::KeyStore;

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
