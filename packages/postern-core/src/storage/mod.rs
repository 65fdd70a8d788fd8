//! # Storage Module
//!
//! Local persistence for the end-to-end encryption state.
//!
//! ## Storage Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        STORAGE ARCHITECTURE                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                      KeyStore                                   │   │
//! │  │                                                                 │   │
//! │  │  config        e2ee_enabled, configured_addr, ...              │   │
//! │  │  keypairs      own public + private keys, one default per addr │   │
//! │  │  acpeerstates  one Autocrypt peerstate per correspondent        │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                               │                                         │
//! │                               ▼                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SQLite (rusqlite, bundled)                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Private keys are stored as-is. Protecting the database file at rest is
//! the embedding application's job.

mod key_store;
pub mod schema;

pub use key_store::{KeyGenerationGuard, KeyStore, KeyStoreGuard};
