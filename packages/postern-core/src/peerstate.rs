//! # Peerstate Engine
//!
//! What we know about one correspondent's key and encryption preference,
//! and how each incoming message changes it.
//!
//! ## State Transitions
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       PEERSTATE TRANSITIONS                             │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  incoming message (time t)                                             │
//! │        │                                                                │
//! │        ├── no peerstate, valid header ───► init_from_header(t)          │
//! │        │                                                                │
//! │        ├── peerstate, valid header                                     │
//! │        │     t < last_seen_autocrypt or t < last_seen ─► ignored        │
//! │        │     otherwise ─► apply_header: key, preference,                │
//! │        │                  last_seen = last_seen_autocrypt = t           │
//! │        │                                                                │
//! │        └── peerstate, no valid header                                  │
//! │              t <= last_seen ─► ignored                                  │
//! │              otherwise ─► degrade_encryption: preference = No,         │
//! │                           last_seen = t, key kept                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All updates are monotonic in message time, so replaying an old message
//! can never roll a peer back to an older key or preference.

use serde::Serialize;

use crate::aheader::AutocryptHeader;
use crate::config::normalize_addr;
use crate::crypto::PublicKey;
use crate::error::Result;
use crate::storage::KeyStoreGuard;

/// A peer's encryption preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferEncrypted {
    /// No preference stated (also the value when the attribute is absent)
    #[default]
    NoPreference,
    /// Peer wants encryption when both sides agree
    Mutual,
    /// Peer does not want encryption, or its client lost Autocrypt support
    No,
}

impl PreferEncrypted {
    /// Integer stored in the key store
    pub fn to_db(self) -> i64 {
        match self {
            PreferEncrypted::NoPreference => 0,
            PreferEncrypted::Mutual => 1,
            PreferEncrypted::No => 20,
        }
    }

    /// Inverse of [`PreferEncrypted::to_db`]; unknown values are treated as
    /// no preference
    pub fn from_db(value: i64) -> Self {
        match value {
            1 => PreferEncrypted::Mutual,
            20 => PreferEncrypted::No,
            _ => PreferEncrypted::NoPreference,
        }
    }

    /// String form used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferEncrypted::NoPreference => "nopreference",
            PreferEncrypted::Mutual => "mutual",
            PreferEncrypted::No => "no",
        }
    }
}

/// Persistent Autocrypt state for one correspondent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerState {
    /// Correspondent address, normalized
    pub addr: String,
    /// Date of the newest message used to update this state
    pub last_seen: i64,
    /// Date of the newest message that carried a valid Autocrypt header
    pub last_seen_autocrypt: i64,
    /// Last usable key; never cleared by a degrade
    pub public_key: Option<PublicKey>,
    /// Preference mirrored from the peer's last header
    pub prefer_encrypted: PreferEncrypted,
}

impl PeerState {
    /// Fetch the peerstate for `addr` from the key store
    pub fn load(guard: &KeyStoreGuard<'_>, addr: &str) -> Result<Option<Self>> {
        guard.load_peerstate(addr)
    }

    /// Persist; `create` inserts a new row, otherwise the existing row is
    /// updated
    pub fn save(&self, guard: &KeyStoreGuard<'_>, create: bool) -> Result<()> {
        guard.save_peerstate(self, create)
    }

    /// New state seeded from the first valid header seen from a peer
    pub fn init_from_header(header: &AutocryptHeader, message_time: i64) -> Self {
        Self {
            addr: normalize_addr(&header.addr),
            last_seen: message_time,
            last_seen_autocrypt: message_time,
            public_key: Some(header.public_key.clone()),
            prefer_encrypted: header.prefer_encrypted,
        }
    }

    /// Take key and preference from a header
    ///
    /// A header older than what this state already reflects is ignored,
    /// as is a header for a different address. Returns whether the state
    /// changed.
    pub fn apply_header(&mut self, header: &AutocryptHeader, message_time: i64) -> bool {
        if normalize_addr(&header.addr) != normalize_addr(&self.addr) {
            tracing::warn!(
                "Autocrypt header for {} not applied to peerstate of {}",
                header.addr,
                self.addr
            );
            return false;
        }
        if message_time < self.last_seen_autocrypt || message_time < self.last_seen {
            tracing::debug!(
                "Ignoring stale Autocrypt header from {} (message {}, last seen {})",
                self.addr,
                message_time,
                self.last_seen
            );
            return false;
        }

        self.public_key = Some(header.public_key.clone());
        self.prefer_encrypted = header.prefer_encrypted;
        self.last_seen = message_time;
        self.last_seen_autocrypt = message_time;
        true
    }

    /// Record a newer message that arrived without a valid header
    ///
    /// The key is kept; only the preference drops to `No`. Returns whether
    /// the state changed.
    pub fn degrade_encryption(&mut self, message_time: i64) -> bool {
        if message_time <= self.last_seen {
            return false;
        }

        tracing::info!(
            "Degrading encryption for {} (message {} without Autocrypt header)",
            self.addr,
            message_time
        );
        self.prefer_encrypted = PreferEncrypted::No;
        self.last_seen = message_time;
        true
    }

    /// Whether outgoing mail to this peer may be encrypted
    pub fn can_encrypt(&self) -> bool {
        self.public_key.is_some() && self.prefer_encrypted != PreferEncrypted::No
    }
}
