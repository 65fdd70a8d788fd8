//! # Key Store
//!
//! SQLite-backed storage for own keypairs, peerstates and configuration.
//!
//! ## Locking
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         KEY STORE ACCESS                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │   Pipelines     │  encrypt / decrypt                                │
//! │  └────────┬────────┘                                                   │
//! │           │ lock()                                                      │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │ KeyStoreGuard   │  Scoped access, released on drop                  │
//! │  │                 │  - config values                                  │
//! │  │                 │  - own keypairs                                   │
//! │  │                 │  - peerstates                                     │
//! │  └────────┬────────┘                                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  ┌─────────────────┐                                                   │
//! │  │   SQLite DB     │  - In-memory for tests                            │
//! │  │                 │  - File for production                            │
//! │  └─────────────────┘                                                   │
//! │                                                                         │
//! │  begin_key_generation() ── AtomicBool, one generator at a time.        │
//! │  Held across the unlocked generation window; callers that find it      │
//! │  set decline instead of waiting.                                       │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};
use rusqlite::{params, Connection, OptionalExtension};

use super::schema;
use crate::config::normalize_addr;
use crate::crypto::{KeyRing, PrivateKey, PublicKey};
use crate::error::{Error, Result};
use crate::peerstate::{PeerState, PreferEncrypted};

/// The key store handle
///
/// Share it between pipelines with an `Arc`; all access goes through
/// [`KeyStore::lock`].
pub struct KeyStore {
    /// The underlying SQLite connection
    conn: Mutex<Connection>,
    /// Set while an own keypair is being generated
    key_generation: AtomicBool,
}

impl KeyStore {
    /// Open or create a key store
    ///
    /// If path is None, creates an in-memory database (useful for testing).
    pub fn open(path: Option<&str>) -> Result<Self> {
        let conn = match path {
            Some(p) => Connection::open(p)
                .map_err(|e| Error::DatabaseError(format!("Failed to open database: {}", e)))?,
            None => Connection::open_in_memory()
                .map_err(|e| Error::DatabaseError(format!("Failed to create in-memory database: {}", e)))?,
        };

        let store = Self {
            conn: Mutex::new(conn),
            key_generation: AtomicBool::new(false),
        };

        store.init_schema()?;

        Ok(store)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        let version: Option<i32> = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| row.get(0))
            .ok();

        match version {
            None => {
                conn.execute_batch(schema::CREATE_TABLES)
                    .map_err(|e| Error::DatabaseError(format!("Failed to create tables: {}", e)))?;

                conn.execute(
                    "INSERT INTO schema_version (version) VALUES (?)",
                    params![schema::SCHEMA_VERSION],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to set schema version: {}", e)))?;

                tracing::info!("Key store schema created (version {})", schema::SCHEMA_VERSION);
            }
            Some(v) if v > schema::SCHEMA_VERSION => {
                return Err(Error::DatabaseError(format!(
                    "Key store schema version {} is newer than supported version {}",
                    v,
                    schema::SCHEMA_VERSION
                )));
            }
            Some(v) => {
                tracing::debug!("Key store schema version: {}", v);
            }
        }

        Ok(())
    }

    /// Acquire exclusive access; released when the guard is dropped
    pub fn lock(&self) -> KeyStoreGuard<'_> {
        KeyStoreGuard {
            conn: self.conn.lock(),
        }
    }

    /// Claim the one-at-a-time key generation slot
    ///
    /// Returns `None` when another caller already holds it. The slot is
    /// released when the returned guard is dropped.
    pub fn begin_key_generation(&self) -> Option<KeyGenerationGuard<'_>> {
        self.key_generation
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| KeyGenerationGuard {
                flag: &self.key_generation,
            })
    }

    /// Whether a keypair is being generated right now
    pub fn is_generating_key(&self) -> bool {
        self.key_generation.load(Ordering::Acquire)
    }
}

/// Clears the key generation flag on drop
pub struct KeyGenerationGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for KeyGenerationGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Locked view of the key store
pub struct KeyStoreGuard<'a> {
    conn: MutexGuard<'a, Connection>,
}

impl KeyStoreGuard<'_> {
    // ========================================================================
    // CONFIGURATION
    // ========================================================================

    /// Get a configuration value
    pub fn get_config(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM config WHERE keyname = ?", params![key], |row| row.get(0))
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to get config: {}", e)))
    }

    /// Get a boolean configuration value, `default` when unset
    pub fn get_config_bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get_config(key)? {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(Error::InvalidConfig {
                    key: key.to_string(),
                    value,
                }),
            },
        }
    }

    /// Set a configuration value
    pub fn set_config(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO config (keyname, value) VALUES (?, ?)",
                params![key, value],
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to set config: {}", e)))?;
        Ok(())
    }

    /// Delete a configuration value
    pub fn delete_config(&self, key: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM config WHERE keyname = ?", params![key])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete config: {}", e)))?;
        Ok(rows > 0)
    }

    // ========================================================================
    // OWN KEYPAIRS
    // ========================================================================

    /// Get the default keypair for an own address
    pub fn get_own_keypair(&self, addr: &str) -> Result<Option<(PublicKey, PrivateKey)>> {
        let row: Option<(Vec<u8>, Vec<u8>)> = self
            .conn
            .query_row(
                "SELECT public_key, private_key FROM keypairs
                 WHERE addr = ? ORDER BY is_default DESC, id DESC LIMIT 1",
                params![normalize_addr(addr)],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to get keypair: {}", e)))?;

        row.map(|(public, private)| Ok((decode_public(&public)?, decode_private(&private)?)))
            .transpose()
    }

    /// Load every private key stored for an own address, default first
    pub fn load_self_private_keys(&self, addr: &str) -> Result<KeyRing<PrivateKey>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT private_key FROM keypairs
                 WHERE addr = ? ORDER BY is_default DESC, id DESC",
            )
            .map_err(|e| Error::DatabaseError(format!("Failed to prepare query: {}", e)))?;

        let blobs = stmt
            .query_map(params![normalize_addr(addr)], |row| row.get::<_, Vec<u8>>(0))
            .map_err(|e| Error::DatabaseError(format!("Failed to query keypairs: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::DatabaseError(format!("Failed to read keypair: {}", e)))?;

        blobs.iter().map(|blob| decode_private(blob)).collect()
    }

    /// Store an own keypair
    ///
    /// With `is_default` set, every other keypair of the address loses its
    /// default flag.
    pub fn save_own_keypair(
        &self,
        addr: &str,
        public_key: &PublicKey,
        private_key: &PrivateKey,
        is_default: bool,
    ) -> Result<()> {
        let addr = normalize_addr(addr);
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(|e| Error::DatabaseError(format!("Failed to begin transaction: {}", e)))?;

        if is_default {
            tx.execute("UPDATE keypairs SET is_default = 0 WHERE addr = ?", params![addr])
                .map_err(|e| Error::DatabaseError(format!("Failed to reset default keypair: {}", e)))?;
        }

        tx.execute(
            "INSERT INTO keypairs (addr, is_default, public_key, private_key, created)
             VALUES (?, ?, ?, ?, ?)",
            params![
                addr,
                is_default,
                public_key.to_bytes(),
                private_key.to_bytes(),
                crate::time::now_timestamp(),
            ],
        )
        .map_err(|e| Error::DatabaseError(format!("Failed to save keypair: {}", e)))?;

        tx.commit()
            .map_err(|e| Error::DatabaseError(format!("Failed to commit keypair: {}", e)))?;
        Ok(())
    }

    // ========================================================================
    // PEERSTATES
    // ========================================================================

    /// Load the peerstate for an address (case-insensitive)
    pub fn load_peerstate(&self, addr: &str) -> Result<Option<PeerState>> {
        let row: Option<(String, i64, i64, Option<Vec<u8>>, i64)> = self
            .conn
            .query_row(
                "SELECT addr, last_seen, last_seen_autocrypt, public_key, prefer_encrypted
                 FROM acpeerstates WHERE addr = ?",
                params![normalize_addr(addr)],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .map_err(|e| Error::DatabaseError(format!("Failed to get peerstate: {}", e)))?;

        row.map(|(addr, last_seen, last_seen_autocrypt, public_key, prefer_encrypted)| {
            Ok(PeerState {
                addr,
                last_seen,
                last_seen_autocrypt,
                public_key: public_key.as_deref().map(decode_public).transpose()?,
                prefer_encrypted: PreferEncrypted::from_db(prefer_encrypted),
            })
        })
        .transpose()
    }

    /// Persist a peerstate
    ///
    /// `create` inserts a new row; otherwise the row matched by address is
    /// updated and must exist.
    pub fn save_peerstate(&self, state: &PeerState, create: bool) -> Result<()> {
        let addr = normalize_addr(&state.addr);
        let public_key = state.public_key.as_ref().map(PublicKey::to_bytes);

        if create {
            self.conn
                .execute(
                    "INSERT INTO acpeerstates
                        (addr, last_seen, last_seen_autocrypt, public_key, prefer_encrypted)
                     VALUES (?, ?, ?, ?, ?)",
                    params![
                        addr,
                        state.last_seen,
                        state.last_seen_autocrypt,
                        public_key,
                        state.prefer_encrypted.to_db(),
                    ],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to create peerstate: {}", e)))?;
        } else {
            let rows = self
                .conn
                .execute(
                    "UPDATE acpeerstates
                     SET last_seen = ?, last_seen_autocrypt = ?, public_key = ?, prefer_encrypted = ?
                     WHERE addr = ?",
                    params![
                        state.last_seen,
                        state.last_seen_autocrypt,
                        public_key,
                        state.prefer_encrypted.to_db(),
                        addr,
                    ],
                )
                .map_err(|e| Error::DatabaseError(format!("Failed to update peerstate: {}", e)))?;
            if rows == 0 {
                return Err(Error::DatabaseError(format!("No peerstate for {}", addr)));
            }
        }

        Ok(())
    }

    /// Delete the peerstate for an address
    pub fn delete_peerstate(&self, addr: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM acpeerstates WHERE addr = ?", params![normalize_addr(addr)])
            .map_err(|e| Error::DatabaseError(format!("Failed to delete peerstate: {}", e)))?;
        Ok(rows > 0)
    }
}

fn decode_public(blob: &[u8]) -> Result<PublicKey> {
    PublicKey::from_bytes(blob)
        .map_err(|e| Error::StorageCorrupted(format!("Stored public key unreadable: {}", e)))
}

fn decode_private(blob: &[u8]) -> Result<PrivateKey> {
    PrivateKey::from_bytes(blob)
        .map_err(|e| Error::StorageCorrupted(format!("Stored private key unreadable: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{Key, KeyAlgorithm};

    fn test_public(fill: u8) -> PublicKey {
        PublicKey::new(KeyAlgorithm::Curve25519, vec![fill; 130])
    }

    fn test_private(fill: u8) -> PrivateKey {
        PrivateKey::new(KeyAlgorithm::Curve25519, vec![fill; 64])
    }

    fn peerstate(addr: &str, last_seen: i64) -> PeerState {
        PeerState {
            addr: addr.to_string(),
            last_seen,
            last_seen_autocrypt: last_seen,
            public_key: Some(test_public(1)),
            prefer_encrypted: PreferEncrypted::Mutual,
        }
    }

    #[test]
    fn test_store_creation() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();
        let version: i32 = guard
            .conn
            .query_row("SELECT version FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, schema::SCHEMA_VERSION);
    }

    #[test]
    fn test_config() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        assert_eq!(guard.get_config("configured_addr").unwrap(), None);
        guard.set_config("configured_addr", "alice@example.org").unwrap();
        assert_eq!(
            guard.get_config("configured_addr").unwrap().as_deref(),
            Some("alice@example.org")
        );

        guard.set_config("configured_addr", "other@example.org").unwrap();
        assert_eq!(
            guard.get_config("configured_addr").unwrap().as_deref(),
            Some("other@example.org")
        );

        assert!(guard.delete_config("configured_addr").unwrap());
        assert!(!guard.delete_config("configured_addr").unwrap());
        assert_eq!(guard.get_config("configured_addr").unwrap(), None);
    }

    #[test]
    fn test_config_bool() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        assert!(guard.get_config_bool("e2ee_enabled", true).unwrap());
        guard.set_config("e2ee_enabled", "0").unwrap();
        assert!(!guard.get_config_bool("e2ee_enabled", true).unwrap());
        guard.set_config("e2ee_enabled", "True").unwrap();
        assert!(guard.get_config_bool("e2ee_enabled", false).unwrap());

        guard.set_config("e2ee_enabled", "maybe").unwrap();
        assert!(matches!(
            guard.get_config_bool("e2ee_enabled", true),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_own_keypair() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        assert!(guard.get_own_keypair("alice@example.org").unwrap().is_none());
        assert!(guard.load_self_private_keys("alice@example.org").unwrap().is_empty());

        guard
            .save_own_keypair("Alice@Example.org", &test_public(1), &test_private(1), true)
            .unwrap();
        let (public, private) = guard.get_own_keypair("alice@example.org").unwrap().unwrap();
        assert_eq!(public, test_public(1));
        assert_eq!(private.raw_bytes(), test_private(1).raw_bytes());
    }

    #[test]
    fn test_default_keypair_switches() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        guard
            .save_own_keypair("alice@example.org", &test_public(1), &test_private(1), true)
            .unwrap();
        guard
            .save_own_keypair("alice@example.org", &test_public(2), &test_private(2), true)
            .unwrap();
        guard
            .save_own_keypair("alice@example.org", &test_public(3), &test_private(3), false)
            .unwrap();

        let (public, _) = guard.get_own_keypair("alice@example.org").unwrap().unwrap();
        assert_eq!(public, test_public(2));

        let ring = guard.load_self_private_keys("ALICE@example.org").unwrap();
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().next().unwrap().raw_bytes(), test_private(2).raw_bytes());
    }

    #[test]
    fn test_peerstate_roundtrip() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        assert!(guard.load_peerstate("bob@x").unwrap().is_none());

        let state = peerstate("bob@x", 100);
        guard.save_peerstate(&state, true).unwrap();

        let loaded = guard.load_peerstate("BOB@X").unwrap().unwrap();
        assert_eq!(loaded, state);
    }

    #[test]
    fn test_peerstate_update() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        let mut state = peerstate("bob@x", 100);
        guard.save_peerstate(&state, true).unwrap();

        state.last_seen = 200;
        state.prefer_encrypted = PreferEncrypted::No;
        guard.save_peerstate(&state, false).unwrap();

        let loaded = guard.load_peerstate("bob@x").unwrap().unwrap();
        assert_eq!(loaded.last_seen, 200);
        assert_eq!(loaded.last_seen_autocrypt, 100);
        assert_eq!(loaded.prefer_encrypted, PreferEncrypted::No);
        assert_eq!(loaded.public_key, Some(test_public(1)));
    }

    #[test]
    fn test_peerstate_without_key() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        let mut state = peerstate("carol@x", 5);
        state.public_key = None;
        guard.save_peerstate(&state, true).unwrap();
        assert_eq!(guard.load_peerstate("carol@x").unwrap().unwrap().public_key, None);
    }

    #[test]
    fn test_peerstate_create_twice_fails() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        guard.save_peerstate(&peerstate("bob@x", 1), true).unwrap();
        assert!(guard.save_peerstate(&peerstate("Bob@X", 2), true).is_err());
    }

    #[test]
    fn test_update_missing_peerstate_fails() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();
        assert!(guard.save_peerstate(&peerstate("nobody@x", 1), false).is_err());
    }

    #[test]
    fn test_delete_peerstate() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();

        guard.save_peerstate(&peerstate("bob@x", 1), true).unwrap();
        assert!(guard.delete_peerstate("bob@x").unwrap());
        assert!(!guard.delete_peerstate("bob@x").unwrap());
        assert!(guard.load_peerstate("bob@x").unwrap().is_none());
    }

    #[test]
    fn test_corrupted_key_blob() {
        let store = KeyStore::open(None).unwrap();
        let guard = store.lock();
        guard
            .conn
            .execute(
                "INSERT INTO acpeerstates (addr, public_key) VALUES ('bad@x', X'FF00')",
                [],
            )
            .unwrap();
        assert!(matches!(
            guard.load_peerstate("bad@x"),
            Err(Error::StorageCorrupted(_))
        ));
    }

    #[test]
    fn test_key_generation_guard() {
        let store = KeyStore::open(None).unwrap();
        assert!(!store.is_generating_key());

        let first = store.begin_key_generation();
        assert!(first.is_some());
        assert!(store.is_generating_key());
        assert!(store.begin_key_generation().is_none());

        drop(first);
        assert!(!store.is_generating_key());
        assert!(store.begin_key_generation().is_some());
    }

    #[test]
    fn test_file_backed_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keys.db");
        let path = path.to_str().unwrap();

        {
            let store = KeyStore::open(Some(path)).unwrap();
            let guard = store.lock();
            guard.set_config("configured_addr", "alice@example.org").unwrap();
            guard.save_peerstate(&peerstate("bob@x", 42), true).unwrap();
        }

        let store = KeyStore::open(Some(path)).unwrap();
        let guard = store.lock();
        assert_eq!(
            guard.get_config("configured_addr").unwrap().as_deref(),
            Some("alice@example.org")
        );
        assert_eq!(guard.load_peerstate("bob@x").unwrap().unwrap().last_seen, 42);
    }
}
