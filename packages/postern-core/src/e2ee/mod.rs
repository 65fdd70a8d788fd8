//! # End-to-End Encryption Pipelines
//!
//! Opportunistic Autocrypt encryption over the MIME message tree.
//!
//! ## Outgoing
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         ENCRYPT PIPELINE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. e2ee_enabled? configured_addr?           no ─► leave untouched      │
//! │  2. own keypair (generate once if missing)   busy ─► leave untouched    │
//! │  3. one recipient, peerstate with key, prefer_encrypted != no          │
//! │        yes ─► body ─► quoted-printable/base64 ─► provider.encrypt       │
//! │               body := multipart/encrypted                               │
//! │                        ├─ application/pgp-encrypted  "Version: 1"       │
//! │                        └─ application/octet-stream   armored payload    │
//! │  4. Autocrypt: addr=<own>; key=<own public key>                        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Incoming
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         DECRYPT PIPELINE                                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  1. From, Date, Autocrypt header                                       │
//! │  2. header fine = parses + addr == From + provider accepts key         │
//! │  3. peerstate: apply_header / degrade_encryption / init_from_header    │
//! │  4. every multipart/encrypted child that is armored ─► provider.decrypt │
//! │     decrypted child := parsed plaintext entity                          │
//! │     failures are counted, the walk continues                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Neither pipeline returns an error: every failure degrades to sending or
//! keeping the message unencrypted, and is reported in the outcome.

mod decrypt;
mod encrypt;

pub use decrypt::DecryptOutcome;
pub use encrypt::{EncryptOutcome, EncryptSkip};

use std::sync::Arc;

use crate::config::E2eeConfig;
use crate::crypto::{CryptoProvider, Key, KeyGenParams, PublicKey};
use crate::error::{Error, Result};
use crate::events::{Event, EventCallback, EventSink};
use crate::storage::KeyStore;

/// Encryption context shared by both pipelines
///
/// Cheap to share: wrap it in an `Arc` and call it from any number of
/// worker threads.
#[derive(Clone)]
pub struct E2ee {
    store: Arc<KeyStore>,
    provider: Arc<dyn CryptoProvider>,
    events: EventSink,
}

impl E2ee {
    /// Create a context over a key store and a crypto provider
    pub fn new(store: Arc<KeyStore>, provider: Arc<dyn CryptoProvider>) -> Self {
        Self {
            store,
            provider,
            events: EventSink::default(),
        }
    }

    /// Report progress and failures to `callback` as well as to the log
    pub fn with_event_callback(mut self, callback: EventCallback) -> Self {
        self.events = EventSink::new(Some(callback));
        self
    }

    /// The key store
    pub fn store(&self) -> &Arc<KeyStore> {
        &self.store
    }

    /// The crypto provider
    pub fn provider(&self) -> &Arc<dyn CryptoProvider> {
        &self.provider
    }

    fn load_config(&self) -> Result<E2eeConfig> {
        E2eeConfig::load(&self.store.lock())
    }

    /// Own default public key, generated and stored on first use
    ///
    /// Fails with [`Error::KeyGenerationInProgress`] if another caller is
    /// generating right now.
    pub fn own_public_key(&self, addr: &str) -> Result<PublicKey> {
        let existing = self.store.lock().get_own_keypair(addr)?;
        match existing {
            Some((public_key, _)) => Ok(public_key),
            None => self.generate_own_keypair(addr),
        }
    }

    fn generate_own_keypair(&self, addr: &str) -> Result<PublicKey> {
        let _generation = self
            .store
            .begin_key_generation()
            .ok_or(Error::KeyGenerationInProgress)?;

        // another caller may have finished between our lookup and the claim
        let existing = self.store.lock().get_own_keypair(addr)?;
        if let Some((public_key, _)) = existing {
            return Ok(public_key);
        }

        tracing::info!("Generating keypair for {}", addr);
        self.events.emit(Event::KeyGenerationStarted {
            addr: addr.to_string(),
        });

        // the store stays unlocked while the provider works
        let result = self
            .provider
            .generate_keypair(&KeyGenParams::for_user(addr))
            .and_then(|(public_key, private_key)| {
                if !self.provider.validate_key(&public_key) || !self.provider.validate_key(&private_key) {
                    return Err(Error::KeyGenerationFailed(
                        "generated keypair failed validation".into(),
                    ));
                }
                self.store
                    .lock()
                    .save_own_keypair(addr, &public_key, &private_key, true)?;
                Ok(public_key)
            });

        match &result {
            Ok(public_key) => {
                tracing::info!("Keypair for {} stored: {}", addr, public_key.fingerprint());
                self.events.emit(Event::KeyGenerationFinished {
                    addr: addr.to_string(),
                    fingerprint: public_key.fingerprint(),
                });
            }
            Err(e) => {
                tracing::warn!("Keypair generation for {} failed: {}", addr, e);
                self.events.emit(Event::KeyGenerationFailed {
                    addr: addr.to_string(),
                    reason: e.to_string(),
                });
            }
        }

        result
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::config::keys;
    use crate::crypto::{Curve25519Provider, KeyRing, PrivateKey};
    use crate::mime::{HeaderFields, MimeMessage, MimePart};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    pub const DATE_1: &str = "Tue, 1 Jul 2003 10:52:37 +0200";
    pub const DATE_2: &str = "Wed, 2 Jul 2003 10:52:37 +0200";
    pub const DATE_3: &str = "Thu, 3 Jul 2003 10:52:37 +0200";

    /// Context for `addr` over a fresh in-memory store
    pub fn party(addr: &str) -> E2ee {
        party_with(addr, Arc::new(Curve25519Provider::new()))
    }

    pub fn party_with(addr: &str, provider: Arc<dyn CryptoProvider>) -> E2ee {
        let store = KeyStore::open(None).unwrap();
        store.lock().set_config(keys::CONFIGURED_ADDR, addr).unwrap();
        E2ee::new(Arc::new(store), provider)
    }

    pub fn message(from: &str, to: &str, date: &str, text: &str) -> MimeMessage {
        let fields: HeaderFields = vec![
            ("From", from),
            ("To", to),
            ("Date", date),
            ("Subject", "hello"),
        ]
        .into_iter()
        .collect();
        MimeMessage::new(fields, MimePart::text(text))
    }

    /// Serialize and parse again, as a transport would
    pub fn transmit(message: &MimeMessage) -> MimeMessage {
        MimeMessage::parse(&message.to_bytes()).unwrap()
    }

    /// Delegates to the default provider, counting and slowing down
    /// key generation
    pub struct SlowProvider {
        inner: Curve25519Provider,
        pub generated: AtomicUsize,
        delay: Duration,
    }

    impl SlowProvider {
        pub fn new(delay: Duration) -> Self {
            Self {
                inner: Curve25519Provider::new(),
                generated: AtomicUsize::new(0),
                delay,
            }
        }
    }

    impl CryptoProvider for SlowProvider {
        fn generate_keypair(&self, params: &KeyGenParams) -> Result<(PublicKey, PrivateKey)> {
            self.generated.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.inner.generate_keypair(params)
        }

        fn validate_key(&self, key: &dyn Key) -> bool {
            self.inner.validate_key(key)
        }

        fn encrypt(&self, plaintext: &[u8], recipients: &KeyRing<PublicKey>) -> Result<Vec<u8>> {
            self.inner.encrypt(plaintext, recipients)
        }

        fn decrypt(&self, ciphertext: &[u8], keys: &KeyRing<PrivateKey>) -> Result<Vec<u8>> {
            self.inner.decrypt(ciphertext, keys)
        }
    }

    /// Provider whose key generation always fails
    pub struct BrokenKeygenProvider;

    impl CryptoProvider for BrokenKeygenProvider {
        fn generate_keypair(&self, _params: &KeyGenParams) -> Result<(PublicKey, PrivateKey)> {
            Err(Error::KeyGenerationFailed("entropy source unavailable".into()))
        }

        fn validate_key(&self, key: &dyn Key) -> bool {
            Curve25519Provider::new().validate_key(key)
        }

        fn encrypt(&self, plaintext: &[u8], recipients: &KeyRing<PublicKey>) -> Result<Vec<u8>> {
            Curve25519Provider::new().encrypt(plaintext, recipients)
        }

        fn decrypt(&self, ciphertext: &[u8], keys: &KeyRing<PrivateKey>) -> Result<Vec<u8>> {
            Curve25519Provider::new().decrypt(ciphertext, keys)
        }
    }
}
