//! Outgoing messages: Autocrypt header and body encryption

use super::E2ee;
use crate::aheader::{AutocryptHeader, HEADER_NAME};
use crate::crypto::{KeyRing, PublicKey};
use crate::error::Error;
use crate::mime::{ContentType, MimeMessage, MimePart};
use crate::peerstate::{PeerState, PreferEncrypted};

/// Protocol parameter and content type of the version part
const PGP_ENCRYPTED: &str = "application/pgp-encrypted";

/// Body of the version part
const VERSION_BODY: &[u8] = b"Version: 1\r\n";

/// Why a message went out unencrypted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptSkip {
    /// `e2ee_enabled` is off
    E2eeDisabled,
    /// No own address configured
    NoConfiguredAddr,
    /// Another caller is generating the own keypair
    KeyGenerationInProgress,
    /// Own keypair could not be generated or stored
    KeyGenerationFailed,
    /// The key store could not be read
    StorageError,
    /// Zero or several recipients
    NotSingleRecipient,
    /// No key known for the recipient
    NoPeerstate,
    /// The recipient's last message asked for no encryption
    PeerPrefersNoEncryption,
    /// Nothing to encrypt
    EmptyBody,
    /// The provider refused or failed
    EncryptionFailed,
}

/// Result of [`E2ee::encrypt`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptOutcome {
    /// The body was replaced by the encrypted envelope
    pub encrypted: bool,
    /// An `Autocrypt` header with the own key was attached
    pub autocrypt_header_added: bool,
    /// Set whenever `encrypted` is false
    pub skip_reason: Option<EncryptSkip>,
}

impl EncryptOutcome {
    fn skipped(reason: EncryptSkip) -> Self {
        Self {
            encrypted: false,
            autocrypt_header_added: false,
            skip_reason: Some(reason),
        }
    }
}

impl E2ee {
    /// Attach the own Autocrypt header and, where possible, encrypt the body
    ///
    /// The body is encrypted only for exactly one recipient whose peerstate
    /// holds a key and does not prefer `no`. The header is attached whenever
    /// the own key is available, encrypted or not, so the recipient learns
    /// it for the next reply. Nothing here fails the send: on any problem
    /// the message stays as it was and the reason is in the outcome.
    pub fn encrypt<S: AsRef<str>>(&self, recipients: &[S], message: &mut MimeMessage) -> EncryptOutcome {
        let config = match self.load_config() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Cannot read encryption settings: {}", e);
                return EncryptOutcome::skipped(EncryptSkip::StorageError);
            }
        };
        if !config.enabled {
            return EncryptOutcome::skipped(EncryptSkip::E2eeDisabled);
        }
        let Some(own_addr) = config.configured_addr else {
            tracing::debug!("No configured address, sending without Autocrypt");
            return EncryptOutcome::skipped(EncryptSkip::NoConfiguredAddr);
        };

        let own_key = match self.own_public_key(&own_addr) {
            Ok(key) => key,
            Err(Error::KeyGenerationInProgress) => {
                tracing::info!("Key generation in progress, sending unencrypted");
                return EncryptOutcome::skipped(EncryptSkip::KeyGenerationInProgress);
            }
            Err(Error::DatabaseError(e)) => {
                tracing::warn!("Cannot read own keypair: {}", e);
                return EncryptOutcome::skipped(EncryptSkip::StorageError);
            }
            Err(e) => {
                tracing::warn!("No own key available: {}", e);
                return EncryptOutcome::skipped(EncryptSkip::KeyGenerationFailed);
            }
        };
        let header = AutocryptHeader::new(own_addr, own_key, config.prefer_encrypted);

        let skip_reason = match self.recipient_key(recipients) {
            Ok(peer_key) => self.encrypt_body(message, peer_key).err(),
            Err(reason) => Some(reason),
        };
        if let Some(reason) = skip_reason {
            tracing::debug!("Not encrypting: {:?}", reason);
        }

        message.fields.set(HEADER_NAME, header.render());

        EncryptOutcome {
            encrypted: skip_reason.is_none(),
            autocrypt_header_added: true,
            skip_reason,
        }
    }

    /// Key to encrypt for, if the recipient set allows encryption
    fn recipient_key<S: AsRef<str>>(&self, recipients: &[S]) -> Result<PublicKey, EncryptSkip> {
        let [recipient] = recipients else {
            return Err(EncryptSkip::NotSingleRecipient);
        };

        let state = PeerState::load(&self.store.lock(), recipient.as_ref()).map_err(|e| {
            tracing::warn!("Cannot load peerstate: {}", e);
            EncryptSkip::StorageError
        })?;
        let state = state.ok_or(EncryptSkip::NoPeerstate)?;

        if state.prefer_encrypted == PreferEncrypted::No {
            return Err(EncryptSkip::PeerPrefersNoEncryption);
        }
        state.public_key.ok_or(EncryptSkip::NoPeerstate)
    }

    fn encrypt_body(&self, message: &mut MimeMessage, peer_key: PublicKey) -> Result<(), EncryptSkip> {
        if message.body.is_empty() {
            return Err(EncryptSkip::EmptyBody);
        }

        // work on a copy so a failure leaves the outgoing body untouched
        let mut body = message.body.clone();
        body.make_transport_safe().map_err(|e| {
            tracing::warn!("Cannot prepare body for encryption: {}", e);
            EncryptSkip::EncryptionFailed
        })?;
        let plaintext = body.to_bytes();

        let recipients: KeyRing<PublicKey> = std::iter::once(peer_key).collect();
        let ciphertext = self.provider.encrypt(&plaintext, &recipients).map_err(|e| {
            tracing::warn!("Encryption failed: {}", e);
            EncryptSkip::EncryptionFailed
        })?;

        let plain = message.replace_body(encrypted_envelope(ciphertext));
        drop(plain);
        tracing::info!("Message body encrypted");
        Ok(())
    }
}

/// `multipart/encrypted` wrapper around armored ciphertext
fn encrypted_envelope(ciphertext: Vec<u8>) -> MimePart {
    let mut version = MimePart::leaf(
        &ContentType::new("application", "pgp-encrypted"),
        VERSION_BODY.to_vec(),
    );
    version.headers.append("Content-Transfer-Encoding", "7bit");

    let mut payload = MimePart::leaf(&ContentType::new("application", "octet-stream"), ciphertext);
    payload.headers.append("Content-Transfer-Encoding", "7bit");

    MimePart::multipart(
        ContentType::new("multipart", "encrypted").with_param("protocol", PGP_ENCRYPTED),
        vec![version, payload],
    )
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::config::keys;
    use crate::crypto::{has_pgp_message_armor, KeyAlgorithm};
    use crate::mime::MimeBody;

    fn bob_knows_alice(bob: &E2ee, alice: &E2ee, prefer: PreferEncrypted) {
        let key = alice.own_public_key("alice@x").unwrap();
        PeerState {
            addr: "alice@x".into(),
            last_seen: 100,
            last_seen_autocrypt: 100,
            public_key: Some(key),
            prefer_encrypted: prefer,
        }
        .save(&bob.store().lock(), true)
        .unwrap();
    }

    #[test]
    fn test_header_attached_without_peerstate() {
        let alice = party("alice@x");
        let mut msg = message("alice@x", "bob@x", DATE_1, "hi");
        let before = msg.body.clone();

        let outcome = alice.encrypt(&["bob@x"], &mut msg);
        assert!(!outcome.encrypted);
        assert!(outcome.autocrypt_header_added);
        assert_eq!(outcome.skip_reason, Some(EncryptSkip::NoPeerstate));
        assert_eq!(msg.body, before);

        let header = AutocryptHeader::from_header_fields(&msg.fields).unwrap();
        assert_eq!(header.addr, "alice@x");
        assert_eq!(header.public_key, alice.own_public_key("alice@x").unwrap());
        assert_eq!(header.prefer_encrypted, PreferEncrypted::NoPreference);
    }

    #[test]
    fn test_encrypts_for_known_peer() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        bob_knows_alice(&bob, &alice, PreferEncrypted::Mutual);

        let mut msg = message("bob@x", "alice@x", DATE_1, "secret");
        let outcome = bob.encrypt(&["alice@x"], &mut msg);
        assert!(outcome.encrypted);
        assert!(outcome.autocrypt_header_added);
        assert_eq!(outcome.skip_reason, None);

        let content_type = msg.body.content_type();
        assert!(content_type.is("multipart", "encrypted"));
        assert_eq!(content_type.param("protocol"), Some(PGP_ENCRYPTED));

        let MimeBody::Multipart(children) = &msg.body.body else {
            panic!("expected envelope");
        };
        assert_eq!(children.len(), 2);
        assert!(children[0].content_type().is("application", "pgp-encrypted"));
        assert_eq!(children[0].decoded_body().unwrap(), VERSION_BODY);
        assert!(children[1].content_type().is("application", "octet-stream"));
        assert!(has_pgp_message_armor(&children[1].decoded_body().unwrap()));
        assert!(!String::from_utf8_lossy(&msg.to_bytes()).contains("secret"));
    }

    #[test]
    fn test_no_preference_peer_is_encrypted() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        bob_knows_alice(&bob, &alice, PreferEncrypted::NoPreference);

        let mut msg = message("bob@x", "alice@x", DATE_1, "hi");
        assert!(bob.encrypt(&["alice@x"], &mut msg).encrypted);
    }

    #[test]
    fn test_recipient_count_must_be_one() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        bob_knows_alice(&bob, &alice, PreferEncrypted::Mutual);

        let none: [&str; 0] = [];
        for recipients in [&none[..], &["alice@x", "carol@x"][..], &["alice@x", "alice@x"][..]] {
            let mut msg = message("bob@x", "alice@x", DATE_1, "hi");
            let outcome = bob.encrypt(recipients, &mut msg);
            assert!(!outcome.encrypted);
            assert!(outcome.autocrypt_header_added);
            assert_eq!(outcome.skip_reason, Some(EncryptSkip::NotSingleRecipient));
        }
    }

    #[test]
    fn test_peer_preferring_no_is_not_encrypted() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        bob_knows_alice(&bob, &alice, PreferEncrypted::No);

        let mut msg = message("bob@x", "alice@x", DATE_1, "hi");
        let outcome = bob.encrypt(&["alice@x"], &mut msg);
        assert_eq!(outcome.skip_reason, Some(EncryptSkip::PeerPrefersNoEncryption));
        assert!(outcome.autocrypt_header_added);
    }

    #[test]
    fn test_disabled_or_unconfigured() {
        let alice = party("alice@x");
        alice.store().lock().set_config(keys::E2EE_ENABLED, "0").unwrap();
        let mut msg = message("alice@x", "bob@x", DATE_1, "hi");
        let before = msg.clone();
        assert_eq!(
            alice.encrypt(&["bob@x"], &mut msg),
            EncryptOutcome::skipped(EncryptSkip::E2eeDisabled)
        );
        assert_eq!(msg, before);

        alice.store().lock().set_config(keys::E2EE_ENABLED, "1").unwrap();
        alice.store().lock().delete_config(keys::CONFIGURED_ADDR).unwrap();
        assert_eq!(
            alice.encrypt(&["bob@x"], &mut msg),
            EncryptOutcome::skipped(EncryptSkip::NoConfiguredAddr)
        );
        assert_eq!(msg, before);
    }

    #[test]
    fn test_key_generation_in_progress() {
        let alice = party("alice@x");
        let _held = alice.store().begin_key_generation().unwrap();
        let mut msg = message("alice@x", "bob@x", DATE_1, "hi");
        assert_eq!(
            alice.encrypt(&["bob@x"], &mut msg),
            EncryptOutcome::skipped(EncryptSkip::KeyGenerationInProgress)
        );
        assert!(!msg.fields.contains(HEADER_NAME));
    }

    #[test]
    fn test_mutual_preference_advertised() {
        let alice = party("alice@x");
        alice.store().lock().set_config(keys::E2EE_PREFER_MUTUAL, "1").unwrap();
        let mut msg = message("alice@x", "bob@x", DATE_1, "hi");
        alice.encrypt(&["bob@x"], &mut msg);

        let header = AutocryptHeader::from_header_fields(&msg.fields).unwrap();
        assert_eq!(header.prefer_encrypted, PreferEncrypted::Mutual);
    }

    #[test]
    fn test_existing_header_replaced() {
        let alice = party("alice@x");
        let mut msg = message("alice@x", "bob@x", DATE_1, "hi");
        msg.fields.append(HEADER_NAME, "addr=someone@else; key=AAAA");
        alice.encrypt(&["bob@x"], &mut msg);
        assert_eq!(msg.fields.get_all(HEADER_NAME).count(), 1);
        assert!(AutocryptHeader::from_header_fields(&msg.fields).is_some());
    }

    #[test]
    fn test_empty_body_not_encrypted() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        bob_knows_alice(&bob, &alice, PreferEncrypted::Mutual);

        let mut msg = message("bob@x", "alice@x", DATE_1, "");
        let outcome = bob.encrypt(&["alice@x"], &mut msg);
        assert_eq!(outcome.skip_reason, Some(EncryptSkip::EmptyBody));
        assert!(outcome.autocrypt_header_added);
    }

    #[test]
    fn test_provider_failure_leaves_body() {
        let bob = party("bob@x");
        PeerState {
            addr: "alice@x".into(),
            last_seen: 100,
            last_seen_autocrypt: 100,
            public_key: Some(PublicKey::new(KeyAlgorithm::Curve25519, vec![7; 140])),
            prefer_encrypted: PreferEncrypted::Mutual,
        }
        .save(&bob.store().lock(), true)
        .unwrap();

        let mut msg = message("bob@x", "alice@x", DATE_1, "hi");
        let before = msg.body.clone();
        let outcome = bob.encrypt(&["alice@x"], &mut msg);
        assert_eq!(outcome.skip_reason, Some(EncryptSkip::EncryptionFailed));
        assert!(outcome.autocrypt_header_added);
        assert_eq!(msg.body, before);
    }
}
