//! Incoming messages: peerstate update and in-place decryption

use super::E2ee;
use crate::aheader::AutocryptHeader;
use crate::config::{normalize_addr, E2eeConfig};
use crate::crypto::{has_pgp_message_armor, KeyRing, PrivateKey};
use crate::error::Result;
use crate::events::{Event, PeerstateChange};
use crate::mime::{first_address, MimeBody, MimeMessage, MimePart};
use crate::peerstate::PeerState;
use crate::storage::KeyStoreGuard;
use crate::time::parse_message_date;

/// Result of [`E2ee::decrypt`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecryptOutcome {
    /// What happened to the sender's peerstate
    pub peerstate_change: Option<PeerstateChange>,
    /// Encrypted parts replaced by their plaintext
    pub decrypted_parts: usize,
    /// Armored parts that could not be decrypted
    pub failed_parts: usize,
}

impl DecryptOutcome {
    /// Whether at least one part was decrypted
    pub fn is_decrypted(&self) -> bool {
        self.decrypted_parts > 0
    }
}

impl E2ee {
    /// Learn from the sender's Autocrypt header and decrypt what we can
    ///
    /// Every `multipart/encrypted` child that carries an armored message is
    /// replaced by the entity it decrypts to. A part that fails to decrypt
    /// is left as it was and does not stop the others.
    pub fn decrypt(&self, message: &mut MimeMessage) -> DecryptOutcome {
        let mut outcome = DecryptOutcome::default();

        let from = message
            .fields
            .get("From")
            .and_then(first_address)
            .map(|addr| normalize_addr(&addr));
        let message_time = message.fields.get("Date").and_then(parse_message_date);
        let header = AutocryptHeader::from_header_fields(&message.fields);

        let sender = from.or_else(|| header.as_ref().map(|h| normalize_addr(&h.addr)));
        let header = header.filter(|h| self.is_fine_header(h, sender.as_deref()));

        let keys = {
            let guard = self.store.lock();
            let config = match E2eeConfig::load(&guard) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Cannot read encryption settings: {}", e);
                    return outcome;
                }
            };

            if config.enabled {
                if let (Some(sender), Some(time)) =
                    (sender.as_deref(), message_time.filter(|t| *t > 0))
                {
                    match update_peerstate(&guard, sender, header.as_ref(), time) {
                        Ok(change) => outcome.peerstate_change = change,
                        Err(e) => tracing::warn!("Cannot update peerstate of {}: {}", sender, e),
                    }
                }
            }

            match config.configured_addr {
                Some(addr) => match guard.load_self_private_keys(&addr) {
                    Ok(keys) => keys,
                    Err(e) => {
                        tracing::warn!("Cannot load own private keys: {}", e);
                        KeyRing::new()
                    }
                },
                None => KeyRing::new(),
            }
        };

        if let (Some(change), Some(sender)) = (outcome.peerstate_change, sender) {
            self.events.emit(Event::PeerstateChanged {
                addr: sender,
                change,
            });
        }

        if keys.is_empty() {
            tracing::debug!("No own private keys, skipping decryption");
            return outcome;
        }

        self.decrypt_part(&mut message.body, &keys, &mut outcome);
        outcome
    }

    /// A header is usable only if it speaks for the visible sender and
    /// carries a key the provider accepts
    fn is_fine_header(&self, header: &AutocryptHeader, sender: Option<&str>) -> bool {
        if sender != Some(normalize_addr(&header.addr).as_str()) {
            tracing::warn!(
                "Autocrypt header for {} does not match sender {:?}",
                header.addr,
                sender
            );
            return false;
        }
        if !self.provider.validate_key(&header.public_key) {
            tracing::warn!("Autocrypt header of {} carries an unusable key", header.addr);
            return false;
        }
        true
    }

    fn decrypt_part(&self, part: &mut MimePart, keys: &KeyRing<PrivateKey>, outcome: &mut DecryptOutcome) {
        let is_encrypted = part.content_type().is("multipart", "encrypted");

        match &mut part.body {
            MimeBody::Multipart(children) => {
                for child in children.iter_mut() {
                    if is_encrypted {
                        self.decrypt_child(child, keys, outcome);
                    } else {
                        self.decrypt_part(child, keys, outcome);
                    }
                }
            }
            MimeBody::Message(inner) => self.decrypt_part(&mut inner.body, keys, outcome),
            MimeBody::Leaf(_) => {}
        }
    }

    fn decrypt_child(&self, child: &mut MimePart, keys: &KeyRing<PrivateKey>, outcome: &mut DecryptOutcome) {
        let Some(ciphertext) = armored_content(child) else {
            return;
        };

        let decrypted = self
            .provider
            .decrypt(&ciphertext, keys)
            .and_then(|plaintext| MimePart::parse(&plaintext));

        match decrypted {
            Ok(plain) => {
                *child = plain;
                outcome.decrypted_parts += 1;
            }
            Err(e) => {
                tracing::warn!("Cannot decrypt part: {}", e);
                outcome.failed_parts += 1;
                self.events.emit(Event::PartDecryptionFailed {
                    reason: e.to_string(),
                });
            }
        }
    }
}

/// Transfer-decoded content of a leaf that starts with PGP message armor
fn armored_content(part: &MimePart) -> Option<Vec<u8>> {
    if !matches!(part.body, MimeBody::Leaf(_)) {
        return None;
    }
    let content = part.decoded_body().ok()?;
    (!content.is_empty() && has_pgp_message_armor(&content)).then_some(content)
}

fn update_peerstate(
    guard: &KeyStoreGuard<'_>,
    sender: &str,
    header: Option<&AutocryptHeader>,
    message_time: i64,
) -> Result<Option<PeerstateChange>> {
    let change = match (PeerState::load(guard, sender)?, header) {
        (Some(mut state), Some(header)) => {
            if !state.apply_header(header, message_time) {
                return Ok(None);
            }
            state.save(guard, false)?;
            PeerstateChange::HeaderApplied
        }
        (Some(mut state), None) => {
            if !state.degrade_encryption(message_time) {
                return Ok(None);
            }
            state.save(guard, false)?;
            PeerstateChange::Degraded
        }
        (None, Some(header)) => {
            PeerState::init_from_header(header, message_time).save(guard, true)?;
            PeerstateChange::Created
        }
        (None, None) => return Ok(None),
    };

    tracing::info!("Peerstate of {}: {}", sender, change.as_str());
    Ok(Some(change))
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::*;
    use crate::aheader::HEADER_NAME;
    use crate::config::keys;
    use crate::crypto::{CryptoProvider, Curve25519Provider, PublicKey};
    use crate::mime::{ContentType, HeaderFields};
    use crate::peerstate::PreferEncrypted;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Alice introduces herself to Bob, Bob answers encrypted
    fn exchange(text: &str) -> (E2ee, E2ee, MimeMessage) {
        let alice = party("alice@x");
        let bob = party("bob@x");

        let mut hello = message("alice@x", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut hello);
        let outcome = bob.decrypt(&mut transmit(&hello));
        assert_eq!(outcome.peerstate_change, Some(PeerstateChange::Created));

        let mut reply = message("bob@x", "alice@x", DATE_2, text);
        assert!(bob.encrypt(&["alice@x"], &mut reply).encrypted);
        (alice, bob, transmit(&reply))
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let text = "Grüße, Alice!\r\nThe = sign, trailing space \r\n\r\n-- \r\nBob";
        let (alice, _bob, mut received) = exchange(text);

        let outcome = alice.decrypt(&mut received);
        assert_eq!(outcome.decrypted_parts, 1);
        assert_eq!(outcome.failed_parts, 0);
        assert!(outcome.is_decrypted());

        let MimeBody::Multipart(children) = &received.body.body else {
            panic!("expected envelope");
        };
        assert!(children[1].content_type().is("text", "plain"));
        assert_eq!(children[1].decoded_body().unwrap(), text.as_bytes());
        assert_eq!(children[0].decoded_body().unwrap(), b"Version: 1\r\n");
    }

    #[test]
    fn test_peerstate_learned_from_header() {
        let (alice, bob, mut received) = exchange("hi");

        let state = PeerState::load(&bob.store().lock(), "alice@x").unwrap().unwrap();
        assert_eq!(state.public_key, Some(alice.own_public_key("alice@x").unwrap()));
        assert_eq!(state.last_seen, 1057049557);

        alice.decrypt(&mut received);
        let state = PeerState::load(&alice.store().lock(), "bob@x").unwrap().unwrap();
        assert_eq!(state.public_key, Some(bob.own_public_key("bob@x").unwrap()));
        assert_eq!(state.prefer_encrypted, PreferEncrypted::NoPreference);
    }

    #[test]
    fn test_spoofed_header_not_applied() {
        let alice = party("alice@x");
        let bob = party("bob@x");

        let mut forged = message("mallory@x", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut forged);
        forged.fields.set("From", "Mallory <mallory@x>");

        let outcome = bob.decrypt(&mut transmit(&forged));
        assert_eq!(outcome.peerstate_change, None);
        assert!(PeerState::load(&bob.store().lock(), "mallory@x").unwrap().is_none());
        assert!(PeerState::load(&bob.store().lock(), "alice@x").unwrap().is_none());
    }

    #[test]
    fn test_spoofed_header_degrades_existing_peer() {
        let alice = party("alice@x");
        let bob = party("bob@x");
        let mallory = party("mallory@x");

        let mut hello = message("alice@x", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut hello);
        bob.decrypt(&mut transmit(&hello));

        let mut forged = message("alice@x", "bob@x", DATE_2, "send money");
        mallory.encrypt(&["bob@x"], &mut forged);
        let outcome = bob.decrypt(&mut transmit(&forged));
        assert_eq!(outcome.peerstate_change, Some(PeerstateChange::Degraded));

        let state = PeerState::load(&bob.store().lock(), "alice@x").unwrap().unwrap();
        assert_eq!(state.public_key, Some(alice.own_public_key("alice@x").unwrap()));
        assert_eq!(state.prefer_encrypted, PreferEncrypted::No);
    }

    #[test]
    fn test_sender_from_header_when_from_missing() {
        let alice = party("alice@x");
        let bob = party("bob@x");

        let mut hello = message("alice@x", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut hello);
        hello.fields.remove("From");

        let outcome = bob.decrypt(&mut transmit(&hello));
        assert_eq!(outcome.peerstate_change, Some(PeerstateChange::Created));
    }

    #[test]
    fn test_missing_header_degrades_then_newer_header_restores() {
        let (_alice, bob, _) = exchange("hi");

        let mut plain = message("alice@x", "bob@x", DATE_2, "sent from a phone");
        let outcome = bob.decrypt(&mut plain);
        assert_eq!(outcome.peerstate_change, Some(PeerstateChange::Degraded));

        let mut reply = message("bob@x", "alice@x", DATE_2, "hi");
        assert!(!bob.encrypt(&["alice@x"], &mut reply).encrypted);

        // replaying the older introduction does nothing
        let alice_again = party("alice@x");
        let mut old = message("alice@x", "bob@x", DATE_1, "hello");
        alice_again.encrypt(&["bob@x"], &mut old);
        assert_eq!(bob.decrypt(&mut transmit(&old)).peerstate_change, None);

        let mut newer = message("alice@x", "bob@x", DATE_3, "back on desktop");
        alice_again.encrypt(&["bob@x"], &mut newer);
        assert_eq!(
            bob.decrypt(&mut transmit(&newer)).peerstate_change,
            Some(PeerstateChange::HeaderApplied)
        );
        let state = PeerState::load(&bob.store().lock(), "alice@x").unwrap().unwrap();
        assert_eq!(state.public_key, Some(alice_again.own_public_key("alice@x").unwrap()));
    }

    #[test]
    fn test_no_date_no_peerstate_update() {
        let alice = party("alice@x");
        let bob = party("bob@x");

        let mut hello = message("alice@x", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut hello);
        hello.fields.remove("Date");

        assert_eq!(bob.decrypt(&mut transmit(&hello)).peerstate_change, None);
    }

    #[test]
    fn test_pre_epoch_date_no_peerstate_update() {
        let alice = party("alice@x");
        let bob = party("bob@x");

        let mut hello = message("alice@x", "bob@x", "Wed, 31 Dec 1969 23:59:59 +0000", "hello");
        alice.encrypt(&["bob@x"], &mut hello);

        assert_eq!(bob.decrypt(&mut transmit(&hello)).peerstate_change, None);
        assert!(PeerState::load(&bob.store().lock(), "alice@x").unwrap().is_none());
    }

    #[test]
    fn test_disabled_skips_peerstate_but_decrypts() {
        let (alice, _bob, mut received) = exchange("hi");
        alice.store().lock().set_config(keys::E2EE_ENABLED, "0").unwrap();

        let outcome = alice.decrypt(&mut received);
        assert_eq!(outcome.peerstate_change, None);
        assert_eq!(outcome.decrypted_parts, 1);
        assert!(PeerState::load(&alice.store().lock(), "bob@x").unwrap().is_none());
    }

    #[test]
    fn test_only_armored_child_is_decrypted() {
        let alice = party("alice@x");
        let key = alice.own_public_key("alice@x").unwrap();
        let ring: KeyRing<PublicKey> = std::iter::once(key).collect();
        let inner = MimePart::text("inside").to_bytes();
        let armored = Curve25519Provider::new().encrypt(&inner, &ring).unwrap();

        let version = MimePart::leaf(&ContentType::new("application", "pgp-encrypted"), b"Version: 1\r\n".to_vec());
        let payload = MimePart::leaf(&ContentType::new("application", "octet-stream"), armored);
        let envelope = MimePart::multipart(
            ContentType::new("multipart", "encrypted"),
            vec![version.clone(), payload],
        );
        let mut received = MimeMessage::new(HeaderFields::new(), envelope);

        let outcome = alice.decrypt(&mut received);
        assert_eq!(outcome.decrypted_parts, 1);
        let MimeBody::Multipart(children) = &received.body.body else {
            panic!("expected envelope");
        };
        assert_eq!(children[0], version);
        assert_eq!(children[1].decoded_body().unwrap(), b"inside");
    }

    #[test]
    fn test_failed_part_does_not_stop_walk() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let alice = party("alice@x")
            .with_event_callback(Arc::new(move |e: &Event| sink.lock().push(e.clone())));
        let key = alice.own_public_key("alice@x").unwrap();
        let stranger = party("carol@x").own_public_key("carol@x").unwrap();
        let provider = Curve25519Provider::new();

        let stranger_ring: KeyRing<PublicKey> = std::iter::once(stranger).collect();
        let alice_ring: KeyRing<PublicKey> = std::iter::once(key).collect();
        let for_stranger = provider.encrypt(b"not for alice", &stranger_ring).unwrap();
        let for_alice = provider.encrypt(b"for alice", &alice_ring).unwrap();

        let octets = ContentType::new("application", "octet-stream");
        let mut base64_part = MimePart::leaf(&octets, crate::mime::encode_base64(&for_alice));
        base64_part.headers.append("Content-Transfer-Encoding", "base64");

        let first = MimePart::multipart(
            ContentType::new("multipart", "encrypted"),
            vec![MimePart::leaf(&octets, for_stranger)],
        );
        let second = MimePart::multipart(ContentType::new("multipart", "encrypted"), vec![base64_part]);
        let outer = MimePart::multipart(ContentType::new("multipart", "mixed"), vec![first, second]);
        let mut received = MimeMessage::parse(&MimeMessage::new(HeaderFields::new(), outer).to_bytes()).unwrap();

        let outcome = alice.decrypt(&mut received);
        assert_eq!(outcome.failed_parts, 1);
        assert_eq!(outcome.decrypted_parts, 1);

        let MimeBody::Multipart(outer) = &received.body.body else {
            panic!("expected mixed");
        };
        let MimeBody::Multipart(second) = &outer[1].body else {
            panic!("expected envelope");
        };
        assert_eq!(second[0].body, MimeBody::Leaf(b"for alice".to_vec()));

        let types: Vec<_> = events.lock().iter().map(|e| e.event_type()).collect();
        assert!(types.contains(&"part_decryption_failed"));
    }

    #[test]
    fn test_embedded_message_is_walked() {
        let (alice, _bob, received) = exchange("nested");

        let mut wrapper_headers = HeaderFields::new();
        wrapper_headers.append("Content-Type", "message/rfc822");
        let wrapper = MimePart::new(wrapper_headers, MimeBody::Message(Box::new(received)));
        let mut outer = MimeMessage::new(HeaderFields::new(), wrapper);

        assert_eq!(alice.decrypt(&mut outer).decrypted_parts, 1);
    }

    #[test]
    fn test_unencrypted_message_untouched() {
        let alice = party("alice@x");
        alice.own_public_key("alice@x").unwrap();
        let mut plain = message("bob@x", "alice@x", DATE_1, "-----BEGIN PGP MESSAGE----- not really");
        let before = plain.clone();

        let outcome = alice.decrypt(&mut plain);
        assert_eq!(outcome, DecryptOutcome::default());
        assert_eq!(plain, before);
        assert!(!plain.fields.contains(HEADER_NAME));
    }

    #[test]
    fn test_peerstate_event_emitted() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let alice = party("alice@x");
        let bob = party("bob@x")
            .with_event_callback(Arc::new(move |e: &Event| sink.lock().push(e.clone())));

        let mut hello = message("Alice <ALICE@x>", "bob@x", DATE_1, "hello");
        alice.encrypt(&["bob@x"], &mut hello);
        bob.decrypt(&mut transmit(&hello));

        assert_eq!(
            events.lock().as_slice(),
            &[Event::PeerstateChanged {
                addr: "alice@x".into(),
                change: PeerstateChange::Created,
            }]
        );
    }
}
