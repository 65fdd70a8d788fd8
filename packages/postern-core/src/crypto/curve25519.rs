//! Default [`CryptoProvider`]: Ed25519-bound X25519 keys, HKDF-SHA256 and
//! AES-256-GCM, armored as a PGP MESSAGE block.
//!
//! ## Key Layout
//!
//! ```text
//! public  = ed25519_pub(32) || x25519_pub(32) || binding_sig(64) || user_id
//! private = ed25519_secret(32) || x25519_secret(32)
//!
//! binding_sig = Ed25519(ed25519_secret,
//!                       "postern-key-binding-v1" || x25519_pub || user_id)
//! ```
//!
//! ## Message Packet
//!
//! ```text
//! ┌──────┬─────────┬───────────────┬───┬──────────────────────────────┬────────────┬──────────────┐
//! │"PSTN"│ version │ ephemeral pub │ n │ n × (hint │ nonce │ wrapped) │ body nonce │ body + tag   │
//! │  4   │    1    │      32       │ 1 │     8   │  12   │   48     │     12     │   variable   │
//! └──────┴─────────┴───────────────┴───┴──────────────────────────────┴────────────┴──────────────┘
//!                    └──────────── authenticated as AAD of the body ─────────────┘
//! ```

use zeroize::Zeroize;

use super::armor::{armor_message, dearmor_message};
use super::encryption::{self, EncryptionKey, Nonce, SharedSecret, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use super::kdf::{derive_key_encryption_key, domain, recipient_hint, RECIPIENT_HINT_SIZE};
use super::keys::{EncryptionKeyPair, Key, KeyAlgorithm, KeyRing, PrivateKey, PublicKey, SigningKeyPair};
use super::provider::{CryptoProvider, KeyGenParams};
use super::signing::{self, Signature, SIGNATURE_SIZE};
use crate::error::{Error, Result};

const PACKET_MAGIC: [u8; 4] = *b"PSTN";
const PACKET_MAGIC_SIZE: usize = 4;
const PACKET_VERSION: u8 = 1;

const POINT_SIZE: usize = 32;
/// Smallest possible public key: both points and the binding signature
pub const MIN_PUBLIC_KEY_SIZE: usize = POINT_SIZE * 2 + SIGNATURE_SIZE;
/// Exact private key size
pub const PRIVATE_KEY_SIZE: usize = POINT_SIZE * 2;

const WRAPPED_KEY_SIZE: usize = KEY_SIZE + TAG_SIZE;
const RECIPIENT_ENTRY_SIZE: usize = RECIPIENT_HINT_SIZE + NONCE_SIZE + WRAPPED_KEY_SIZE;
const PACKET_PREFIX_SIZE: usize = PACKET_MAGIC_SIZE + 1 + POINT_SIZE + 1;

/// Public key fields borrowed out of a [`PublicKey`]
struct PublicParts<'a> {
    signing: [u8; POINT_SIZE],
    encryption: [u8; POINT_SIZE],
    signature: Signature,
    user_id: &'a [u8],
}

fn split_public(bytes: &[u8]) -> Result<PublicParts<'_>> {
    if bytes.len() < MIN_PUBLIC_KEY_SIZE {
        return Err(Error::InvalidKey(format!(
            "public key must be at least {} bytes, got {}",
            MIN_PUBLIC_KEY_SIZE,
            bytes.len()
        )));
    }
    let mut signing = [0u8; POINT_SIZE];
    signing.copy_from_slice(&bytes[..POINT_SIZE]);
    let mut encryption = [0u8; POINT_SIZE];
    encryption.copy_from_slice(&bytes[POINT_SIZE..POINT_SIZE * 2]);
    let signature = Signature::from_slice(&bytes[POINT_SIZE * 2..MIN_PUBLIC_KEY_SIZE])?;

    Ok(PublicParts {
        signing,
        encryption,
        signature,
        user_id: &bytes[MIN_PUBLIC_KEY_SIZE..],
    })
}

fn binding_message(encryption_public: &[u8; POINT_SIZE], user_id: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(domain::KEY_BINDING.len() + POINT_SIZE + user_id.len());
    message.extend_from_slice(domain::KEY_BINDING);
    message.extend_from_slice(encryption_public);
    message.extend_from_slice(user_id);
    message
}

fn check_public(key: &dyn Key) -> Result<PublicParts<'_>> {
    if key.algorithm() != KeyAlgorithm::Curve25519 {
        return Err(Error::InvalidKey(format!("unsupported algorithm {:?}", key.algorithm())));
    }
    let parts = split_public(key.raw_bytes())?;
    if parts.encryption == [0u8; POINT_SIZE] {
        return Err(Error::InvalidKey("encryption key is the identity point".into()));
    }
    signing::verify(
        &parts.signing,
        &binding_message(&parts.encryption, parts.user_id),
        &parts.signature,
    )?;
    Ok(parts)
}

fn encryption_keypair(key: &PrivateKey) -> Result<EncryptionKeyPair> {
    if key.algorithm() != KeyAlgorithm::Curve25519 || key.raw_bytes().len() != PRIVATE_KEY_SIZE {
        return Err(Error::InvalidKey("not a Curve25519 private key".into()));
    }
    let mut secret = [0u8; POINT_SIZE];
    secret.copy_from_slice(&key.raw_bytes()[POINT_SIZE..]);
    let keypair = EncryptionKeyPair::from_bytes(&secret);
    secret.zeroize();
    Ok(keypair)
}

/// Recipient entry borrowed out of a message packet
struct RecipientEntry<'a> {
    hint: &'a [u8],
    nonce: Nonce,
    wrapped: &'a [u8],
}

/// Parsed message packet
struct Packet<'a> {
    ephemeral: [u8; POINT_SIZE],
    recipients: Vec<RecipientEntry<'a>>,
    header: &'a [u8],
    body_nonce: Nonce,
    body: &'a [u8],
}

fn parse_packet(data: &[u8]) -> Result<Packet<'_>> {
    let malformed = |what: &str| Error::DecryptionFailed(format!("malformed packet: {}", what));

    if data.len() < PACKET_PREFIX_SIZE || data[..PACKET_MAGIC_SIZE] != PACKET_MAGIC {
        return Err(malformed("bad magic"));
    }
    if data[PACKET_MAGIC_SIZE] != PACKET_VERSION {
        return Err(malformed("unsupported version"));
    }

    let mut ephemeral = [0u8; POINT_SIZE];
    ephemeral.copy_from_slice(&data[PACKET_MAGIC_SIZE + 1..PACKET_MAGIC_SIZE + 1 + POINT_SIZE]);
    let count = data[PACKET_PREFIX_SIZE - 1] as usize;

    let header_len = PACKET_PREFIX_SIZE + count * RECIPIENT_ENTRY_SIZE;
    if data.len() < header_len + NONCE_SIZE + TAG_SIZE {
        return Err(malformed("truncated"));
    }

    let recipients = data[PACKET_PREFIX_SIZE..header_len]
        .chunks_exact(RECIPIENT_ENTRY_SIZE)
        .map(|entry| {
            Ok(RecipientEntry {
                hint: &entry[..RECIPIENT_HINT_SIZE],
                nonce: Nonce::from_slice(&entry[RECIPIENT_HINT_SIZE..RECIPIENT_HINT_SIZE + NONCE_SIZE])?,
                wrapped: &entry[RECIPIENT_HINT_SIZE + NONCE_SIZE..],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Packet {
        ephemeral,
        recipients,
        header: &data[..header_len],
        body_nonce: Nonce::from_slice(&data[header_len..header_len + NONCE_SIZE])?,
        body: &data[header_len + NONCE_SIZE..],
    })
}

/// The built-in provider
#[derive(Debug, Default, Clone, Copy)]
pub struct Curve25519Provider;

impl Curve25519Provider {
    /// Create the provider
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for Curve25519Provider {
    fn generate_keypair(&self, params: &KeyGenParams) -> Result<(PublicKey, PrivateKey)> {
        tracing::debug!(
            bits = params.bits,
            public_exponent = params.public_exponent,
            "Curve25519 keys have a fixed size, size parameters ignored"
        );

        let signing_pair = SigningKeyPair::generate();
        let encryption_pair = EncryptionKeyPair::generate();
        let encryption_public = encryption_pair.public_bytes();
        let user_id = params.user_id.as_bytes();

        let signature = signing::sign(&signing_pair, &binding_message(&encryption_public, user_id));

        let mut public = Vec::with_capacity(MIN_PUBLIC_KEY_SIZE + user_id.len());
        public.extend_from_slice(&signing_pair.public_bytes());
        public.extend_from_slice(&encryption_public);
        public.extend_from_slice(signature.as_bytes());
        public.extend_from_slice(user_id);

        let mut private = Vec::with_capacity(PRIVATE_KEY_SIZE);
        private.extend_from_slice(&signing_pair.secret_bytes());
        private.extend_from_slice(&encryption_pair.secret_bytes());

        Ok((
            PublicKey::new(KeyAlgorithm::Curve25519, public),
            PrivateKey::new(KeyAlgorithm::Curve25519, private),
        ))
    }

    fn validate_key(&self, key: &dyn Key) -> bool {
        if key.algorithm() != KeyAlgorithm::Curve25519 {
            return false;
        }
        if key.is_private() {
            return key.raw_bytes().len() == PRIVATE_KEY_SIZE;
        }
        match check_public(key) {
            Ok(_) => true,
            Err(e) => {
                tracing::debug!("Public key rejected: {}", e);
                false
            }
        }
    }

    fn encrypt(&self, plaintext: &[u8], recipients: &KeyRing<PublicKey>) -> Result<Vec<u8>> {
        if recipients.is_empty() {
            return Err(Error::EncryptionFailed("no recipients".into()));
        }
        let count = u8::try_from(recipients.len())
            .map_err(|_| Error::EncryptionFailed(format!("too many recipients: {}", recipients.len())))?;

        let ephemeral = EncryptionKeyPair::generate();
        let ephemeral_public = ephemeral.public_bytes();
        let session_key = EncryptionKey::generate();

        let mut packet = Vec::with_capacity(
            PACKET_PREFIX_SIZE + recipients.len() * RECIPIENT_ENTRY_SIZE + NONCE_SIZE + plaintext.len() + TAG_SIZE,
        );
        packet.extend_from_slice(&PACKET_MAGIC);
        packet.push(PACKET_VERSION);
        packet.extend_from_slice(&ephemeral_public);
        packet.push(count);

        for recipient in recipients.iter() {
            let parts = check_public(recipient)?;
            let hint = recipient_hint(&parts.encryption);

            let shared = SharedSecret::from_bytes(ephemeral.diffie_hellman(&parts.encryption));
            let kek = derive_key_encryption_key(&shared, &ephemeral_public, &parts.encryption)?;
            let (nonce, wrapped) = encryption::encrypt(&kek, &session_key.as_inner(), &hint)?;

            packet.extend_from_slice(&hint);
            packet.extend_from_slice(nonce.as_bytes());
            packet.extend_from_slice(&wrapped);
        }

        let (body_nonce, body) = encryption::encrypt(&session_key, plaintext, &packet)?;
        packet.extend_from_slice(body_nonce.as_bytes());
        packet.extend_from_slice(&body);

        Ok(armor_message(&packet).into_bytes())
    }

    fn decrypt(&self, ciphertext: &[u8], keys: &KeyRing<PrivateKey>) -> Result<Vec<u8>> {
        let data = dearmor_message(ciphertext)?;
        let packet = parse_packet(&data)?;

        for key in keys.iter() {
            let keypair = match encryption_keypair(key) {
                Ok(pair) => pair,
                Err(_) => continue,
            };
            let own_public = keypair.public_bytes();
            let hint = recipient_hint(&own_public);

            for entry in packet.recipients.iter().filter(|e| e.hint == hint) {
                let shared = SharedSecret::from_bytes(keypair.diffie_hellman(&packet.ephemeral));
                let kek = derive_key_encryption_key(&shared, &packet.ephemeral, &own_public)?;
                let mut session_bytes = match encryption::decrypt(&kek, &entry.nonce, entry.wrapped, &hint) {
                    Ok(bytes) => bytes,
                    Err(_) => continue,
                };
                let session_key = EncryptionKey::from_slice(&session_bytes);
                session_bytes.zeroize();
                return encryption::decrypt(&session_key?, &packet.body_nonce, packet.body, packet.header);
            }
        }

        Err(Error::DecryptionFailed("no matching private key".into()))
    }
}
