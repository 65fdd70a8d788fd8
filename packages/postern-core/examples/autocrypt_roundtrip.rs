//! # Autocrypt Round-Trip Demo
//!
//! Alice introduces herself to Bob with an Autocrypt header, Bob replies
//! encrypted, Alice decrypts.
//!
//! ## Run
//!
//! ```bash
//! RUST_LOG=postern_core=debug cargo run --example autocrypt_roundtrip
//! ```

use std::sync::Arc;

use postern_core::config::keys;
use postern_core::mime::HeaderFields;
use postern_core::{
    AutocryptHeader, Curve25519Provider, E2ee, Event, KeyStore, MimeBody, MimeMessage, MimePart,
    PeerState,
};
use tracing_subscriber::EnvFilter;

fn party(addr: &str) -> E2ee {
    let store = KeyStore::open(None).expect("Failed to open key store");
    store
        .lock()
        .set_config(keys::CONFIGURED_ADDR, addr)
        .expect("Failed to configure address");

    let label = addr.to_string();
    E2ee::new(Arc::new(store), Arc::new(Curve25519Provider::new())).with_event_callback(Arc::new(
        move |event: &Event| println!("  [{}] event: {}", label, event.to_json()),
    ))
}

fn message(from: &str, to: &str, date: &str, text: &str) -> MimeMessage {
    let fields: HeaderFields = vec![("From", from), ("To", to), ("Date", date), ("Subject", "Hi")]
        .into_iter()
        .collect();
    MimeMessage::new(fields, MimePart::text(text))
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Postern Core: Autocrypt Round-Trip Demo ===\n");

    let alice = party("alice@example.org");
    let bob = party("bob@example.org");

    // Step 1: Alice writes first; Bob's key is unknown so only her header goes out
    println!("Step 1: Alice -> Bob (cleartext, with Autocrypt header)...");
    let mut hello = message(
        "Alice <alice@example.org>",
        "bob@example.org",
        "Mon, 2 Mar 2020 09:00:00 +0000",
        "Hello Bob!",
    );
    let outcome = alice.encrypt(&["bob@example.org"], &mut hello);
    println!("  outcome: {:?}", outcome);
    if let Some(header) = AutocryptHeader::from_header_fields(&hello.fields) {
        println!(
            "  header: addr={} prefer={}",
            header.addr,
            header.prefer_encrypted.as_str()
        );
    }
    println!();

    // Step 2: Bob receives it and learns Alice's key
    println!("Step 2: Bob receives Alice's message...");
    let mut received = MimeMessage::parse(&hello.to_bytes()).expect("Failed to parse message");
    let outcome = bob.decrypt(&mut received);
    println!("  outcome: {:?}", outcome);
    let state = PeerState::load(&bob.store().lock(), "alice@example.org")
        .expect("Failed to load peerstate")
        .expect("Peerstate should exist");
    println!(
        "  peerstate: addr={} last_seen={} prefer={}",
        state.addr,
        state.last_seen,
        state.prefer_encrypted.as_str()
    );
    println!();

    // Step 3: Bob replies; now the body can be encrypted
    println!("Step 3: Bob -> Alice (encrypted)...");
    let secret = "Hi Alice, this one is end-to-end encrypted.";
    let mut reply = message(
        "Bob <bob@example.org>",
        "alice@example.org",
        "Mon, 2 Mar 2020 10:00:00 +0000",
        secret,
    );
    let outcome = bob.encrypt(&["alice@example.org"], &mut reply);
    println!("  outcome: {:?}", outcome);
    let wire = reply.to_bytes();
    println!("  wire size: {} bytes", wire.len());
    println!(
        "  plaintext visible on the wire: {}",
        String::from_utf8_lossy(&wire).contains(secret)
    );
    println!();

    // Step 4: Alice decrypts
    println!("Step 4: Alice decrypts Bob's reply...");
    let mut received = MimeMessage::parse(&wire).expect("Failed to parse message");
    let outcome = alice.decrypt(&mut received);
    println!("  outcome: {:?}", outcome);

    if let MimeBody::Multipart(children) = &received.body.body {
        for child in children {
            let content_type = child.content_type();
            if content_type.is("text", "plain") {
                let text = child.decoded_body().expect("Failed to decode body");
                println!("  decrypted text: {}", String::from_utf8_lossy(&text));
                assert_eq!(text, secret.as_bytes());
            }
        }
    }

    println!("\n=== Demo Complete ===");
}
