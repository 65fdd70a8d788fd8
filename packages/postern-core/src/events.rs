//! # Event Reporting
//!
//! Progress and failure notifications pushed to an application-supplied
//! callback, in addition to the `tracing` log.
//!
//! Events carry a stable `event_type` string and a JSON payload, so a UI
//! layer can forward them without knowing the Rust types.

use std::sync::Arc;

use serde::Serialize;

/// Callback receiving every emitted event
pub type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

/// How a peerstate was touched by an incoming message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerstateChange {
    /// First valid header from this peer created a new record
    Created,
    /// A newer valid header replaced key and preference
    HeaderApplied,
    /// A newer message without a valid header degraded encryption
    Degraded,
}

impl PeerstateChange {
    /// String form used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            PeerstateChange::Created => "created",
            PeerstateChange::HeaderApplied => "header_applied",
            PeerstateChange::Degraded => "degraded",
        }
    }
}

/// Events emitted by the encrypt and decrypt pipelines
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Own keypair generation started
    KeyGenerationStarted {
        /// Address the key is generated for
        addr: String,
    },
    /// Own keypair generated and stored
    KeyGenerationFinished {
        /// Address the key belongs to
        addr: String,
        /// Fingerprint of the new public key
        fingerprint: String,
    },
    /// Own keypair could not be generated or stored
    KeyGenerationFailed {
        /// Address the key was generated for
        addr: String,
        /// Human readable reason
        reason: String,
    },
    /// A peerstate was created or updated
    PeerstateChanged {
        /// Peer address
        addr: String,
        /// What happened
        change: PeerstateChange,
    },
    /// An armored part could not be decrypted
    PartDecryptionFailed {
        /// Human readable reason
        reason: String,
    },
}

impl Event {
    /// Stable event name
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::KeyGenerationStarted { .. } => "key_generation_started",
            Event::KeyGenerationFinished { .. } => "key_generation_finished",
            Event::KeyGenerationFailed { .. } => "key_generation_failed",
            Event::PeerstateChanged { .. } => "peerstate_changed",
            Event::PartDecryptionFailed { .. } => "part_decryption_failed",
        }
    }

    /// JSON payload
    pub fn to_json(&self) -> String {
        // Serializing plain strings and unit enums cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Fan events out to the optional callback
#[derive(Clone, Default)]
pub(crate) struct EventSink {
    callback: Option<EventCallback>,
}

impl EventSink {
    pub(crate) fn new(callback: Option<EventCallback>) -> Self {
        Self { callback }
    }

    pub(crate) fn emit(&self, event: Event) {
        tracing::debug!(event_type = event.event_type(), "{}", event.to_json());
        if let Some(cb) = &self.callback {
            cb(&event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_event_json() {
        let event = Event::PeerstateChanged {
            addr: "bob@x".into(),
            change: PeerstateChange::Degraded,
        };
        assert_eq!(event.event_type(), "peerstate_changed");
        assert_eq!(
            event.to_json(),
            r#"{"type":"peerstate_changed","addr":"bob@x","change":"degraded"}"#
        );
    }

    #[test]
    fn test_sink_forwards_to_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let sink = EventSink::new(Some(Arc::new(move |e: &Event| {
            sink_seen.lock().push(e.event_type());
        })));

        sink.emit(Event::KeyGenerationStarted { addr: "a@x".into() });
        sink.emit(Event::PartDecryptionFailed { reason: "bad".into() });
        assert_eq!(
            *seen.lock(),
            vec!["key_generation_started", "part_decryption_failed"]
        );
    }

    #[test]
    fn test_sink_without_callback() {
        let sink = EventSink::default();
        sink.emit(Event::KeyGenerationStarted { addr: "a@x".into() });
    }
}
