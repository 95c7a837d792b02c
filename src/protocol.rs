//! Envelope type exchanged with the worker.
//!
//! Every message on the channel is an [`Envelope`]: a non-empty `type` string
//! and an optional JSON `body`. On the wire it is a JSON object:
//!
//! ```json
//! {"type": "chat", "body": {"text": "hi"}}
//! ```
//!
//! `body` is omitted when absent. A handful of types are reserved for the
//! session lifecycle (see the constants below); everything else is an
//! application event.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Reserved types ──────────────────────────────────────────────────

/// Sent by the client when it starts listening.
pub const CONNECT: &str = "connect";

/// Sent by the client on every heartbeat tick.
pub const HEARTBEAT: &str = "heartbeat";

/// Sent by the worker once it has accepted the session.
pub const CONNECTED: &str = "connected";

/// Sent by the worker when it ends the session.
pub const DISCONNECTED: &str = "disconnected";

// ── Envelope ────────────────────────────────────────────────────────

/// A structured `{type, body}` unit exchanged over the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Message type. Never empty on a decoded envelope.
    #[serde(rename = "type")]
    pub kind: String,
    /// Optional payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Envelope {
    /// Create an envelope with no body.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            body: None,
        }
    }

    /// Create an envelope carrying `body`.
    pub fn with_body(kind: impl Into<String>, body: Value) -> Self {
        Self {
            kind: kind.into(),
            body: Some(body),
        }
    }

    /// Returns `true` for the types the client handles itself
    /// ([`CONNECTED`] and [`DISCONNECTED`]).
    pub fn is_lifecycle(&self) -> bool {
        self.kind == CONNECTED || self.kind == DISCONNECTED
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn body_is_omitted_when_absent() {
        let json = serde_json::to_string(&Envelope::new(HEARTBEAT)).unwrap();
        assert_eq!(json, r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn missing_body_deserializes_as_none() {
        let env: Envelope = serde_json::from_str(r#"{"type":"connected"}"#).unwrap();
        assert_eq!(env, Envelope::new(CONNECTED));
    }

    #[test]
    fn lifecycle_types_are_recognized() {
        assert!(Envelope::new(CONNECTED).is_lifecycle());
        assert!(Envelope::new(DISCONNECTED).is_lifecycle());
        assert!(!Envelope::with_body("chat", json!({"text": "hi"})).is_lifecycle());
        assert!(!Envelope::new(CONNECT).is_lifecycle());
    }
}
