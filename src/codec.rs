//! Conversion between raw transport payloads and [`Envelope`]s.
//!
//! The client never looks at raw payloads itself. Inbound text goes through
//! [`Codec::decode`], which either yields an envelope or reports the payload
//! as malformed; outbound envelopes go through [`Codec::encode`].
//!
//! [`JsonCodec`] is the default and matches the wire shape documented in
//! [`protocol`](crate::protocol).

use crate::error::{Result, WorkerLinkError};
use crate::protocol::Envelope;

/// Converts raw payloads to envelopes and back.
pub trait Codec: Send + 'static {
    /// Decode an inbound payload.
    ///
    /// Returns `None` when the payload is malformed. The client treats that
    /// as a non-fatal diagnostic and drops the payload.
    fn decode(&self, raw: &str) -> Option<Envelope>;

    /// Encode an outbound envelope.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerLinkError::Encoding`] if the envelope cannot be
    /// represented on the wire.
    fn encode(&self, envelope: &Envelope) -> Result<String>;
}

/// JSON codec: `{"type": "...", "body": ...}`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl Codec for JsonCodec {
    fn decode(&self, raw: &str) -> Option<Envelope> {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) if !envelope.kind.is_empty() => Some(envelope),
            Ok(_) => {
                tracing::debug!("rejecting envelope with empty type");
                None
            }
            Err(e) => {
                tracing::debug!("failed to decode envelope: {e}");
                None
            }
        }
    }

    fn encode(&self, envelope: &Envelope) -> Result<String> {
        if envelope.kind.is_empty() {
            return Err(WorkerLinkError::Encoding {
                reason: "envelope type must be non-empty".into(),
                source: None,
            });
        }
        serde_json::to_string(envelope).map_err(|e| WorkerLinkError::Encoding {
            reason: e.to_string(),
            source: Some(e),
        })
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
    fn decode_accepts_body_of_any_shape() {
        let codec = JsonCodec;
        for body in [json!(1), json!("text"), json!([1, 2]), json!({"a": null})] {
            let raw = json!({"type": "x", "body": body}).to_string();
            let env = codec.decode(&raw).unwrap();
            assert_eq!(env.body, Some(body));
        }
    }

    #[test]
    fn decode_rejects_malformed_payloads() {
        let codec = JsonCodec;
        assert!(codec.decode("").is_none());
        assert!(codec.decode("not json").is_none());
        assert!(codec.decode("[1,2,3]").is_none());
        assert!(codec.decode(r#"{"body":1}"#).is_none());
        assert!(codec.decode(r#"{"type":42}"#).is_none());
        assert!(codec.decode(r#"{"type":""}"#).is_none());
    }

    #[test]
    fn decode_ignores_unknown_fields() {
        let env = JsonCodec
            .decode(r#"{"type":"ping","body":null,"extra":true}"#)
            .unwrap();
        assert_eq!(env.kind, "ping");
    }

    #[test]
    fn encode_rejects_empty_type() {
        let err = JsonCodec.encode(&Envelope::new("")).unwrap_err();
        assert!(matches!(err, WorkerLinkError::Encoding { .. }));
    }

    #[test]
    fn encode_writes_wire_shape() {
        let raw = JsonCodec
            .encode(&Envelope::with_body("chat", json!({"text": "hi"})))
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value, json!({"type": "chat", "body": {"text": "hi"}}));
    }
}
