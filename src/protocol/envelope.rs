//! Signed frames and error messages.
//!
//! Every frame on the wire is a JSON text message. Authenticated frames wrap
//! their payload together with a tag computed over the payload's exact bytes:
//!
//! ```json
//! { "payload": { "cmd": "get-tab-list", "correlationId": "..." }, "signature": "<hex>" }
//! ```
//!
//! The payload is kept as raw JSON between decode and verification, so the
//! tag is checked against the bytes the peer actually signed rather than a
//! re-serialization.
//!
//! A bare error message (`{ "correlationId", "errorMessage" }` with no
//! envelope) is also recognised on inbound frames.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_json::value::RawValue;

use crate::error::{Error, Result};
use crate::identifiers::CorrelationId;

use super::signature;
use super::{CommandRequest, ResourceMessage};

// ============================================================================
// ErrorMessage
// ============================================================================

/// Failure outcome for a correlated command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMessage {
    /// Correlation id of the failed command.
    pub correlation_id: CorrelationId,
    /// Human-readable reason.
    pub error_message: String,
}

impl ErrorMessage {
    /// Creates an error message for `correlation_id`.
    #[inline]
    #[must_use]
    pub fn new(correlation_id: CorrelationId, error_message: impl Into<String>) -> Self {
        Self {
            correlation_id,
            error_message: error_message.into(),
        }
    }
}

// ============================================================================
// SignedEnvelope
// ============================================================================

/// A payload together with its authentication tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedEnvelope {
    /// Serialized payload, verbatim.
    pub payload: Box<RawValue>,
    /// Hex HMAC-SHA-256 tag over `payload`.
    pub signature: String,
}

impl SignedEnvelope {
    /// Serializes `payload` and signs the resulting bytes.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the payload cannot be serialized
    /// - [`Error::Signature`] if `secret` is empty
    pub fn seal<T: Serialize>(payload: &T, secret: &str) -> Result<Self> {
        let json = serde_json::to_string(payload)?;
        let signature = signature::sign(json.as_bytes(), secret)?;
        let payload = RawValue::from_string(json)?;

        Ok(Self { payload, signature })
    }

    /// Returns `true` if the tag matches the payload under `secret`.
    #[inline]
    #[must_use]
    pub fn verify(&self, secret: &str) -> bool {
        signature::verify(self.payload.get().as_bytes(), &self.signature, secret)
    }

    /// Verifies the tag and decodes the payload.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSignature`] if the tag does not match
    /// - [`Error::Json`] / [`Error::Protocol`] if the payload is not a known message
    pub fn open(&self, secret: &str) -> Result<Payload> {
        if !self.verify(secret) {
            return Err(Error::InvalidSignature);
        }
        Payload::parse(self.payload.get())
    }

    /// Extracts the payload's `correlationId`, if it has one.
    ///
    /// Works on payloads that fail full decoding.
    #[must_use]
    pub fn correlation_id(&self) -> Option<CorrelationId> {
        let value: Value = serde_json::from_str(self.payload.get()).ok()?;
        value
            .get("correlationId")
            .and_then(Value::as_str)
            .map(CorrelationId::from)
    }

    /// Serializes the envelope into a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn to_frame(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// Payload
// ============================================================================

/// A decoded envelope payload.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A command to execute.
    Command(CommandRequest),
    /// A successful result.
    Resource(ResourceMessage),
    /// A failure report.
    Error(ErrorMessage),
}

impl Payload {
    /// Decodes a payload, classifying it by its discriminating key.
    ///
    /// # Errors
    ///
    /// - [`Error::Json`] if the JSON is malformed or fields do not match
    /// - [`Error::Protocol`] if no `cmd`, `resource` or `errorMessage` key is present
    pub fn parse(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;

        if value.get("errorMessage").is_some() {
            Ok(Self::Error(serde_json::from_value(value)?))
        } else if value.get("cmd").is_some() {
            Ok(Self::Command(serde_json::from_value(value)?))
        } else if value.get("resource").is_some() {
            Ok(Self::Resource(serde_json::from_value(value)?))
        } else {
            Err(Error::protocol("Payload has no cmd, resource or errorMessage"))
        }
    }

    /// Returns the correlation id carried by the payload.
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        match self {
            Self::Command(request) => &request.correlation_id,
            Self::Resource(message) => &message.correlation_id,
            Self::Error(error) => &error.correlation_id,
        }
    }
}

// ============================================================================
// InboundFrame
// ============================================================================

/// A text frame as received from the peer, before verification.
#[derive(Debug, Clone)]
pub enum InboundFrame {
    /// A signed envelope.
    Signed(SignedEnvelope),
    /// A bare, unsigned error message.
    UnsignedError(ErrorMessage),
}

impl InboundFrame {
    /// Decodes a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the text is neither shape.
    pub fn parse(text: &str) -> Result<Self> {
        if let Ok(error) = serde_json::from_str::<ErrorMessage>(text) {
            return Ok(Self::UnsignedError(error));
        }

        Ok(Self::Signed(serde_json::from_str(text)?))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::identifiers::TabId;
    use crate::protocol::{Command, Resource};

    const SECRET: &str = "test-secret";

    #[test]
    fn test_seal_and_open_command() {
        let request = CommandRequest::with_id(
            CorrelationId::from("c1"),
            Command::FindHighlight {
                tab_id: TabId::new(4),
                query_phrase: "needle".into(),
            },
        );

        let frame = SignedEnvelope::seal(&request, SECRET)
            .and_then(|e| e.to_frame())
            .expect("seal");

        let InboundFrame::Signed(envelope) = InboundFrame::parse(&frame).expect("parse") else {
            panic!("expected signed frame");
        };

        assert_eq!(envelope.open(SECRET).expect("open"), Payload::Command(request));
    }

    #[test]
    fn test_signature_covers_exact_bytes() {
        // Key order differs from what this crate would serialize.
        let payload = r#"{"correlationId":"c9","resource":"tabs-closed"}"#;
        let tag = signature::sign(payload.as_bytes(), SECRET).expect("sign");
        let frame = format!(r#"{{"payload":{payload},"signature":"{tag}"}}"#);

        let InboundFrame::Signed(envelope) = InboundFrame::parse(&frame).expect("parse") else {
            panic!("expected signed frame");
        };

        assert!(envelope.verify(SECRET));
        assert_eq!(envelope.payload.get(), payload);
    }

    #[test]
    fn test_open_rejects_tampered_payload() {
        let message = ResourceMessage::new(
            CorrelationId::from("c1"),
            Resource::FindHighlightResult { no_of_results: 1 },
        );
        let frame = SignedEnvelope::seal(&message, SECRET)
            .and_then(|e| e.to_frame())
            .expect("seal")
            .replace("\"noOfResults\":1", "\"noOfResults\":9");

        let InboundFrame::Signed(envelope) = InboundFrame::parse(&frame).expect("parse") else {
            panic!("expected signed frame");
        };

        assert!(matches!(envelope.open(SECRET), Err(Error::InvalidSignature)));
    }

    #[test]
    fn test_missing_signature_is_malformed() {
        let frame = json!({ "payload": { "cmd": "get-tab-list", "correlationId": "c1" } });
        assert!(InboundFrame::parse(&frame.to_string()).is_err());
    }

    #[test]
    fn test_empty_signature_is_rejected() {
        let frame = json!({
            "payload": { "cmd": "get-tab-list", "correlationId": "c1" },
            "signature": ""
        });

        let InboundFrame::Signed(envelope) =
            InboundFrame::parse(&frame.to_string()).expect("parse")
        else {
            panic!("expected signed frame");
        };
        assert!(!envelope.verify(SECRET));
        assert_eq!(envelope.correlation_id(), Some(CorrelationId::from("c1")));
    }

    #[test]
    fn test_bare_error_message() {
        let frame = json!({ "correlationId": "c1", "errorMessage": "Invalid URL" });

        let InboundFrame::UnsignedError(error) =
            InboundFrame::parse(&frame.to_string()).expect("parse")
        else {
            panic!("expected bare error");
        };
        assert_eq!(error, ErrorMessage::new(CorrelationId::from("c1"), "Invalid URL"));
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        assert!(matches!(InboundFrame::parse("{not json"), Err(Error::Json(_))));
    }

    #[test]
    fn test_payload_classification() {
        let error = Payload::parse(r#"{"correlationId":"a","errorMessage":"x"}"#).expect("parse");
        assert!(matches!(error, Payload::Error(_)));

        let resource = Payload::parse(r#"{"resource":"tabs-closed","correlationId":"b"}"#)
            .expect("parse");
        assert!(matches!(resource, Payload::Resource(_)));
        assert_eq!(resource.correlation_id().as_str(), "b");

        assert!(Payload::parse(r#"{"correlationId":"c"}"#).is_err());
    }
}
