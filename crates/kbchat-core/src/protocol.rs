//! Wire protocol spoken with the chat backend.
//!
//! Outbound frames are the user's raw text with no envelope. Inbound frames
//! are JSON objects discriminated by `type`:
//!
//! ```text
//! {"type": "stream", "content": "Hel"}
//! {"type": "stream", "content": "lo"}
//! {"type": "end", "content": ""}
//! ```

use serde::Deserialize;

use crate::error::ProtocolError;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A fragment of the assistant reply.
    Stream(String),
    /// The assistant reply is complete.
    End,
    /// A frame with an unrecognized `type`; ignored by the controller.
    Other(String),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Option<String>,
}

/// Decode an inbound text frame.
///
/// # Errors
///
/// Returns `ProtocolError::Json` if the frame is not a JSON object with a
/// string `type`, and `ProtocolError::MissingField` for a `stream` frame
/// without string `content`.
pub fn decode_frame(text: &str) -> Result<Inbound, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text)?;

    match envelope.kind.as_str() {
        "stream" => envelope
            .content
            .map(Inbound::Stream)
            .ok_or(ProtocolError::MissingField {
                kind: envelope.kind,
                field: "content",
            }),
        "end" => Ok(Inbound::End),
        _ => Ok(Inbound::Other(envelope.kind)),
    }
}

/// Encode a user message for the wire.
#[must_use]
pub fn encode_user_message(text: &str) -> String {
    text.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_stream_chunk() {
        let frame = decode_frame(r#"{"type":"stream","content":"Hel"}"#).unwrap();
        assert_eq!(frame, Inbound::Stream("Hel".to_string()));
    }

    #[test]
    fn decodes_end_with_and_without_content() {
        assert_eq!(
            decode_frame(r#"{"type":"end","content":""}"#).unwrap(),
            Inbound::End
        );
        assert_eq!(decode_frame(r#"{"type":"end"}"#).unwrap(), Inbound::End);
    }

    #[test]
    fn unknown_type_is_reported_not_rejected() {
        let frame = decode_frame(r#"{"type":"typing","content":"x"}"#).unwrap();
        assert_eq!(frame, Inbound::Other("typing".to_string()));
    }

    #[test]
    fn stream_without_content_is_an_error() {
        let err = decode_frame(r#"{"type":"stream"}"#).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::MissingField { field: "content", .. }
        ));
    }

    #[test]
    fn malformed_frames_are_errors() {
        assert!(decode_frame("not json").is_err());
        assert!(decode_frame(r#"{"content":"no type"}"#).is_err());
        assert!(decode_frame(r#"{"type":"stream","content":42}"#).is_err());
        assert!(decode_frame("[]").is_err());
    }

    #[test]
    fn outbound_text_is_sent_verbatim() {
        assert_eq!(encode_user_message("  hi\n"), "  hi\n");
    }
}
