//! JSON text framing for relay envelopes.
//!
//! Each WebSocket text frame carries exactly one envelope, so there is no
//! length prefix: decoding reads the routing header out of a frame and
//! encoding produces the text of a frame.

use crate::error::{RelayError, RelayResult};
use crate::messages::{EnvelopeHeader, Pong};

/// Decode the routing header of a single envelope frame.
///
/// Fails if the frame is not a JSON object with a string `type`.
pub fn decode_header(frame: &str) -> RelayResult<EnvelopeHeader> {
    let header: EnvelopeHeader = serde_json::from_str(frame)?;
    if header.kind.is_empty() {
        return Err(RelayError::InvalidMessage("empty type tag".into()));
    }
    Ok(header)
}

/// Decode a binary frame, which must hold UTF-8 JSON.
pub fn decode_binary(frame: &[u8]) -> RelayResult<(&str, EnvelopeHeader)> {
    let text = std::str::from_utf8(frame)
        .map_err(|e| RelayError::Codec(format!("binary frame is not UTF-8: {e}")))?;
    Ok((text, decode_header(text)?))
}

/// Encode a serializable value into the text of one frame.
pub fn frame_encode<T: serde::Serialize>(value: &T) -> RelayResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// The fixed acknowledgement sent in reply to `ping`.
pub fn pong_frame() -> String {
    // Serializing a unit-like struct cannot fail.
    frame_encode(&Pong::default()).unwrap_or_else(|_| r#"{"type":"pong"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MsgType, RelayForward};

    #[test]
    fn decode_auth() {
        let header = decode_header(r#"{"type":"auth","username":"Alice"}"#).unwrap();
        assert_eq!(header.msg_type(), Some(MsgType::Auth));
        assert_eq!(header.username.as_deref(), Some("Alice"));
    }

    #[test]
    fn decode_keeps_unknown_type_tag() {
        let header = decode_header(r#"{"type":"teleport"}"#).unwrap();
        assert_eq!(header.kind, "teleport");
        assert_eq!(header.msg_type(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(decode_header("not json"), Err(RelayError::Codec(_))));
        assert!(decode_header("[1,2,3]").is_err());
        assert!(decode_header(r#"{"to":"bob"}"#).is_err());
        assert!(decode_header(r#"{"type":7}"#).is_err());
        assert!(matches!(
            decode_header(r#"{"type":""}"#),
            Err(RelayError::InvalidMessage(_))
        ));
    }

    #[test]
    fn decode_binary_requires_utf8() {
        let (text, header) = decode_binary(br#"{"type":"ping"}"#).unwrap();
        assert_eq!(text, r#"{"type":"ping"}"#);
        assert_eq!(header.msg_type(), Some(MsgType::Ping));
        assert!(decode_binary(&[0xff, 0xfe, 0x7b]).is_err());
    }

    #[test]
    fn pong_is_fixed() {
        assert_eq!(pong_frame(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn relay_forward_embeds_payload() {
        let header =
            decode_header(r#"{"type":"relay","targetPeerId":"b","payload":{"candidate":"x"}}"#)
                .unwrap();
        let frame = frame_encode(&RelayForward {
            kind: MsgType::Relay,
            sender_peer_id: Some("a"),
            payload: header.payload.as_deref(),
        })
        .unwrap();
        assert_eq!(
            frame,
            r#"{"type":"relay","senderPeerId":"a","payload":{"candidate":"x"}}"#
        );
    }
}
