//! JSON Hub Protocol
//!
//! Wire format spoken by the WebSocket transport. Every frame is a JSON
//! object terminated by the ASCII record separator (`0x1E`); a single
//! WebSocket text message may carry several frames.
//!
//! ```text
//! client ──{"protocol":"json","version":1}␞──> hub
//! client <──{}␞─────────────────────────────── hub      handshake ok
//! client <──{"type":1,"target":"UserTyping","arguments":["conv-1","u-2"]}␞
//! client ──{"type":1,"invocationId":"7","target":"StartTyping","arguments":["conv-1"]}␞──>
//! client <──{"type":3,"invocationId":"7"}␞     completion
//! client <──{"type":6}␞                          ping
//! ```

use crate::error::{HubError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frame terminator
pub const RECORD_SEPARATOR: char = '\u{1e}';

/// Protocol name sent in the handshake
pub const PROTOCOL_NAME: &str = "json";

/// Protocol version sent in the handshake
pub const PROTOCOL_VERSION: u32 = 1;

const TYPE_INVOCATION: u8 = 1;
const TYPE_COMPLETION: u8 = 3;
const TYPE_PING: u8 = 6;
const TYPE_CLOSE: u8 = 7;

#[derive(Serialize)]
struct HandshakeRequest<'a> {
    protocol: &'a str,
    version: u32,
}

#[derive(Deserialize)]
struct HandshakeResponse {
    #[serde(default)]
    error: Option<String>,
}

/// A decoded hub frame
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
    /// Stream items, cancellations and anything newer; ignored
    Unsupported(u8),
}

#[derive(Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    invocation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    arguments: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    allow_reconnect: Option<bool>,
}

/// Handshake request frame, separator included
pub fn handshake_request() -> String {
    let body = serde_json::to_string(&HandshakeRequest {
        protocol: PROTOCOL_NAME,
        version: PROTOCOL_VERSION,
    })
    .unwrap_or_default();
    format!("{}{}", body, RECORD_SEPARATOR)
}

/// Check the hub's handshake response frame
///
/// `{}` accepts the handshake; `{"error": "..."}` rejects it.
pub fn parse_handshake_response(frame: &str) -> Result<()> {
    let response: HandshakeResponse = serde_json::from_str(frame)
        .map_err(|e| HubError::Handshake(format!("malformed response: {}", e)))?;

    match response.error {
        Some(reason) => Err(HubError::Handshake(reason)),
        None => Ok(()),
    }
}

/// Split a WebSocket text payload into its frames
pub fn split_frames(payload: &str) -> impl Iterator<Item = &str> {
    payload
        .split(RECORD_SEPARATOR)
        .filter(|frame| !frame.trim().is_empty())
}

/// Decode a single frame (without separator)
pub fn decode(frame: &str) -> Result<HubMessage> {
    let raw: RawMessage = serde_json::from_str(frame)?;

    match raw.kind {
        TYPE_INVOCATION => {
            let target = raw
                .target
                .ok_or_else(|| HubError::Protocol("invocation without target".into()))?;
            Ok(HubMessage::Invocation {
                invocation_id: raw.invocation_id,
                target,
                arguments: raw.arguments.unwrap_or_default(),
            })
        }
        TYPE_COMPLETION => {
            let invocation_id = raw
                .invocation_id
                .ok_or_else(|| HubError::Protocol("completion without invocationId".into()))?;
            Ok(HubMessage::Completion {
                invocation_id,
                result: raw.result,
                error: raw.error,
            })
        }
        TYPE_PING => Ok(HubMessage::Ping),
        TYPE_CLOSE => Ok(HubMessage::Close {
            error: raw.error,
            allow_reconnect: raw.allow_reconnect.unwrap_or(false),
        }),
        other => Ok(HubMessage::Unsupported(other)),
    }
}

/// Encode a frame, separator included
pub fn encode(message: &HubMessage) -> Result<String> {
    let raw = match message {
        HubMessage::Invocation {
            invocation_id,
            target,
            arguments,
        } => RawMessage {
            kind: TYPE_INVOCATION,
            invocation_id: invocation_id.clone(),
            target: Some(target.clone()),
            arguments: Some(arguments.clone()),
            ..Default::default()
        },
        HubMessage::Completion {
            invocation_id,
            result,
            error,
        } => RawMessage {
            kind: TYPE_COMPLETION,
            invocation_id: Some(invocation_id.clone()),
            result: result.clone(),
            error: error.clone(),
            ..Default::default()
        },
        HubMessage::Ping => RawMessage {
            kind: TYPE_PING,
            ..Default::default()
        },
        HubMessage::Close {
            error,
            allow_reconnect,
        } => RawMessage {
            kind: TYPE_CLOSE,
            error: error.clone(),
            allow_reconnect: Some(*allow_reconnect),
            ..Default::default()
        },
        HubMessage::Unsupported(kind) => {
            return Err(HubError::Protocol(format!(
                "cannot encode message type {}",
                kind
            )))
        }
    };

    Ok(format!("{}{}", serde_json::to_string(&raw)?, RECORD_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_handshake_request_is_terminated() {
        let frame = handshake_request();
        assert!(frame.ends_with(RECORD_SEPARATOR));
        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body, json!({"protocol": "json", "version": 1}));
    }

    #[test]
    fn test_handshake_response() {
        assert!(parse_handshake_response("{}").is_ok());

        let err = parse_handshake_response(r#"{"error":"Requested protocol 'json' is not available."}"#)
            .unwrap_err();
        assert!(matches!(err, HubError::Handshake(reason) if reason.contains("not available")));

        assert!(matches!(
            parse_handshake_response("not json"),
            Err(HubError::Handshake(_))
        ));
    }

    #[test]
    fn test_split_multiple_frames() {
        let payload = "{\"type\":6}\u{1e}{\"type\":1,\"target\":\"UserTyping\",\"arguments\":[]}\u{1e}";
        let frames: Vec<_> = split_frames(payload).collect();
        assert_eq!(frames.len(), 2);
        assert_eq!(decode(frames[0]).unwrap(), HubMessage::Ping);
    }

    #[test]
    fn test_decode_invocation() {
        let message = decode(r#"{"type":1,"target":"UserTyping","arguments":["conv-1","user-2"]}"#).unwrap();
        assert_eq!(
            message,
            HubMessage::Invocation {
                invocation_id: None,
                target: "UserTyping".to_string(),
                arguments: vec![json!("conv-1"), json!("user-2")],
            }
        );
    }

    #[test]
    fn test_decode_completion_with_error() {
        let message = decode(r#"{"type":3,"invocationId":"4","error":"Unauthorized"}"#).unwrap();
        assert_eq!(
            message,
            HubMessage::Completion {
                invocation_id: "4".to_string(),
                result: None,
                error: Some("Unauthorized".to_string()),
            }
        );
    }

    #[test]
    fn test_decode_close_defaults_to_no_reconnect() {
        assert_eq!(
            decode(r#"{"type":7,"error":"Server shutting down"}"#).unwrap(),
            HubMessage::Close {
                error: Some("Server shutting down".to_string()),
                allow_reconnect: false,
            }
        );
    }

    #[test]
    fn test_decode_rejects_malformed_frames() {
        assert!(matches!(decode(r#"{"type":1}"#), Err(HubError::Protocol(_))));
        assert!(matches!(decode(r#"{"type":3}"#), Err(HubError::Protocol(_))));
        assert!(matches!(decode("[1,2"), Err(HubError::Protocol(_))));
    }

    #[test]
    fn test_decode_ignores_stream_items() {
        assert_eq!(
            decode(r#"{"type":2,"invocationId":"1","item":5}"#).unwrap(),
            HubMessage::Unsupported(2)
        );
    }

    #[test]
    fn test_encode_invocation_omits_empty_fields() {
        let frame = encode(&HubMessage::Invocation {
            invocation_id: Some("1".to_string()),
            target: "StartTyping".to_string(),
            arguments: vec![json!("conv-1")],
        })
        .unwrap();

        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(
            body,
            json!({"type": 1, "invocationId": "1", "target": "StartTyping", "arguments": ["conv-1"]})
        );
    }
}
