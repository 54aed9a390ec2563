//! JSON hub protocol spoken over the leaderboard websocket.
//!
//! Every frame is a JSON object followed by the ASCII record separator
//! (`0x1E`). A websocket text message may carry several frames.

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::ProtocolError;

/// Frame terminator.
pub const RECORD_SEPARATOR: char = '\u{1e}';

pub const HUB_PROTOCOL: &str = "json";
pub const HUB_PROTOCOL_VERSION: u32 = 1;

/// Message type codes.
pub const TYPE_INVOCATION: u64 = 1;
pub const TYPE_COMPLETION: u64 = 3;
pub const TYPE_PING: u64 = 6;
pub const TYPE_CLOSE: u64 = 7;

/// Append the record separator to a serialized JSON object.
fn terminate(value: Value) -> String {
    let mut frame = value.to_string();
    frame.push(RECORD_SEPARATOR);
    frame
}

/// Split a websocket text payload into its frames, dropping empty segments.
pub fn split_frames(text: &str) -> impl Iterator<Item = &str> {
    text.split(RECORD_SEPARATOR)
        .map(str::trim)
        .filter(|frame| !frame.is_empty())
}

/// The first frame a client sends after the socket opens.
pub fn handshake_request() -> String {
    terminate(json!({ "protocol": HUB_PROTOCOL, "version": HUB_PROTOCOL_VERSION }))
}

/// Check the server's handshake reply: `{}` accepts, `{"error": ..}` rejects.
pub fn parse_handshake_response(frame: &str) -> Result<(), ProtocolError> {
    #[derive(Deserialize)]
    struct HandshakeResponse {
        #[serde(default)]
        error: Option<String>,
    }

    let response: HandshakeResponse = serde_json::from_str(frame)?;
    match response.error {
        Some(error) => Err(ProtocolError::HandshakeRejected(error)),
        None => Ok(()),
    }
}

/// Hub messages this client sends or understands.
#[derive(Debug, Clone, PartialEq)]
pub enum HubMessage {
    /// Call a method on the other side. Broadcasts carry no invocation id.
    Invocation {
        invocation_id: Option<String>,
        target: String,
        arguments: Vec<Value>,
    },
    /// Outcome of an invocation that carried an id.
    Completion {
        invocation_id: String,
        result: Option<Value>,
        error: Option<String>,
    },
    Ping,
    /// The server is closing the connection.
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(rename = "type")]
    kind: Option<u64>,
    #[serde(default)]
    invocation_id: Option<String>,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    arguments: Vec<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    allow_reconnect: bool,
}

impl HubMessage {
    /// Build an invocation that expects a completion.
    pub fn invocation(
        invocation_id: impl Into<String>,
        target: impl Into<String>,
        arguments: Vec<Value>,
    ) -> Self {
        HubMessage::Invocation {
            invocation_id: Some(invocation_id.into()),
            target: target.into(),
            arguments,
        }
    }

    /// Build a fire-and-forget broadcast.
    pub fn broadcast(target: impl Into<String>, payload: Value) -> Self {
        HubMessage::Invocation {
            invocation_id: None,
            target: target.into(),
            arguments: vec![payload],
        }
    }

    /// Decode one frame (without its separator).
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_str(frame)?;
        let kind = raw
            .kind
            .ok_or_else(|| ProtocolError::Malformed("missing message type".to_string()))?;

        match kind {
            TYPE_INVOCATION => {
                let target = raw
                    .target
                    .ok_or_else(|| ProtocolError::Malformed("invocation without target".to_string()))?;
                Ok(HubMessage::Invocation {
                    invocation_id: raw.invocation_id,
                    target,
                    arguments: raw.arguments,
                })
            }
            TYPE_COMPLETION => {
                let invocation_id = raw.invocation_id.ok_or_else(|| {
                    ProtocolError::Malformed("completion without invocationId".to_string())
                })?;
                Ok(HubMessage::Completion {
                    invocation_id,
                    result: raw.result,
                    error: raw.error,
                })
            }
            TYPE_PING => Ok(HubMessage::Ping),
            TYPE_CLOSE => Ok(HubMessage::Close {
                error: raw.error,
                allow_reconnect: raw.allow_reconnect,
            }),
            other => Err(ProtocolError::UnsupportedType(other)),
        }
    }

    /// Encode as a terminated frame.
    pub fn to_frame(&self) -> String {
        let mut object = Map::new();
        match self {
            HubMessage::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                object.insert("type".into(), TYPE_INVOCATION.into());
                if let Some(id) = invocation_id {
                    object.insert("invocationId".into(), id.clone().into());
                }
                object.insert("target".into(), target.clone().into());
                object.insert("arguments".into(), Value::Array(arguments.clone()));
            }
            HubMessage::Completion {
                invocation_id,
                result,
                error,
            } => {
                object.insert("type".into(), TYPE_COMPLETION.into());
                object.insert("invocationId".into(), invocation_id.clone().into());
                if let Some(result) = result {
                    object.insert("result".into(), result.clone());
                }
                if let Some(error) = error {
                    object.insert("error".into(), error.clone().into());
                }
            }
            HubMessage::Ping => {
                object.insert("type".into(), TYPE_PING.into());
            }
            HubMessage::Close {
                error,
                allow_reconnect,
            } => {
                object.insert("type".into(), TYPE_CLOSE.into());
                if let Some(error) = error {
                    object.insert("error".into(), error.clone().into());
                }
                if *allow_reconnect {
                    object.insert("allowReconnect".into(), true.into());
                }
            }
        }
        terminate(Value::Object(object))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_batched_frames() {
        let text = "{\"type\":6}\u{1e}{\"type\":6}\u{1e}";
        let frames: Vec<_> = split_frames(text).collect();
        assert_eq!(frames, vec!["{\"type\":6}", "{\"type\":6}"]);
    }

    #[test]
    fn handshake_request_is_terminated() {
        let frame = handshake_request();
        assert!(frame.ends_with(RECORD_SEPARATOR));
        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body["protocol"], "json");
        assert_eq!(body["version"], 1);
    }

    #[test]
    fn handshake_response_error_is_rejected() {
        assert!(parse_handshake_response("{}").is_ok());
        assert_eq!(
            parse_handshake_response("{\"error\":\"unknown protocol\"}"),
            Err(ProtocolError::HandshakeRejected("unknown protocol".to_string()))
        );
    }

    #[test]
    fn parses_broadcast_invocation() {
        let frame = r#"{"type":1,"target":"ReceiveLeaderboardUpdate","arguments":[{"teams":[]}]}"#;
        let message = HubMessage::parse(frame).unwrap();
        assert_eq!(
            message,
            HubMessage::broadcast("ReceiveLeaderboardUpdate", json!({"teams": []}))
        );
    }

    #[test]
    fn parses_completion_with_error() {
        let frame = r#"{"type":3,"invocationId":"4","error":"Method does not exist."}"#;
        assert_eq!(
            HubMessage::parse(frame).unwrap(),
            HubMessage::Completion {
                invocation_id: "4".to_string(),
                result: None,
                error: Some("Method does not exist.".to_string()),
            }
        );
    }

    #[test]
    fn parses_close_with_reconnect_hint() {
        let frame = r#"{"type":7,"error":"restarting","allowReconnect":true}"#;
        assert_eq!(
            HubMessage::parse(frame).unwrap(),
            HubMessage::Close {
                error: Some("restarting".to_string()),
                allow_reconnect: true,
            }
        );
    }

    #[test]
    fn rejects_unknown_and_untyped_frames() {
        assert_eq!(
            HubMessage::parse(r#"{"type":4}"#),
            Err(ProtocolError::UnsupportedType(4))
        );
        assert!(matches!(
            HubMessage::parse(r#"{"target":"x"}"#),
            Err(ProtocolError::Malformed(_))
        ));
        assert!(matches!(HubMessage::parse("not json"), Err(ProtocolError::Malformed(_))));
    }

    #[test]
    fn invocation_frame_carries_id_and_arguments() {
        let frame = HubMessage::invocation("0", "JoinContestGroup", vec![json!("c1")]).to_frame();
        let body: Value = serde_json::from_str(frame.trim_end_matches(RECORD_SEPARATOR)).unwrap();
        assert_eq!(body["type"], 1);
        assert_eq!(body["invocationId"], "0");
        assert_eq!(body["target"], "JoinContestGroup");
        assert_eq!(body["arguments"], json!(["c1"]));
    }
}
