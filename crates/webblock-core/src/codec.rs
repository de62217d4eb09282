//! JSON text codec for the realtime channel and the HTTP bodies.

use crate::error::BlockerResult;

/// Encode a serializable value into a JSON text frame.
pub fn encode<T: serde::Serialize>(value: &T) -> BlockerResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a JSON text frame into a typed value.
pub fn decode<T: serde::de::DeserializeOwned>(text: &str) -> BlockerResult<T> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{ClientMessage, ServerMessage, Snapshot};
    use crate::BlockerError;

    #[test]
    fn state_frame_is_flat() {
        let snapshot = Snapshot {
            blocked: false,
            sessions: 2,
            working: 1,
            waiting_for_input: 1,
        };
        let text = encode(&ServerMessage::State(snapshot)).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "state");
        assert_eq!(value["sessions"], 2);
        assert_eq!(value["working"], 1);
        assert_eq!(value["waitingForInput"], 1);
        assert_eq!(value["blocked"], false);
    }

    #[test]
    fn pong_frame() {
        assert_eq!(encode(&ServerMessage::Pong).unwrap(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn decode_ping() {
        let msg: ClientMessage = decode(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Ping);
    }

    #[test]
    fn decode_state_from_server_text() {
        let msg: ServerMessage = decode(
            r#"{"type":"state","blocked":true,"sessions":3,"working":0,"waitingForInput":0}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::State(s) => {
                assert!(s.blocked);
                assert_eq!(s.sessions, 3);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn garbage_is_codec_error() {
        let err = decode::<ClientMessage>("not json").unwrap_err();
        assert!(matches!(err, BlockerError::Codec(_)));
        assert!(decode::<ClientMessage>(r#"{"type":"shout"}"#).is_err());
    }
}
