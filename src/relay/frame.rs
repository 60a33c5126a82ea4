//! Framing-preserving message model shared by both relay legs.
//!
//! The client leg speaks axum's WebSocket types and the upstream leg speaks
//! tungstenite's. Both are converted into [`Frame`] so the session loops are
//! independent of either library. Payloads are moved, never re-encoded.

use axum::body::Bytes;
use axum::extract::ws::{CloseFrame as ClientCloseFrame, Message as ClientMessage};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame as UpstreamCloseFrame;
use tokio_tungstenite::tungstenite::Message as UpstreamMessage;

/// Close code and reason carried by a Close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

/// One WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseReason>),
}

impl Frame {
    /// Data frames are relayed; control frames stay on their own leg.
    pub fn is_data(&self) -> bool {
        matches!(self, Frame::Text(_) | Frame::Binary(_))
    }

    pub fn payload_len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) | Frame::Ping(data) | Frame::Pong(data) => data.len(),
            Frame::Close(reason) => reason.as_ref().map_or(0, |r| r.reason.len() + 2),
        }
    }

    /// Convert an upstream message. Raw frames are never produced by reads.
    pub fn from_upstream(msg: UpstreamMessage) -> Option<Frame> {
        Some(match msg {
            UpstreamMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            UpstreamMessage::Binary(data) => Frame::Binary(data),
            UpstreamMessage::Ping(data) => Frame::Ping(data),
            UpstreamMessage::Pong(data) => Frame::Pong(data),
            UpstreamMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: u16::from(f.code),
                reason: f.reason.as_str().to_owned(),
            })),
            UpstreamMessage::Frame(_) => return None,
        })
    }
}

impl From<ClientMessage> for Frame {
    fn from(msg: ClientMessage) -> Self {
        match msg {
            ClientMessage::Text(text) => Frame::Text(text.as_str().to_owned()),
            ClientMessage::Binary(data) => Frame::Binary(data),
            ClientMessage::Ping(data) => Frame::Ping(data),
            ClientMessage::Pong(data) => Frame::Pong(data),
            ClientMessage::Close(frame) => Frame::Close(frame.map(|f| CloseReason {
                code: f.code,
                reason: f.reason.as_str().to_owned(),
            })),
        }
    }
}

impl From<Frame> for ClientMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ClientMessage::Text(text.into()),
            Frame::Binary(data) => ClientMessage::Binary(data),
            Frame::Ping(data) => ClientMessage::Ping(data),
            Frame::Pong(data) => ClientMessage::Pong(data),
            Frame::Close(reason) => ClientMessage::Close(reason.map(|r| ClientCloseFrame {
                code: r.code,
                reason: r.reason.into(),
            })),
        }
    }
}

impl From<Frame> for UpstreamMessage {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => UpstreamMessage::Text(text.into()),
            Frame::Binary(data) => UpstreamMessage::Binary(data),
            Frame::Ping(data) => UpstreamMessage::Ping(data),
            Frame::Pong(data) => UpstreamMessage::Pong(data),
            Frame::Close(reason) => UpstreamMessage::Close(reason.map(|r| UpstreamCloseFrame {
                code: CloseCode::from(r.code),
                reason: r.reason.into(),
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_payload_is_untouched() {
        let payload = Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF]);
        let frame = Frame::from(ClientMessage::Binary(payload.clone()));
        assert_eq!(frame, Frame::Binary(payload.clone()));

        match UpstreamMessage::from(frame) {
            UpstreamMessage::Binary(data) => assert_eq!(data, payload),
            other => panic!("framing changed: {:?}", other),
        }
    }

    #[test]
    fn text_stays_text() {
        let frame = Frame::from_upstream(UpstreamMessage::Text("partial:hi".into())).unwrap();
        assert_eq!(frame, Frame::Text("partial:hi".into()));
        assert!(matches!(ClientMessage::from(frame), ClientMessage::Text(t) if t.as_str() == "partial:hi"));
    }

    #[test]
    fn close_code_survives_both_directions() {
        let frame = Frame::from(ClientMessage::Close(Some(ClientCloseFrame {
            code: 4001,
            reason: "bye".into(),
        })));
        match UpstreamMessage::from(frame) {
            UpstreamMessage::Close(Some(close)) => {
                assert_eq!(u16::from(close.code), 4001);
                assert_eq!(close.reason.as_str(), "bye");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn control_frames_are_not_data() {
        assert!(!Frame::Ping(Bytes::new()).is_data());
        assert!(!Frame::Close(None).is_data());
        assert!(Frame::Text(String::new()).is_data());
    }
}
