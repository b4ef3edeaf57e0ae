//! SockJS WebSocket transport framing
//!
//! Server → client frames are a single type character plus payload:
//! - `o` session open
//! - `h` heartbeat
//! - `a["m1","m2"]` array of messages
//! - `m"msg"` single message (legacy)
//! - `c[3000,"Go away!"]` close
//!
//! Client → server frames are a JSON array of strings.

use rand::Rng;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SockJsError {
    #[error("Empty SockJS frame")]
    Empty,

    #[error("Unknown SockJS frame type: {0:?}")]
    UnknownType(char),

    #[error("Malformed SockJS payload: {0}")]
    Payload(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockJsFrame {
    Open,
    Heartbeat,
    Messages(Vec<String>),
    Close { code: u16, reason: String },
}

pub fn decode(text: &str) -> Result<SockJsFrame, SockJsError> {
    let mut chars = text.chars();
    let kind = chars.next().ok_or(SockJsError::Empty)?;
    let payload = chars.as_str();

    match kind {
        'o' => Ok(SockJsFrame::Open),
        'h' => Ok(SockJsFrame::Heartbeat),
        'a' => Ok(SockJsFrame::Messages(serde_json::from_str(payload)?)),
        'm' => Ok(SockJsFrame::Messages(vec![serde_json::from_str(payload)?])),
        'c' => {
            let (code, reason): (u16, String) = serde_json::from_str(payload)?;
            Ok(SockJsFrame::Close { code, reason })
        }
        other => Err(SockJsError::UnknownType(other)),
    }
}

/// Wrap one outbound message.
pub fn encode(message: &str) -> String {
    // Serializing a one-element array of &str cannot fail
    serde_json::to_string(&[message]).unwrap_or_else(|_| "[]".to_string())
}

/// Build the raw-WebSocket session URL for a SockJS endpoint:
/// `<ws base>/<server-id>/<session-id>/websocket`.
pub fn session_url(base: &str) -> String {
    let mut rng = rand::thread_rng();
    let server_id: u16 = rng.gen_range(0..1000);
    let session_id: String = (0..8)
        .map(|_| {
            const ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
            ALPHABET[rng.gen_range(0..ALPHABET.len())] as char
        })
        .collect();

    format!(
        "{}/{:03}/{}/websocket",
        super::to_ws_scheme(base).trim_end_matches('/'),
        server_id,
        session_id
    )
}
