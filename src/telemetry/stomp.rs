//! STOMP 1.2 frame codec
//!
//! A STOMP frame is:
//!
//! ```text
//! COMMAND\n
//! header1:value1\n
//! header2:value2\n
//! \n
//! body^@
//! ```
//!
//! Bare EOLs between frames are heart-beats. Header values are escaped
//! (`\\`, `\n`, `\r`, `\c`) except on CONNECT/CONNECTED. A `content-length`
//! header delimits the body in bytes; otherwise the body runs to the first NUL.

use std::time::Duration;
use thiserror::Error;

use crate::config::defaults;

/// STOMP codec errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StompError {
    #[error("Unknown STOMP command: {0:?}")]
    UnknownCommand(String),

    #[error("Malformed header line: {0:?}")]
    MalformedHeader(String),

    #[error("Invalid escape sequence in header: {0:?}")]
    InvalidEscape(String),

    #[error("Invalid content-length: {0:?}")]
    InvalidContentLength(String),

    #[error("Frame body is not valid UTF-8")]
    InvalidBody,

    #[error("Frame exceeds {0} bytes")]
    FrameTooLarge(usize),
}

/// STOMP frame commands (client and server).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StompCommand {
    Connect,
    Stomp,
    Connected,
    Send,
    Subscribe,
    Unsubscribe,
    Ack,
    Nack,
    Begin,
    Commit,
    Abort,
    Disconnect,
    Message,
    Receipt,
    Error,
}

impl StompCommand {
    pub fn as_str(self) -> &'static str {
        match self {
            StompCommand::Connect => "CONNECT",
            StompCommand::Stomp => "STOMP",
            StompCommand::Connected => "CONNECTED",
            StompCommand::Send => "SEND",
            StompCommand::Subscribe => "SUBSCRIBE",
            StompCommand::Unsubscribe => "UNSUBSCRIBE",
            StompCommand::Ack => "ACK",
            StompCommand::Nack => "NACK",
            StompCommand::Begin => "BEGIN",
            StompCommand::Commit => "COMMIT",
            StompCommand::Abort => "ABORT",
            StompCommand::Disconnect => "DISCONNECT",
            StompCommand::Message => "MESSAGE",
            StompCommand::Receipt => "RECEIPT",
            StompCommand::Error => "ERROR",
        }
    }

    fn parse(s: &str) -> Result<Self, StompError> {
        Ok(match s {
            "CONNECT" => StompCommand::Connect,
            "STOMP" => StompCommand::Stomp,
            "CONNECTED" => StompCommand::Connected,
            "SEND" => StompCommand::Send,
            "SUBSCRIBE" => StompCommand::Subscribe,
            "UNSUBSCRIBE" => StompCommand::Unsubscribe,
            "ACK" => StompCommand::Ack,
            "NACK" => StompCommand::Nack,
            "BEGIN" => StompCommand::Begin,
            "COMMIT" => StompCommand::Commit,
            "ABORT" => StompCommand::Abort,
            "DISCONNECT" => StompCommand::Disconnect,
            "MESSAGE" => StompCommand::Message,
            "RECEIPT" => StompCommand::Receipt,
            "ERROR" => StompCommand::Error,
            other => return Err(StompError::UnknownCommand(other.to_string())),
        })
    }

    /// CONNECT and CONNECTED carry raw header values.
    fn escapes_headers(self) -> bool {
        !matches!(self, StompCommand::Connect | StompCommand::Connected)
    }
}

impl std::fmt::Display for StompCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Frame
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StompFrame {
    pub command: StompCommand,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl StompFrame {
    pub fn new(command: StompCommand) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value for `name`; repeated headers keep the first occurrence.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire text, NUL-terminated.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str(&format!("content-length:{}\n", self.body.len()));
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }

    // --- Client frames used by the telemetry channel ---

    pub fn connect(heartbeat: Heartbeat) -> Self {
        Self::new(StompCommand::Connect)
            .header("accept-version", "1.2,1.1,1.0")
            .header("heart-beat", heartbeat.to_header())
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Self::new(StompCommand::Subscribe)
            .header("id", id)
            .header("destination", destination)
            .header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Self::new(StompCommand::Unsubscribe).header("id", id)
    }

    pub fn disconnect() -> Self {
        Self::new(StompCommand::Disconnect)
    }
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, StompError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(StompError::InvalidEscape(s.to_string())),
        }
    }
    Ok(out)
}

// ============================================================================
// Heart-beating
// ============================================================================

/// A `heart-beat` header value: `(can send every, want to receive every)` in ms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Heartbeat {
    pub send_ms: u64,
    pub receive_ms: u64,
}

impl Heartbeat {
    pub fn new(send_ms: u64, receive_ms: u64) -> Self {
        Self { send_ms, receive_ms }
    }

    pub fn to_header(self) -> String {
        format!("{},{}", self.send_ms, self.receive_ms)
    }

    /// Parse `"sx,sy"`. Missing or garbled values mean "no heart-beating".
    pub fn parse(value: Option<&str>) -> Self {
        let Some(value) = value else {
            return Self::default();
        };
        let mut parts = value.split(',').map(|p| p.trim().parse::<u64>().unwrap_or(0));
        Self {
            send_ms: parts.next().unwrap_or(0),
            receive_ms: parts.next().unwrap_or(0),
        }
    }

    /// Negotiate with the server's CONNECTED value.
    ///
    /// Returns `(outgoing, incoming)` intervals; `None` disables that direction.
    pub fn negotiate(client: Self, server: Self) -> (Option<Duration>, Option<Duration>) {
        let pick = |ours: u64, theirs: u64| {
            (ours > 0 && theirs > 0).then(|| Duration::from_millis(ours.max(theirs)))
        };
        (
            pick(client.send_ms, server.receive_ms),
            pick(client.receive_ms, server.send_ms),
        )
    }
}

// ============================================================================
// Decoder
// ============================================================================

/// Incremental decoder. Feed wire text with [`push`](Self::push), pull
/// complete frames with [`next_frame`](Self::next_frame).
///
/// Partial frames stay buffered across pushes. A malformed frame is
/// consumed and reported once, so the stream continues with the next one.
/// A frame larger than `max_frame` bytes is discarded.
#[derive(Debug)]
pub struct StompDecoder {
    buf: String,
    max_frame: usize,
}

impl Default for StompDecoder {
    fn default() -> Self {
        Self::with_max_frame(defaults::MAX_FRAME_BYTES)
    }
}

impl StompDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_frame(max_frame: usize) -> Self {
        Self {
            buf: String::new(),
            max_frame,
        }
    }

    pub fn push(&mut self, chunk: &str) {
        self.buf.push_str(chunk);
    }

    /// Bytes buffered but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    pub fn next_frame(&mut self) -> Option<Result<StompFrame, StompError>> {
        // Heart-beats
        let skip = self.buf.len() - self.buf.trim_start_matches(|c: char| c == '\n' || c == '\r').len();
        self.buf.drain(..skip);
        if self.buf.is_empty() {
            return None;
        }

        let Some((head_end, body_start)) = find_head_end(&self.buf) else {
            return self.overflow();
        };
        let head = parse_head(&self.buf[..head_end]);

        let content_length = match &head {
            Ok((_, headers)) => match content_length(headers) {
                Ok(len) => len,
                Err(e) => return self.discard_frame(body_start, e),
            },
            Err(_) => None,
        };

        let body_end = match content_length {
            Some(len) => {
                let end = match body_start.checked_add(len) {
                    Some(end) if end < self.max_frame => end,
                    _ => return self.reject_length(body_start, len),
                };
                // Need the body plus its NUL terminator
                if self.buf.len() <= end {
                    return None;
                }
                if self.buf.as_bytes()[end] != 0 {
                    return self.reject_length(body_start, len);
                }
                end
            }
            None => match self.buf[body_start..].find('\0') {
                Some(nul) => body_start + nul,
                None => return self.overflow(),
            },
        };

        let (command, headers) = match head {
            Ok(head) => head,
            Err(e) => return self.discard_frame(body_start, e),
        };

        let body = match self.buf.get(body_start..body_end) {
            Some(body) => body.to_string(),
            None => {
                self.consume_through_nul(body_end);
                return Some(Err(StompError::InvalidBody));
            }
        };

        self.consume_through_nul(body_end);
        Some(Ok(StompFrame {
            command,
            headers,
            body,
        }))
    }

    /// Report a frame whose declared length is absurd or does not end on a
    /// NUL, and resynchronise at the first NUL after its head.
    fn reject_length(
        &mut self,
        body_start: usize,
        len: usize,
    ) -> Option<Result<StompFrame, StompError>> {
        let err = StompError::InvalidContentLength(len.to_string());
        match self.discard_frame(body_start, err) {
            Some(result) => Some(result),
            None => self.overflow(),
        }
    }

    /// Incomplete frame: wait for more input unless the buffer is already
    /// past the frame limit, in which case everything buffered is dropped.
    fn overflow(&mut self) -> Option<Result<StompFrame, StompError>> {
        if self.buf.len() <= self.max_frame {
            return None;
        }
        self.buf.clear();
        Some(Err(StompError::FrameTooLarge(self.max_frame)))
    }

    /// Drop a broken frame up to its NUL terminator (if it has arrived).
    fn discard_frame(
        &mut self,
        body_start: usize,
        err: StompError,
    ) -> Option<Result<StompFrame, StompError>> {
        let nul = self.buf[body_start..].find('\0')?;
        self.buf.drain(..=body_start + nul);
        Some(Err(err))
    }

    /// Remove everything up to and including the NUL at or after `from`.
    fn consume_through_nul(&mut self, from: usize) {
        let start = from.min(self.buf.len());
        let end = self.buf.as_bytes()[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(self.buf.len(), |p| start + p + 1);
        // `end` sits just after an ASCII NUL or at the buffer end, so it is a char boundary
        self.buf.drain(..end);
    }
}

/// Locate the blank line ending the head. Returns (head end, body start).
fn find_head_end(buf: &str) -> Option<(usize, usize)> {
    let mut line_start = 0;
    loop {
        let nl = line_start + buf[line_start..].find('\n')?;
        let line = buf[line_start..nl].trim_end_matches('\r');
        if line.is_empty() && line_start > 0 {
            return Some((line_start, nl + 1));
        }
        line_start = nl + 1;
    }
}

fn parse_head(head: &str) -> Result<(StompCommand, Vec<(String, String)>), StompError> {
    let mut lines = head.lines().map(|l| l.trim_end_matches('\r'));
    let command = StompCommand::parse(lines.next().unwrap_or_default())?;
    let escaped = command.escapes_headers();

    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (k, v) = line
            .split_once(':')
            .ok_or_else(|| StompError::MalformedHeader(line.to_string()))?;
        if escaped {
            headers.push((unescape_header(k)?, unescape_header(v)?));
        } else {
            headers.push((k.to_string(), v.to_string()));
        }
    }
    Ok((command, headers))
}

fn content_length(headers: &[(String, String)]) -> Result<Option<usize>, StompError> {
    headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| {
            v.trim()
                .parse::<usize>()
                .map_err(|_| StompError::InvalidContentLength(v.clone()))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(text: &str) -> Vec<Result<StompFrame, StompError>> {
        let mut decoder = StompDecoder::new();
        decoder.push(text);
        std::iter::from_fn(|| decoder.next_frame()).collect()
    }

    #[test]
    fn test_encode_subscribe() {
        let wire = StompFrame::subscribe("sub-0", "/topic/live").encode();
        assert_eq!(
            wire,
            "SUBSCRIBE\nid:sub-0\ndestination:/topic/live\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_connect_headers_not_escaped() {
        let wire = StompFrame::connect(Heartbeat::new(10_000, 10_000)).encode();
        assert!(wire.starts_with("CONNECT\naccept-version:1.2,1.1,1.0\nheart-beat:10000,10000\n\n"));
    }

    #[test]
    fn test_decode_message_without_content_length() {
        let frames = decode_all("MESSAGE\ndestination:/topic/live\nsubscription:sub-0\n\n{\"a\":1}\0");
        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.command, StompCommand::Message);
        assert_eq!(frame.get("destination"), Some("/topic/live"));
        assert_eq!(frame.body, "{\"a\":1}");
    }

    #[test]
    fn test_decode_skips_heartbeats_and_crlf() {
        let frames = decode_all("\n\r\n\nCONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0\n");
        assert_eq!(frames.len(), 1);
        let frame = frames[0].as_ref().unwrap();
        assert_eq!(frame.command, StompCommand::Connected);
        assert_eq!(frame.get("version"), Some("1.2"));
    }

    #[test]
    fn test_content_length_allows_embedded_nul() {
        let frames = decode_all("MESSAGE\ncontent-length:5\n\nab\0cd\0RECEIPT\nreceipt-id:7\n\n\0");
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap().body, "ab\0cd");
        assert_eq!(frames[1].as_ref().unwrap().get("receipt-id"), Some("7"));
    }

    #[test]
    fn test_partial_frame_is_buffered() {
        let mut decoder = StompDecoder::new();
        decoder.push("MESSAGE\ndestination:/topic/li");
        assert!(decoder.next_frame().is_none());
        decoder.push("ve\n\n{\"time\":[]");
        assert!(decoder.next_frame().is_none());
        decoder.push("}\0");

        let frame = decoder.next_frame().unwrap().unwrap();
        assert_eq!(frame.body, "{\"time\":[]}");
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_header_escaping_round_trip() {
        let frame = StompFrame::new(StompCommand::Send)
            .header("note", "a:b\\c\nd")
            .body("x");
        let wire = frame.encode();
        assert!(wire.contains("note:a\\cb\\\\c\\nd\n"));

        let decoded = decode_all(&wire).remove(0).unwrap();
        assert_eq!(decoded.get("note"), Some("a:b\\c\nd"));
        assert_eq!(decoded.body, "x");
    }

    #[test]
    fn test_first_header_wins() {
        let frame = decode_all("MESSAGE\nfoo:1\nfoo:2\n\n\0").remove(0).unwrap();
        assert_eq!(frame.get("foo"), Some("1"));
    }

    #[test]
    fn test_bad_frame_is_consumed_and_stream_continues() {
        let frames = decode_all("BOGUS\n\nxx\0MESSAGE\nbad-header-line\n\n\0MESSAGE\n\nok\0");
        assert_eq!(frames.len(), 3);
        assert_eq!(
            frames[0],
            Err(StompError::UnknownCommand("BOGUS".to_string()))
        );
        assert!(matches!(frames[1], Err(StompError::MalformedHeader(_))));
        assert_eq!(frames[2].as_ref().unwrap().body, "ok");
    }

    #[test]
    fn test_overflowing_content_length_is_dropped() {
        let frames = decode_all(
            "MESSAGE\ncontent-length:18446744073709551615\n\n{}\0MESSAGE\n\nok\0",
        );
        assert_eq!(frames.len(), 2);
        assert!(matches!(frames[0], Err(StompError::InvalidContentLength(_))));
        assert_eq!(frames[1].as_ref().unwrap().body, "ok");
    }

    #[test]
    fn test_oversized_content_length_does_not_swallow_stream() {
        let mut wire = String::from("MESSAGE\ncontent-length:1000000\n\n{}\0");
        for i in 0..100 {
            wire.push_str(&format!("MESSAGE\n\n{i}\0"));
        }

        let frames = decode_all(&wire);
        assert_eq!(frames.len(), 101);
        assert!(matches!(frames[0], Err(StompError::InvalidContentLength(_))));
        assert_eq!(frames[100].as_ref().unwrap().body, "99");
    }

    #[test]
    fn test_content_length_past_body_resyncs_once_data_arrives() {
        let mut decoder = StompDecoder::new();
        decoder.push("MESSAGE\ncontent-length:40\n\n{}\0");
        // Could still be a body with embedded NULs
        assert!(decoder.next_frame().is_none());

        decoder.push(&"MESSAGE\n\nok\0".repeat(5));
        let frames: Vec<_> = std::iter::from_fn(|| decoder.next_frame()).collect();

        assert_eq!(frames.len(), 6);
        assert_eq!(
            frames[0],
            Err(StompError::InvalidContentLength("40".to_string()))
        );
        assert!(frames[1..].iter().all(|f| f.as_ref().unwrap().body == "ok"));
        assert_eq!(decoder.buffered(), 0);
    }

    #[test]
    fn test_unterminated_frame_over_limit_is_dropped() {
        let mut decoder = StompDecoder::with_max_frame(64);
        decoder.push("MESSAGE\n\n");
        decoder.push(&"x".repeat(100));

        assert_eq!(decoder.next_frame(), Some(Err(StompError::FrameTooLarge(64))));
        assert_eq!(decoder.buffered(), 0);

        decoder.push("MESSAGE\n\nok\0");
        assert_eq!(decoder.next_frame().unwrap().unwrap().body, "ok");
    }

    #[test]
    fn test_invalid_escape_rejected() {
        let frames = decode_all("MESSAGE\nk:bad\\t\n\n\0");
        assert!(matches!(frames[0], Err(StompError::InvalidEscape(_))));
    }

    #[test]
    fn test_heartbeat_negotiation() {
        let client = Heartbeat::new(10_000, 10_000);

        let (out, inc) = Heartbeat::negotiate(client, Heartbeat::new(5_000, 20_000));
        assert_eq!(out, Some(Duration::from_millis(20_000)));
        assert_eq!(inc, Some(Duration::from_millis(10_000)));

        let (out, inc) = Heartbeat::negotiate(client, Heartbeat::new(0, 0));
        assert_eq!((out, inc), (None, None));

        let (out, inc) = Heartbeat::negotiate(Heartbeat::new(0, 4_000), Heartbeat::new(1_000, 1_000));
        assert_eq!((out, inc), (None, Some(Duration::from_millis(4_000))));
    }

    #[test]
    fn test_heartbeat_parse() {
        assert_eq!(Heartbeat::parse(Some("100, 200")), Heartbeat::new(100, 200));
        assert_eq!(Heartbeat::parse(Some("x,y")), Heartbeat::default());
        assert_eq!(Heartbeat::parse(None), Heartbeat::default());
    }
}
