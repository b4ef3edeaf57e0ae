//! Telemetry Channel - live frames over STOMP
//!
//! ```text
//! WebSocket ──► [SockJS envelope] ──► StompDecoder ──► MESSAGE body ──► decode_payload
//!                                                                        │
//!                         TelemetryEvent::{Frame, Dropped} ◄─────────────┘
//! ```
//!
//! The channel knows nothing about rendering. It yields one event per
//! inbound message, in arrival order. A payload that fails to decode is
//! surfaced as [`TelemetryEvent::Dropped`] and the stream keeps going.

mod client;
pub mod sockjs;
pub mod stomp;

pub use client::{StompTelemetry, TelemetrySettings};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::types::{FrameError, VibrationFrame};

// ============================================================================
// Framing
// ============================================================================

/// How STOMP frames are carried over the WebSocket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Framing {
    /// One STOMP frame per WebSocket text message
    Raw,
    /// SockJS WebSocket transport envelope
    #[default]
    SockJs,
}

impl Framing {
    /// WebSocket URL to dial for a configured endpoint base.
    pub fn connect_url(self, base: &str) -> String {
        match self {
            Framing::Raw => to_ws_scheme(base),
            Framing::SockJs => sockjs::session_url(base),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Framing::Raw => "raw",
            Framing::SockJs => "sockjs",
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "raw" | "ws" | "websocket" => Ok(Framing::Raw),
            "sockjs" => Ok(Framing::SockJs),
            other => Err(format!("unknown framing {other:?} (expected raw or sockjs)")),
        }
    }
}

/// Map `http(s)://` to `ws(s)://`; other schemes pass through.
pub(crate) fn to_ws_scheme(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_string()
    }
}

// ============================================================================
// Events & Errors
// ============================================================================

/// One step of the telemetry stream.
#[derive(Debug)]
pub enum TelemetryEvent {
    /// A decoded frame, ready to render
    Frame(VibrationFrame),
    /// A payload that failed to decode; the stream continues
    Dropped(FrameError),
    /// The connection was lost and re-established
    Reconnected { attempts: u32 },
    /// The stream has ended; every later call yields `Closed` again
    Closed,
}

/// Telemetry connection errors
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("WebSocket transport error: {0}")]
    Transport(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("Broker rejected the session: {0}")]
    Rejected(String),

    #[error("Unexpected {0} frame during handshake")]
    Handshake(String),

    #[error("STOMP protocol error: {0}")]
    Protocol(#[from] stomp::StompError),

    #[error("Connection closed by server")]
    ConnectionClosed,

    #[error("No heart-beat from server within {0:?}")]
    HeartbeatTimeout(Duration),

    #[error("Reconnection failed after {0} attempts")]
    ReconnectExhausted(u32),
}

impl From<tokio_tungstenite::tungstenite::Error> for TelemetryError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        TelemetryError::Transport(e.to_string())
    }
}

/// Counters kept by a telemetry source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub reconnections: u64,
    pub heartbeat_timeouts: u64,
    pub connected: bool,
}

// ============================================================================
// Source Trait
// ============================================================================

/// Anything that yields telemetry events.
///
/// Implementations must tolerate a pending [`next_event`](Self::next_event)
/// future being dropped and the method called again.
#[async_trait]
pub trait TelemetrySource: Send {
    /// Wait for the next event. Connects lazily on first use.
    ///
    /// Returns `Err` only when the stream cannot continue (e.g. reconnection
    /// exhausted); the source is closed afterwards.
    async fn next_event(&mut self) -> Result<TelemetryEvent, TelemetryError>;

    /// Unsubscribe and release the connection. Idempotent.
    async fn close(&mut self);

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

/// Invoke `on_frame` once per decoded frame, in arrival order, until the
/// stream closes or `cancel` fires. Dropped payloads are logged and skipped.
///
/// Returns the number of frames delivered. The source is closed on exit.
pub async fn for_each_frame<S, F>(
    source: &mut S,
    mut on_frame: F,
    cancel: &CancellationToken,
) -> Result<u64, TelemetryError>
where
    S: TelemetrySource + ?Sized,
    F: FnMut(VibrationFrame),
{
    let mut delivered = 0u64;

    let result = loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(delivered),
            event = source.next_event() => event,
        };

        match event {
            Ok(TelemetryEvent::Frame(frame)) => {
                delivered += 1;
                on_frame(frame);
            }
            Ok(TelemetryEvent::Dropped(e)) => {
                debug!(source = source.source_name(), error = %e, "Dropped malformed frame");
            }
            Ok(TelemetryEvent::Reconnected { attempts }) => {
                info!(source = source.source_name(), attempts, "Telemetry stream resumed");
            }
            Ok(TelemetryEvent::Closed) => break Ok(delivered),
            Err(e) => break Err(e),
        }
    };

    source.close().await;
    result
}
