//! STOMP telemetry client over WebSocket
//!
//! Connects lazily, subscribes once, and reconnects with bounded
//! exponential backoff when the link drops:
//!
//! ```text
//! Idle ──connect──► Up ──drop──► Retrying{failed} ──ok──► Up
//!   │                │                 │
//!   └─fail──► Retrying  close()        └─exhausted──► Closed
//! ```
//!
//! Link state lives on `self`. Dropping a pending `next_event` future
//! abandons an in-progress handshake; the next call starts it over, and an
//! interrupted backoff resumes at the same attempt.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rand::Rng;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, trace, warn};

use super::sockjs::{self, SockJsFrame};
use super::stomp::{Heartbeat, StompCommand, StompDecoder, StompFrame};
use super::{Framing, TelemetryError, TelemetryEvent, TelemetrySource, TelemetryStats};
use crate::config::{defaults, MonitorConfig, ReconnectConfig};
use crate::types::decode_payload;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// ============================================================================
// Settings
// ============================================================================

/// Everything needed to open and keep a telemetry subscription.
#[derive(Debug, Clone)]
pub struct TelemetrySettings {
    /// Endpoint base (`http(s)://` or `ws(s)://`)
    pub url: String,
    pub topic: String,
    pub framing: Framing,
    pub connect_timeout: Duration,
    /// Heart-beat we advertise in CONNECT
    pub heartbeat: Heartbeat,
    pub reconnect: ReconnectConfig,
}

impl TelemetrySettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            url: config.endpoints.telemetry_url.clone(),
            topic: config.endpoints.topic.clone(),
            framing: config.endpoints.framing,
            connect_timeout: config.telemetry.connect_timeout(),
            heartbeat: Heartbeat::new(
                config.telemetry.heartbeat_outgoing_ms,
                config.telemetry.heartbeat_incoming_ms,
            ),
            reconnect: config.reconnect.clone(),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One live WebSocket + STOMP session.
struct Session {
    ws: WsStream,
    framing: Framing,
    decoder: StompDecoder,
    /// SockJS `o` seen (always true for raw framing)
    opened: bool,
    outgoing: Option<Duration>,
    incoming: Option<Duration>,
    last_sent: Instant,
    last_received: Instant,
}

/// What woke the session up.
enum Wake {
    Inbound(Option<Result<Message, tokio_tungstenite::tungstenite::Error>>),
    SendHeartbeat,
    Stale(Duration),
}

impl Session {
    fn new(ws: WsStream, framing: Framing) -> Self {
        let now = Instant::now();
        Self {
            ws,
            framing,
            decoder: StompDecoder::new(),
            opened: framing == Framing::Raw,
            outgoing: None,
            incoming: None,
            last_sent: now,
            last_received: now,
        }
    }

    /// Next complete STOMP frame, reading from the socket as needed.
    async fn next_frame(&mut self) -> Result<StompFrame, TelemetryError> {
        loop {
            match self.decoder.next_frame() {
                Some(Ok(frame)) => return Ok(frame),
                Some(Err(e)) => warn!(error = %e, "Discarding malformed STOMP frame"),
                None => self.pump().await?,
            }
        }
    }

    /// Wait for one socket message or a heart-beat deadline.
    async fn pump(&mut self) -> Result<(), TelemetryError> {
        let send_at = self.outgoing.map(|d| self.last_sent + d);
        // Tolerate one missed beat before declaring the link dead
        let stale_after = self.incoming.map(|d| d * 2);
        let stale_at = stale_after.map(|d| self.last_received + d);

        let wake = tokio::select! {
            msg = self.ws.next() => Wake::Inbound(msg),
            () = sleep_until(send_at) => Wake::SendHeartbeat,
            () = sleep_until(stale_at) => Wake::Stale(stale_after.unwrap_or_default()),
        };

        match wake {
            Wake::Inbound(None) => Err(TelemetryError::ConnectionClosed),
            Wake::Inbound(Some(Err(e))) => Err(e.into()),
            Wake::Inbound(Some(Ok(msg))) => {
                self.last_received = Instant::now();
                self.accept(msg)
            }
            Wake::SendHeartbeat => {
                trace!("Sending STOMP heart-beat");
                self.send_text("\n").await
            }
            Wake::Stale(window) => Err(TelemetryError::HeartbeatTimeout(window)),
        }
    }

    /// Feed one WebSocket message into the STOMP decoder.
    fn accept(&mut self, msg: Message) -> Result<(), TelemetryError> {
        let text = match msg {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("Ignoring non-UTF-8 binary message");
                    return Ok(());
                }
            },
            Message::Close(_) => return Err(TelemetryError::ConnectionClosed),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => return Ok(()),
        };

        match self.framing {
            Framing::Raw => self.decoder.push(&text),
            Framing::SockJs => match sockjs::decode(&text) {
                Ok(SockJsFrame::Open) => self.opened = true,
                Ok(SockJsFrame::Heartbeat) => trace!("SockJS heartbeat"),
                Ok(SockJsFrame::Messages(messages)) => {
                    for m in &messages {
                        self.decoder.push(m);
                    }
                }
                Ok(SockJsFrame::Close { code, reason }) => {
                    warn!(code, reason = %reason, "SockJS session closed by server");
                    return Err(TelemetryError::ConnectionClosed);
                }
                Err(e) => warn!(error = %e, "Ignoring malformed SockJS frame"),
            },
        }
        Ok(())
    }

    async fn send_frame(&mut self, frame: &StompFrame) -> Result<(), TelemetryError> {
        debug!(command = %frame.command, "STOMP >>>");
        self.send_text(&frame.encode()).await
    }

    async fn send_text(&mut self, text: &str) -> Result<(), TelemetryError> {
        let payload = match self.framing {
            Framing::Raw => text.to_string(),
            Framing::SockJs => sockjs::encode(text),
        };
        self.ws.send(Message::Text(payload)).await?;
        self.last_sent = Instant::now();
        Ok(())
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Client
// ============================================================================

enum Link {
    /// Never connected yet
    Idle,
    Up(Box<Session>),
    /// Reconnecting; `failed` attempts already spent
    Retrying { failed: u32 },
    Closed,
}

/// STOMP subscription to the live telemetry topic.
pub struct StompTelemetry {
    settings: TelemetrySettings,
    link: Link,
    stats: TelemetryStats,
}

impl StompTelemetry {
    pub fn new(settings: TelemetrySettings) -> Self {
        Self {
            settings,
            link: Link::Idle,
            stats: TelemetryStats::default(),
        }
    }

    pub fn from_config(config: &MonitorConfig) -> Self {
        Self::new(TelemetrySettings::from_config(config))
    }

    pub fn settings(&self) -> &TelemetrySettings {
        &self.settings
    }

    pub fn stats(&self) -> &TelemetryStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.link, Link::Closed)
    }

    /// Open the socket and run the STOMP handshake, bounded by the connect timeout.
    async fn connect(settings: &TelemetrySettings) -> Result<Session, TelemetryError> {
        let timeout = settings.connect_timeout;
        tokio::time::timeout(timeout, Self::handshake(settings))
            .await
            .map_err(|_| TelemetryError::Timeout(timeout))?
    }

    async fn handshake(settings: &TelemetrySettings) -> Result<Session, TelemetryError> {
        let url = settings.framing.connect_url(&settings.url);
        debug!(url = %url, framing = %settings.framing, "Opening telemetry connection");

        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let mut session = Session::new(ws, settings.framing);

        while !session.opened {
            session.pump().await?;
        }

        session.send_frame(&StompFrame::connect(settings.heartbeat)).await?;

        let reply = session.next_frame().await?;
        match reply.command {
            StompCommand::Connected => {}
            StompCommand::Error => {
                let message = reply.get("message").unwrap_or(&reply.body).to_string();
                return Err(TelemetryError::Rejected(message));
            }
            other => return Err(TelemetryError::Handshake(other.to_string())),
        }

        let server = Heartbeat::parse(reply.get("heart-beat"));
        let (outgoing, incoming) = Heartbeat::negotiate(settings.heartbeat, server);
        session.outgoing = outgoing;
        session.incoming = incoming;

        session
            .send_frame(&StompFrame::subscribe(defaults::SUBSCRIPTION_ID, &settings.topic))
            .await?;

        info!(
            url = %settings.url,
            topic = %settings.topic,
            version = reply.get("version").unwrap_or("1.0"),
            outgoing_ms = outgoing.map_or(0, |d| d.as_millis() as u64),
            incoming_ms = incoming.map_or(0, |d| d.as_millis() as u64),
            "Telemetry subscribed"
        );
        Ok(session)
    }

    /// Next MESSAGE body on the live session.
    async fn read_message(session: &mut Session) -> Result<String, TelemetryError> {
        loop {
            let frame = session.next_frame().await?;
            match frame.command {
                StompCommand::Message => return Ok(frame.body),
                StompCommand::Error => {
                    let message = frame.get("message").unwrap_or(&frame.body).to_string();
                    error!(reason = %message, "Broker sent ERROR frame");
                    return Err(TelemetryError::Rejected(message));
                }
                other => debug!(command = %other, "Ignoring STOMP frame"),
            }
        }
    }

    /// The link just dropped: either end the stream or start retrying.
    fn link_lost(&mut self, cause: &TelemetryError) {
        self.stats.connected = false;
        if matches!(cause, TelemetryError::HeartbeatTimeout(_)) {
            self.stats.heartbeat_timeouts += 1;
        }

        if self.settings.reconnect.enabled {
            warn!(error = %cause, "Telemetry connection lost, reconnecting");
            self.link = Link::Retrying { failed: 0 };
        } else {
            warn!(error = %cause, "Telemetry connection lost, stream ended");
            self.link = Link::Closed;
        }
    }

    /// Reconnect with exponential backoff plus jitter.
    async fn retry(&mut self, mut failed: u32) -> Result<TelemetryEvent, TelemetryError> {
        let policy = self.settings.reconnect.clone();

        loop {
            let attempt = failed + 1;
            if attempt > policy.max_attempts {
                error!(
                    max_attempts = policy.max_attempts,
                    "Telemetry reconnection exhausted"
                );
                self.link = Link::Closed;
                return Err(TelemetryError::ReconnectExhausted(policy.max_attempts));
            }

            let jitter = if policy.jitter_ms > 0 {
                rand::thread_rng().gen_range(0..=policy.jitter_ms)
            } else {
                0
            };
            let delay = policy.backoff_delay(attempt) + Duration::from_millis(jitter);

            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "Telemetry reconnecting after failure"
            );
            tokio::time::sleep(delay).await;

            match Self::connect(&self.settings).await {
                Ok(session) => {
                    self.link = Link::Up(Box::new(session));
                    self.stats.connected = true;
                    self.stats.reconnections += 1;
                    info!(
                        attempt,
                        total_reconnections = self.stats.reconnections,
                        "Telemetry reconnection successful"
                    );
                    return Ok(TelemetryEvent::Reconnected { attempts: attempt });
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Reconnection attempt failed");
                    failed = attempt;
                    self.link = Link::Retrying { failed };
                }
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for StompTelemetry {
    async fn next_event(&mut self) -> Result<TelemetryEvent, TelemetryError> {
        loop {
            match self.link {
                Link::Closed => return Ok(TelemetryEvent::Closed),
                Link::Retrying { failed } => return self.retry(failed).await,
                Link::Idle => match Self::connect(&self.settings).await {
                    Ok(session) => {
                        self.link = Link::Up(Box::new(session));
                        self.stats.connected = true;
                    }
                    Err(e) => self.link_lost(&e),
                },
                Link::Up(ref mut session) => {
                    let body = match Self::read_message(session).await {
                        Ok(body) => body,
                        Err(e) => {
                            self.link_lost(&e);
                            continue;
                        }
                    };

                    match decode_payload(&body) {
                        Ok(Some(frame)) => {
                            self.stats.frames_received += 1;
                            trace!(
                                samples = frame.time().len(),
                                bins = frame.freq().len(),
                                "Telemetry frame"
                            );
                            return Ok(TelemetryEvent::Frame(frame));
                        }
                        Ok(None) => trace!("Skipping null payload"),
                        Err(e) => {
                            self.stats.frames_dropped += 1;
                            return Ok(TelemetryEvent::Dropped(e));
                        }
                    }
                }
            }
        }
    }

    async fn close(&mut self) {
        let link = std::mem::replace(&mut self.link, Link::Closed);
        self.stats.connected = false;

        let Link::Up(mut session) = link else {
            return;
        };

        for frame in [
            StompFrame::unsubscribe(defaults::SUBSCRIPTION_ID),
            StompFrame::disconnect(),
        ] {
            if let Err(e) = session.send_frame(&frame).await {
                debug!(error = %e, "Failed to send {} during close", frame.command);
                break;
            }
        }
        if let Err(e) = session.ws.close(None).await {
            debug!(error = %e, "WebSocket close failed");
        }
        info!(topic = %self.settings.topic, "Telemetry unsubscribed");
    }

    fn source_name(&self) -> &str {
        "STOMP"
    }
}
