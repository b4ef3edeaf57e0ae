//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Endpoints
// ============================================================================

/// Base address of the realtime subscription endpoint (SockJS).
pub const TELEMETRY_URL: &str = "http://localhost:8080/ws-vibration";

/// Base address of the command API. Commands go to `<base>/command`.
pub const COMMAND_URL: &str = "http://localhost:8080/api";

/// Topic carrying live vibration frames.
pub const TELEMETRY_TOPIC: &str = "/topic/live";

// ============================================================================
// Telemetry
// ============================================================================

/// Timeout for the WebSocket handshake plus STOMP CONNECTED (seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Heart-beat we offer to send (ms). Matches common STOMP client defaults.
pub const HEARTBEAT_OUTGOING_MS: u64 = 10_000;

/// Heart-beat we ask the server to send (ms).
pub const HEARTBEAT_INCOMING_MS: u64 = 10_000;

/// Subscription id used for the live topic.
pub const SUBSCRIPTION_ID: &str = "sub-0";

/// Largest STOMP frame the decoder will buffer (bytes).
pub const MAX_FRAME_BYTES: usize = 256 * 1024;

// ============================================================================
// Reconnect
// ============================================================================

/// Maximum reconnection attempts before giving up.
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10;

/// Initial reconnection delay (doubles each attempt).
pub const INITIAL_RECONNECT_DELAY_MS: u64 = 2_000;

/// Maximum reconnection delay cap.
pub const MAX_RECONNECT_DELAY_MS: u64 = 60_000;

/// Random jitter added to each reconnection delay.
pub const RECONNECT_JITTER_MS: u64 = 500;

// ============================================================================
// Commands
// ============================================================================

/// HTTP timeout for command requests (seconds).
pub const COMMAND_TIMEOUT_SECS: u64 = 10;

/// How long shutdown waits for in-flight commands (ms).
pub const COMMAND_DRAIN_TIMEOUT_MS: u64 = 2_000;

// ============================================================================
// Charts
// ============================================================================

/// Muted tick colour shared by both charts.
pub const TICK_COLOR: &str = "#94a3b8";

/// X-axis labels drawn per chart.
pub const AXIS_LABELS: usize = 5;
