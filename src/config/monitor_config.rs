//! Monitor Configuration - endpoints, telemetry, reconnect and chart settings
//!
//! Every tunable value is a field here. Each struct implements `Default`
//! with the built-in constants from [`super::defaults`], so a missing
//! config file changes nothing.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::chart::{parse_color, ChartConfig};
use crate::telemetry::Framing;

/// Environment variable pointing at a TOML config file.
pub const CONFIG_ENV_VAR: &str = "VIBMON_CONFIG";

/// File name searched in the current working directory.
pub const LOCAL_CONFIG_FILE: &str = "monitor.toml";

// ============================================================================
// Top-Level Config
// ============================================================================

/// Root configuration for a monitoring client.
///
/// Load with `MonitorConfig::load()` which searches:
/// 1. `$VIBMON_CONFIG` env var
/// 2. `./monitor.toml`
/// 3. Built-in defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Telemetry and command endpoints
    #[serde(default)]
    pub endpoints: EndpointConfig,

    /// STOMP session tuning
    #[serde(default)]
    pub telemetry: TelemetryConfig,

    /// Reconnection policy for the telemetry channel
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Command channel tuning
    #[serde(default)]
    pub command: CommandConfig,

    /// Chart appearance
    #[serde(default)]
    pub charts: ChartsConfig,
}

impl MonitorConfig {
    /// Load configuration using the standard search order:
    /// 1. `$VIBMON_CONFIG` environment variable
    /// 2. `./monitor.toml` in the current working directory
    /// 3. Built-in defaults
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded monitor config from {}", CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load config from {}, falling back", CONFIG_ENV_VAR);
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./monitor.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded monitor config from ./{}", LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No {} found — using built-in defaults", LOCAL_CONFIG_FILE);
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Validate all values for internal consistency.
    ///
    /// Rules:
    /// - Endpoints must be absolute http(s)/ws(s) URLs, topic must be non-empty
    /// - Reconnect delays must be positive and initial <= max
    /// - Timeouts must be positive
    /// - Charts need at least 2 axis labels and parseable colours
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        for (name, url) in [
            ("endpoints.telemetry_url", &self.endpoints.telemetry_url),
            ("endpoints.command_url", &self.endpoints.command_url),
        ] {
            if !has_supported_scheme(url) {
                errors.push(format!(
                    "{name} must start with http://, https://, ws:// or wss:// (got {url:?})"
                ));
            }
        }
        if self.endpoints.topic.trim().is_empty() {
            errors.push("endpoints.topic must not be empty".to_string());
        }

        if self.telemetry.connect_timeout_secs == 0 {
            errors.push("telemetry.connect_timeout_secs must be > 0".to_string());
        }

        let r = &self.reconnect;
        if r.enabled {
            if r.max_attempts == 0 {
                errors.push("reconnect.max_attempts must be > 0 when reconnect is enabled".to_string());
            }
            if r.initial_delay_ms == 0 {
                errors.push("reconnect.initial_delay_ms must be > 0".to_string());
            }
            if r.initial_delay_ms > r.max_delay_ms {
                errors.push(format!(
                    "reconnect.initial_delay_ms ({}) must be <= reconnect.max_delay_ms ({})",
                    r.initial_delay_ms, r.max_delay_ms
                ));
            }
        }

        if self.command.timeout_secs == 0 {
            errors.push("command.timeout_secs must be > 0".to_string());
        }

        if self.charts.axis_labels < 2 {
            errors.push(format!(
                "charts.axis_labels must be >= 2 (got {})",
                self.charts.axis_labels
            ));
        }
        for (name, chart) in [("time", &self.charts.time), ("frequency", &self.charts.frequency)] {
            for (field, colour) in [
                ("border_color", &chart.border_color),
                ("fill_color", &chart.fill_color),
                ("tick_color", &chart.tick_color),
            ] {
                if parse_color(colour).is_none() {
                    errors.push(format!("charts.{name}.{field} is not a colour (got {colour:?})"));
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

fn has_supported_scheme(url: &str) -> bool {
    ["http://", "https://", "ws://", "wss://"]
        .iter()
        .any(|scheme| url.starts_with(scheme) && url.len() > scheme.len())
}

// ============================================================================
// Sections
// ============================================================================

/// Where the client connects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Realtime subscription base address
    #[serde(default = "default_telemetry_url")]
    pub telemetry_url: String,

    /// Command API base address
    #[serde(default = "default_command_url")]
    pub command_url: String,

    /// STOMP destination carrying live frames
    #[serde(default = "default_topic")]
    pub topic: String,

    /// WebSocket framing used by the telemetry endpoint
    #[serde(default)]
    pub framing: Framing,
}

fn default_telemetry_url() -> String {
    defaults::TELEMETRY_URL.to_string()
}

fn default_command_url() -> String {
    defaults::COMMAND_URL.to_string()
}

fn default_topic() -> String {
    defaults::TELEMETRY_TOPIC.to_string()
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            telemetry_url: default_telemetry_url(),
            command_url: default_command_url(),
            topic: default_topic(),
            framing: Framing::default(),
        }
    }
}

/// STOMP session tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub connect_timeout_secs: u64,
    /// Heart-beat interval we can send (0 = never)
    pub heartbeat_outgoing_ms: u64,
    /// Heart-beat interval we want to receive (0 = never)
    pub heartbeat_incoming_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: defaults::CONNECT_TIMEOUT_SECS,
            heartbeat_outgoing_ms: defaults::HEARTBEAT_OUTGOING_MS,
            heartbeat_incoming_ms: defaults::HEARTBEAT_INCOMING_MS,
        }
    }
}

impl TelemetryConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Bounded exponential backoff for a dropped telemetry connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: defaults::MAX_RECONNECT_ATTEMPTS,
            initial_delay_ms: defaults::INITIAL_RECONNECT_DELAY_MS,
            max_delay_ms: defaults::MAX_RECONNECT_DELAY_MS,
            jitter_ms: defaults::RECONNECT_JITTER_MS,
        }
    }
}

impl ReconnectConfig {
    /// Policy that never reconnects: a dropped stream simply ends.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    /// Delay before `attempt` (1-based), without jitter.
    ///
    /// `initial * 2^(attempt-1)`, capped at `max_delay_ms`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let ms = self
            .initial_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }
}

/// Command channel tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandConfig {
    pub timeout_secs: u64,
    /// How long shutdown waits for in-flight commands
    pub drain_timeout_ms: u64,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            timeout_secs: defaults::COMMAND_TIMEOUT_SECS,
            drain_timeout_ms: defaults::COMMAND_DRAIN_TIMEOUT_MS,
        }
    }
}

/// Appearance of the two charts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartsConfig {
    /// X-axis labels drawn per chart
    pub axis_labels: usize,
    pub time: ChartConfig,
    pub frequency: ChartConfig,
}

impl Default for ChartsConfig {
    fn default() -> Self {
        Self {
            axis_labels: defaults::AXIS_LABELS,
            time: ChartConfig::time_domain(),
            frequency: ChartConfig::frequency_domain(),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(PathBuf, toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Config I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(path, e) => {
                write!(f, "Config parse error ({}): {}", path.display(), e)
            }
            ConfigError::Serialize(e) => write!(f, "Config serialization error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Config validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

// ============================================================================
// Tests
// ============================================================================
