//! vibration-monitor: realtime vibration monitoring client
//!
//! Receives streaming vibration frames (time-domain samples plus a
//! pre-computed spectrum) over a STOMP topic, renders them on two rolling
//! charts, and sends one-shot commands to the remote controller.
//!
//! ## Architecture
//!
//! - **Telemetry**: STOMP 1.2 subscription over WebSocket (raw or SockJS framing)
//! - **Charts**: time-domain and FFT surfaces behind a pluggable drawing backend
//! - **Commands**: fire-and-forget HTTP POSTs to the controller API
//! - **Controller**: single event loop owning the mode flag and both charts

pub mod chart;
pub mod command;
pub mod config;
pub mod controller;
pub mod telemetry;
pub mod types;

// Re-export configuration
pub use config::MonitorConfig;

// Re-export commonly used types
pub use types::{AcquisitionMode, Command, FrameError, VibrationFrame};

// Re-export components
pub use chart::{ChartBackend, ChartSurface, NullBackend, TerminalBackend};
pub use command::{CommandError, CommandSink, HttpCommandClient};
pub use controller::{AppController, ControllerError, ControllerStats, UserAction};
pub use telemetry::{
    for_each_frame, StompTelemetry, TelemetryError, TelemetryEvent, TelemetrySource,
};
