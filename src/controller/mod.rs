//! Application Controller - composes telemetry, charts and commands
//!
//! ```text
//!                    ┌──────────────────── AppController::run ───────────────────┐
//! TelemetrySource ──►│ Frame ──► time_domain_series ──► ChartSurface (time)      │
//!                    │       └─► frequency_domain_series ──► ChartSurface (fft)  │
//! UserAction ───────►│ measure / toggle_mode / reset ──► CommandSink (pending)   │
//! command results ──►│ logged + counted                                          │
//!                    └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Everything runs on one event loop: each handler finishes before the next
//! event is taken, so the two surfaces and the mode flag are never touched
//! concurrently.

mod input;

pub use input::{forward_key_events, key_action, spawn_key_reader, UserAction, HELP};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::chart::{
    frequency_domain_series, time_domain_series, ChartBackend, ChartError, ChartSurface,
};
use crate::command::{CommandError, CommandSink};
use crate::config::{ChartsConfig, MonitorConfig};
use crate::telemetry::{TelemetryError, TelemetryEvent, TelemetrySource};
use crate::types::{AcquisitionMode, Command, VibrationFrame};

// ============================================================================
// Errors, Stats, Outcomes
// ============================================================================

/// Controller errors
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Chart creation failed: {0}")]
    Chart(#[from] ChartError),

    #[error("Controller already shut down")]
    ShutDown,
}

/// Counters reported when the controller stops.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ControllerStats {
    pub frames_rendered: u64,
    pub frames_dropped: u64,
    pub commands_sent: u64,
    pub commands_failed: u64,
    pub reconnects: u64,
    /// Telemetry ended (closed or reconnect exhausted) while running
    pub telemetry_lost: bool,
    pub last_frame_at: Option<DateTime<Utc>>,
}

/// Result of one command send, collected by the event loop.
#[derive(Debug)]
pub struct CommandOutcome {
    pub command: Command,
    pub result: Result<(), CommandError>,
    pub elapsed: Duration,
}

/// The two chart surfaces, created and destroyed together.
struct ChartPair {
    time: ChartSurface,
    frequency: ChartSurface,
}

// ============================================================================
// Controller
// ============================================================================

pub struct AppController {
    mode: AcquisitionMode,
    backend: Arc<dyn ChartBackend>,
    charts_config: ChartsConfig,
    charts: Option<ChartPair>,
    commands: Arc<dyn CommandSink>,
    pending: FuturesUnordered<BoxFuture<'static, CommandOutcome>>,
    drain_timeout: Duration,
    shut_down: bool,
    stats: ControllerStats,
}

/// What woke the run loop.
enum Wake {
    Cancelled,
    Telemetry(Result<TelemetryEvent, TelemetryError>),
    Action(Option<UserAction>),
    Settled(CommandOutcome),
}

impl AppController {
    pub fn new(
        backend: Arc<dyn ChartBackend>,
        commands: Arc<dyn CommandSink>,
        charts_config: ChartsConfig,
        drain_timeout: Duration,
    ) -> Self {
        Self {
            mode: AcquisitionMode::default(),
            backend,
            charts_config,
            charts: None,
            commands,
            pending: FuturesUnordered::new(),
            drain_timeout,
            shut_down: false,
            stats: ControllerStats::default(),
        }
    }

    pub fn from_config(
        config: &MonitorConfig,
        backend: Arc<dyn ChartBackend>,
        commands: Arc<dyn CommandSink>,
    ) -> Self {
        Self::new(
            backend,
            commands,
            config.charts.clone(),
            Duration::from_millis(config.command.drain_timeout_ms),
        )
    }

    /// Create both chart surfaces.
    ///
    /// If the second surface fails, the first is released before the error
    /// is returned. Calling again once started is a no-op.
    pub fn start(&mut self) -> Result<(), ControllerError> {
        if self.shut_down {
            return Err(ControllerError::ShutDown);
        }
        if self.charts.is_some() {
            return Ok(());
        }

        let backend = self.backend.as_ref();
        let mut time = ChartSurface::create(self.charts_config.time.clone(), backend)?;
        let frequency = match ChartSurface::create(self.charts_config.frequency.clone(), backend)
        {
            Ok(surface) => surface,
            Err(e) => {
                time.destroy();
                return Err(e.into());
            }
        };

        self.charts = Some(ChartPair { time, frequency });
        info!(mode = %self.mode, "Charts ready");
        Ok(())
    }

    /// Fan one frame out to both surfaces.
    ///
    /// Every frame is rendered regardless of mode. Ignored once shut down.
    pub fn on_frame(&mut self, frame: &VibrationFrame) {
        let Some(charts) = self.charts.as_mut() else {
            trace!("Frame ignored: charts not live");
            return;
        };

        if let Err(e) = charts.time.update(time_domain_series(frame)) {
            warn!(chart = "time", error = %e, "Chart update failed");
        }
        if let Err(e) = charts.frequency.update(frequency_domain_series(frame)) {
            warn!(chart = "fft", error = %e, "Chart update failed");
        }

        self.stats.frames_rendered += 1;
        self.stats.last_frame_at = Some(Utc::now());
    }

    /// Ask the remote controller to take a measurement.
    pub fn measure(&mut self) {
        self.dispatch(Command::start_measure());
    }

    /// Flip the mode and announce the new value.
    ///
    /// The flip stands even if the command later fails.
    pub fn toggle_mode(&mut self) -> AcquisitionMode {
        self.mode = self.mode.toggled();
        info!(mode = %self.mode, "Acquisition mode switched");
        self.dispatch(Command::set_mode(self.mode));
        self.mode
    }

    /// Stop everything remotely and empty both charts right away.
    pub fn reset(&mut self) {
        self.dispatch(Command::stop_all());

        if let Some(charts) = self.charts.as_mut() {
            for (name, surface) in [("time", &mut charts.time), ("fft", &mut charts.frequency)] {
                if let Err(e) = surface.clear() {
                    warn!(chart = name, error = %e, "Chart clear failed");
                }
            }
        }
    }

    /// Apply one user action. Returns `false` for [`UserAction::Quit`].
    pub fn handle_action(&mut self, action: UserAction) -> bool {
        debug!(?action, "User action");
        match action {
            UserAction::Measure => self.measure(),
            UserAction::ToggleMode => {
                self.toggle_mode();
            }
            UserAction::Reset => self.reset(),
            UserAction::Quit => return false,
        }
        true
    }

    /// Start sending `command`; the result is collected by the event loop.
    fn dispatch(&mut self, command: Command) {
        let sink = Arc::clone(&self.commands);
        self.stats.commands_sent += 1;
        debug!(command = %command, "Sending command");

        self.pending.push(
            async move {
                let started = Instant::now();
                let result = sink.send(&command).await;
                CommandOutcome {
                    command,
                    result,
                    elapsed: started.elapsed(),
                }
            }
            .boxed(),
        );
    }

    fn record_outcome(&mut self, outcome: CommandOutcome) {
        let elapsed_ms = outcome.elapsed.as_millis() as u64;
        match outcome.result {
            Ok(()) => info!(command = %outcome.command, elapsed_ms, "Command delivered"),
            Err(e) => {
                self.stats.commands_failed += 1;
                warn!(command = %outcome.command, elapsed_ms, error = %e, "Command failed");
            }
        }
    }

    /// Wait for every in-flight command and record its outcome.
    pub async fn settle_commands(&mut self) {
        while let Some(outcome) = self.pending.next().await {
            self.record_outcome(outcome);
        }
    }

    /// Release both surfaces. Idempotent; no frame reaches a surface afterwards.
    pub fn shutdown(&mut self) {
        if let Some(mut charts) = self.charts.take() {
            charts.time.destroy();
            charts.frequency.destroy();
            info!("Charts released");
        }
        self.shut_down = true;
    }

    /// Drive the client until quit, cancellation, or the action channel closes.
    ///
    /// Charts are created first (a failure aborts). Telemetry loss is
    /// logged and user actions keep being served. On exit the telemetry
    /// source is closed, in-flight commands get a bounded grace period and
    /// both surfaces are released.
    pub async fn run<S>(
        &mut self,
        source: &mut S,
        mut actions: mpsc::Receiver<UserAction>,
        cancel: CancellationToken,
    ) -> Result<ControllerStats, ControllerError>
    where
        S: TelemetrySource + ?Sized,
    {
        self.start()?;
        info!(source = source.source_name(), "Streaming telemetry");

        {
            // The stream keeps an in-flight next_event alive across loop
            // turns, so a user action never aborts a handshake halfway.
            let events = futures::stream::unfold(&mut *source, |source| async move {
                let event = source.next_event().await;
                Some((event, source))
            });
            tokio::pin!(events);
            let mut telemetry_live = true;

            loop {
                let wake = tokio::select! {
                    _ = cancel.cancelled() => Wake::Cancelled,
                    Some(event) = events.next(), if telemetry_live => Wake::Telemetry(event),
                    action = actions.recv() => Wake::Action(action),
                    Some(outcome) = self.pending.next(), if !self.pending.is_empty() => {
                        Wake::Settled(outcome)
                    }
                };

                match wake {
                    Wake::Cancelled => {
                        info!("Shutdown signal received");
                        break;
                    }
                    Wake::Telemetry(Ok(TelemetryEvent::Frame(frame))) => self.on_frame(&frame),
                    Wake::Telemetry(Ok(TelemetryEvent::Dropped(e))) => {
                        self.stats.frames_dropped += 1;
                        debug!(error = %e, total = self.stats.frames_dropped, "Dropped malformed frame");
                    }
                    Wake::Telemetry(Ok(TelemetryEvent::Reconnected { attempts })) => {
                        self.stats.reconnects += 1;
                        info!(attempts, "Telemetry stream resumed");
                    }
                    Wake::Telemetry(Ok(TelemetryEvent::Closed)) => {
                        telemetry_live = false;
                        self.stats.telemetry_lost = true;
                        warn!("Telemetry stream ended, commands still available");
                    }
                    Wake::Telemetry(Err(e)) => {
                        telemetry_live = false;
                        self.stats.telemetry_lost = true;
                        error!(error = %e, "Telemetry stream failed, commands still available");
                    }
                    Wake::Action(Some(action)) => {
                        if !self.handle_action(action) {
                            info!("Quit requested");
                            break;
                        }
                    }
                    Wake::Action(None) => {
                        info!("Action channel closed");
                        break;
                    }
                    Wake::Settled(outcome) => self.record_outcome(outcome),
                }
            }
        }

        source.close().await;

        if tokio::time::timeout(self.drain_timeout, self.settle_commands())
            .await
            .is_err()
        {
            warn!(
                abandoned = self.pending.len(),
                "Gave up waiting for in-flight commands"
            );
        }

        self.shutdown();
        Ok(self.stats.clone())
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn stats(&self) -> &ControllerStats {
        &self.stats
    }

    pub fn pending_commands(&self) -> usize {
        self.pending.len()
    }

    pub fn is_started(&self) -> bool {
        self.charts.is_some()
    }

    pub fn time_chart(&self) -> Option<&ChartSurface> {
        self.charts.as_ref().map(|c| &c.time)
    }

    pub fn frequency_chart(&self) -> Option<&ChartSurface> {
        self.charts.as_ref().map(|c| &c.frequency)
    }
}

impl Drop for AppController {
    fn drop(&mut self) {
        self.shutdown();
    }
}
