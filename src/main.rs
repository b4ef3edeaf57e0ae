//! vibration-monitor: realtime vibration client
//!
//! Streams live frames from the telemetry topic, draws the time and FFT
//! charts in a full-screen terminal UI, and maps key presses to controller
//! commands. While the UI owns the terminal, logs go to `--log-file` (or
//! nowhere); with `--headless` they go to stderr and nothing is drawn.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use vibration_monitor::chart::{ChartBackend, NullBackend, TerminalBackend, TerminalSession};
use vibration_monitor::command::HttpCommandClient;
use vibration_monitor::config::{self, MonitorConfig, ReconnectConfig};
use vibration_monitor::controller::{spawn_key_reader, AppController, HELP};
use vibration_monitor::telemetry::{Framing, StompTelemetry};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "vibration-monitor")]
#[command(about = "Realtime vibration monitor - live time/FFT charts and controller commands")]
#[command(version)]
struct CliArgs {
    /// Path to a TOML config file (overrides VIBMON_CONFIG and ./monitor.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Telemetry endpoint base (e.g. http://localhost:8080/ws-vibration)
    #[arg(long, value_name = "URL")]
    telemetry_url: Option<String>,

    /// Command API base; commands are posted to <URL>/command
    #[arg(long, value_name = "URL")]
    command_url: Option<String>,

    /// STOMP topic carrying live frames
    #[arg(long)]
    topic: Option<String>,

    /// WebSocket framing: raw or sockjs
    #[arg(long)]
    framing: Option<Framing>,

    /// Let the stream end on connection loss instead of reconnecting
    #[arg(long)]
    no_reconnect: bool,

    /// X-axis labels per chart
    #[arg(long, value_name = "N")]
    axis_labels: Option<usize>,

    /// Skip the terminal UI; log to stderr instead
    #[arg(long)]
    headless: bool,

    /// Append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,
}

impl CliArgs {
    /// Load the config file and apply flag overrides on top.
    fn resolve_config(&self) -> Result<MonitorConfig> {
        let mut config = match &self.config {
            Some(path) => MonitorConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => MonitorConfig::load(),
        };

        if let Some(url) = &self.telemetry_url {
            config.endpoints.telemetry_url.clone_from(url);
        }
        if let Some(url) = &self.command_url {
            config.endpoints.command_url.clone_from(url);
        }
        if let Some(topic) = &self.topic {
            config.endpoints.topic.clone_from(topic);
        }
        if let Some(framing) = self.framing {
            config.endpoints.framing = framing;
        }
        if self.no_reconnect {
            config.reconnect = ReconnectConfig::disabled();
        }
        if let Some(count) = self.axis_labels {
            config.charts.axis_labels = count;
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Log to `--log-file` if given, stderr when headless, otherwise
    /// nowhere so nothing scribbles over the charts.
    fn init_tracing(&self) -> Result<()> {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with_target(false);

        if let Some(path) = &self.log_file {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        } else if self.headless {
            builder.with_writer(std::io::stderr).init();
        } else {
            builder.with_writer(std::io::sink).init();
        }
        Ok(())
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    args.init_tracing()?;

    config::init(args.resolve_config()?);
    let cfg = config::get();

    info!(
        telemetry = %cfg.endpoints.telemetry_url,
        topic = %cfg.endpoints.topic,
        framing = %cfg.endpoints.framing,
        commands = %cfg.endpoints.command_url,
        reconnect = cfg.reconnect.enabled,
        headless = args.headless,
        "Vibration monitor starting"
    );
    info!("{}", HELP);

    // Graceful shutdown via Ctrl+C (raw mode delivers it as a key instead)
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    let commands = Arc::new(
        HttpCommandClient::new(
            &cfg.endpoints.command_url,
            Duration::from_secs(cfg.command.timeout_secs),
        )
        .context("Failed to build command client")?,
    );
    let mut telemetry = StompTelemetry::from_config(cfg);

    // Entered before the key reader so it reads from a raw-mode terminal
    let session = if args.headless {
        None
    } else {
        Some(TerminalSession::enter().context("Failed to set up the terminal")?)
    };
    let backend: Arc<dyn ChartBackend> = if args.headless {
        Arc::new(NullBackend)
    } else {
        Arc::new(
            TerminalBackend::stdout(cfg.charts.axis_labels)
                .context("Failed to open the terminal")?
                .with_footer(HELP),
        )
    };

    let (action_tx, action_rx) = mpsc::channel(16);
    let key_reader = spawn_key_reader(action_tx.clone());

    let mut controller = AppController::from_config(cfg, backend, commands);
    let result = controller
        .run(&mut telemetry, action_rx, cancel_token.clone())
        .await;

    // Held until here so a closed keyboard does not end a detached monitor
    key_reader.abort();
    drop(action_tx);
    drop(controller);
    drop(session);

    let stats = result.context("Controller failed to start")?;
    info!(
        frames_rendered = stats.frames_rendered,
        frames_dropped = stats.frames_dropped,
        commands_sent = stats.commands_sent,
        commands_failed = stats.commands_failed,
        reconnects = stats.reconnects,
        telemetry_lost = stats.telemetry_lost,
        "Vibration monitor stopped"
    );

    Ok(())
}
