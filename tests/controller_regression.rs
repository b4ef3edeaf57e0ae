//! Controller Regression Tests
//!
//! Drives `AppController::run` with a scripted telemetry source, a spy chart
//! backend and in-memory command sinks. No network.
//!
//! Covers the rendering invariants (label/value alignment, label formats),
//! the optimistic reset/toggle behaviour, telemetry loss, and teardown.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ratatui::backend::TestBackend;

use vibration_monitor::chart::{
    ChartBackend, ChartConfig, ChartError, Plot, RedrawMode, Series, TerminalBackend,
};
use vibration_monitor::command::{CommandError, CommandSink};
use vibration_monitor::config::ChartsConfig;
use vibration_monitor::controller::{AppController, ControllerError, UserAction};
use vibration_monitor::telemetry::{TelemetryError, TelemetryEvent, TelemetrySource};
use vibration_monitor::types::{decode_payload, AcquisitionMode, Command, VibrationFrame};

// ============================================================================
// Test doubles
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Redraw {
        chart: String,
        labels: Vec<String>,
        values: Vec<f64>,
        mode: RedrawMode,
    },
    Release(String),
}

#[derive(Clone, Default)]
struct SpyBackend {
    calls: Arc<Mutex<Vec<Call>>>,
    fail: bool,
}

struct SpyPlot {
    chart: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl ChartBackend for SpyBackend {
    fn create_plot(&self, config: &ChartConfig) -> Result<Box<dyn Plot>, ChartError> {
        if self.fail {
            return Err(ChartError::Backend("no display".to_string()));
        }
        Ok(Box::new(SpyPlot {
            chart: config.title.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

impl Plot for SpyPlot {
    fn redraw(&mut self, data: &Series, mode: RedrawMode) -> Result<(), ChartError> {
        self.calls.lock().unwrap().push(Call::Redraw {
            chart: self.chart.clone(),
            labels: data.labels.clone(),
            values: data.values.clone(),
            mode,
        });
        Ok(())
    }

    fn release(&mut self) {
        self.calls.lock().unwrap().push(Call::Release(self.chart.clone()));
    }
}

impl SpyBackend {
    fn redraws(&self, chart: &str) -> Vec<(Vec<String>, Vec<f64>, RedrawMode)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter_map(|c| match c {
                Call::Redraw {
                    chart: name,
                    labels,
                    values,
                    mode,
                } if name == chart => Some((labels.clone(), values.clone(), *mode)),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct RecordingSink {
    sent: Mutex<Vec<Command>>,
}

#[async_trait]
impl CommandSink for RecordingSink {
    async fn send(&self, command: &Command) -> Result<(), CommandError> {
        self.sent.lock().unwrap().push(command.clone());
        Ok(())
    }
}

impl RecordingSink {
    fn sent_sorted(&self) -> Vec<String> {
        let mut sent: Vec<String> = self.sent.lock().unwrap().iter().map(ToString::to_string).collect();
        sent.sort();
        sent
    }
}

/// Every send fails, like an unreachable controller.
struct DownSink;

#[async_trait]
impl CommandSink for DownSink {
    async fn send(&self, _command: &Command) -> Result<(), CommandError> {
        Err(CommandError::ServerError(reqwest::StatusCode::SERVICE_UNAVAILABLE))
    }
}

/// Replays a script of events. When the last one is handed out, the
/// follow-up actions are queued, so they are seen only after every
/// scripted event was handled. Then waits forever.
struct ScriptedSource {
    script: VecDeque<Result<TelemetryEvent, TelemetryError>>,
    follow_up: Option<(mpsc::Sender<UserAction>, Vec<UserAction>)>,
    closed: Arc<Mutex<bool>>,
}

impl ScriptedSource {
    fn new(
        script: Vec<Result<TelemetryEvent, TelemetryError>>,
        tx: mpsc::Sender<UserAction>,
        follow_up: Vec<UserAction>,
    ) -> Self {
        Self {
            script: script.into(),
            follow_up: Some((tx, follow_up)),
            closed: Arc::new(Mutex::new(false)),
        }
    }

    fn release_follow_up(&mut self) {
        if let Some((tx, actions)) = self.follow_up.take() {
            for a in actions {
                tx.try_send(a).unwrap();
            }
        }
    }
}

#[async_trait]
impl TelemetrySource for ScriptedSource {
    async fn next_event(&mut self) -> Result<TelemetryEvent, TelemetryError> {
        match self.script.pop_front() {
            Some(event) => {
                if self.script.is_empty() {
                    self.release_follow_up();
                }
                event
            }
            None => {
                self.release_follow_up();
                std::future::pending().await
            }
        }
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }

    fn source_name(&self) -> &str {
        "scripted"
    }
}

fn controller(backend: &SpyBackend, sink: Arc<dyn CommandSink>) -> AppController {
    AppController::new(
        Arc::new(backend.clone()),
        sink,
        ChartsConfig::default(),
        Duration::from_millis(500),
    )
}

fn frame_event(json: &str) -> Result<TelemetryEvent, TelemetryError> {
    let frame = decode_payload(json).unwrap().unwrap();
    Ok(TelemetryEvent::Frame(frame))
}

fn dropped_event(json: &str) -> Result<TelemetryEvent, TelemetryError> {
    Ok(TelemetryEvent::Dropped(decode_payload(json).unwrap_err()))
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

// ============================================================================
// Rendering
// ============================================================================

#[tokio::test]
async fn test_frames_render_aligned_on_both_charts() {
    let spy = SpyBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut c = controller(&spy, sink);

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![
            frame_event(r#"{"time":[0.1,0.2,0.3],"freq":[12.345,100.07],"amp":[0.5,0.25]}"#),
            frame_event(r#"{"time":[1.0],"freq":[],"amp":[]}"#),
        ],
        tx,
        vec![UserAction::Quit],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert_eq!(stats.frames_rendered, 2);

    let time = spy.redraws("time");
    assert_eq!(time.len(), 2);
    assert_eq!(time[0].0, strings(&["0", "1", "2"]));
    assert_eq!(time[0].1, vec![0.1, 0.2, 0.3]);
    assert_eq!(time[0].2, RedrawMode::Immediate);
    assert_eq!(time[1].0, strings(&["0"]));

    let fft = spy.redraws("fft");
    assert_eq!(fft.len(), 2);
    assert_eq!(fft[0].0, strings(&["12.3", "100.1"]));
    assert_eq!(fft[0].1, vec![0.5, 0.25]);
    assert!(fft[1].0.is_empty() && fft[1].1.is_empty());

    for (labels, values, _) in time.iter().chain(fft.iter()) {
        assert_eq!(labels.len(), values.len());
    }
}

#[tokio::test]
async fn test_frames_draw_on_terminal_screen() {
    let screen = TerminalBackend::new(TestBackend::new(100, 30), 3).unwrap();
    let mut c = AppController::new(
        Arc::new(screen.clone()),
        Arc::new(RecordingSink::default()),
        ChartsConfig::default(),
        Duration::from_millis(500),
    );
    c.start().unwrap();
    assert_eq!(screen.pane_count(), 2);

    let frame = decode_payload(r#"{"time":[0.1,0.2,0.3,0.4],"freq":[12.345,100.07],"amp":[0.5,0.25]}"#)
        .unwrap()
        .unwrap();
    c.on_frame(&frame);

    let text = screen_text(&screen);
    assert!(text.contains("time  Acceleration (m/s²)  n=4"), "{text}");
    assert!(text.contains("fft  Amplitude  n=2"), "{text}");
    assert!(text.contains("12.3") && text.contains("100.1"), "{text}");

    c.reset();
    assert_eq!(screen_text(&screen).matches("n=0").count(), 2);

    c.shutdown();
    assert_eq!(screen.pane_count(), 0);
}

fn screen_text(screen: &TerminalBackend<TestBackend>) -> String {
    screen.with_terminal(|terminal| {
        let buffer = terminal.backend().buffer();
        buffer
            .content()
            .chunks(usize::from(buffer.area.width))
            .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
            .collect::<Vec<_>>()
            .join("\n")
    })
}

#[tokio::test]
async fn test_malformed_payloads_never_touch_charts() {
    let spy = SpyBackend::default();
    let mut c = controller(&spy, Arc::new(RecordingSink::default()));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![
            frame_event(r#"{"time":[1.0,2.0],"freq":[5.0],"amp":[9.0]}"#),
            dropped_event("not json at all"),
            dropped_event(r#"{"time":[1.0],"freq":[1.0]}"#),
            dropped_event(r#"{"time":[1.0],"freq":[1.0,2.0],"amp":[3.0]}"#),
        ],
        tx,
        vec![UserAction::Quit],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(stats.frames_dropped, 3);

    // Only the single good frame was drawn
    assert_eq!(spy.redraws("time").len(), 1);
    assert_eq!(spy.redraws("fft").len(), 1);
    assert_eq!(spy.redraws("fft")[0].1, vec![9.0]);
}

// ============================================================================
// Commands
// ============================================================================

#[tokio::test]
async fn test_toggle_flips_and_sends_post_toggle_value() {
    let spy = SpyBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut c = controller(&spy, sink.clone());

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![],
        tx,
        vec![
            UserAction::ToggleMode,
            UserAction::ToggleMode,
            UserAction::ToggleMode,
            UserAction::Quit,
        ],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();

    assert_eq!(c.mode(), AcquisitionMode::Manual);
    assert_eq!(stats.commands_sent, 3);
    assert_eq!(
        sink.sent_sorted(),
        vec!["SET_MODE/AUTO", "SET_MODE/MANUAL", "SET_MODE/MANUAL"]
    );
}

#[tokio::test]
async fn test_reset_clears_both_charts_when_stop_fails() {
    let spy = SpyBackend::default();
    let mut c = controller(&spy, Arc::new(DownSink));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![frame_event(r#"{"time":[1.0,2.0],"freq":[5.0],"amp":[9.0]}"#)],
        tx,
        vec![UserAction::Reset, UserAction::Quit],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert_eq!(stats.commands_sent, 1);
    assert_eq!(stats.commands_failed, 1);

    for chart in ["time", "fft"] {
        let redraws = spy.redraws(chart);
        let (labels, values, mode) = redraws.last().unwrap();
        assert!(labels.is_empty(), "{chart} labels not cleared");
        assert!(values.is_empty(), "{chart} values not cleared");
        assert_eq!(*mode, RedrawMode::Animated);
    }
}

#[tokio::test]
async fn test_measure_sends_start_measure() {
    let spy = SpyBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut c = controller(&spy, sink.clone());

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(vec![], tx, vec![UserAction::Measure, UserAction::Quit]);

    c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert_eq!(sink.sent_sorted(), vec!["START_MEASURE/ON"]);
    assert_eq!(c.mode(), AcquisitionMode::Auto);
}

// ============================================================================
// Telemetry loss & lifecycle
// ============================================================================

#[tokio::test]
async fn test_commands_still_served_after_telemetry_closes() {
    let spy = SpyBackend::default();
    let sink = Arc::new(RecordingSink::default());
    let mut c = controller(&spy, sink.clone());

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![
            frame_event(r#"{"time":[1.0],"freq":[1.0],"amp":[1.0]}"#),
            Ok(TelemetryEvent::Closed),
        ],
        tx,
        vec![UserAction::Measure, UserAction::Quit],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert!(stats.telemetry_lost);
    assert_eq!(stats.frames_rendered, 1);
    assert_eq!(sink.sent_sorted(), vec!["START_MEASURE/ON"]);
}

#[tokio::test]
async fn test_reconnect_exhausted_is_not_fatal() {
    let spy = SpyBackend::default();
    let mut c = controller(&spy, Arc::new(RecordingSink::default()));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![
            Ok(TelemetryEvent::Reconnected { attempts: 3 }),
            Err(TelemetryError::ReconnectExhausted(10)),
        ],
        tx,
        vec![UserAction::ToggleMode, UserAction::Quit],
    );

    let stats = c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert_eq!(stats.reconnects, 1);
    assert!(stats.telemetry_lost);
    assert_eq!(c.mode(), AcquisitionMode::Manual);
}

#[tokio::test]
async fn test_teardown_releases_and_blocks_redraws() {
    let spy = SpyBackend::default();
    let mut c = controller(&spy, Arc::new(RecordingSink::default()));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![frame_event(r#"{"time":[1.0],"freq":[1.0],"amp":[1.0]}"#)],
        tx,
        vec![UserAction::Quit],
    );
    let closed = Arc::clone(&source.closed);

    c.run(&mut source, rx, CancellationToken::new()).await.unwrap();
    assert!(*closed.lock().unwrap(), "telemetry was not unsubscribed");

    // Frames and resets after teardown go nowhere
    let late = decode_payload(r#"{"time":[7.0],"freq":[7.0],"amp":[7.0]}"#)
        .unwrap()
        .unwrap();
    c.on_frame(&late);
    c.reset();
    c.shutdown();

    let calls = spy.calls.lock().unwrap();
    let releases = calls.iter().filter(|c| matches!(c, Call::Release(_))).count();
    assert_eq!(releases, 2);

    let first_release = calls
        .iter()
        .position(|c| matches!(c, Call::Release(_)))
        .unwrap();
    assert!(calls[first_release..]
        .iter()
        .all(|c| matches!(c, Call::Release(_))));
}

#[tokio::test]
async fn test_cancellation_stops_run() {
    let spy = SpyBackend::default();
    let mut c = controller(&spy, Arc::new(RecordingSink::default()));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(vec![], tx, vec![]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stats = c.run(&mut source, rx, cancel).await.unwrap();
    assert_eq!(stats.frames_rendered, 0);
    assert!(!c.is_started());
}

#[tokio::test]
async fn test_chart_failure_aborts_before_telemetry() {
    let spy = SpyBackend {
        fail: true,
        ..SpyBackend::default()
    };
    let mut c = controller(&spy, Arc::new(RecordingSink::default()));

    let (tx, rx) = mpsc::channel(8);
    let mut source = ScriptedSource::new(
        vec![frame_event(r#"{"time":[1.0],"freq":[1.0],"amp":[1.0]}"#)],
        tx,
        vec![],
    );

    let err = c
        .run(&mut source, rx, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Chart(_)));
    // The source was never polled
    assert_eq!(source.script.len(), 1);
}

#[test]
fn test_frame_constructor_rejects_mismatch() {
    assert!(VibrationFrame::new(vec![], vec![1.0, 2.0], vec![1.0]).is_err());
}
