//! Operator key presses mapped to user actions

use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub const HELP: &str = "m measure | t toggle mode | r reset | q quit";

/// Something the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Measure,
    ToggleMode,
    Reset,
    Quit,
}

impl std::str::FromStr for UserAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m" | "measure" => Ok(UserAction::Measure),
            "t" | "mode" | "toggle" => Ok(UserAction::ToggleMode),
            "r" | "reset" => Ok(UserAction::Reset),
            "q" | "quit" | "exit" => Ok(UserAction::Quit),
            other => Err(format!("unknown command {other:?} ({HELP})")),
        }
    }
}

/// Map one key press to an action.
///
/// Raw mode swallows SIGINT, so Ctrl+C and Esc quit here.
pub fn key_action(key: &KeyEvent) -> Option<UserAction> {
    if key.kind != KeyEventKind::Press {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(UserAction::Quit)
        }
        KeyCode::Esc => Some(UserAction::Quit),
        KeyCode::Char(c) => c.to_string().parse().ok(),
        _ => None,
    }
}

/// Forward actions from a terminal event stream until it ends, fails, or
/// the receiver goes away. Keys with no action are ignored.
pub async fn forward_key_events<S>(mut events: S, tx: mpsc::Sender<UserAction>)
where
    S: Stream<Item = std::io::Result<Event>> + Unpin,
{
    while let Some(event) = events.next().await {
        match event {
            Ok(Event::Key(key)) => {
                let Some(action) = key_action(&key) else {
                    continue;
                };
                debug!(?action, "Key action");
                if tx.send(action).await.is_err() {
                    return;
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Keyboard input failed");
                return;
            }
        }
    }
    debug!("Keyboard input ended");
}

/// Read key presses from the terminal on a runtime task.
pub fn spawn_key_reader(tx: mpsc::Sender<UserAction>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(forward_key_events(EventStream::new(), tx))
}
