//! Remote controller commands

use serde::{Deserialize, Serialize};

use super::AcquisitionMode;
use crate::command::CommandError;

/// Command types understood by the remote controller.
pub mod command_types {
    pub const START_MEASURE: &str = "START_MEASURE";
    pub const SET_MODE: &str = "SET_MODE";
    pub const STOP: &str = "STOP";
}

/// A fire-and-forget instruction for the remote controller.
///
/// Both fields are opaque to the client; only non-emptiness is checked.
/// Serializes as `{ "type": ..., "value": ... }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    #[serde(rename = "type")]
    kind: String,
    value: String,
}

impl Command {
    /// Build a command, rejecting an empty type or value.
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Result<Self, CommandError> {
        let kind = kind.into();
        let value = value.into();
        if kind.is_empty() {
            return Err(CommandError::InvalidCommand(
                "command type must not be empty".to_string(),
            ));
        }
        if value.is_empty() {
            return Err(CommandError::InvalidCommand(format!(
                "command {kind} has an empty value"
            )));
        }
        Ok(Self { kind, value })
    }

    /// `START_MEASURE` / `ON`
    pub fn start_measure() -> Self {
        Self {
            kind: command_types::START_MEASURE.to_string(),
            value: "ON".to_string(),
        }
    }

    /// `SET_MODE` / `AUTO|MANUAL`
    pub fn set_mode(mode: AcquisitionMode) -> Self {
        Self {
            kind: command_types::SET_MODE.to_string(),
            value: mode.as_str().to_string(),
        }
    }

    /// `STOP` / `ALL`
    pub fn stop_all() -> Self {
        Self {
            kind: command_types::STOP.to_string(),
            value: "ALL".to_string(),
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.kind, self.value)
    }
}
