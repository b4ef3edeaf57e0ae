//! Command Channel — one-shot instructions for the remote controller
//!
//! Commands are fire-and-forget from the UI's point of view: no retry, no
//! queueing of failed commands, no ordering between commands issued close
//! together. Each send is an independent request whose result is only
//! logged by the caller.

mod client;

pub use client::HttpCommandClient;

use async_trait::async_trait;

use crate::types::Command;

/// Command channel errors
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Controller returned status {0}")]
    ServerError(reqwest::StatusCode),
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

/// Anything that can deliver a [`Command`] to the remote controller.
#[async_trait]
pub trait CommandSink: Send + Sync + 'static {
    /// Deliver one command. Resolves on acknowledgement.
    async fn send(&self, command: &Command) -> Result<(), CommandError>;
}
