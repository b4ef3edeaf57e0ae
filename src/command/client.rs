//! Command Client — HTTP client for client → remote controller commands
//!
//! One POST per command. The response body is never inspected.

use async_trait::async_trait;
use std::time::Duration;

use super::{CommandError, CommandSink};
use crate::types::Command;

/// HTTP command channel
#[derive(Clone)]
pub struct HttpCommandClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpCommandClient {
    /// Create a new command client for `base_url` (commands go to `<base_url>/command`).
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CommandError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Full URL commands are posted to
    pub fn endpoint(&self) -> String {
        format!("{}/command", self.base_url)
    }

    /// Get base URL for logging
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl CommandSink for HttpCommandClient {
    async fn send(&self, command: &Command) -> Result<(), CommandError> {
        let resp = self.http.post(self.endpoint()).json(command).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(CommandError::ServerError(resp.status()))
        }
    }
}
