//! Monitor Configuration Module
//!
//! Provides client configuration loaded from TOML files.
//!
//! ## Loading Order
//!
//! 1. `VIBMON_CONFIG` environment variable (path to TOML file)
//! 2. `monitor.toml` in the current working directory
//! 3. Built-in defaults
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(MonitorConfig::load());
//!
//! // Anywhere in the codebase:
//! let topic = &config::get().endpoints.topic;
//! ```

mod monitor_config;
pub mod defaults;

pub use monitor_config::*;

use std::sync::OnceLock;

/// Global monitor configuration, initialized once at startup.
static MONITOR_CONFIG: OnceLock<MonitorConfig> = OnceLock::new();

/// Initialize the global monitor configuration.
///
/// A second call is ignored with a warning.
pub fn init(config: MonitorConfig) {
    if MONITOR_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global monitor configuration.
///
/// Falls back to built-in defaults when `init()` has not been called.
pub fn get() -> &'static MonitorConfig {
    MONITOR_CONFIG.get_or_init(MonitorConfig::default)
}

