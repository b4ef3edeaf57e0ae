//! Chart Surfaces
//!
//! Two independent rolling plots fed from the same frame:
//!
//! ```text
//! VibrationFrame ──┬── time_domain_series()      ──► ChartSurface (time)
//!                  └── frequency_domain_series() ──► ChartSurface (fft)
//! ```
//!
//! Each update replaces the whole dataset and redraws without animation, so
//! per-frame cost stays constant no matter how long the stream runs.

mod backend;
mod series;
mod surface;
mod terminal;

pub use backend::{ChartBackend, ChartConfig, NullBackend, Plot, RedrawMode};
pub use series::{format_frequency, frequency_domain_series, time_domain_series, Series};
pub use surface::ChartSurface;
pub use terminal::{axis_ticks, parse_color, TerminalBackend, TerminalSession};

use thiserror::Error;

/// Chart surface errors
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Chart surface already destroyed")]
    Destroyed,

    #[error("Series misaligned: {labels} labels, {values} values")]
    LengthMismatch { labels: usize, values: usize },

    #[error("Chart backend error: {0}")]
    Backend(String),
}
