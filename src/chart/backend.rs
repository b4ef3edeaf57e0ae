//! Drawing backends for chart surfaces
//!
//! A [`ChartBackend`] turns a [`ChartConfig`] into a live [`Plot`]; the
//! surface owns the plot and hands it complete datasets to draw. The
//! drawing engine itself sits behind these two traits.

use serde::{Deserialize, Serialize};

use super::{ChartError, Series};
use crate::config::defaults;

// ============================================================================
// Chart Configuration
// ============================================================================

/// Static appearance of one rolling plot.
///
/// Colours are `#rrggbb`, `rgb(r, g, b)`, `rgba(r, g, b, a)` or a named
/// terminal colour.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChartConfig {
    pub title: String,
    /// Label of the single visible series
    pub series_label: String,
    pub border_color: String,
    pub fill_color: String,
    pub border_width: f32,
    pub fill: bool,
    /// 0 = no point markers
    pub point_radius: f32,
    /// Entry animation length; 0 disables it
    pub animation_ms: u64,
    pub tick_color: String,
    pub show_legend: bool,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            title: String::new(),
            series_label: String::new(),
            border_color: "#e2e8f0".to_string(),
            fill_color: "rgba(226, 232, 240, 0.1)".to_string(),
            border_width: 1.5,
            fill: true,
            point_radius: 0.0,
            animation_ms: 0,
            tick_color: defaults::TICK_COLOR.to_string(),
            show_legend: false,
        }
    }
}

impl ChartConfig {
    pub fn time_domain() -> Self {
        Self {
            title: "time".to_string(),
            series_label: "Acceleration (m/s²)".to_string(),
            border_color: "#38bdf8".to_string(),
            fill_color: "rgba(56, 189, 248, 0.1)".to_string(),
            ..Self::default()
        }
    }

    pub fn frequency_domain() -> Self {
        Self {
            title: "fft".to_string(),
            series_label: "Amplitude".to_string(),
            border_color: "#fb7185".to_string(),
            fill_color: "rgba(251, 113, 133, 0.1)".to_string(),
            ..Self::default()
        }
    }

    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "chart"
        } else {
            &self.title
        }
    }
}

/// How a redraw is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedrawMode {
    /// Skip animation entirely (per-frame updates)
    Immediate,
    /// Transition honouring the chart's `animation_ms` (infrequent, user-triggered)
    Animated,
}

// ============================================================================
// Backend Traits
// ============================================================================

/// Factory for plots.
pub trait ChartBackend: Send + Sync {
    fn create_plot(&self, config: &ChartConfig) -> Result<Box<dyn Plot>, ChartError>;
}

/// One live plot owned by a `ChartSurface`.
pub trait Plot: Send {
    /// Draw the full dataset, replacing whatever was drawn before.
    fn redraw(&mut self, data: &Series, mode: RedrawMode) -> Result<(), ChartError>;

    /// Free the underlying resource. Called at most once.
    fn release(&mut self);
}

// ============================================================================
// Null Backend
// ============================================================================

/// Draws nothing. Useful headless and in tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullBackend;

struct NullPlot;

impl ChartBackend for NullBackend {
    fn create_plot(&self, _config: &ChartConfig) -> Result<Box<dyn Plot>, ChartError> {
        Ok(Box::new(NullPlot))
    }
}

impl Plot for NullPlot {
    fn redraw(&mut self, _data: &Series, _mode: RedrawMode) -> Result<(), ChartError> {
        Ok(())
    }

    fn release(&mut self) {}
}
