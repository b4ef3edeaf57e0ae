//! Chart Surface — one rolling, non-animated plot with a single series

use tracing::debug;

use super::{ChartBackend, ChartConfig, ChartError, Plot, RedrawMode, Series};

/// Owns one plot and the dataset currently drawn on it.
///
/// The dataset is replaced wholesale on every update; labels and values
/// always have equal length. Once destroyed, the surface refuses further
/// updates and never touches the plot again.
pub struct ChartSurface {
    config: ChartConfig,
    plot: Option<Box<dyn Plot>>,
    data: Series,
    destroyed: bool,
}

impl ChartSurface {
    /// Create an empty plot through `backend`.
    pub fn create(config: ChartConfig, backend: &dyn ChartBackend) -> Result<Self, ChartError> {
        let plot = backend.create_plot(&config)?;
        debug!(chart = %config.display_title(), "Chart surface created");
        Ok(Self {
            config,
            plot: Some(plot),
            data: Series::default(),
            destroyed: false,
        })
    }

    /// Replace the dataset and redraw immediately, animation skipped.
    ///
    /// A misaligned series is rejected and the current dataset kept.
    pub fn update(&mut self, series: Series) -> Result<(), ChartError> {
        self.ensure_live()?;
        if !series.is_aligned() {
            return Err(ChartError::LengthMismatch {
                labels: series.labels.len(),
                values: series.values.len(),
            });
        }
        self.data = series;
        self.redraw(RedrawMode::Immediate)
    }

    /// Empty the dataset and redraw.
    pub fn clear(&mut self) -> Result<(), ChartError> {
        self.ensure_live()?;
        self.data = Series::default();
        self.redraw(RedrawMode::Animated)
    }

    /// Release the plot. Safe to call repeatedly.
    pub fn destroy(&mut self) {
        if let Some(mut plot) = self.plot.take() {
            plot.release();
            debug!(chart = %self.config.display_title(), "Chart surface destroyed");
        }
        self.destroyed = true;
    }

    fn ensure_live(&self) -> Result<(), ChartError> {
        if self.destroyed || self.plot.is_none() {
            return Err(ChartError::Destroyed);
        }
        Ok(())
    }

    fn redraw(&mut self, mode: RedrawMode) -> Result<(), ChartError> {
        match self.plot.as_mut() {
            Some(plot) => plot.redraw(&self.data, mode),
            None => Err(ChartError::Destroyed),
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.data.labels
    }

    pub fn values(&self) -> &[f64] {
        &self.data.values
    }

    pub fn data(&self) -> &Series {
        &self.data
    }

    pub fn config(&self) -> &ChartConfig {
        &self.config
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

impl Drop for ChartSurface {
    fn drop(&mut self) {
        self.destroy();
    }
}
