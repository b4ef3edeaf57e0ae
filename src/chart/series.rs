//! Frame → chart series derivation
//!
//! Pure functions: one frame in, one `(labels, values)` pair out per chart.
//! Nothing is shared between the two derivations, so each chart can be
//! tested on its own.

use crate::types::VibrationFrame;

/// Labels plus the single visible series of a chart.
///
/// Labels and values are index-aligned; `ChartSurface::update` rejects a
/// series where the two lengths differ.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Series {
    pub labels: Vec<String>,
    pub values: Vec<f64>,
}

impl Series {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn is_aligned(&self) -> bool {
        self.labels.len() == self.values.len()
    }
}

/// Time-domain chart: labels are sample indices `0..N-1`, values the samples.
pub fn time_domain_series(frame: &VibrationFrame) -> Series {
    let time = frame.time();
    Series {
        labels: (0..time.len()).map(|i| i.to_string()).collect(),
        values: time.to_vec(),
    }
}

/// Frequency-domain chart: labels are bin centres to one decimal, values the amplitudes.
pub fn frequency_domain_series(frame: &VibrationFrame) -> Series {
    Series {
        labels: frame.freq().iter().map(|&hz| format_frequency(hz)).collect(),
        values: frame.amp().to_vec(),
    }
}

/// Fixed-point, exactly one decimal digit. Never scientific notation.
pub fn format_frequency(hz: f64) -> String {
    format!("{hz:.1}")
}
