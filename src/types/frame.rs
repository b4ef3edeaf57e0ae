//! Vibration frame types

use serde::Deserialize;
use thiserror::Error;

/// Errors raised while decoding or constructing a [`VibrationFrame`].
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("Malformed frame payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Spectrum length mismatch: {freq} frequency bins, {amp} amplitudes")]
    LengthMismatch { freq: usize, amp: usize },
}

/// One telemetry ingestion unit: a time-domain sample block plus its spectrum.
///
/// `freq` and `amp` always have the same length; `time` is independent.
/// The invariant is checked on construction and on deserialization, so a
/// frame that exists is always renderable.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawFrame")]
pub struct VibrationFrame {
    /// Acceleration samples in sample order
    time: Vec<f64>,
    /// Frequency bin centres (Hz)
    freq: Vec<f64>,
    /// Magnitude per frequency bin
    amp: Vec<f64>,
}

/// Wire shape before the length invariant is checked.
#[derive(Deserialize)]
struct RawFrame {
    time: Vec<f64>,
    freq: Vec<f64>,
    amp: Vec<f64>,
}

impl TryFrom<RawFrame> for VibrationFrame {
    type Error = FrameError;

    fn try_from(raw: RawFrame) -> Result<Self, Self::Error> {
        Self::new(raw.time, raw.freq, raw.amp)
    }
}

impl VibrationFrame {
    pub fn new(time: Vec<f64>, freq: Vec<f64>, amp: Vec<f64>) -> Result<Self, FrameError> {
        if freq.len() != amp.len() {
            return Err(FrameError::LengthMismatch {
                freq: freq.len(),
                amp: amp.len(),
            });
        }
        Ok(Self { time, freq, amp })
    }

    pub fn time(&self) -> &[f64] {
        &self.time
    }

    pub fn freq(&self) -> &[f64] {
        &self.freq
    }

    pub fn amp(&self) -> &[f64] {
        &self.amp
    }
}

/// Decode a telemetry payload.
///
/// Returns `Ok(None)` for a JSON `null` body, which carries no frame and is
/// skipped by the channel.
pub fn decode_payload(body: &str) -> Result<Option<VibrationFrame>, FrameError> {
    Ok(serde_json::from_str::<Option<VibrationFrame>>(body)?)
}
