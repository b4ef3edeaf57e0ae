//! Acquisition mode

use serde::{Deserialize, Serialize};

/// How the remote controller decides when to sample.
///
/// The client mirrors this flag; it is flipped only by explicit user action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AcquisitionMode {
    #[default]
    Auto,
    Manual,
}

impl AcquisitionMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            AcquisitionMode::Auto => AcquisitionMode::Manual,
            AcquisitionMode::Manual => AcquisitionMode::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AcquisitionMode::Auto => "AUTO",
            AcquisitionMode::Manual => "MANUAL",
        }
    }
}

impl std::fmt::Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
