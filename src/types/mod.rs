//! Shared data structures for the vibration monitoring client
//!
//! - `VibrationFrame`: one telemetry message (time samples + spectrum)
//! - `Command`: one-shot instruction for the remote controller
//! - `AcquisitionMode`: AUTO / MANUAL flag mirrored by the client

mod command;
mod frame;
mod mode;

pub use command::*;
pub use frame::*;
pub use mode::*;
