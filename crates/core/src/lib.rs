//! Signal-processing and touch-tracking core for a pressure-sensitive
//! multi-touch surface: adaptive background estimation, per-sensor
//! normalization, peak detection, template matching against a learned
//! per-location touch shape, touch identity tracking with hysteresis,
//! inhibition between nearby touches, interactive calibration, and the
//! state machines that decide when a touch is born, moved, or released.
//!
//! Upstream acquisition and downstream note-mapping, transport, GUI, and
//! persistence are external collaborators and live outside this crate.

pub mod calibration;
pub mod error;
pub mod geometry;
pub mod grid;
pub mod keystate;
pub mod onepole;
pub mod output;
pub mod params;
pub mod template;
pub mod touch;
pub mod tracker;

pub use calibration::{CalibrationPhase, CalibrationResult, Calibrator};
pub use error::ConfigError;
pub use geometry::KeyGeometry;
pub use grid::{SignalGrid, SignalGrid3};
pub use output::OutputFrame;
pub use params::Parameters;
pub use touch::{Touch, TouchTable};
pub use tracker::Tracker;
