//! Error taxonomy. Per the design, the tracker never surfaces per-frame
//! errors to its caller: `ConfigError` is returned only from bind/configure
//! calls, is logged, and leaves the tracker in a safe no-op state until
//! corrected. Everything else (saturation, underflow, an incomplete
//! calibration) is degraded silently and logged at debug level.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("output signal must be at least {min_cols}x{min_rows}, got {got_cols}x{got_rows}")]
    OutputTooSmall {
        min_cols: usize,
        min_rows: usize,
        got_cols: usize,
        got_rows: usize,
    },

    #[error("input signal not bound")]
    InputNotBound,

    #[error("output signal not bound")]
    OutputNotBound,

    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(f32),

    #[error("maxTouches must be between 1 and {max}, got {got}")]
    InvalidMaxTouches { got: usize, max: usize },
}
