//! Parameter definitions with units and documented semantics.
//!
//! Every tunable number lives here with:
//! - Units (samples, decibels, world units, pixels)
//! - Documented ranges and meanings
//! - A `validate()` where a bad value would break the pipeline

mod audio;
mod render;
mod surface;

use thiserror::Error;

// Re-export all types
pub use audio::{AnalyserConfig, RecorderConfig, DATA_ARRAY_LEN};
pub use render::RenderConfig;
pub use surface::{AmplitudeRange, SurfaceGeometry};

/// Rejected configuration value
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("FFT size must be a power of 2 in [32, 32768], got {0}")]
    FftSize(usize),

    #[error("smoothing time constant must be in [0, 1], got {0}")]
    Smoothing(f32),

    #[error("decibel range is empty: min {min} >= max {max}")]
    DecibelRange { min: f32, max: f32 },

    #[error("amplitude range [{min}, {max}] does not contain default {default}")]
    AmplitudeRange { min: f32, max: f32, default: f32 },

    #[error("analyser produces {bins} bins but the shader declares {declared}")]
    BinCount { bins: usize, declared: usize },
}
