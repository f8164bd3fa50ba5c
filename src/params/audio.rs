//! Audio analysis and capture configuration.

use super::ConfigError;

/// Length of `u_data_arr` as declared by the surface shader
/// (`array<vec4<f32>, 128>` = 512 floats)
pub const DATA_ARRAY_LEN: usize = 512;

/// Frequency analyser configuration
///
/// Mirrors the knobs of a browser analyser node so the byte snapshot
/// looks the same as the one the visuals were tuned against.
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// Transform window size in samples (power of 2)
    /// Snapshot length is half of this: 1024 → 512 bins
    pub fft_size: usize,

    /// Weight of the previous frame when smoothing magnitudes (0 = none, 1 = frozen)
    pub smoothing_time_constant: f32,

    /// Magnitude (dB) mapped to byte 0
    pub min_decibels: f32,

    /// Magnitude (dB) mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 1024,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    /// Number of frequency bins in each snapshot
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Validate configuration (FFT size must be power of 2, etc.)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fft_size.is_power_of_two() || !(32..=32768).contains(&self.fft_size) {
            return Err(ConfigError::FftSize(self.fft_size));
        }
        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(ConfigError::Smoothing(self.smoothing_time_constant));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(ConfigError::DecibelRange {
                min: self.min_decibels,
                max: self.max_decibels,
            });
        }
        Ok(())
    }

    /// Check the snapshot length against the shader's declared array length
    pub fn validate_for_shader(&self, declared: usize) -> Result<(), ConfigError> {
        self.validate()?;
        if self.bin_count() != declared {
            return Err(ConfigError::BinCount {
                bins: self.bin_count(),
                declared,
            });
        }
        Ok(())
    }
}

/// Microphone capture settings
///
/// The clip is always encoded as 16-bit mono WAV at the device rate.
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// How often the capture thread checks for a stop request (milliseconds)
    pub stop_poll_ms: u64,

    /// Capture length after which further input is dropped (seconds)
    pub max_capture_secs: f32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            stop_poll_ms: 50,
            max_capture_secs: 600.0,
        }
    }
}

impl RecorderConfig {
    /// Sample cap for a device running at `sample_rate` with `channels`
    pub fn max_samples(&self, sample_rate: u32, channels: u16) -> usize {
        (self.max_capture_secs * sample_rate as f32) as usize * channels as usize
    }
}
