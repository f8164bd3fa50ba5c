//! Windowed FFT analyser producing byte frequency snapshots.

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::params::{AnalyserConfig, ConfigError};

/// Fixed-length byte snapshot of frequency magnitudes
///
/// The length is set once when the graph is built; sampling overwrites
/// the contents in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FrequencyBuffer {
    bins: Box<[u8]>,
}

impl FrequencyBuffer {
    pub fn new(len: usize) -> Self {
        Self {
            bins: vec![0; len].into_boxed_slice(),
        }
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bins
    }

    pub(crate) fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bins
    }

    /// Widen to floats for upload as a shader array
    pub fn to_f32_vec(&self) -> Vec<f32> {
        self.bins.iter().map(|&b| b as f32).collect()
    }
}

/// Ring of the most recent time-domain samples (shared with the audio thread)
#[derive(Clone)]
pub struct SampleTap {
    ring: Arc<Mutex<TapRing>>,
}

struct TapRing {
    samples: Vec<f32>,
    write: usize,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: Arc::new(Mutex::new(TapRing {
                samples: vec![0.0; capacity.max(1)],
                write: 0,
            })),
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.lock().samples.len()
    }

    /// Append samples, overwriting the oldest
    pub fn push(&self, input: &[f32]) {
        let mut ring = self.ring.lock();
        let cap = ring.samples.len();

        // Only the tail can survive
        let input = &input[input.len().saturating_sub(cap)..];
        for &sample in input {
            let write = ring.write;
            ring.samples[write] = sample;
            ring.write = (write + 1) % cap;
        }
    }

    /// Copy the ring into `out`, oldest sample first
    pub fn copy_latest(&self, out: &mut [f32]) {
        let ring = self.ring.lock();
        let (newer, older) = ring.samples.split_at(ring.write);
        let n = out.len().min(older.len() + newer.len());
        for (dst, &src) in out[..n].iter_mut().zip(older.iter().chain(newer.iter())) {
            *dst = src;
        }
    }
}

/// Frequency analyser over a sample tap
///
/// Per snapshot: Blackman window over the latest `fft_size` samples, FFT,
/// magnitude scaled by `1/fft_size`, exponential smoothing against the
/// previous snapshot, then decibels mapped linearly onto `0..=255`.
pub struct Analyser {
    config: AnalyserConfig,
    tap: SampleTap,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
}

impl Analyser {
    pub fn new(config: AnalyserConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let window = (0..size).map(|i| blackman_window(i, size)).collect();

        Ok(Self {
            tap: SampleTap::new(size),
            fft,
            window,
            time_domain: vec![0.0; size],
            spectrum: vec![Complex::new(0.0, 0.0); size],
            scratch,
            smoothed: vec![0.0; config.bin_count()],
            config,
        })
    }

    /// Handle for the producer side (source node)
    pub fn tap(&self) -> SampleTap {
        self.tap.clone()
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }

    /// Write the current byte magnitudes into `out` (up to `bin_count` bins)
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) {
        self.update_smoothed();

        let range = self.config.max_decibels - self.config.min_decibels;
        for (byte, &magnitude) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = 20.0 * magnitude.log10();
            let scaled = 255.0 * (db - self.config.min_decibels) / range;
            // -inf (silence) and NaN both land on 0
            *byte = if scaled.is_finite() {
                scaled.clamp(0.0, 255.0) as u8
            } else if scaled > 0.0 {
                255
            } else {
                0
            };
        }
    }

    fn update_smoothed(&mut self) {
        let size = self.config.fft_size;
        self.tap.copy_latest(&mut self.time_domain);

        for (i, slot) in self.spectrum.iter_mut().enumerate() {
            *slot = Complex::new(self.time_domain[i] * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let tau = self.config.smoothing_time_constant;
        let scale = 1.0 / size as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.spectrum.iter()) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
    }
}

/// Blackman window (alpha = 0.16), periodic form
pub fn blackman_window(index: usize, size: usize) -> f32 {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    let x = index as f32 / size as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}
