//! Per-frame uniform feed: frequency snapshot and time into the uniform set.

use log::{debug, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::audio::FrequencySampler;
use crate::uniforms::{UniformError, UniformSet, U_DATA_ARR, U_TIME};

/// Shared cancellation flag; the host cancels on teardown
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// What the host should do after a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Not started; nothing was written
    Idle,
    /// Uniforms updated; schedule the next frame
    Continue,
    /// Token fired; the loop has stopped
    Cancelled,
}

/// Frame loop writing `u_data_arr` and `u_time`
///
/// Each tick samples, writes the array, writes the time, and only then
/// reports `Continue`. Ticks borrow the feed mutably, so they never overlap.
#[derive(Debug, Default)]
pub struct UniformFeed {
    token: Option<CancellationToken>,
    last_time: f32,
    frames: u64,
}

impl UniformFeed {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the loop; a second start while running is ignored
    pub fn start(&mut self, token: CancellationToken) {
        if self.is_running() {
            debug!("Uniform feed already running");
            return;
        }
        info!("Uniform feed started");
        self.token = Some(token);
    }

    pub fn is_running(&self) -> bool {
        self.token.is_some()
    }

    /// Frames completed since start
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Run one frame
    pub fn tick<S>(
        &mut self,
        time_s: f32,
        sampler: &mut S,
        uniforms: &mut UniformSet,
    ) -> Result<FrameStatus, UniformError>
    where
        S: FrequencySampler + ?Sized,
    {
        let Some(token) = &self.token else {
            return Ok(FrameStatus::Idle);
        };
        if token.is_cancelled() {
            self.token = None;
            info!("Uniform feed cancelled after {} frames", self.frames);
            return Ok(FrameStatus::Cancelled);
        }

        if let Some(snapshot) = sampler.sample() {
            uniforms.set(U_DATA_ARR, snapshot.to_f32_vec())?;
        }

        // Scheduler time can jitter backwards; keep u_time non-decreasing
        let time_s = if time_s.is_finite() {
            time_s.max(self.last_time)
        } else {
            self.last_time
        };
        uniforms.set(U_TIME, time_s)?;
        self.last_time = time_s;

        self.frames += 1;
        Ok(FrameStatus::Continue)
    }
}
