//! Optional control panel: amplitude slider and wireframe toggle.
//!
//! Constructed once at startup and handed to the app; when omitted,
//! `u_amplitude` simply keeps its initial value.

use log::debug;

use crate::params::AmplitudeRange;
use crate::uniforms::{UniformError, UniformSet, U_AMPLITUDE};

/// Sole writer of `u_amplitude`
#[derive(Debug, Clone)]
pub struct ControlPanel {
    range: AmplitudeRange,
    amplitude: f32,
    wireframe: bool,
}

impl ControlPanel {
    pub fn new(range: AmplitudeRange, amplitude: f32, wireframe: bool) -> Self {
        let amplitude = range.clamp(amplitude);
        Self {
            range,
            amplitude,
            wireframe,
        }
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude
    }

    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    /// Slider drag: any requested value lands inside the range
    pub fn set_amplitude(&mut self, value: f32) {
        self.amplitude = self.range.clamp(value);
        debug!("amplitude -> {:.2}", self.amplitude);
    }

    /// Key press: move by `steps` increments
    pub fn nudge_amplitude(&mut self, steps: i32) {
        self.set_amplitude(self.amplitude + steps as f32 * self.range.step);
    }

    pub fn toggle_wireframe(&mut self) -> bool {
        self.wireframe = !self.wireframe;
        debug!("wireframe -> {}", self.wireframe);
        self.wireframe
    }

    /// Push the panel state into the uniform set
    pub fn apply(&self, uniforms: &mut UniformSet) -> Result<(), UniformError> {
        uniforms.set(U_AMPLITUDE, self.amplitude)
    }
}
