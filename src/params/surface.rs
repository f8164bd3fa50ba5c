//! Surface mesh placement and the amplitude control range.

use std::f32::consts::FRAC_PI_4;

use super::ConfigError;

/// Plane mesh geometry and placement
#[derive(Debug, Clone)]
pub struct SurfaceGeometry {
    /// Side length of the plane (world units)
    pub size: f32,

    /// Segments per side (vertices per side = segments + 1)
    pub segments: usize,

    /// Uniform scale applied to the mesh
    pub scale: f32,

    /// Rotation about X (radians); -π/2 lays the plane flat, +π/4 tips it toward the camera
    pub tilt_rad: f32,

    /// Vertical offset (world units)
    pub lift: f32,
}

impl Default for SurfaceGeometry {
    fn default() -> Self {
        Self {
            size: 64.0,
            segments: 64,
            scale: 2.0,
            tilt_rad: -FRAC_PI_4, // -π/2 + π/4
            lift: 8.0,
        }
    }
}

/// Bounds of the user-adjustable `u_amplitude` uniform
#[derive(Debug, Clone)]
pub struct AmplitudeRange {
    pub min: f32,
    pub max: f32,

    /// Value before any user input
    pub default: f32,

    /// Increment per key press
    pub step: f32,
}

impl Default for AmplitudeRange {
    fn default() -> Self {
        Self {
            min: 1.0,
            max: 8.0,
            default: 3.0,
            step: 0.25,
        }
    }
}

impl AmplitudeRange {
    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.min <= self.default && self.default <= self.max) {
            return Err(ConfigError::AmplitudeRange {
                min: self.min,
                max: self.max,
                default: self.default,
            });
        }
        Ok(())
    }
}
