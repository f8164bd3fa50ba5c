//! Surface mesh and fixed camera.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3};

use crate::params::{RenderConfig, SurfaceGeometry};

/// Vertex data for the surface mesh (position + UV coordinates)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub uv: [f32; 2],
}

/// Segmented plane in the XY plane, centred on the origin
///
/// Displacement happens in the vertex shader, so the CPU-side mesh is
/// built once and never touched again.
pub struct SurfaceMesh {
    pub vertices: Vec<Vertex>,
    /// Triangle list (solid pipeline)
    pub triangle_indices: Vec<u32>,
    /// Line list (wireframe pipeline)
    pub line_indices: Vec<u32>,
    model: Mat4,
}

impl SurfaceMesh {
    pub fn new(geometry: &SurfaceGeometry) -> Self {
        let segments = geometry.segments.max(1);
        let row = segments + 1;
        let half = geometry.size / 2.0;
        let step = geometry.size / segments as f32;

        let mut vertices = Vec::with_capacity(row * row);
        let mut triangle_indices = Vec::with_capacity(segments * segments * 6);
        let mut line_indices = Vec::with_capacity((segments * segments * 3 + 2 * segments) * 2);

        // Rows run top (+Y) to bottom (-Y)
        for y in 0..row {
            for x in 0..row {
                vertices.push(Vertex {
                    position: [x as f32 * step - half, half - y as f32 * step, 0.0],
                    uv: [x as f32 / segments as f32, 1.0 - y as f32 / segments as f32],
                });
            }
        }

        for y in 0..segments {
            for x in 0..segments {
                let top_left = (y * row + x) as u32;
                let top_right = top_left + 1;
                let bottom_left = ((y + 1) * row + x) as u32;
                let bottom_right = bottom_left + 1;

                // Counter-clockwise seen from +Z
                triangle_indices.extend_from_slice(&[
                    top_left,
                    bottom_left,
                    top_right,
                    bottom_left,
                    bottom_right,
                    top_right,
                ]);

                // Top, left and diagonal; right/bottom come from neighbours
                line_indices.extend_from_slice(&[
                    top_left,
                    top_right,
                    top_left,
                    bottom_left,
                    bottom_left,
                    top_right,
                ]);
            }
        }

        // Closing borders
        for i in 0..segments {
            let right = (i * row + segments) as u32;
            line_indices.extend_from_slice(&[right, right + row as u32]);

            let bottom = (segments * row + i) as u32;
            line_indices.extend_from_slice(&[bottom, bottom + 1]);
        }

        let model = Mat4::from_translation(Vec3::new(0.0, geometry.lift, 0.0))
            * Mat4::from_rotation_x(geometry.tilt_rad)
            * Mat4::from_scale(Vec3::splat(geometry.scale));

        Self {
            vertices,
            triangle_indices,
            line_indices,
            model,
        }
    }

    /// Object-to-world transform (scale, then tilt, then lift)
    pub fn model_matrix(&self) -> Mat4 {
        self.model
    }
}

/// Perspective view-projection for a camera at `config.eye` looking at the origin
pub fn view_proj(config: &RenderConfig, aspect: f32) -> Mat4 {
    let view = Mat4::look_at_rh(Vec3::from_array(config.eye), Vec3::ZERO, Vec3::Y);
    let proj = Mat4::perspective_rh(
        config.fov_degrees.to_radians(),
        aspect.max(f32::EPSILON),
        config.near_plane,
        config.far_plane,
    );
    proj * view
}
