//! Wavemesh library - Audio-reactive procedural surface

pub mod audio;
pub mod cli;
pub mod controls;
pub mod feed;
pub mod params;
pub mod pending;
pub mod recording;
pub mod rendering;
pub mod scene;
pub mod trigger;
pub mod uniforms;
