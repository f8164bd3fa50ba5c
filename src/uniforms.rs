//! Typed uniform store shared between the feed loop, the control panel and the GPU.
//!
//! Uniform names are the contract with the surface shader; the layout below
//! must match the `SurfaceUniforms` block in `shader.wgsl`.

use thiserror::Error;

use crate::params::{AmplitudeRange, DATA_ARRAY_LEN};

/// Elapsed time in seconds, written once per frame
pub const U_TIME: &str = "u_time";

/// Displacement scale, written only by the control panel
pub const U_AMPLITUDE: &str = "u_amplitude";

/// Latest frequency snapshot as floats (0-255)
pub const U_DATA_ARR: &str = "u_data_arr";

/// Declared type of a uniform slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformKind {
    Float,
    Vec3,
    FloatArray(usize),
}

/// Closed set of uniform values
#[derive(Debug, Clone, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3([f32; 3]),
    FloatArray(Box<[f32]>),
}

impl UniformValue {
    pub fn kind(&self) -> UniformKind {
        match self {
            Self::Float(_) => UniformKind::Float,
            Self::Vec3(_) => UniformKind::Vec3,
            Self::FloatArray(values) => UniformKind::FloatArray(values.len()),
        }
    }

    /// Zero value of a declared kind
    pub fn zeroed(kind: UniformKind) -> Self {
        match kind {
            UniformKind::Float => Self::Float(0.0),
            UniformKind::Vec3 => Self::Vec3([0.0; 3]),
            UniformKind::FloatArray(len) => Self::FloatArray(vec![0.0; len].into_boxed_slice()),
        }
    }
}

impl From<f32> for UniformValue {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec<f32>> for UniformValue {
    fn from(values: Vec<f32>) -> Self {
        Self::FloatArray(values.into_boxed_slice())
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum UniformError {
    #[error("uniform `{0}` is not declared by the shader")]
    Unknown(String),

    #[error("uniform `{name}` expects {expected:?}, got {actual:?}")]
    KindMismatch {
        name: String,
        expected: UniformKind,
        actual: UniformKind,
    },

    #[error("uniform `{0}` declared twice")]
    Duplicate(String),
}

/// One declared slot
#[derive(Debug, Clone, PartialEq)]
pub struct UniformDecl {
    pub name: String,
    pub kind: UniformKind,
}

/// Uniform layout as declared by a shader
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UniformLayout {
    decls: Vec<UniformDecl>,
}

impl UniformLayout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, kind: UniformKind) -> Result<Self, UniformError> {
        if self.decls.iter().any(|d| d.name == name) {
            return Err(UniformError::Duplicate(name.to_string()));
        }
        self.decls.push(UniformDecl {
            name: name.to_string(),
            kind,
        });
        Ok(self)
    }

    /// Layout of the audio-reactive surface shader
    pub fn surface() -> Self {
        Self {
            decls: vec![
                UniformDecl {
                    name: U_TIME.to_string(),
                    kind: UniformKind::Float,
                },
                UniformDecl {
                    name: U_AMPLITUDE.to_string(),
                    kind: UniformKind::Float,
                },
                UniformDecl {
                    name: U_DATA_ARR.to_string(),
                    kind: UniformKind::FloatArray(DATA_ARRAY_LEN),
                },
            ],
        }
    }

    pub fn decls(&self) -> &[UniformDecl] {
        &self.decls
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.decls.iter().position(|d| d.name == name)
    }
}

/// Named uniform values, validated against a layout
///
/// Every declared slot always holds a value of its declared kind; slots
/// are replaced on write and never removed.
#[derive(Debug, Clone)]
pub struct UniformSet {
    layout: UniformLayout,
    values: Vec<UniformValue>,
}

impl UniformSet {
    /// Build from a layout; slots not given in `initial` start zeroed
    pub fn new<'a, I>(layout: UniformLayout, initial: I) -> Result<Self, UniformError>
    where
        I: IntoIterator<Item = (&'a str, UniformValue)>,
    {
        let values = layout
            .decls
            .iter()
            .map(|d| UniformValue::zeroed(d.kind))
            .collect();
        let mut set = Self { layout, values };

        for (name, value) in initial {
            set.set(name, value)?;
        }
        Ok(set)
    }

    /// Surface layout with `u_amplitude` at its default
    pub fn surface(amplitude: &AmplitudeRange) -> Self {
        Self {
            values: vec![
                UniformValue::Float(0.0),
                UniformValue::Float(amplitude.default),
                UniformValue::zeroed(UniformKind::FloatArray(DATA_ARRAY_LEN)),
            ],
            layout: UniformLayout::surface(),
        }
    }

    /// Replace a slot's value; the kind must match the declaration
    pub fn set(&mut self, name: &str, value: impl Into<UniformValue>) -> Result<(), UniformError> {
        let value = value.into();
        let index = self
            .layout
            .index_of(name)
            .ok_or_else(|| UniformError::Unknown(name.to_string()))?;

        let expected = self.layout.decls[index].kind;
        if value.kind() != expected {
            return Err(UniformError::KindMismatch {
                name: name.to_string(),
                expected,
                actual: value.kind(),
            });
        }

        self.values[index] = value;
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&UniformValue> {
        self.layout.index_of(name).map(|i| &self.values[i])
    }

    pub fn float(&self, name: &str) -> Option<f32> {
        match self.get(name)? {
            UniformValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn array(&self, name: &str) -> Option<&[f32]> {
        match self.get(name)? {
            UniformValue::FloatArray(values) => Some(values),
            _ => None,
        }
    }

    pub fn layout(&self) -> &UniformLayout {
        &self.layout
    }
}
