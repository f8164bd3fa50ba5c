//! Audio graph and frequency analysis.
//!
//! A playable element feeds a source node, which tees every rendered block
//! into the analyser's sample tap on its way to the output device. The
//! engine owns that graph and turns the tap into a byte frequency snapshot
//! once per frame.

mod analyser;
mod context;
mod element;
mod engine;

use thiserror::Error;

use crate::params::ConfigError;

// Re-export public types
pub use analyser::{blackman_window, Analyser, FrequencyBuffer, SampleTap};
pub use context::{
    AudioContext, ContextFactory, CpalContext, CpalContextFactory, OfflineContext,
    OfflineDestination,
};
pub use element::{ElementId, PlayableElement, SourceNode};
pub use engine::{AudioEngine, FrequencySampler, GraphId, InitOutcome};

/// Audio pipeline errors
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("audio context unavailable: {0}")]
    ContextUnavailable(String),

    #[error("audio stream failed: {0}")]
    Stream(String),

    #[error("failed to decode audio: {0}")]
    Decode(#[from] hound::Error),

    #[error("audio source {0} contains no samples")]
    EmptySource(String),

    #[error("no artifact registered for {0}")]
    UnknownArtifact(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
