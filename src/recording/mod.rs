//! Microphone capture lifecycle: permission, record/stop, artifact hand-off.

mod artifact;
mod controller;
mod permission;
mod recorder;

// Re-export public types
pub use artifact::{ArtifactRef, ArtifactStore, Blob};
pub use controller::{RecordingController, RecordingError, RecordingEvent, RecordingState};
pub use permission::{MicrophoneProbe, PermissionQuery, PermissionResult, PermissionState};
pub use recorder::{Capture, EncodedClip, MicRecorder, Recorder, RecorderError};
