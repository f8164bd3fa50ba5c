//! Record/stop state machine producing a playable artifact.

use log::{debug, error, info, warn};
use thiserror::Error;

use super::artifact::{ArtifactRef, ArtifactStore};
use super::permission::{PermissionQuery, PermissionResult, PermissionState};
use super::recorder::{Capture, EncodedClip, Recorder, RecorderError};
use crate::pending::{Pending, Settled};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    Idle,
    Recording,
}

/// User-visible recording failures
#[derive(Debug, Error)]
pub enum RecordingError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("could not start recording: {0}")]
    RecorderStart(#[source] RecorderError),

    #[error("recording lost: {0}")]
    Encode(#[source] RecorderError),
}

/// Asynchronous completions surfaced by [`RecordingController::poll`]
#[derive(Debug)]
pub enum RecordingEvent {
    PermissionResolved(PermissionResult),
    /// Encode succeeded; the reference is the new current artifact
    ArtifactReady(ArtifactRef),
    /// Encode failed; the session ended without an artifact
    Lost(RecordingError),
}

type EncodeResult = Result<EncodedClip, RecorderError>;

/// Microphone capture lifecycle
///
/// `Idle --start--> Recording --stop + encode--> Idle`. While an encode
/// is in flight the controller stays in `Recording` and further start or
/// stop requests are ignored. Only the transition legal for the current
/// state has an effect; the other is a logged no-op.
pub struct RecordingController<R: Recorder> {
    recorder: R,
    state: RecordingState,
    permission: PermissionState,
    permission_query: Option<Pending<PermissionResult>>,
    encoding: Option<Pending<EncodeResult>>,
    artifacts: ArtifactStore,
    artifact: Option<ArtifactRef>,
}

impl<R: Recorder> RecordingController<R> {
    /// Create the controller and fire the one-shot permission query
    pub fn new<Q: PermissionQuery + ?Sized>(recorder: R, query: &mut Q) -> Self {
        Self {
            recorder,
            state: RecordingState::Idle,
            permission: PermissionState::default(),
            permission_query: Some(query.request()),
            encoding: None,
            artifacts: ArtifactStore::new(),
            artifact: None,
        }
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Stop requested, encode still running
    pub fn is_settling(&self) -> bool {
        self.encoding.is_some()
    }

    pub fn permission(&self) -> PermissionState {
        self.permission
    }

    /// Most recent artifact reference
    pub fn artifact(&self) -> Option<&ArtifactRef> {
        self.artifact.as_ref()
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    pub fn recorder(&self) -> &R {
        &self.recorder
    }

    /// Open a capture session
    ///
    /// Uses the cached permission; never re-queries.
    pub fn start_recording(&mut self) -> Result<(), RecordingError> {
        if self.state == RecordingState::Recording {
            debug!("start ignored: already recording");
            return Ok(());
        }

        if self.permission.blocked() {
            warn!("Recording refused: microphone permission denied");
            return Err(RecordingError::PermissionDenied);
        }

        match self.recorder.start() {
            Ok(()) => {
                self.state = RecordingState::Recording;
                info!("Recording started");
                Ok(())
            }
            Err(e) => {
                error!("Recorder failed to start: {}", e);
                Err(RecordingError::RecorderStart(e))
            }
        }
    }

    /// Close the capture session and begin encoding
    ///
    /// Completion arrives through [`poll`](Self::poll).
    pub fn stop_recording(&mut self) {
        if self.state == RecordingState::Idle {
            debug!("stop ignored: not recording");
            return;
        }
        if self.is_settling() {
            debug!("stop ignored: encode in flight");
            return;
        }

        info!("Recording stopped, encoding");
        let capture = self.recorder.stop();
        self.encoding = Some(Pending::spawn("clip-encode", move || {
            capture
                .wait()
                .unwrap_or_else(|| Err(RecorderError::Thread("recorder exited without a capture".into())))
                .and_then(Capture::encode)
        }));
    }

    /// Apply any asynchronous completions (call once per frame)
    pub fn poll(&mut self) -> Vec<RecordingEvent> {
        let mut events = Vec::new();

        if let Some(query) = &self.permission_query {
            match query.poll() {
                Settled::Waiting => {}
                Settled::Ready(result) => {
                    events.push(self.resolve_permission(result));
                }
                Settled::Abandoned => {
                    warn!("Permission query abandoned; leaving microphone unblocked");
                    self.permission_query = None;
                }
            }
        }

        if let Some(encoding) = &self.encoding {
            match encoding.poll() {
                Settled::Waiting => {}
                Settled::Ready(result) => events.push(self.finish_encode(result)),
                Settled::Abandoned => events.push(self.finish_encode(Err(
                    RecorderError::Thread("encoder exited without a result".into()),
                ))),
            }
        }

        events
    }

    /// Block until every in-flight completion has settled
    pub fn wait_settled(&mut self) -> Vec<RecordingEvent> {
        let mut events = Vec::new();

        if let Some(query) = self.permission_query.take() {
            match query.wait() {
                Some(result) => events.push(self.resolve_permission(result)),
                None => warn!("Permission query abandoned; leaving microphone unblocked"),
            }
        }

        if let Some(encoding) = self.encoding.take() {
            let result = encoding
                .wait()
                .unwrap_or_else(|| Err(RecorderError::Thread("encoder exited without a result".into())));
            events.push(self.finish_encode(result));
        }

        events
    }

    /// Release the current artifact and abandon any open session
    pub fn shutdown(&mut self) {
        if self.state == RecordingState::Recording && !self.is_settling() {
            // Capture is discarded; the recorder finishes closing on its own
            drop(self.recorder.stop());
        }
        if let Some(url) = self.artifact.take() {
            self.artifacts.revoke(&url);
        }
        self.state = RecordingState::Idle;
    }

    fn resolve_permission(&mut self, result: PermissionResult) -> RecordingEvent {
        self.permission_query = None;
        self.permission.apply(result);
        info!("Microphone permission: {:?}", result);
        RecordingEvent::PermissionResolved(result)
    }

    fn finish_encode(&mut self, result: EncodeResult) -> RecordingEvent {
        self.encoding = None;
        self.state = RecordingState::Idle;

        match result {
            Ok(clip) => {
                if let Some(previous) = self.artifact.take() {
                    self.artifacts.revoke(&previous);
                }
                let url = self.artifacts.create_url(clip.blob);
                info!("Recording ready: {}", url);
                self.artifact = Some(url.clone());
                RecordingEvent::ArtifactReady(url)
            }
            Err(e) => {
                error!("Recording lost: {}", e);
                RecordingEvent::Lost(RecordingError::Encode(e))
            }
        }
    }
}
