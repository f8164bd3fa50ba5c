//! Playback trigger: lazily builds the audio graph on first play and runs the feed.

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::audio::{AudioEngine, AudioError, ContextFactory, ElementId, InitOutcome, PlayableElement};
use crate::feed::{CancellationToken, FrameStatus, UniformFeed};
use crate::recording::{ArtifactRef, ArtifactStore};
use crate::uniforms::{UniformError, UniformSet};

/// Pipeline state as seen by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    /// No playback yet
    Waiting,
    /// Graph built, feed armed
    Running,
    /// Context creation failed; the surface never animates
    Failed,
}

/// Playback that nothing would render
///
/// The element is paused again before this is returned.
#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable")]
    Unavailable,

    #[error("audio output is bound to {bound}; {element} cannot play")]
    Unbound { element: ElementId, bound: ElementId },
}

/// Glue between element playback, the audio engine and the uniform feed
///
/// One graph per session: the first element to play is the one the
/// surface reacts to until `shutdown`. Only that element is ever rendered,
/// so a play event for any other element is refused.
pub struct PlaybackTrigger<F: ContextFactory> {
    engine: AudioEngine<F>,
    feed: UniformFeed,
    token: CancellationToken,
    state: TriggerState,
}

impl<F: ContextFactory> PlaybackTrigger<F> {
    pub fn new(engine: AudioEngine<F>) -> Self {
        Self {
            engine,
            feed: UniformFeed::new(),
            token: CancellationToken::new(),
            state: TriggerState::Waiting,
        }
    }

    /// Playback-started event for `element`
    pub fn on_play(&mut self, element: &PlayableElement) -> Result<InitOutcome, PlaybackError> {
        if self.state == TriggerState::Failed {
            debug!("Playback of {} refused: audio pipeline failed", element.id());
            element.pause();
            return Err(PlaybackError::Unavailable);
        }

        let outcome = match self.engine.init(element) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("Audio pipeline unavailable: {}", e);
                self.state = TriggerState::Failed;
                element.pause();
                return Err(PlaybackError::Unavailable);
            }
        };

        if let Some(bound) = self.engine.bound_element().filter(|&id| id != element.id()) {
            warn!("Playback of {} refused: graph renders {}", element.id(), bound);
            element.pause();
            return Err(PlaybackError::Unbound {
                element: element.id(),
                bound,
            });
        }

        match outcome {
            InitOutcome::Built(graph) => {
                self.feed.start(self.token.clone());
                self.state = TriggerState::Running;
                info!("Surface now reacting to {} ({:?})", element.src(), graph);
            }
            InitOutcome::Reused(graph) => {
                debug!("{} playing on existing {:?}", element.src(), graph);
            }
        }
        Ok(outcome)
    }

    /// Drive one feed tick
    pub fn frame(&mut self, time_s: f32, uniforms: &mut UniformSet) -> Result<FrameStatus, UniformError> {
        self.feed.tick(time_s, &mut self.engine, uniforms)
    }

    /// Stop the feed and release the audio device
    pub fn shutdown(&mut self) {
        self.token.cancel();
        self.engine.dispose();
        if self.state == TriggerState::Running {
            self.state = TriggerState::Waiting;
        }
    }

    pub fn state(&self) -> TriggerState {
        self.state
    }

    pub fn engine(&self) -> &AudioEngine<F> {
        &self.engine
    }

    pub fn feed(&self) -> &UniformFeed {
        &self.feed
    }
}

/// The session's one audible player
///
/// The pre-loaded track and every recording are loaded into the same
/// element, so whichever plays first builds a graph that keeps rendering
/// the other sources too.
#[derive(Debug, Default)]
pub struct SessionPlayer {
    element: Option<PlayableElement>,
}

impl SessionPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load the recording behind `url`
    pub fn bind(
        &mut self,
        store: &ArtifactStore,
        url: &ArtifactRef,
    ) -> Result<&PlayableElement, AudioError> {
        let blob = store
            .resolve(url)
            .ok_or_else(|| AudioError::UnknownArtifact(url.to_string()))?;

        let element = match self.element.take() {
            Some(existing) => {
                if let Err(e) = existing.load_wav_bytes(url.as_str(), blob.bytes()) {
                    self.element = Some(existing);
                    return Err(e);
                }
                existing
            }
            None => PlayableElement::from_wav_bytes(url.as_str(), blob.bytes())?,
        };
        Ok(self.element.insert(element))
    }

    /// Load a decoded track (stopped, at the start)
    pub fn cue(&mut self, track: &PlayableElement) -> &PlayableElement {
        let element = match self.element.take() {
            Some(existing) => {
                existing.load_from(track);
                existing
            }
            None => track.fork(),
        };
        self.element.insert(element)
    }

    pub fn element(&self) -> Option<&PlayableElement> {
        self.element.as_ref()
    }

    /// Where the current source came from
    pub fn src(&self) -> Option<String> {
        self.element.as_ref().map(PlayableElement::src)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioContext, FrequencySampler, OfflineContext, OfflineDestination};
    use crate::params::{AmplitudeRange, AnalyserConfig};
    use crate::pending::Pending;
    use crate::recording::{
        Capture, PermissionResult, Recorder, RecorderError, RecordingController, RecordingEvent,
    };
    use crate::uniforms::{U_DATA_ARR, U_TIME};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Factory = Box<dyn FnMut() -> Result<Box<dyn AudioContext>, AudioError>>;

    fn offline_trigger(
        count: Rc<RefCell<usize>>,
        destinations: Rc<RefCell<Vec<OfflineDestination>>>,
    ) -> PlaybackTrigger<Factory> {
        let factory: Factory = Box::new(move || {
            *count.borrow_mut() += 1;
            let (context, destination) = OfflineContext::new(44100);
            destinations.borrow_mut().push(destination);
            Ok(Box::new(context) as Box<dyn AudioContext>)
        });
        PlaybackTrigger::new(AudioEngine::new(factory, AnalyserConfig::default()).unwrap())
    }

    fn tone() -> PlayableElement {
        let samples = (0..22050)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();
        PlayableElement::from_samples("tone.wav", samples, 44100).unwrap()
    }

    struct ToneRecorder;

    impl Recorder for ToneRecorder {
        fn start(&mut self) -> Result<(), RecorderError> {
            Ok(())
        }

        fn stop(&mut self) -> Pending<Result<Capture, RecorderError>> {
            let samples = (0..8000).map(|i| (i as f32 * 0.1).sin() * 0.4).collect();
            Pending::ready(Ok(Capture::new(samples, 8000, 1)))
        }
    }

    #[test]
    fn test_recorded_clip_is_bound() {
        let mut query = || Pending::ready(PermissionResult::Granted);
        let mut controller = RecordingController::new(ToneRecorder, &mut query);
        controller.wait_settled();

        controller.start_recording().unwrap();
        controller.stop_recording();

        let mut binding = SessionPlayer::new();
        for event in controller.wait_settled() {
            if let RecordingEvent::ArtifactReady(url) = event {
                binding.bind(controller.artifacts(), &url).unwrap();
            }
        }

        let url = controller.artifact().unwrap();
        assert!(!url.as_str().is_empty());
        assert_eq!(binding.src().as_deref(), Some(url.as_str()));

        let element = binding.element().unwrap();
        assert_eq!(element.sample_rate(), 8000);
        assert!((element.duration_secs() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn test_rebinding_keeps_the_graph_element() {
        let mut query = || Pending::ready(PermissionResult::Granted);
        let mut controller = RecordingController::new(ToneRecorder, &mut query);
        controller.wait_settled();

        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));
        let mut binding = SessionPlayer::new();

        let mut ids = Vec::new();
        for _ in 0..2 {
            controller.start_recording().unwrap();
            controller.stop_recording();
            for event in controller.wait_settled() {
                if let RecordingEvent::ArtifactReady(url) = event {
                    let element = binding.bind(controller.artifacts(), &url).unwrap();
                    element.play();
                    trigger.on_play(element).unwrap();
                    ids.push(element.id());
                }
            }
        }

        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
        assert_eq!(*count.borrow(), 1);
        assert_eq!(trigger.engine().bound_element(), Some(ids[1]));
        assert_eq!(
            binding.src().as_deref(),
            controller.artifact().map(|url| url.as_str())
        );

        // The graph hears the second clip
        let block = destinations.borrow()[0].pull(256);
        assert!(block.iter().any(|s| s.abs() > 0.01));
    }

    #[test]
    fn test_bind_unknown_artifact() {
        let store = ArtifactStore::new();
        let mut other = ArtifactStore::new();
        let url = other.create_url(crate::recording::Blob::new(vec![0; 4], "audio/wav"));

        let mut binding = SessionPlayer::new();
        let err = binding.bind(&store, &url).unwrap_err();
        assert!(matches!(err, AudioError::UnknownArtifact(_)));
        assert!(binding.element().is_none());
    }

    #[test]
    fn test_second_playback_reuses_graph() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));

        let element = tone();
        element.play();
        assert!(matches!(trigger.on_play(&element), Ok(InitOutcome::Built(_))));
        assert_eq!(trigger.state(), TriggerState::Running);
        let graph = trigger.engine().graph_id();

        element.pause();
        element.play();
        assert!(matches!(trigger.on_play(&element), Ok(InitOutcome::Reused(_))));

        assert_eq!(*count.borrow(), 1);
        assert_eq!(trigger.engine().graph_id(), graph);
        assert_eq!(trigger.engine().bound_element(), Some(element.id()));
    }

    #[test]
    fn test_unbound_element_is_refused() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));

        let first = tone();
        first.play();
        trigger.on_play(&first).unwrap();

        let second = tone();
        assert!(second.play());
        let err = trigger.on_play(&second).unwrap_err();
        assert!(matches!(
            err,
            PlaybackError::Unbound { element, bound } if element == second.id() && bound == first.id()
        ));
        assert!(!second.is_playing());
        assert_eq!(trigger.engine().bound_element(), Some(first.id()));

        // Only the bound element renders; the refused one can be asked again
        destinations.borrow()[0].pull(4410);
        assert!(first.current_time() > 0.0);
        assert_eq!(second.current_time(), 0.0);
        assert!(second.play());
    }

    #[test]
    fn test_track_then_clip_share_the_graph() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));
        let mut player = SessionPlayer::new();

        let track = tone();
        let element = player.cue(&track);
        assert!(element.play());
        assert!(matches!(trigger.on_play(element), Ok(InitOutcome::Built(_))));
        destinations.borrow()[0].pull(2205);
        assert!(!track.is_playing());

        let mut query = || Pending::ready(PermissionResult::Granted);
        let mut controller = RecordingController::new(ToneRecorder, &mut query);
        controller.wait_settled();
        controller.start_recording().unwrap();
        controller.stop_recording();
        let url = match controller.wait_settled().as_slice() {
            [RecordingEvent::ArtifactReady(url)] => url.clone(),
            other => panic!("unexpected events: {:?}", other),
        };

        // The clip interrupts the track on the same element
        let element = player.bind(controller.artifacts(), &url).unwrap();
        assert!(element.play());
        assert!(matches!(trigger.on_play(element), Ok(InitOutcome::Reused(_))));
        assert_eq!(player.src().as_deref(), Some(url.as_str()));

        let block = destinations.borrow()[0].pull(800);
        assert!(block.iter().any(|s| s.abs() > 0.01));
        let element = player.element().unwrap();
        assert!(element.current_time() > 0.0);

        // And back to the track
        let element = player.cue(&track);
        assert_eq!(element.src(), "tone.wav");
        assert!(element.play());
        assert!(trigger.on_play(element).is_ok());
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_frames_feed_uniforms() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));
        let mut uniforms = UniformSet::surface(&AmplitudeRange::default());

        // Nothing happens before playback
        assert_eq!(trigger.frame(0.0, &mut uniforms).unwrap(), FrameStatus::Idle);

        let element = tone();
        element.play();
        trigger.on_play(&element).unwrap();

        let mut last = 0.0;
        for t in [0.016, 0.033, 0.050] {
            destinations.borrow()[0].pull(735);
            let status = trigger.frame(t, &mut uniforms).unwrap();
            assert_eq!(status, FrameStatus::Continue);

            let now = uniforms.float(U_TIME).unwrap();
            assert!(now >= last);
            last = now;
            assert_eq!(uniforms.array(U_DATA_ARR).unwrap().len(), 512);
        }

        let data = uniforms.array(U_DATA_ARR).unwrap();
        assert!(data.iter().any(|&v| v > 0.0));
        assert_eq!(trigger.feed().frames(), 3);
    }

    #[test]
    fn test_context_failure_is_not_retried() {
        let attempts = Rc::new(RefCell::new(0));
        let counter = Rc::clone(&attempts);
        let factory = move || -> Result<Box<dyn AudioContext>, AudioError> {
            *counter.borrow_mut() += 1;
            Err(AudioError::ContextUnavailable("no device".into()))
        };
        let mut trigger =
            PlaybackTrigger::new(AudioEngine::new(factory, AnalyserConfig::default()).unwrap());
        let mut uniforms = UniformSet::surface(&AmplitudeRange::default());

        let element = tone();
        for _ in 0..2 {
            element.play();
            assert!(matches!(trigger.on_play(&element), Err(PlaybackError::Unavailable)));
            assert_eq!(trigger.state(), TriggerState::Failed);
            // Nothing will render it, so it does not stay "playing"
            assert!(!element.is_playing());
        }
        assert_eq!(*attempts.borrow(), 1);

        assert_eq!(trigger.frame(1.0, &mut uniforms).unwrap(), FrameStatus::Idle);
        assert_eq!(uniforms.float(U_TIME), Some(0.0));
    }

    #[test]
    fn test_shutdown_cancels_and_disposes() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut trigger = offline_trigger(Rc::clone(&count), Rc::clone(&destinations));
        let mut uniforms = UniformSet::surface(&AmplitudeRange::default());

        let element = tone();
        element.play();
        trigger.on_play(&element).unwrap();
        trigger.frame(0.1, &mut uniforms).unwrap();

        trigger.shutdown();
        assert!(!trigger.engine().is_initialized());
        assert!(!destinations.borrow()[0].is_connected());
        assert_eq!(trigger.frame(0.2, &mut uniforms).unwrap(), FrameStatus::Cancelled);
        assert!(trigger.engine.sample().is_none());
    }
}
