//! Wavemesh - A wireframe surface that dances to whatever is playing
//!
//! Record a clip from the microphone, play it back (or a pre-loaded track)
//! and the plane's vertices ride the frequency spectrum.

use std::error::Error;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use log::{error, info, warn};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Window, WindowId},
};

use wavemesh::audio::{AudioEngine, CpalContextFactory, PlayableElement};
use wavemesh::cli::Args;
use wavemesh::controls::ControlPanel;
use wavemesh::feed::FrameStatus;
use wavemesh::params::*;
use wavemesh::recording::{
    MicRecorder, MicrophoneProbe, PermissionResult, RecordingController, RecordingEvent,
    RecordingState,
};
use wavemesh::rendering::{RenderSystem, SurfaceUniforms};
use wavemesh::scene::{self, SurfaceMesh};
use wavemesh::trigger::{PlaybackTrigger, SessionPlayer, TriggerState};
use wavemesh::uniforms::{UniformSet, U_AMPLITUDE};

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,
    mesh: SurfaceMesh,
    render_config: RenderConfig,

    // Audio pipeline and shader inputs
    uniforms: UniformSet,
    trigger: PlaybackTrigger<CpalContextFactory>,
    controls: Option<ControlPanel>,
    wireframe: bool,

    // Sources and the one player they are loaded into
    recorder: RecordingController<MicRecorder>,
    player: SessionPlayer,
    track: Option<PlayableElement>,

    // Latest user-visible message (shown in the title)
    notice: String,
    fatal: Option<String>,
    start_time: Instant,
}

impl App {
    fn new(args: &Args) -> Result<Self, Box<dyn Error>> {
        let analyser = AnalyserConfig::default();
        analyser.validate_for_shader(DATA_ARRAY_LEN)?;

        let range = AmplitudeRange::default();
        range.validate()?;
        let amplitude = args.initial_amplitude(&range);

        let mut uniforms = UniformSet::surface(&range);
        uniforms.set(U_AMPLITUDE, amplitude)?;

        let controls = if args.no_controls {
            info!("Control panel disabled");
            None
        } else {
            Some(ControlPanel::new(range, amplitude, !args.solid))
        };

        let track = match &args.track {
            Some(path) => {
                let element = PlayableElement::open(path)?;
                info!(
                    "Track loaded: {} ({:.1}s)",
                    element.src(),
                    element.duration_secs()
                );
                Some(element)
            }
            None => None,
        };

        let engine = AudioEngine::new(CpalContextFactory, analyser)?;
        let recorder =
            RecordingController::new(MicRecorder::new(RecorderConfig::default()), &mut MicrophoneProbe);

        Ok(Self {
            window: None,
            render_system: None,
            mesh: SurfaceMesh::new(&SurfaceGeometry::default()),
            render_config: RenderConfig::default(),
            uniforms,
            trigger: PlaybackTrigger::new(engine),
            controls,
            wireframe: !args.solid,
            recorder,
            player: SessionPlayer::new(),
            track,
            notice: String::new(),
            fatal: None,
            start_time: Instant::now(),
        })
    }

    fn wireframe(&self) -> bool {
        self.controls
            .as_ref()
            .map_or(self.wireframe, ControlPanel::wireframe)
    }

    fn set_notice(&mut self, notice: impl Into<String>) {
        self.notice = notice.into();
    }

    /// Record button: offers only the transition legal for the current state
    fn toggle_recording(&mut self) {
        match self.recorder.state() {
            RecordingState::Idle => match self.recorder.start_recording() {
                Ok(()) => self.set_notice(""),
                Err(e) => {
                    warn!("{}", e);
                    self.set_notice(e.to_string());
                }
            },
            RecordingState::Recording => self.recorder.stop_recording(),
        }
    }

    /// Start the player and report playback nothing will render
    fn start_player(&mut self) {
        let Some(element) = self.player.element() else {
            return;
        };
        if !element.play() {
            return;
        }
        if let Err(e) = self.trigger.on_play(element) {
            warn!("{}", e);
            self.notice = e.to_string();
        }
    }

    fn play_track(&mut self) {
        let Some(track) = &self.track else {
            info!("No track loaded (use --track)");
            return;
        };
        if self.player.src() != Some(track.src()) {
            self.player.cue(track);
        }
        self.start_player();
    }

    fn replay_clip(&mut self) {
        let Some(url) = self.recorder.artifact().cloned() else {
            info!("Nothing recorded yet");
            return;
        };
        if self.player.src().as_deref() != Some(url.as_str()) {
            let loaded = self.player.bind(self.recorder.artifacts(), &url).map(|_| ());
            if let Err(e) = loaded {
                error!("Could not load clip {}: {}", url, e);
                self.set_notice(e.to_string());
                return;
            }
        }
        self.start_player();
    }

    fn handle_recording_event(&mut self, event: RecordingEvent) {
        match event {
            RecordingEvent::PermissionResolved(PermissionResult::Denied) => {
                self.set_notice("microphone blocked");
            }
            RecordingEvent::PermissionResolved(PermissionResult::Granted) => {}
            RecordingEvent::ArtifactReady(url) => {
                // Autoplay the fresh clip
                let loaded = self.player.bind(self.recorder.artifacts(), &url).map(|_| ());
                match loaded {
                    Ok(()) => self.start_player(),
                    Err(e) => {
                        error!("Could not load clip {}: {}", url, e);
                        self.set_notice(e.to_string());
                    }
                }
            }
            RecordingEvent::Lost(e) => self.set_notice(e.to_string()),
        }
    }

    fn handle_key(&mut self, code: KeyCode, repeat: bool, event_loop: &ActiveEventLoop) {
        match code {
            KeyCode::Escape => event_loop.exit(),
            KeyCode::ArrowUp | KeyCode::ArrowDown => {
                if let Some(controls) = self.controls.as_mut() {
                    let steps = if code == KeyCode::ArrowUp { 1 } else { -1 };
                    controls.nudge_amplitude(steps);
                }
            }
            _ if repeat => {}
            KeyCode::KeyR => self.toggle_recording(),
            KeyCode::KeyP => self.play_track(),
            KeyCode::Enter => self.replay_clip(),
            KeyCode::KeyW => {
                if let Some(controls) = self.controls.as_mut() {
                    controls.toggle_wireframe();
                }
            }
            _ => {}
        }
    }

    fn status_line(&self) -> String {
        let recording = match (self.recorder.state(), self.recorder.is_settling()) {
            (RecordingState::Idle, _) => "R: record",
            (RecordingState::Recording, false) => "REC (R: stop)",
            (RecordingState::Recording, true) => "encoding...",
        };
        let audio = match self.trigger.state() {
            TriggerState::Waiting => "waiting for playback",
            TriggerState::Running => "live",
            TriggerState::Failed => "audio unavailable",
        };
        let amplitude = self.uniforms.float(U_AMPLITUDE).unwrap_or_default();

        let mut title = format!(
            "Wavemesh | {} | {} | amplitude {:.2}",
            recording, audio, amplitude
        );
        if !self.notice.is_empty() {
            title.push_str(" | ");
            title.push_str(&self.notice);
        }
        title
    }

    /// Render a single frame
    fn render_frame(&mut self) {
        for event in self.recorder.poll() {
            self.handle_recording_event(event);
        }

        let time_s = self.start_time.elapsed().as_secs_f32();
        match self.trigger.frame(time_s, &mut self.uniforms) {
            Ok(FrameStatus::Cancelled) => info!("Uniform feed stopped"),
            Ok(_) => {}
            Err(e) => error!("Uniform update failed: {}", e),
        }

        if let Some(controls) = &self.controls {
            if let Err(e) = controls.apply(&mut self.uniforms) {
                error!("Amplitude update failed: {}", e);
            }
        }

        let wireframe = self.wireframe();
        let Some(render_system) = self.render_system.as_mut() else {
            return;
        };

        let view_proj = scene::view_proj(&self.render_config, render_system.aspect_ratio());
        let mvp = view_proj * self.mesh.model_matrix();
        render_system.update_uniforms(&SurfaceUniforms::pack(&self.uniforms, mvp));

        match render_system.render(wireframe) {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(window) = &self.window {
                    let size = window.inner_size();
                    render_system.resize(size.width, size.height);
                }
            }
            Err(e) => error!("Render error: {:?}", e),
        }

        if let Some(window) = &self.window {
            window.set_title(&self.status_line());
        }
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let window_attributes = Window::default_attributes()
            .with_title("Wavemesh")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.render_config.window_width,
                self.render_config.window_height,
            ));

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                self.fatal = Some(format!("failed to create window: {}", e));
                event_loop.exit();
                return;
            }
        };

        // The surface mesh is the scene's only object
        match pollster::block_on(RenderSystem::new(Arc::clone(&window), &self.mesh)) {
            Ok(render_system) => self.render_system = Some(render_system),
            Err(e) => {
                self.fatal = Some(e.to_string());
                event_loop.exit();
                return;
            }
        }

        info!("Wavemesh is running: R record, P play track, Enter replay clip, Up/Down amplitude, W wireframe, Esc quit");
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                if let Some(render_system) = self.render_system.as_mut() {
                    render_system.resize(size.width, size.height);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat,
                        ..
                    },
                ..
            } => self.handle_key(code, repeat, event_loop),
            WindowEvent::RedrawRequested => {
                self.render_frame();
            }
            _ => {}
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.trigger.shutdown();
        self.recorder.shutdown();
        info!("Session ended");
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut app = App::new(&args)?;

    let event_loop = EventLoop::new()?;
    event_loop.run_app(&mut app)?;

    match app.fatal.take() {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}
