//! Playable elements and the source node that renders them.

use log::{debug, info};
use parking_lot::Mutex;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::analyser::SampleTap;
use super::AudioError;

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a playable element (unique per process)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementId(u64);

impl std::fmt::Display for ElementId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "element#{}", self.0)
    }
}

/// Player with a swappable source and a shared play-head
///
/// Clones share everything, so the UI thread can start playback or load a
/// new source while the audio thread renders from the same element. The
/// identity survives source changes; a graph built on the element keeps
/// working after `load_*`.
#[derive(Clone)]
pub struct PlayableElement {
    inner: Arc<ElementInner>,
}

struct ElementInner {
    id: ElementId,
    media: Mutex<Media>,
}

struct Media {
    src: String,
    samples: Arc<[f32]>,
    sample_rate: u32,
    /// Fractional position in source samples
    position: f64,
    playing: bool,
}

impl PlayableElement {
    /// Wrap already-decoded mono samples
    pub fn from_samples(
        src: impl Into<String>,
        samples: Vec<f32>,
        sample_rate: u32,
    ) -> Result<Self, AudioError> {
        let media = Media::new(src.into(), samples, sample_rate)?;
        Ok(Self {
            inner: Arc::new(ElementInner {
                id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
                media: Mutex::new(media),
            }),
        })
    }

    /// Decode an in-memory WAV clip (a recorded artifact)
    pub fn from_wav_bytes(src: impl Into<String>, bytes: &[u8]) -> Result<Self, AudioError> {
        let src = src.into();
        let (samples, sample_rate) = decode(&src, hound::WavReader::new(Cursor::new(bytes))?)?;
        Self::from_samples(src, samples, sample_rate)
    }

    /// Load a WAV file from disk (the pre-loaded track)
    pub fn open(path: &Path) -> Result<Self, AudioError> {
        let src = path.display().to_string();
        let (samples, sample_rate) = decode(&src, hound::WavReader::open(path)?)?;
        Self::from_samples(src, samples, sample_rate)
    }

    /// Replace the source with an in-memory WAV clip
    ///
    /// Stops playback and rewinds. On error the current source is kept.
    pub fn load_wav_bytes(&self, src: impl Into<String>, bytes: &[u8]) -> Result<(), AudioError> {
        let src = src.into();
        let (samples, sample_rate) = decode(&src, hound::WavReader::new(Cursor::new(bytes))?)?;
        let media = Media::new(src, samples, sample_rate)?;

        info!("{} now sourced from {}", self.inner.id, media.src);
        *self.inner.media.lock() = media;
        Ok(())
    }

    /// Replace the source with `other`'s media, sharing its samples
    ///
    /// Stops playback and rewinds, like `load_wav_bytes`.
    pub fn load_from(&self, other: &PlayableElement) {
        let media = other.inner.media.lock().cued();
        info!("{} now sourced from {}", self.inner.id, media.src);
        *self.inner.media.lock() = media;
    }

    /// New element over the same samples, with its own identity and play-head
    pub fn fork(&self) -> PlayableElement {
        let media = self.inner.media.lock().cued();
        Self {
            inner: Arc::new(ElementInner {
                id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
                media: Mutex::new(media),
            }),
        }
    }

    pub fn id(&self) -> ElementId {
        self.inner.id
    }

    /// Where the audio came from (file path or reference URL)
    pub fn src(&self) -> String {
        self.inner.media.lock().src.clone()
    }

    pub fn sample_rate(&self) -> u32 {
        self.inner.media.lock().sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        let media = self.inner.media.lock();
        media.samples.len() as f32 / media.sample_rate as f32
    }

    pub fn is_playing(&self) -> bool {
        self.inner.media.lock().playing
    }

    /// Current play-head position in seconds
    pub fn current_time(&self) -> f32 {
        let media = self.inner.media.lock();
        media.position as f32 / media.sample_rate as f32
    }

    /// Begin playback; rewinds first if the clip has ended
    ///
    /// Returns `true` when this call started playback (the play event).
    pub fn play(&self) -> bool {
        let mut media = self.inner.media.lock();
        if media.playing {
            return false;
        }
        if media.position >= media.samples.len() as f64 {
            media.position = 0.0;
        }
        media.playing = true;
        info!("Playing {} ({})", self.inner.id, media.src);
        true
    }

    pub fn pause(&self) {
        self.inner.media.lock().playing = false;
    }

    /// Render mono output at `output_rate`, advancing the play-head
    ///
    /// Writes silence when paused or past the end.
    fn render(&self, out: &mut [f32], output_rate: u32) {
        let mut media = self.inner.media.lock();
        let step = media.sample_rate as f64 / output_rate.max(1) as f64;
        let samples = Arc::clone(&media.samples);

        for slot in out.iter_mut() {
            if !media.playing {
                *slot = 0.0;
                continue;
            }

            let index = media.position as usize;
            if index >= samples.len() {
                media.playing = false;
                *slot = 0.0;
                continue;
            }

            // Linear interpolation between neighbouring source samples
            let frac = (media.position - index as f64) as f32;
            let current = samples[index];
            let next = samples.get(index + 1).copied().unwrap_or(current);
            *slot = current + (next - current) * frac;
            media.position += step;
        }
    }
}

impl std::fmt::Debug for PlayableElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let media = self.inner.media.lock();
        f.debug_struct("PlayableElement")
            .field("id", &self.inner.id)
            .field("src", &media.src)
            .field("sample_rate", &media.sample_rate)
            .finish()
    }
}

impl Media {
    fn new(src: String, samples: Vec<f32>, sample_rate: u32) -> Result<Self, AudioError> {
        if samples.is_empty() || sample_rate == 0 {
            return Err(AudioError::EmptySource(src));
        }
        Ok(Self {
            src,
            samples: samples.into(),
            sample_rate,
            position: 0.0,
            playing: false,
        })
    }

    /// Same source, stopped at the start
    fn cued(&self) -> Self {
        Self {
            src: self.src.clone(),
            samples: Arc::clone(&self.samples),
            sample_rate: self.sample_rate,
            position: 0.0,
            playing: false,
        }
    }
}

/// Decode to mono floats, returning `(samples, sample_rate)`
fn decode<R: Read>(src: &str, mut reader: hound::WavReader<R>) -> Result<(Vec<f32>, u32), AudioError> {
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let full_scale = (1_i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / full_scale))
                .collect::<Result<_, _>>()?
        }
    };

    // Downmix to mono
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    debug!(
        "Decoded {}: {} frames, {}ch @ {}Hz",
        src,
        mono.len(),
        channels,
        spec.sample_rate
    );

    Ok((mono, spec.sample_rate))
}

/// Graph node reading from an element and teeing into the analyser
pub struct SourceNode {
    element: PlayableElement,
    tap: SampleTap,
    output_rate: u32,
}

impl SourceNode {
    pub fn new(element: PlayableElement, tap: SampleTap, output_rate: u32) -> Self {
        Self {
            element,
            tap,
            output_rate,
        }
    }

    pub fn element_id(&self) -> ElementId {
        self.element.id()
    }

    /// Fill one mono block for the destination
    pub fn render(&mut self, out: &mut [f32]) {
        self.element.render(out, self.output_rate);
        self.tap.push(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav_bytes(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_ids_are_unique() {
        let a = PlayableElement::from_samples("a", vec![0.0; 4], 8000).unwrap();
        let b = PlayableElement::from_samples("b", vec![0.0; 4], 8000).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(a.id(), a.clone().id());
    }

    #[test]
    fn test_empty_source_rejected() {
        let err = PlayableElement::from_samples("empty", Vec::new(), 44100).unwrap_err();
        assert!(matches!(err, AudioError::EmptySource(_)));
    }

    #[test]
    fn test_decode_stereo_wav_downmixes() {
        // Two stereo frames: (16384, 0) and (-16384, -16384)
        let bytes = wav_bytes(&[16384, 0, -16384, -16384], 22050, 2);
        let element = PlayableElement::from_wav_bytes("blob:test", &bytes).unwrap();

        assert_eq!(element.src(), "blob:test");
        assert_eq!(element.sample_rate(), 22050);
        assert!((element.duration_secs() - 2.0 / 22050.0).abs() < 1e-9);

        element.play();
        let mut out = [0.0; 2];
        element.render(&mut out, 22050);
        assert!((out[0] - 0.25).abs() < 1e-4);
        assert!((out[1] + 0.5).abs() < 1e-4);
    }

    #[test]
    fn test_garbage_bytes_fail_to_decode() {
        let err = PlayableElement::from_wav_bytes("blob:bad", b"not a wav").unwrap_err();
        assert!(matches!(err, AudioError::Decode(_)));
    }

    #[test]
    fn test_render_silent_until_played() {
        let element = PlayableElement::from_samples("tone", vec![0.5; 8], 8000).unwrap();
        let mut out = [1.0; 4];
        element.render(&mut out, 8000);
        assert_eq!(out, [0.0; 4]);

        assert!(element.play());
        assert!(!element.play()); // already playing, no second play event
        element.render(&mut out, 8000);
        assert_eq!(out, [0.5; 4]);
    }

    #[test]
    fn test_playback_ends_and_rewinds() {
        let element = PlayableElement::from_samples("short", vec![0.5; 3], 8000).unwrap();
        element.play();

        let mut out = [1.0; 5];
        element.render(&mut out, 8000);
        assert_eq!(out, [0.5, 0.5, 0.5, 0.0, 0.0]);
        assert!(!element.is_playing());

        assert!(element.play());
        assert_eq!(element.current_time(), 0.0);
    }

    #[test]
    fn test_resamples_to_output_rate() {
        let element = PlayableElement::from_samples("ramp", vec![0.0, 1.0, 2.0, 3.0], 8000).unwrap();
        element.play();

        // Output at twice the source rate interpolates midpoints
        let mut out = [0.0; 4];
        element.render(&mut out, 16000);
        assert_eq!(out, [0.0, 0.5, 1.0, 1.5]);
    }

    #[test]
    fn test_source_node_feeds_tap() {
        let element = PlayableElement::from_samples("tone", vec![0.25; 16], 8000).unwrap();
        element.play();
        let tap = SampleTap::new(4);
        let mut node = SourceNode::new(element.clone(), tap.clone(), 8000);

        let mut out = [0.0; 4];
        node.render(&mut out);
        assert_eq!(node.element_id(), element.id());

        let mut latest = [0.0; 4];
        tap.copy_latest(&mut latest);
        assert_eq!(latest, [0.25; 4]);
    }

    #[test]
    fn test_load_keeps_identity_and_rewinds() {
        let element = PlayableElement::from_samples("first", vec![0.5; 8], 8000).unwrap();
        let shared = element.clone();
        element.play();
        let mut out = [0.0; 4];
        element.render(&mut out, 8000);

        let bytes = wav_bytes(&[8192; 16], 16000, 1);
        shared.load_wav_bytes("blob:second", &bytes).unwrap();

        assert_eq!(element.id(), shared.id());
        assert_eq!(element.src(), "blob:second");
        assert_eq!(element.sample_rate(), 16000);
        assert!(!element.is_playing());
        assert_eq!(element.current_time(), 0.0);

        // A failed load leaves the source alone
        assert!(element.load_wav_bytes("blob:bad", b"junk").is_err());
        assert_eq!(element.src(), "blob:second");
    }

    #[test]
    fn test_load_from_shares_samples_under_own_identity() {
        let track = PlayableElement::from_samples("track.wav", vec![0.5; 8], 8000).unwrap();
        let player = track.fork();
        assert_ne!(player.id(), track.id());
        assert_eq!(player.src(), "track.wav");

        // The fork plays independently of the element it came from
        player.play();
        let mut out = [0.0; 4];
        player.render(&mut out, 8000);
        assert_eq!(out, [0.5; 4]);
        assert!(!track.is_playing());

        let clip = PlayableElement::from_samples("blob:clip", vec![0.25; 4], 4000).unwrap();
        let id = player.id();
        player.load_from(&clip);
        assert_eq!(player.id(), id);
        assert_eq!(player.src(), "blob:clip");
        assert_eq!(player.sample_rate(), 4000);
        assert!(!player.is_playing());
        assert_eq!(player.current_time(), 0.0);
    }
}
