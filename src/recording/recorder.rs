//! Recorder seam and the cpal microphone implementation.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use crossbeam_channel::bounded;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use thiserror::Error;

use super::artifact::Blob;
use crate::params::RecorderConfig;
use crate::pending::Pending;

/// MIME type of encoded clips
pub const CLIP_MIME: &str = "audio/wav";

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no audio input device")]
    NoDevice,

    #[error("input stream failed: {0}")]
    Stream(String),

    #[error("recorder is already capturing")]
    AlreadyRecording,

    #[error("recorder is not capturing")]
    NotRecording,

    #[error("capture contains no audio")]
    EmptyCapture,

    #[error("WAV encoding failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("capture thread failed: {0}")]
    Thread(String),
}

/// Underlying capture device
pub trait Recorder {
    /// Open the capture session
    fn start(&mut self) -> Result<(), RecorderError>;

    /// Close the capture session
    ///
    /// Must not block: the capture is handed back once the device side has
    /// shut down.
    fn stop(&mut self) -> Pending<Result<Capture, RecorderError>>;
}

/// Raw interleaved samples from a finished capture session
#[derive(Debug, Clone)]
pub struct Capture {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: u16,
}

/// Output of [`Capture::encode`]
#[derive(Debug, Clone)]
pub struct EncodedClip {
    /// Mono 16-bit little-endian PCM payload
    pub buffer: Vec<u8>,

    /// Complete WAV file
    pub blob: Blob,
}

impl Capture {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }

    /// Downmix to mono and encode as 16-bit WAV
    pub fn encode(self) -> Result<EncodedClip, RecorderError> {
        if self.frames() == 0 || self.sample_rate == 0 {
            return Err(RecorderError::EmptyCapture);
        }

        let pcm: Vec<i16> = self
            .samples
            .chunks_exact(self.channels as usize)
            .map(|frame| {
                let mono = frame.iter().sum::<f32>() / frame.len() as f32;
                (mono.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
            })
            .collect();

        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
            for &sample in &pcm {
                writer.write_sample(sample)?;
            }
            writer.finalize()?;
        }

        let buffer = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
        debug!(
            "Encoded {} frames ({:.2}s) @ {}Hz",
            pcm.len(),
            self.duration_secs(),
            self.sample_rate
        );

        Ok(EncodedClip {
            buffer,
            blob: Blob::new(cursor.into_inner(), CLIP_MIME),
        })
    }
}

/// Microphone recorder on the default cpal input device
///
/// The input stream lives on a dedicated thread for the duration of the
/// capture session. `stop` raises the session's stop flag and joins that
/// thread on a worker, so the caller never waits on the device.
pub struct MicRecorder {
    config: RecorderConfig,
    session: Option<CaptureSession>,
}

/// One open capture: fresh buffers per session
struct CaptureSession {
    samples: Arc<Mutex<Vec<f32>>>,
    stop_signal: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
    sample_rate: u32,
    channels: u16,
}

impl CaptureSession {
    /// Signal, join and collect (blocking)
    fn finish(self) -> Result<Capture, RecorderError> {
        self.stop_signal.store(true, Ordering::Release);
        self.thread
            .join()
            .map_err(|_| RecorderError::Thread("capture thread panicked".into()))?;

        let samples = std::mem::take(&mut *self.samples.lock());
        info!(
            "Captured {} samples ({}ch @ {}Hz)",
            samples.len(),
            self.channels,
            self.sample_rate
        );
        Ok(Capture::new(samples, self.sample_rate, self.channels))
    }
}

impl MicRecorder {
    pub fn new(config: RecorderConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.session.is_some()
    }
}

impl Recorder for MicRecorder {
    fn start(&mut self) -> Result<(), RecorderError> {
        if self.session.is_some() {
            return Err(RecorderError::AlreadyRecording);
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let stop_signal = Arc::new(AtomicBool::new(false));
        let config = self.config.clone();
        let (tx, rx) = bounded::<Result<(u32, u16), RecorderError>>(1);

        let thread_samples = Arc::clone(&samples);
        let thread_stop = Arc::clone(&stop_signal);
        let handle = thread::Builder::new()
            .name("mic-capture".to_string())
            .spawn(move || {
                let host = cpal::default_host();
                let Some(device) = host.default_input_device() else {
                    let _ = tx.send(Err(RecorderError::NoDevice));
                    return;
                };

                let input_config = match device.default_input_config() {
                    Ok(c) => c,
                    Err(e) => {
                        let _ = tx.send(Err(RecorderError::Stream(format!("input config: {}", e))));
                        return;
                    }
                };

                let sample_rate = input_config.sample_rate().0;
                let channels = input_config.channels();
                let cap = config.max_samples(sample_rate, channels);
                let stream_config: cpal::StreamConfig = input_config.config();

                let built = match input_config.sample_format() {
                    cpal::SampleFormat::F32 => {
                        build_input::<f32>(&device, &stream_config, thread_samples, cap)
                    }
                    cpal::SampleFormat::I16 => {
                        build_input::<i16>(&device, &stream_config, thread_samples, cap)
                    }
                    cpal::SampleFormat::U16 => {
                        build_input::<u16>(&device, &stream_config, thread_samples, cap)
                    }
                    other => Err(RecorderError::Stream(format!(
                        "unsupported input sample format: {}",
                        other
                    ))),
                };
                let stream = match built {
                    Ok(s) => s,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        return;
                    }
                };

                if let Err(e) = stream.play() {
                    let _ = tx.send(Err(RecorderError::Stream(format!("start input stream: {}", e))));
                    return;
                }

                info!(
                    "Capturing from {} @ {}Hz, {}ch",
                    device.name().unwrap_or_else(|_| "Unknown".to_string()),
                    sample_rate,
                    channels
                );
                let _ = tx.send(Ok((sample_rate, channels)));

                // Keep the stream alive until stop is signaled
                while !thread_stop.load(Ordering::Acquire) {
                    thread::sleep(Duration::from_millis(config.stop_poll_ms));
                }
                drop(stream);
            })
            .map_err(|e| RecorderError::Thread(e.to_string()))?;

        let ready = rx
            .recv()
            .unwrap_or_else(|_| Err(RecorderError::Thread("capture thread exited".into())));

        match ready {
            Ok((sample_rate, channels)) => {
                self.session = Some(CaptureSession {
                    samples,
                    stop_signal,
                    thread: handle,
                    sample_rate,
                    channels,
                });
                Ok(())
            }
            Err(e) => {
                let _ = handle.join();
                Err(e)
            }
        }
    }

    fn stop(&mut self) -> Pending<Result<Capture, RecorderError>> {
        match self.session.take() {
            Some(session) => {
                // Raise the flag now; the join happens off the caller's thread
                session.stop_signal.store(true, Ordering::Release);
                Pending::spawn("mic-stop", move || session.finish())
            }
            None => Pending::ready(Err(RecorderError::NotRecording)),
        }
    }
}

impl Drop for MicRecorder {
    fn drop(&mut self) {
        if let Some(session) = self.session.take() {
            if let Err(e) = session.finish() {
                warn!("Recorder shutdown: {}", e);
            }
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    samples: Arc<Mutex<Vec<f32>>>,
    cap: usize,
) -> Result<cpal::Stream, RecorderError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                append_capped(&mut samples.lock(), data, cap);
            },
            |err| error!("Input stream error: {}", err),
            None,
        )
        .map_err(|e| RecorderError::Stream(format!("build input stream: {}", e)))
}

/// Convert device samples to floats, dropping whatever exceeds `cap`
fn append_capped<T>(buffer: &mut Vec<f32>, data: &[T], cap: usize)
where
    T: Sample,
    f32: FromSample<T>,
{
    let room = cap.saturating_sub(buffer.len());
    buffer.extend(data.iter().take(room).map(|&s| f32::from_sample(s)));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_produces_decodable_wav() {
        // Stereo frames averaging to 0.5 and -0.5
        let capture = Capture::new(vec![1.0, 0.0, -0.5, -0.5], 16000, 2);
        assert_eq!(capture.frames(), 2);

        let clip = capture.encode().unwrap();
        assert_eq!(clip.blob.mime(), "audio/wav");
        assert_eq!(clip.buffer.len(), 4);

        let mut reader = hound::WavReader::new(Cursor::new(clip.blob.bytes())).unwrap();
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.spec().sample_rate, 16000);

        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![16383, -16383]);
        assert_eq!(clip.buffer, [16383_i16.to_le_bytes(), (-16383_i16).to_le_bytes()].concat());
    }

    #[test]
    fn test_encode_clamps_overdriven_input() {
        let clip = Capture::new(vec![4.0, -4.0], 8000, 1).encode().unwrap();
        let mut reader = hound::WavReader::new(Cursor::new(clip.blob.bytes())).unwrap();
        let decoded: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(decoded, vec![i16::MAX, -i16::MAX]);
    }

    #[test]
    fn test_empty_capture_fails_to_encode() {
        let err = Capture::new(Vec::new(), 44100, 1).encode().unwrap_err();
        assert!(matches!(err, RecorderError::EmptyCapture));
    }

    #[test]
    fn test_stop_without_start() {
        let mut recorder = MicRecorder::new(RecorderConfig::default());
        assert!(matches!(
            recorder.stop().wait(),
            Some(Err(RecorderError::NotRecording))
        ));
        assert!(!recorder.is_capturing());
    }

    #[test]
    fn test_append_converts_and_caps() {
        let mut buffer = Vec::new();
        append_capped(&mut buffer, &[i16::MIN, 0, 16384], 8);
        assert_eq!(buffer[0], -1.0);
        assert_eq!(buffer[1], 0.0);
        assert!((buffer[2] - 0.5).abs() < 1e-4);

        // Unsigned mid-scale is silence
        append_capped(&mut buffer, &[32768_u16], 8);
        assert_eq!(buffer[3], 0.0);

        append_capped(&mut buffer, &[0.25_f32; 10], 8);
        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer[7], 0.25);
    }
}
