//! Audio contexts: the destination end of the graph.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SizedSample};
use log::{error, info};
use parking_lot::Mutex;
use std::sync::Arc;

use super::element::SourceNode;
use super::AudioError;

/// Output destination that pulls rendered blocks from a source node
pub trait AudioContext {
    /// Rate at which the destination pulls samples (Hz)
    fn sample_rate(&self) -> u32;

    /// Route `source` to the destination
    ///
    /// Irreversible for the lifetime of the context: from here on the
    /// destination drives the source (and so the analyser tap).
    fn connect(&mut self, source: SourceNode) -> Result<(), AudioError>;

    /// Stop pulling and release the device
    fn close(&mut self);
}

/// Constructor for audio contexts
pub trait ContextFactory {
    fn create_context(&mut self) -> Result<Box<dyn AudioContext>, AudioError>;
}

impl<F> ContextFactory for F
where
    F: FnMut() -> Result<Box<dyn AudioContext>, AudioError>,
{
    fn create_context(&mut self) -> Result<Box<dyn AudioContext>, AudioError> {
        self()
    }
}

/// Context backed by the default cpal output device
pub struct CpalContext {
    device: cpal::Device,
    config: cpal::StreamConfig,
    sample_format: cpal::SampleFormat,

    /// Output stream (kept alive while connected)
    stream: Option<cpal::Stream>,
}

impl CpalContext {
    pub fn new() -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::ContextUnavailable("no audio output device".into()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::ContextUnavailable(format!("output config: {}", e)))?;

        info!(
            "Audio output: {} @ {}Hz, {}ch, {}",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate().0,
            config.channels(),
            config.sample_format()
        );

        Ok(Self {
            device,
            sample_format: config.sample_format(),
            config: config.into(),
            stream: None,
        })
    }

    fn build_stream<T>(&self, mut source: SourceNode) -> Result<cpal::Stream, AudioError>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels.max(1) as usize;
        let mut mono: Vec<f32> = Vec::with_capacity(4096);

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    mono.resize(data.len() / channels, 0.0);
                    source.render(&mut mono);
                    fill_interleaved(data, &mono, channels);
                },
                |err| error!("Audio stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::Stream(format!("build output stream: {}", e)))
    }
}

/// Copy each mono sample to every channel of its frame, converting to the device format
fn fill_interleaved<T>(data: &mut [T], mono: &[f32], channels: usize)
where
    T: Sample + FromSample<f32>,
{
    for (frame, &sample) in data.chunks_mut(channels).zip(mono.iter()) {
        frame.fill(T::from_sample(sample));
    }
}

impl AudioContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate.0
    }

    fn connect(&mut self, source: SourceNode) -> Result<(), AudioError> {
        if self.stream.is_some() {
            return Err(AudioError::Stream("context already has a source".into()));
        }

        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(source)?,
            cpal::SampleFormat::I16 => self.build_stream::<i16>(source)?,
            cpal::SampleFormat::U16 => self.build_stream::<u16>(source)?,
            other => {
                return Err(AudioError::Stream(format!(
                    "unsupported output sample format: {}",
                    other
                )))
            }
        };

        stream
            .play()
            .map_err(|e| AudioError::Stream(format!("start output stream: {}", e)))?;

        self.stream = Some(stream);
        Ok(())
    }

    fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Audio output closed");
        }
    }
}

/// Factory for [`CpalContext`]
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalContextFactory;

impl ContextFactory for CpalContextFactory {
    fn create_context(&mut self) -> Result<Box<dyn AudioContext>, AudioError> {
        Ok(Box::new(CpalContext::new()?))
    }
}

/// Context with no device: blocks are pulled explicitly via [`OfflineDestination`]
pub struct OfflineContext {
    sample_rate: u32,
    slot: Arc<Mutex<Option<SourceNode>>>,
}

/// Pull side of an [`OfflineContext`]
#[derive(Clone)]
pub struct OfflineDestination {
    slot: Arc<Mutex<Option<SourceNode>>>,
}

impl OfflineContext {
    pub fn new(sample_rate: u32) -> (Self, OfflineDestination) {
        let slot = Arc::new(Mutex::new(None));
        (
            Self {
                sample_rate,
                slot: Arc::clone(&slot),
            },
            OfflineDestination { slot },
        )
    }
}

impl AudioContext for OfflineContext {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn connect(&mut self, source: SourceNode) -> Result<(), AudioError> {
        let mut slot = self.slot.lock();
        if slot.is_some() {
            return Err(AudioError::Stream("context already has a source".into()));
        }
        *slot = Some(source);
        Ok(())
    }

    fn close(&mut self) {
        self.slot.lock().take();
    }
}

impl OfflineDestination {
    pub fn is_connected(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Render `frames` mono samples (silence when nothing is connected)
    pub fn pull(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        if let Some(source) = self.slot.lock().as_mut() {
            source.render(&mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{PlayableElement, SampleTap};

    #[test]
    fn test_offline_context_connects_once() {
        let (mut context, destination) = OfflineContext::new(8000);
        assert!(!destination.is_connected());
        assert_eq!(destination.pull(2), vec![0.0, 0.0]);

        let element = PlayableElement::from_samples("tone", vec![0.5; 8], 8000).unwrap();
        element.play();
        let tap = SampleTap::new(4);
        context
            .connect(SourceNode::new(element.clone(), tap.clone(), 8000))
            .unwrap();
        assert!(destination.is_connected());
        assert_eq!(destination.pull(2), vec![0.5, 0.5]);

        let second = SourceNode::new(element, tap, 8000);
        assert!(matches!(
            context.connect(second),
            Err(AudioError::Stream(_))
        ));
    }

    #[test]
    fn test_offline_context_close_disconnects() {
        let (mut context, destination) = OfflineContext::new(8000);
        let element = PlayableElement::from_samples("tone", vec![0.5; 8], 8000).unwrap();
        context
            .connect(SourceNode::new(element, SampleTap::new(4), 8000))
            .unwrap();

        context.close();
        assert!(!destination.is_connected());
    }

    #[test]
    fn test_closure_factory() {
        let mut created = 0;
        let mut factory = || -> Result<Box<dyn AudioContext>, AudioError> {
            created += 1;
            let (context, _) = OfflineContext::new(44100);
            Ok(Box::new(context))
        };

        let context = factory.create_context().unwrap();
        assert_eq!(context.sample_rate(), 44100);
        drop(factory);
        assert_eq!(created, 1);
    }

    #[test]
    fn test_fill_interleaved_converts_formats() {
        let mono = [0.5, -1.0];

        let mut float = [0.0_f32; 4];
        fill_interleaved(&mut float, &mono, 2);
        assert_eq!(float, [0.5, 0.5, -1.0, -1.0]);

        let mut signed = [0_i16; 4];
        fill_interleaved(&mut signed, &mono, 2);
        assert_eq!(signed[0], signed[1]);
        assert!((signed[0] - 16384).abs() <= 1);
        assert_eq!(signed[2], i16::MIN);

        // Unsigned silence sits mid-scale
        let mut unsigned = [0_u16; 2];
        fill_interleaved(&mut unsigned, &[0.0], 2);
        assert_eq!(unsigned, [32768, 32768]);
    }
}
