//! Audio engine: owns the one audio graph and samples it per frame.

use log::{info, warn};

use super::analyser::{Analyser, FrequencyBuffer};
use super::context::{AudioContext, ContextFactory};
use super::element::{ElementId, PlayableElement, SourceNode};
use super::AudioError;
use crate::params::AnalyserConfig;

/// Identity of a built graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphId(u64);

/// Result of [`AudioEngine::init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// A new graph was built and connected
    Built(GraphId),
    /// A graph already existed; nothing changed
    Reused(GraphId),
}

impl InitOutcome {
    pub fn graph_id(&self) -> GraphId {
        match self {
            Self::Built(id) | Self::Reused(id) => *id,
        }
    }
}

/// Anything that can hand out a fresh frequency snapshot
pub trait FrequencySampler {
    /// Refresh and return the snapshot, or `None` before a graph exists
    fn sample(&mut self) -> Option<&FrequencyBuffer>;
}

/// Context + source + analyser, built once
struct AudioGraph {
    id: GraphId,
    element: ElementId,
    context: Box<dyn AudioContext>,
    analyser: Analyser,
    buffer: FrequencyBuffer,
}

/// Owner of the audio graph with an explicit `init`/`dispose` lifecycle
///
/// At most one graph exists at a time. `init` is guarded by presence only:
/// asking for a different element while a graph exists leaves the graph
/// bound to the first element.
pub struct AudioEngine<F: ContextFactory> {
    factory: F,
    config: AnalyserConfig,
    graph: Option<AudioGraph>,
    next_graph: u64,
}

impl<F: ContextFactory> AudioEngine<F> {
    pub fn new(factory: F, config: AnalyserConfig) -> Result<Self, AudioError> {
        config.validate()?;
        Ok(Self {
            factory,
            config,
            graph: None,
            next_graph: 1,
        })
    }

    /// Build the graph for `element` unless one already exists
    pub fn init(&mut self, element: &PlayableElement) -> Result<InitOutcome, AudioError> {
        if let Some(graph) = &self.graph {
            if graph.element != element.id() {
                warn!(
                    "Audio graph already bound to {}; ignoring {}",
                    graph.element,
                    element.id()
                );
            }
            return Ok(InitOutcome::Reused(graph.id));
        }

        let mut context = self.factory.create_context()?;
        let analyser = Analyser::new(self.config.clone())?;
        let source = SourceNode::new(element.clone(), analyser.tap(), context.sample_rate());
        context.connect(source)?;

        let id = GraphId(self.next_graph);
        self.next_graph += 1;

        info!(
            "Audio graph built for {}: fft {} -> {} bins @ {}Hz",
            element.id(),
            analyser.fft_size(),
            analyser.bin_count(),
            context.sample_rate()
        );

        self.graph = Some(AudioGraph {
            id,
            element: element.id(),
            context,
            buffer: FrequencyBuffer::new(analyser.bin_count()),
            analyser,
        });

        Ok(InitOutcome::Built(id))
    }

    /// Tear down the graph (session end)
    pub fn dispose(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.context.close();
            info!("Audio graph disposed ({})", graph.element);
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.graph.is_some()
    }

    pub fn graph_id(&self) -> Option<GraphId> {
        self.graph.as_ref().map(|g| g.id)
    }

    pub fn bound_element(&self) -> Option<ElementId> {
        self.graph.as_ref().map(|g| g.element)
    }

    /// Snapshot length (transform size / 2)
    pub fn bin_count(&self) -> usize {
        self.config.bin_count()
    }
}

impl<F: ContextFactory> FrequencySampler for AudioEngine<F> {
    fn sample(&mut self) -> Option<&FrequencyBuffer> {
        let graph = self.graph.as_mut()?;
        graph
            .analyser
            .get_byte_frequency_data(graph.buffer.as_mut_slice());
        Some(&graph.buffer)
    }
}

impl<F: ContextFactory> Drop for AudioEngine<F> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{OfflineContext, OfflineDestination};
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Factory producing offline contexts and counting constructions
    fn counting_factory(
        count: Rc<RefCell<usize>>,
        destinations: Rc<RefCell<Vec<OfflineDestination>>>,
    ) -> impl FnMut() -> Result<Box<dyn AudioContext>, AudioError> {
        move || {
            *count.borrow_mut() += 1;
            let (context, destination) = OfflineContext::new(44100);
            destinations.borrow_mut().push(destination);
            Ok(Box::new(context) as Box<dyn AudioContext>)
        }
    }

    fn tone(frequency_hz: f32) -> PlayableElement {
        let samples = (0..44100)
            .map(|i| 0.5 * (2.0 * std::f32::consts::PI * frequency_hz * i as f32 / 44100.0).sin())
            .collect();
        PlayableElement::from_samples("tone.wav", samples, 44100).unwrap()
    }

    #[test]
    fn test_sample_length_is_half_transform_size() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AudioEngine::new(
            counting_factory(Rc::clone(&count), Rc::clone(&destinations)),
            AnalyserConfig::default(),
        )
        .unwrap();

        assert!(engine.sample().is_none());

        let element = tone(440.0);
        element.play();
        engine.init(&element).unwrap();

        for _ in 0..5 {
            destinations.borrow()[0].pull(512);
            assert_eq!(engine.sample().unwrap().len(), 512);
        }
    }

    #[test]
    fn test_init_is_idempotent() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AudioEngine::new(
            counting_factory(Rc::clone(&count), Rc::clone(&destinations)),
            AnalyserConfig::default(),
        )
        .unwrap();

        let first = tone(220.0);
        let second = tone(880.0);

        let built = engine.init(&first).unwrap();
        assert!(matches!(built, InitOutcome::Built(_)));
        let before = engine.graph_id();

        let again = engine.init(&first).unwrap();
        let other = engine.init(&second).unwrap();

        assert_eq!(again, InitOutcome::Reused(built.graph_id()));
        assert_eq!(other.graph_id(), built.graph_id());
        assert_eq!(engine.graph_id(), before);
        assert_eq!(engine.bound_element(), Some(first.id()));
        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_init_connects_source_to_destination() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AudioEngine::new(
            counting_factory(Rc::clone(&count), Rc::clone(&destinations)),
            AnalyserConfig::default(),
        )
        .unwrap();

        let element = tone(1000.0);
        element.play();
        engine.init(&element).unwrap();

        let destination = destinations.borrow()[0].clone();
        assert!(destination.is_connected());
        let block = destination.pull(1024);
        assert!(block.iter().any(|s| s.abs() > 0.1));

        // 1 kHz at 44.1 kHz / 1024 lands near bin 23
        let snapshot = engine.sample().unwrap().as_slice().to_vec();
        let peak = snapshot
            .iter()
            .enumerate()
            .max_by_key(|&(_, b)| *b)
            .map(|(i, _)| i)
            .unwrap();
        assert!((21..=25).contains(&peak), "peak at bin {}", peak);
    }

    #[test]
    fn test_context_failure_leaves_engine_empty() {
        let factory = || -> Result<Box<dyn AudioContext>, AudioError> {
            Err(AudioError::ContextUnavailable("denied".into()))
        };
        let mut engine = AudioEngine::new(factory, AnalyserConfig::default()).unwrap();

        let err = engine.init(&tone(440.0)).unwrap_err();
        assert!(matches!(err, AudioError::ContextUnavailable(_)));
        assert!(!engine.is_initialized());
        assert!(engine.sample().is_none());
    }

    #[test]
    fn test_dispose_then_rebuild_gets_new_identity() {
        let count = Rc::new(RefCell::new(0));
        let destinations = Rc::new(RefCell::new(Vec::new()));
        let mut engine = AudioEngine::new(
            counting_factory(Rc::clone(&count), Rc::clone(&destinations)),
            AnalyserConfig::default(),
        )
        .unwrap();

        let first = engine.init(&tone(440.0)).unwrap().graph_id();
        engine.dispose();
        assert!(!engine.is_initialized());
        assert!(!destinations.borrow()[0].is_connected());

        let second = engine.init(&tone(440.0)).unwrap().graph_id();
        assert_ne!(first, second);
        assert_eq!(*count.borrow(), 2);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = AnalyserConfig {
            fft_size: 1000,
            ..AnalyserConfig::default()
        };
        let factory = || -> Result<Box<dyn AudioContext>, AudioError> {
            unreachable!("never constructed")
        };
        assert!(matches!(
            AudioEngine::new(factory, config),
            Err(AudioError::Config(_))
        ));
    }
}
