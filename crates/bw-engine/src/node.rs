//! Audio graph nodes
//!
//! Two halves per node:
//! - a render-side processor implementing [`AudioNode`], owned by the context
//! - a typed handle (`GainNode`, `DelayNode`, ...) that callers keep, holding
//!   the node's [`NodeId`] and its parameter ports

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use bw_core::{AnalyserConfig, Sample};
use bw_dsp::{BiquadDesign, BiquadTDF2, DelayLine, FftAnalyser, FilterKind, MonoProcessor, Processor};
use parking_lot::Mutex;

use crate::error::{GraphError, GraphResult};
use crate::media::{ElementId, MediaElement, MediaStream};
use crate::param::AudioParam;

/// Largest magnitude a parameter may hold (single-precision max)
const PARAM_LIMIT: f64 = f32::MAX as f64;

/// Node identifier, scoped to the context that created it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub context: u64,
    pub index: usize,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}.{}", self.context, self.index)
    }
}

/// Anything that names a node
pub trait NodeRef {
    fn node_id(&self) -> NodeId;
}

impl NodeRef for NodeId {
    fn node_id(&self) -> NodeId {
        *self
    }
}

/// Node type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Destination,
    Gain,
    BiquadFilter,
    Delay,
    Analyser,
    MediaElementSource,
    MediaStreamSource,
}

impl NodeKind {
    pub fn is_source(self) -> bool {
        matches!(self, NodeKind::MediaElementSource | NodeKind::MediaStreamSource)
    }
}

/// Render-side node
pub trait AudioNode: Send {
    fn kind(&self) -> NodeKind;

    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    /// Process one render quantum. `input` is the sum of all connections.
    fn process(&mut self, input: &[Sample], output: &mut [Sample]);

    /// Reset node state
    fn reset(&mut self) {}

    /// Downcast to concrete type
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

macro_rules! impl_any {
    () => {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    };
}

// ═══════════════════════════════════════════════════════════════════════════════
// DESTINATION
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct DestinationProcessor;

impl AudioNode for DestinationProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Destination
    }

    fn num_outputs(&self) -> usize {
        0
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        output.copy_from_slice(input);
    }

    impl_any!();
}

/// The context's output sink
#[derive(Debug, Clone, Copy)]
pub struct DestinationNode {
    pub(crate) id: NodeId,
}

impl NodeRef for DestinationNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// GAIN
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct GainProcessor {
    gain: AudioParam,
}

impl AudioNode for GainProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Gain
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        let g = self.gain.value();
        for (o, &i) in output.iter_mut().zip(input) {
            *o = i * g;
        }
    }

    impl_any!();
}

#[derive(Debug, Clone)]
pub struct GainNode {
    pub(crate) id: NodeId,
    gain: AudioParam,
}

impl GainNode {
    pub(crate) fn create(id: NodeId) -> (Self, GainProcessor) {
        let gain = AudioParam::new("gain", 1.0, -PARAM_LIMIT, PARAM_LIMIT);
        (
            Self {
                id,
                gain: gain.clone(),
            },
            GainProcessor { gain },
        )
    }

    /// Linear gain
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }
}

impl NodeRef for GainNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BIQUAD
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct BiquadProcessor {
    filter: BiquadTDF2,
    kind: Arc<Mutex<FilterKind>>,
    frequency: AudioParam,
    q: AudioParam,
    gain: AudioParam,
}

impl AudioNode for BiquadProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::BiquadFilter
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        let design = BiquadDesign {
            kind: *self.kind.lock(),
            frequency: self.frequency.value(),
            q: self.q.value(),
            gain_db: self.gain.value(),
        };
        self.filter.configure(design);

        output.copy_from_slice(input);
        self.filter.process_block(output);
    }

    fn reset(&mut self) {
        self.filter.reset();
    }

    impl_any!();
}

#[derive(Debug, Clone)]
pub struct BiquadFilterNode {
    pub(crate) id: NodeId,
    kind: Arc<Mutex<FilterKind>>,
    frequency: AudioParam,
    q: AudioParam,
    gain: AudioParam,
}

impl BiquadFilterNode {
    pub(crate) fn create(id: NodeId, sample_rate: f64) -> (Self, BiquadProcessor) {
        let defaults = BiquadDesign::default();
        let kind = Arc::new(Mutex::new(defaults.kind));
        let frequency = AudioParam::new("frequency", defaults.frequency, 0.0, sample_rate / 2.0);
        let q = AudioParam::new("Q", defaults.q, -PARAM_LIMIT, PARAM_LIMIT);
        let gain = AudioParam::new("gain", defaults.gain_db, -PARAM_LIMIT, 1541.0);

        let handle = Self {
            id,
            kind: kind.clone(),
            frequency: frequency.clone(),
            q: q.clone(),
            gain: gain.clone(),
        };
        let processor = BiquadProcessor {
            filter: BiquadTDF2::new(sample_rate),
            kind,
            frequency,
            q,
            gain,
        };
        (handle, processor)
    }

    pub fn filter_type(&self) -> FilterKind {
        *self.kind.lock()
    }

    /// Returns true when the type changed
    pub fn set_filter_type(&self, kind: FilterKind) -> bool {
        let mut current = self.kind.lock();
        if *current == kind {
            return false;
        }
        *current = kind;
        true
    }

    /// Center or corner frequency in Hz
    pub fn frequency(&self) -> &AudioParam {
        &self.frequency
    }

    /// Quality factor (peaking, lowpass, highpass)
    pub fn q(&self) -> &AudioParam {
        &self.q
    }

    /// Gain in dB (peaking and shelving types)
    pub fn gain(&self) -> &AudioParam {
        &self.gain
    }
}

impl NodeRef for BiquadFilterNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELAY
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct DelayProcessor {
    line: DelayLine,
    delay_time: AudioParam,
}

impl DelayProcessor {
    /// First half of a feedback-cycle render: emit the delayed block
    pub(crate) fn read_phase(&mut self, output: &mut [Sample]) {
        self.line.set_delay_seconds(self.delay_time.value());
        self.line.read_block(output);
    }

    /// Second half: store the block's summed input
    pub(crate) fn write_phase(&mut self, input: &[Sample]) {
        self.line.write_block(input);
    }
}

impl AudioNode for DelayProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Delay
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        self.line.set_delay_seconds(self.delay_time.value());
        output.copy_from_slice(input);
        self.line.process_block(output);
    }

    fn reset(&mut self) {
        self.line.reset();
    }

    impl_any!();
}

#[derive(Debug, Clone)]
pub struct DelayNode {
    pub(crate) id: NodeId,
    delay_time: AudioParam,
}

impl DelayNode {
    pub(crate) fn create(
        id: NodeId,
        sample_rate: f64,
        max_delay_seconds: f64,
        quantum: usize,
    ) -> (Self, DelayProcessor) {
        let delay_time = AudioParam::new("delayTime", 0.0, 0.0, max_delay_seconds);
        (
            Self {
                id,
                delay_time: delay_time.clone(),
            },
            DelayProcessor {
                line: DelayLine::new(sample_rate, max_delay_seconds, quantum),
                delay_time,
            },
        )
    }

    /// Delay in seconds
    pub fn delay_time(&self) -> &AudioParam {
        &self.delay_time
    }

    pub fn max_delay_time(&self) -> f64 {
        self.delay_time.range().1
    }
}

impl NodeRef for DelayNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
pub(crate) struct AnalyserShared {
    analyser: Mutex<FftAnalyser>,
    detached: AtomicBool,
}

impl AnalyserShared {
    pub(crate) fn detach(&self) {
        self.detached.store(true, Ordering::Release);
    }
}

pub(crate) struct AnalyserProcessor {
    shared: Arc<AnalyserShared>,
}

impl AudioNode for AnalyserProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::Analyser
    }

    fn process(&mut self, input: &[Sample], output: &mut [Sample]) {
        self.shared.analyser.lock().push(input);
        output.copy_from_slice(input);
    }

    fn reset(&mut self) {
        self.shared.analyser.lock().reset();
    }

    impl_any!();
}

/// Analysis tap. Passes its input through unchanged and exposes the
/// spectrum and waveform of the most recent window.
///
/// Reads fail with [`GraphError::NodeDetached`] once the owning context is
/// closed.
#[derive(Debug, Clone)]
pub struct AnalyserNode {
    pub(crate) id: NodeId,
    shared: Arc<AnalyserShared>,
}

impl AnalyserNode {
    pub(crate) fn create(
        id: NodeId,
        config: &AnalyserConfig,
    ) -> GraphResult<(Self, AnalyserProcessor, Arc<AnalyserShared>)> {
        let shared = Arc::new(AnalyserShared {
            analyser: Mutex::new(FftAnalyser::new(config)?),
            detached: AtomicBool::new(false),
        });
        Ok((
            Self {
                id,
                shared: shared.clone(),
            },
            AnalyserProcessor {
                shared: shared.clone(),
            },
            shared,
        ))
    }

    fn check_attached(&self) -> GraphResult<()> {
        if self.shared.detached.load(Ordering::Acquire) {
            return Err(GraphError::NodeDetached(self.id));
        }
        Ok(())
    }

    pub fn is_detached(&self) -> bool {
        self.shared.detached.load(Ordering::Acquire)
    }

    pub fn same_node(&self, other: &AnalyserNode) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn fft_size(&self) -> usize {
        self.shared.analyser.lock().fft_size()
    }

    /// Resize the FFT. Drops the current window and smoothing state.
    pub fn set_fft_size(&self, fft_size: usize) -> GraphResult<()> {
        let mut analyser = self.shared.analyser.lock();
        if analyser.fft_size() == fft_size {
            return Ok(());
        }
        let (min_decibels, max_decibels) = analyser.decibel_range();
        let config = AnalyserConfig {
            fft_size,
            smoothing: analyser.smoothing(),
            min_decibels,
            max_decibels,
        };
        *analyser = FftAnalyser::new(&config)?;
        Ok(())
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.shared.analyser.lock().frequency_bin_count()
    }

    pub fn smoothing_time_constant(&self) -> f64 {
        self.shared.analyser.lock().smoothing()
    }

    pub fn set_smoothing_time_constant(&self, smoothing: f64) -> GraphResult<()> {
        Ok(self.shared.analyser.lock().set_smoothing(smoothing)?)
    }

    pub fn set_decibel_range(&self, min_db: f64, max_db: f64) -> GraphResult<()> {
        Ok(self.shared.analyser.lock().set_decibel_range(min_db, max_db)?)
    }

    pub fn get_byte_frequency_data(&self, out: &mut [u8]) -> GraphResult<()> {
        self.check_attached()?;
        self.shared.analyser.lock().byte_frequency_data(out);
        Ok(())
    }

    pub fn get_byte_time_domain_data(&self, out: &mut [u8]) -> GraphResult<()> {
        self.check_attached()?;
        self.shared.analyser.lock().byte_time_domain_data(out);
        Ok(())
    }
}

impl NodeRef for AnalyserNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SOURCES
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) struct ElementSourceProcessor {
    element: MediaElement,
}

impl AudioNode for ElementSourceProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::MediaElementSource
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn process(&mut self, _input: &[Sample], output: &mut [Sample]) {
        self.element.peek(output);
    }

    impl_any!();
}

/// Source wrapping a media element. At most one exists per element.
#[derive(Debug, Clone)]
pub struct MediaElementSourceNode {
    pub(crate) id: NodeId,
    element: ElementId,
}

impl MediaElementSourceNode {
    pub(crate) fn create(id: NodeId, element: &MediaElement) -> (Self, ElementSourceProcessor) {
        (
            Self {
                id,
                element: element.id(),
            },
            ElementSourceProcessor {
                element: element.clone(),
            },
        )
    }

    pub fn element_id(&self) -> ElementId {
        self.element
    }
}

impl NodeRef for MediaElementSourceNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

pub(crate) struct StreamSourceProcessor {
    stream: MediaStream,
}

impl AudioNode for StreamSourceProcessor {
    fn kind(&self) -> NodeKind {
        NodeKind::MediaStreamSource
    }

    fn num_inputs(&self) -> usize {
        0
    }

    fn process(&mut self, _input: &[Sample], output: &mut [Sample]) {
        self.stream.peek(output);
    }

    impl_any!();
}

/// Source fed by a captured media stream
#[derive(Debug, Clone)]
pub struct MediaStreamSourceNode {
    pub(crate) id: NodeId,
    element: ElementId,
}

impl MediaStreamSourceNode {
    pub(crate) fn create(id: NodeId, stream: &MediaStream) -> (Self, StreamSourceProcessor) {
        (
            Self {
                id,
                element: stream.element_id(),
            },
            StreamSourceProcessor {
                stream: stream.clone(),
            },
        )
    }

    pub fn element_id(&self) -> ElementId {
        self.element
    }
}

impl NodeRef for MediaStreamSourceNode {
    fn node_id(&self) -> NodeId {
        self.id
    }
}

/// Either kind of source node
#[derive(Debug, Clone)]
pub enum SourceNode {
    Element(MediaElementSourceNode),
    Stream(MediaStreamSourceNode),
}

impl SourceNode {
    pub fn element_id(&self) -> ElementId {
        match self {
            SourceNode::Element(n) => n.element_id(),
            SourceNode::Stream(n) => n.element_id(),
        }
    }

    pub fn is_stream(&self) -> bool {
        matches!(self, SourceNode::Stream(_))
    }
}

impl NodeRef for SourceNode {
    fn node_id(&self) -> NodeId {
        match self {
            SourceNode::Element(n) => n.id,
            SourceNode::Stream(n) => n.id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: usize) -> NodeId {
        NodeId { context: 0, index }
    }

    #[test]
    fn test_gain_processor_uses_live_param() {
        let (handle, mut processor) = GainNode::create(id(1));
        let input = [1.0, -1.0, 0.5];
        let mut out = [0.0; 3];

        processor.process(&input, &mut out);
        assert_eq!(out, input);

        handle.gain().set_value(0.5);
        processor.process(&input, &mut out);
        assert_eq!(out, [0.5, -0.5, 0.25]);
    }

    #[test]
    fn test_biquad_type_change_detection() {
        let (handle, _processor) = BiquadFilterNode::create(id(2), 48000.0);
        assert_eq!(handle.filter_type(), FilterKind::Lowpass);
        assert!(handle.set_filter_type(FilterKind::Peaking));
        assert!(!handle.set_filter_type(FilterKind::Peaking));
    }

    #[test]
    fn test_biquad_frequency_clamped_to_nyquist() {
        let (handle, _processor) = BiquadFilterNode::create(id(2), 48000.0);
        handle.frequency().set_value(30000.0);
        assert_eq!(handle.frequency().value(), 24000.0);
    }

    #[test]
    fn test_delay_param_bounded_by_max() {
        let (handle, _processor) = DelayNode::create(id(3), 48000.0, 1.0, 128);
        handle.delay_time().set_value(3.0);
        assert_eq!(handle.delay_time().value(), 1.0);
        assert_eq!(handle.max_delay_time(), 1.0);
    }

    #[test]
    fn test_analyser_detach_fails_reads() {
        let (handle, _processor, shared) =
            AnalyserNode::create(id(4), &AnalyserConfig::default()).unwrap();
        let mut buf = vec![0u8; handle.frequency_bin_count()];
        assert!(handle.get_byte_time_domain_data(&mut buf).is_ok());

        shared.detach();
        assert!(matches!(
            handle.get_byte_time_domain_data(&mut buf),
            Err(GraphError::NodeDetached(_))
        ));
    }

    #[test]
    fn test_analyser_resize() {
        let (handle, _processor, _shared) =
            AnalyserNode::create(id(4), &AnalyserConfig::default()).unwrap();
        handle.set_fft_size(512).unwrap();
        assert_eq!(handle.frequency_bin_count(), 256);
        assert!(handle.set_fft_size(500).is_err());
        assert_eq!(handle.smoothing_time_constant(), 0.8);
    }
}
