//! Audio context: node ownership, connections and block rendering
//!
//! Rendering runs in render quanta. Each quantum:
//! 1. delay nodes that sit on a cycle emit their delayed block
//! 2. every other node runs in topological order on the sum of its inputs
//! 3. the cycle delays store their summed input for later quanta
//!
//! Edges into cycle delays are left out of the ordering, which is what makes
//! feedback through a delay legal. A cycle with no delay on it is rejected
//! at connect time.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bw_core::{AnalyserConfig, RenderConfig, Sample};
use parking_lot::Mutex;

use crate::error::{GraphError, GraphResult};
use crate::media::{MediaElement, MediaStream};
use crate::node::{
    AnalyserNode, AnalyserShared, AudioNode, BiquadFilterNode, DelayNode, DelayProcessor,
    DestinationNode, DestinationProcessor, GainNode, MediaElementSourceNode,
    MediaStreamSourceNode, NodeId, NodeKind, NodeRef,
};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Largest delay a delay node may be created with
pub const MAX_DELAY_SECONDS: f64 = 180.0;

const DESTINATION_INDEX: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

struct NodeSlot {
    processor: Box<dyn AudioNode>,
    output: Vec<Sample>,
}

#[derive(Default)]
struct RenderPlan {
    order: Vec<usize>,
    inputs: Vec<Vec<usize>>,
    cycle_delay: Vec<bool>,
    cycle_delays: Vec<usize>,
}

struct Inner {
    id: u64,
    state: ContextState,
    sample_rate: f64,
    quantum: usize,
    nodes: Vec<NodeSlot>,
    connections: Vec<(usize, usize)>,
    plan: RenderPlan,
    dirty: bool,
    input_scratch: Vec<Sample>,
    analysers: Vec<Arc<AnalyserShared>>,
    frames_rendered: u64,
    topology_version: u64,
    resume_rejection: Option<String>,
}

/// Shared handle to an audio graph. Clones refer to the same context.
#[derive(Clone)]
pub struct AudioContext {
    inner: Arc<Mutex<Inner>>,
}

impl fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("AudioContext")
            .field("id", &inner.id)
            .field("state", &inner.state)
            .field("sample_rate", &inner.sample_rate)
            .field("nodes", &inner.nodes.len())
            .finish()
    }
}

impl AudioContext {
    /// New context in the `Suspended` state
    pub fn new(config: &RenderConfig) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        let quantum = config.render_quantum.max(1);
        let destination = NodeSlot {
            processor: Box::new(DestinationProcessor),
            output: vec![0.0; quantum],
        };

        log::debug!(
            "[Context] #{id} created at {} Hz, quantum {quantum}",
            config.sample_rate
        );

        Self {
            inner: Arc::new(Mutex::new(Inner {
                id,
                state: ContextState::Suspended,
                sample_rate: config.sample_rate,
                quantum,
                nodes: vec![destination],
                connections: Vec::new(),
                plan: RenderPlan::default(),
                dirty: true,
                input_scratch: vec![0.0; quantum],
                analysers: Vec::new(),
                frames_rendered: 0,
                topology_version: 0,
                resume_rejection: None,
            })),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.lock().id
    }

    pub fn same_context(&self, other: &AudioContext) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn state(&self) -> ContextState {
        self.inner.lock().state
    }

    pub fn sample_rate(&self) -> f64 {
        self.inner.lock().sample_rate
    }

    pub fn render_quantum(&self) -> usize {
        self.inner.lock().quantum
    }

    /// Seconds of audio rendered so far
    pub fn current_time(&self) -> f64 {
        let inner = self.inner.lock();
        inner.frames_rendered as f64 / inner.sample_rate
    }

    /// Make every later `resume` fail, the way an autoplay policy does
    pub fn block_resume(&self, reason: impl Into<String>) {
        self.inner.lock().resume_rejection = Some(reason.into());
    }

    pub fn unblock_resume(&self) {
        self.inner.lock().resume_rejection = None;
    }

    pub fn resume(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ContextState::Closed => Err(GraphError::InvalidState("context is closed".into())),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                if let Some(reason) = &inner.resume_rejection {
                    return Err(GraphError::ResumeRejected(reason.clone()));
                }
                inner.state = ContextState::Running;
                log::info!("[Context] #{} running", inner.id);
                Ok(())
            }
        }
    }

    pub fn suspend(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ContextState::Closed => Err(GraphError::InvalidState("context is closed".into())),
            _ => {
                inner.state = ContextState::Suspended;
                Ok(())
            }
        }
    }

    /// Close the context. Analysers it owns stop serving reads.
    /// Closing twice is an `InvalidState` error.
    pub fn close(&self) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        if inner.state == ContextState::Closed {
            return Err(GraphError::InvalidState("context already closed".into()));
        }
        inner.state = ContextState::Closed;
        for analyser in &inner.analysers {
            analyser.detach();
        }
        log::info!("[Context] #{} closed", inner.id);
        Ok(())
    }

    pub fn destination(&self) -> DestinationNode {
        let inner = self.inner.lock();
        DestinationNode {
            id: NodeId {
                context: inner.id,
                index: DESTINATION_INDEX,
            },
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // NODE FACTORIES
    // ═══════════════════════════════════════════════════════════════════════════

    fn add_node<H>(
        &self,
        build: impl FnOnce(NodeId, &Inner) -> GraphResult<(H, Box<dyn AudioNode>)>,
    ) -> GraphResult<H> {
        let mut inner = self.inner.lock();
        if inner.state == ContextState::Closed {
            return Err(GraphError::InvalidState("context is closed".into()));
        }
        let id = NodeId {
            context: inner.id,
            index: inner.nodes.len(),
        };
        let (handle, processor) = build(id, &inner)?;
        let quantum = inner.quantum;
        inner.nodes.push(NodeSlot {
            processor,
            output: vec![0.0; quantum],
        });
        inner.dirty = true;
        inner.topology_version += 1;
        Ok(handle)
    }

    pub fn create_gain(&self) -> GraphResult<GainNode> {
        self.add_node(|id, _| {
            let (handle, processor) = GainNode::create(id);
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })
    }

    pub fn create_biquad_filter(&self) -> GraphResult<BiquadFilterNode> {
        self.add_node(|id, inner| {
            let (handle, processor) = BiquadFilterNode::create(id, inner.sample_rate);
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })
    }

    pub fn create_delay(&self, max_delay_seconds: f64) -> GraphResult<DelayNode> {
        if max_delay_seconds.is_nan()
            || max_delay_seconds <= 0.0
            || max_delay_seconds >= MAX_DELAY_SECONDS
        {
            return Err(GraphError::InvalidParam(format!(
                "max delay {max_delay_seconds}s outside (0, {MAX_DELAY_SECONDS})"
            )));
        }
        self.add_node(|id, inner| {
            let (handle, processor) =
                DelayNode::create(id, inner.sample_rate, max_delay_seconds, inner.quantum);
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })
    }

    pub fn create_analyser(&self) -> GraphResult<AnalyserNode> {
        self.create_analyser_with(&AnalyserConfig::default())
    }

    pub fn create_analyser_with(&self, config: &AnalyserConfig) -> GraphResult<AnalyserNode> {
        let mut shared_out = None;
        let handle = self.add_node(|id, _| {
            let (handle, processor, shared) = AnalyserNode::create(id, config)?;
            shared_out = Some(shared);
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })?;
        if let Some(shared) = shared_out {
            self.inner.lock().analysers.push(shared);
        }
        Ok(handle)
    }

    /// Wrap a media element. Fails with [`GraphError::AlreadyConnected`] if
    /// any context ever wrapped this element before.
    pub fn create_media_element_source(
        &self,
        element: &MediaElement,
    ) -> GraphResult<MediaElementSourceNode> {
        self.add_node(|id, _| {
            element.claim_source()?;
            let (handle, processor) = MediaElementSourceNode::create(id, element);
            log::debug!("[Context] {} wraps {}", id, element.id());
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })
    }

    pub fn create_media_stream_source(
        &self,
        stream: &MediaStream,
    ) -> GraphResult<MediaStreamSourceNode> {
        self.add_node(|id, _| {
            let (handle, processor) = MediaStreamSourceNode::create(id, stream);
            Ok((handle, Box::new(processor) as Box<dyn AudioNode>))
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CONNECTIONS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn connect(&self, from: &impl NodeRef, to: &impl NodeRef) -> GraphResult<()> {
        let (from, to) = (from.node_id(), to.node_id());
        let mut inner = self.inner.lock();
        if inner.state == ContextState::Closed {
            return Err(GraphError::InvalidState("context is closed".into()));
        }
        let a = inner.index_of(from)?;
        let b = inner.index_of(to)?;
        if inner.nodes[a].processor.num_outputs() == 0 {
            return Err(GraphError::NoOutputs(from));
        }
        if inner.nodes[b].processor.num_inputs() == 0 {
            return Err(GraphError::NoInputs(to));
        }
        if inner.connections.contains(&(a, b)) {
            return Ok(());
        }

        inner.connections.push((a, b));
        if inner.has_cycle_without_delay() {
            inner.connections.pop();
            return Err(GraphError::CycleWithoutDelay { from, to });
        }
        inner.dirty = true;
        inner.topology_version += 1;
        Ok(())
    }

    /// Returns true when a connection was removed
    pub fn disconnect(&self, from: &impl NodeRef, to: &impl NodeRef) -> GraphResult<bool> {
        let (from, to) = (from.node_id(), to.node_id());
        let mut inner = self.inner.lock();
        let a = inner.index_of(from)?;
        let b = inner.index_of(to)?;
        let before = inner.connections.len();
        inner.connections.retain(|&edge| edge != (a, b));
        let removed = inner.connections.len() != before;
        if removed {
            inner.dirty = true;
            inner.topology_version += 1;
        }
        Ok(removed)
    }

    pub fn is_connected(&self, from: &impl NodeRef, to: &impl NodeRef) -> bool {
        let inner = self.inner.lock();
        match (inner.index_of(from.node_id()), inner.index_of(to.node_id())) {
            (Ok(a), Ok(b)) => inner.connections.contains(&(a, b)),
            _ => false,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }

    /// Node count, destination included
    pub fn node_count(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn node_kind(&self, node: &impl NodeRef) -> Option<NodeKind> {
        let inner = self.inner.lock();
        let index = inner.index_of(node.node_id()).ok()?;
        Some(inner.nodes[index].processor.kind())
    }

    /// Bumped by every node creation, connect and disconnect
    pub fn topology_version(&self) -> u64 {
        self.inner.lock().topology_version
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RENDERING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Render `out.len()` frames. A suspended context renders silence.
    pub fn render(&self, out: &mut [Sample]) -> GraphResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            ContextState::Closed => Err(GraphError::InvalidState("context is closed".into())),
            ContextState::Suspended => {
                out.fill(0.0);
                Ok(())
            }
            ContextState::Running => {
                let quantum = inner.quantum;
                for chunk in out.chunks_mut(quantum) {
                    inner.render_quantum(chunk);
                }
                Ok(())
            }
        }
    }
}

impl Inner {
    fn index_of(&self, id: NodeId) -> GraphResult<usize> {
        if id.context != self.id || id.index >= self.nodes.len() {
            return Err(GraphError::UnknownNode(id));
        }
        Ok(id.index)
    }

    fn is_delay(&self, index: usize) -> bool {
        self.nodes[index].processor.kind() == NodeKind::Delay
    }

    /// Kahn's algorithm over all edges except those into nodes in `skip`.
    /// Returns the order, which is partial if a cycle remains.
    fn topological_order(&self, skip_into: impl Fn(usize) -> bool) -> Vec<usize> {
        let n = self.nodes.len();
        let mut in_degree = vec![0usize; n];
        let mut outgoing = vec![Vec::new(); n];
        for &(a, b) in &self.connections {
            if skip_into(b) {
                continue;
            }
            in_degree[b] += 1;
            outgoing[a].push(b);
        }

        let mut queue: VecDeque<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &j in &outgoing[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    queue.push_back(j);
                }
            }
        }
        order
    }

    fn has_cycle_without_delay(&self) -> bool {
        self.topological_order(|i| self.is_delay(i)).len() < self.nodes.len()
    }

    /// Whether `start` can reach itself
    fn on_cycle(&self, start: usize) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack: Vec<usize> = self
            .connections
            .iter()
            .filter(|&&(a, _)| a == start)
            .map(|&(_, b)| b)
            .collect();
        while let Some(i) = stack.pop() {
            if i == start {
                return true;
            }
            if seen[i] {
                continue;
            }
            seen[i] = true;
            stack.extend(
                self.connections
                    .iter()
                    .filter(|&&(a, _)| a == i)
                    .map(|&(_, b)| b),
            );
        }
        false
    }

    fn rebuild_plan(&mut self) {
        let n = self.nodes.len();
        let cycle_delay: Vec<bool> = (0..n).map(|i| self.is_delay(i) && self.on_cycle(i)).collect();
        let order = self.topological_order(|i| cycle_delay[i]);
        debug_assert_eq!(order.len(), n);

        let mut inputs = vec![Vec::new(); n];
        for &(a, b) in &self.connections {
            inputs[b].push(a);
        }

        let cycle_delays = (0..n).filter(|&i| cycle_delay[i]).collect();
        self.plan = RenderPlan {
            order,
            inputs,
            cycle_delay,
            cycle_delays,
        };
        self.dirty = false;
        log::trace!("[Context] #{} render plan rebuilt ({} nodes)", self.id, n);
    }

    fn render_quantum(&mut self, out: &mut [Sample]) {
        if self.dirty {
            self.rebuild_plan();
        }
        let n = out.len();
        let Inner {
            nodes,
            plan,
            input_scratch,
            ..
        } = &mut *self;

        for &d in &plan.cycle_delays {
            let NodeSlot { processor, output } = &mut nodes[d];
            if let Some(delay) = processor.as_any_mut().downcast_mut::<DelayProcessor>() {
                delay.read_phase(&mut output[..n]);
            }
        }

        for &i in &plan.order {
            if plan.cycle_delay[i] {
                continue;
            }
            mix_inputs(nodes, &plan.inputs[i], &mut input_scratch[..n]);
            let NodeSlot { processor, output } = &mut nodes[i];
            processor.process(&input_scratch[..n], &mut output[..n]);
        }

        for &d in &plan.cycle_delays {
            mix_inputs(nodes, &plan.inputs[d], &mut input_scratch[..n]);
            if let Some(delay) = nodes[d].processor.as_any_mut().downcast_mut::<DelayProcessor>() {
                delay.write_phase(&input_scratch[..n]);
            }
        }

        out.copy_from_slice(&nodes[DESTINATION_INDEX].output[..n]);
        self.frames_rendered += n as u64;
    }
}

fn mix_inputs(nodes: &[NodeSlot], sources: &[usize], scratch: &mut [Sample]) {
    scratch.fill(0.0);
    let n = scratch.len();
    for &s in sources {
        for (acc, &x) in scratch.iter_mut().zip(&nodes[s].output[..n]) {
            *acc += x;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn running() -> AudioContext {
        let ctx = AudioContext::new(&RenderConfig::default());
        ctx.resume().unwrap();
        ctx
    }

    fn playing(samples: Vec<Sample>) -> MediaElement {
        let el = MediaElement::new(samples, 48000.0);
        el.play();
        el
    }

    #[test]
    fn test_starts_suspended_and_renders_silence() {
        let ctx = AudioContext::new(&RenderConfig::default());
        assert_eq!(ctx.state(), ContextState::Suspended);

        let el = playing(vec![1.0; 256]);
        let src = ctx.create_media_element_source(&el).unwrap();
        ctx.connect(&src, &ctx.destination()).unwrap();

        let mut out = [9.0; 128];
        ctx.render(&mut out).unwrap();
        assert!(out.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_close_twice_is_invalid_state() {
        let ctx = running();
        ctx.close().unwrap();
        assert!(matches!(ctx.close(), Err(GraphError::InvalidState(_))));
        assert!(ctx.create_gain().is_err());
        assert!(ctx.resume().is_err());
    }

    #[test]
    fn test_blocked_resume() {
        let ctx = AudioContext::new(&RenderConfig::default());
        ctx.block_resume("no user gesture");
        assert!(matches!(ctx.resume(), Err(GraphError::ResumeRejected(_))));
        assert_eq!(ctx.state(), ContextState::Suspended);
        ctx.unblock_resume();
        assert!(ctx.resume().is_ok());
    }

    #[test]
    fn test_gain_chain_renders() {
        let ctx = running();
        let el = playing(vec![0.5; 256]);
        let src = ctx.create_media_element_source(&el).unwrap();
        let gain = ctx.create_gain().unwrap();
        gain.gain().set_value(2.0);
        ctx.connect(&src, &gain).unwrap();
        ctx.connect(&gain, &ctx.destination()).unwrap();

        let mut out = [0.0; 128];
        ctx.render(&mut out).unwrap();
        assert!(out.iter().all(|&x| (x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_second_source_rejected_across_contexts() {
        let a = running();
        let b = running();
        let el = playing(vec![0.0; 16]);
        a.create_media_element_source(&el).unwrap();

        let err = b.create_media_element_source(&el).unwrap_err();
        assert!(err.is_duplicate_source());
        // a failed factory does not leave a node behind
        assert_eq!(b.node_count(), 1);
    }

    #[test]
    fn test_cycle_without_delay_rejected() {
        let ctx = running();
        let g1 = ctx.create_gain().unwrap();
        let g2 = ctx.create_gain().unwrap();
        ctx.connect(&g1, &g2).unwrap();
        let err = ctx.connect(&g2, &g1).unwrap_err();
        assert!(matches!(err, GraphError::CycleWithoutDelay { .. }));
        assert_eq!(ctx.connection_count(), 1);
    }

    #[test]
    fn test_feedback_through_delay() {
        let ctx = running();
        let mut impulse = vec![0.0; 48000];
        impulse[0] = 1.0;
        let el = playing(impulse);

        let src = ctx.create_media_element_source(&el).unwrap();
        let delay = ctx.create_delay(1.0).unwrap();
        let wet = ctx.create_gain().unwrap();
        let feedback = ctx.create_gain().unwrap();
        delay.delay_time().set_value(0.01);
        feedback.gain().set_value(0.5);

        ctx.connect(&src, &delay).unwrap();
        ctx.connect(&delay, &wet).unwrap();
        ctx.connect(&wet, &feedback).unwrap();
        ctx.connect(&feedback, &delay).unwrap();
        ctx.connect(&wet, &ctx.destination()).unwrap();

        let mut out = vec![0.0; 2048];
        for chunk in out.chunks_mut(128) {
            ctx.render(chunk).unwrap();
            el.advance(chunk.len());
        }

        assert_relative_eq!(out[480], 1.0, epsilon = 1e-9);
        assert_relative_eq!(out[960], 0.5, epsilon = 1e-9);
        assert_relative_eq!(out[1440], 0.25, epsilon = 1e-9);
        assert_eq!(out[0], 0.0);
    }

    #[test]
    fn test_delay_in_cycle_clamped_to_quantum() {
        let ctx = running();
        let mut impulse = vec![0.0; 1024];
        impulse[0] = 1.0;
        let el = playing(impulse);

        let src = ctx.create_media_element_source(&el).unwrap();
        let delay = ctx.create_delay(1.0).unwrap();
        let feedback = ctx.create_gain().unwrap();
        feedback.gain().set_value(0.0);
        ctx.connect(&src, &delay).unwrap();
        ctx.connect(&delay, &feedback).unwrap();
        ctx.connect(&feedback, &delay).unwrap();
        ctx.connect(&delay, &ctx.destination()).unwrap();

        let mut out = vec![0.0; 512];
        for chunk in out.chunks_mut(128) {
            ctx.render(chunk).unwrap();
            el.advance(chunk.len());
        }
        assert_eq!(out[128], 1.0);
        assert!(out[..128].iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_delay_outside_cycle_can_be_short() {
        let ctx = running();
        let mut impulse = vec![0.0; 256];
        impulse[0] = 1.0;
        let el = playing(impulse);

        let src = ctx.create_media_element_source(&el).unwrap();
        let delay = ctx.create_delay(1.0).unwrap();
        delay.delay_time().set_value(10.0 / 48000.0);
        ctx.connect(&src, &delay).unwrap();
        ctx.connect(&delay, &ctx.destination()).unwrap();

        let mut out = vec![0.0; 128];
        ctx.render(&mut out).unwrap();
        assert_relative_eq!(out[10], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_param_writes_do_not_touch_topology() {
        let ctx = running();
        let gain = ctx.create_gain().unwrap();
        ctx.connect(&gain, &ctx.destination()).unwrap();
        let version = ctx.topology_version();
        gain.gain().set_value(0.25);
        gain.gain().set_value(0.75);
        assert_eq!(ctx.topology_version(), version);
    }

    #[test]
    fn test_foreign_node_rejected() {
        let a = running();
        let b = running();
        let gain = a.create_gain().unwrap();
        assert!(matches!(
            b.connect(&gain, &b.destination()),
            Err(GraphError::UnknownNode(_))
        ));
    }

    #[test]
    fn test_close_detaches_analysers() {
        let ctx = running();
        let analyser = ctx.create_analyser().unwrap();
        ctx.close().unwrap();
        let mut buf = vec![0u8; analyser.frequency_bin_count()];
        assert!(analyser.get_byte_frequency_data(&mut buf).is_err());
    }

    #[test]
    fn test_analyser_sees_stream_source() {
        let ctx = running();
        let el = playing(vec![0.5; 4096]);
        let stream = el.capture_stream().unwrap();
        let src = ctx.create_media_stream_source(&stream).unwrap();
        let analyser = ctx.create_analyser().unwrap();
        ctx.connect(&src, &analyser).unwrap();

        let mut out = vec![0.0; 2048];
        ctx.render(&mut out).unwrap();

        let mut time = vec![0u8; analyser.frequency_bin_count()];
        analyser.get_byte_time_domain_data(&mut time).unwrap();
        assert!(time.iter().all(|&b| b == 192));
    }
}
