//! Live effects graph
//!
//! ```text
//! source → bass → low-mid → mid → high-mid → treble → master → delay → wet → destination
//!                                                                ▲        │
//!                                                                └─ fb ◀──┘
//! ```
//!
//! The graph is built once per media element, on the surface's ready or
//! play signal, inside the surface's own context. After that only
//! parameter ports change. The feedback gain is clamped below 1.0 at the
//! setter, so the loop always decays.

use bw_core::{
    DELAY_FEEDBACK, DELAY_MIX, DELAY_TIME_MS, Decibels, EQ_GAIN_DB, EffectsParams, MASTER_GAIN_DB,
};
use bw_engine::{
    AudioContext, BiquadFilterNode, ContextState, DelayNode, FilterKind, GainNode, GraphResult,
    NodeId, NodeRef, SourceNode,
};
use crossbeam_channel::Receiver;

use crate::error::LiveError;
use crate::handle::AudioGraphHandle;
use crate::surface::{SurfaceEvent, SurfaceSlot, locate_on_surface};

/// Delay buffer length of the chain's delay node
pub const DELAY_BUFFER_SECONDS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    EqBass,
    EqLowMid,
    EqMid,
    EqHighMid,
    EqTreble,
    MasterGain,
    DelayLine,
    DelayWetGain,
    DelayFeedbackGain,
}

impl Stage {
    pub const ALL: [Stage; 9] = [
        Stage::EqBass,
        Stage::EqLowMid,
        Stage::EqMid,
        Stage::EqHighMid,
        Stage::EqTreble,
        Stage::MasterGain,
        Stage::DelayLine,
        Stage::DelayWetGain,
        Stage::DelayFeedbackGain,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Source,
    Stage(Stage),
    Destination,
}

use Endpoint::{Destination, Source};

/// Every edge of the chain, in connection order. The last one closes the
/// feedback loop.
pub const TOPOLOGY: [(Endpoint, Endpoint); 11] = [
    (Source, Endpoint::Stage(Stage::EqBass)),
    (Endpoint::Stage(Stage::EqBass), Endpoint::Stage(Stage::EqLowMid)),
    (Endpoint::Stage(Stage::EqLowMid), Endpoint::Stage(Stage::EqMid)),
    (Endpoint::Stage(Stage::EqMid), Endpoint::Stage(Stage::EqHighMid)),
    (Endpoint::Stage(Stage::EqHighMid), Endpoint::Stage(Stage::EqTreble)),
    (Endpoint::Stage(Stage::EqTreble), Endpoint::Stage(Stage::MasterGain)),
    (Endpoint::Stage(Stage::MasterGain), Endpoint::Stage(Stage::DelayLine)),
    (Endpoint::Stage(Stage::DelayLine), Endpoint::Stage(Stage::DelayWetGain)),
    (Endpoint::Stage(Stage::DelayWetGain), Destination),
    (Endpoint::Stage(Stage::DelayWetGain), Endpoint::Stage(Stage::DelayFeedbackGain)),
    (Endpoint::Stage(Stage::DelayFeedbackGain), Endpoint::Stage(Stage::DelayLine)),
];

/// Fixed shape of one EQ band. Only its gain is adjustable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqBand {
    pub stage: Stage,
    pub kind: FilterKind,
    pub frequency: f64,
    /// `None` for shelves
    pub q: Option<f64>,
}

pub const EQ_BANDS: [EqBand; 5] = [
    EqBand {
        stage: Stage::EqBass,
        kind: FilterKind::LowShelf,
        frequency: 250.0,
        q: None,
    },
    EqBand {
        stage: Stage::EqLowMid,
        kind: FilterKind::Peaking,
        frequency: 375.0,
        q: Some(1.0),
    },
    EqBand {
        stage: Stage::EqMid,
        kind: FilterKind::Peaking,
        frequency: 1250.0,
        q: Some(1.0),
    },
    EqBand {
        stage: Stage::EqHighMid,
        kind: FilterKind::Peaking,
        frequency: 3000.0,
        q: Some(1.0),
    },
    EqBand {
        stage: Stage::EqTreble,
        kind: FilterKind::HighShelf,
        frequency: 4000.0,
        q: None,
    },
];

// ═══════════════════════════════════════════════════════════════════════════
// CHAIN
// ═══════════════════════════════════════════════════════════════════════════

/// The built graph: nodes plus named parameter ports
#[derive(Debug, Clone)]
pub struct EffectsChain {
    eq: [BiquadFilterNode; 5],
    master: GainNode,
    delay: DelayNode,
    wet: GainNode,
    feedback: GainNode,
    source: NodeId,
    destination: NodeId,
}

impl EffectsChain {
    /// Create every stage in `context` and connect them per [`TOPOLOGY`]
    pub fn build(context: &AudioContext, source: &SourceNode) -> GraphResult<Self> {
        let eq = [
            context.create_biquad_filter()?,
            context.create_biquad_filter()?,
            context.create_biquad_filter()?,
            context.create_biquad_filter()?,
            context.create_biquad_filter()?,
        ];
        for (filter, band) in eq.iter().zip(&EQ_BANDS) {
            filter.set_filter_type(band.kind);
            filter.frequency().set_value(band.frequency);
            if let Some(q) = band.q {
                filter.q().set_value(q);
            }
        }

        let chain = Self {
            eq,
            master: context.create_gain()?,
            delay: context.create_delay(DELAY_BUFFER_SECONDS)?,
            wet: context.create_gain()?,
            feedback: context.create_gain()?,
            source: source.node_id(),
            destination: context.destination().node_id(),
        };

        for (from, to) in TOPOLOGY {
            context.connect(&chain.endpoint(from), &chain.endpoint(to))?;
        }
        log::info!("[Effects] chain built, {} edges", TOPOLOGY.len());
        Ok(chain)
    }

    /// Remove every chain edge from `context`. Returns how many were
    /// still connected.
    pub fn disconnect(&self, context: &AudioContext) -> usize {
        TOPOLOGY
            .iter()
            .filter(|&&(from, to)| {
                match context.disconnect(&self.endpoint(from), &self.endpoint(to)) {
                    Ok(removed) => removed,
                    Err(e) => {
                        log::debug!("[Effects] disconnect skipped: {}", e);
                        false
                    }
                }
            })
            .count()
    }

    fn endpoint(&self, endpoint: Endpoint) -> NodeId {
        match endpoint {
            Source => self.source,
            Destination => self.destination,
            Endpoint::Stage(stage) => self.node_id(stage),
        }
    }

    pub fn node_id(&self, stage: Stage) -> NodeId {
        match stage {
            Stage::EqBass => self.eq[0].node_id(),
            Stage::EqLowMid => self.eq[1].node_id(),
            Stage::EqMid => self.eq[2].node_id(),
            Stage::EqHighMid => self.eq[3].node_id(),
            Stage::EqTreble => self.eq[4].node_id(),
            Stage::MasterGain => self.master.node_id(),
            Stage::DelayLine => self.delay.node_id(),
            Stage::DelayWetGain => self.wet.node_id(),
            Stage::DelayFeedbackGain => self.feedback.node_id(),
        }
    }

    pub fn eq_band(&self, index: usize) -> Option<&BiquadFilterNode> {
        self.eq.get(index)
    }

    pub fn master_gain(&self) -> &GainNode {
        &self.master
    }

    pub fn delay(&self) -> &DelayNode {
        &self.delay
    }

    pub fn wet_gain(&self) -> &GainNode {
        &self.wet
    }

    pub fn feedback_gain(&self) -> &GainNode {
        &self.feedback
    }

    // ═══════════════════════════════════════════════════════════════════════
    // PARAMETERS
    // ═══════════════════════════════════════════════════════════════════════

    /// Returns whether the port changed
    pub fn set_eq_gain(&self, band: usize, db: f64) -> bool {
        self.eq
            .get(band)
            .is_some_and(|f| f.gain().set_value(EQ_GAIN_DB.clamp(db)))
    }

    pub fn set_master_gain_db(&self, db: f64) -> bool {
        let gain = Decibels(MASTER_GAIN_DB.clamp(db)).to_gain();
        self.master.gain().set_value(gain)
    }

    pub fn set_delay_time_ms(&self, ms: f64) -> bool {
        self.delay
            .delay_time()
            .set_value(DELAY_TIME_MS.clamp(ms) / 1000.0)
    }

    pub fn set_delay_mix(&self, mix: f64) -> bool {
        self.wet.gain().set_value(DELAY_MIX.clamp(mix))
    }

    /// Clamped to the feedback range, whose maximum is below 1.0
    pub fn set_delay_feedback(&self, feedback: f64) -> bool {
        self.feedback
            .gain()
            .set_value(DELAY_FEEDBACK.clamp(feedback))
    }

    /// Push every value. Returns how many ports actually changed.
    pub fn apply(&self, params: &EffectsParams) -> usize {
        let mut changed = 0;
        for (band, db) in params.eq_gains().into_iter().enumerate() {
            changed += usize::from(self.set_eq_gain(band, db));
        }
        changed += usize::from(self.set_master_gain_db(params.master_gain_db));
        changed += usize::from(self.set_delay_time_ms(params.delay_time_ms));
        changed += usize::from(self.set_delay_mix(params.delay_mix));
        changed += usize::from(self.set_delay_feedback(params.delay_feedback));
        changed
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COMPONENT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoSurface,
    NoBackendContext,
    NoMediaElement,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BuildOutcome {
    Built,
    AlreadyBuilt,
    /// The element already had a source node; nothing was built
    AlreadyExists,
    /// Preconditions not met yet; a later signal retries
    Skipped(SkipReason),
    Failed(LiveError),
}

/// Mounted live effects component
#[derive(Debug)]
pub struct LiveEffects {
    surface: SurfaceSlot,
    params: EffectsParams,
    handle: Option<AudioGraphHandle>,
    chain: Option<EffectsChain>,
    torn_down: bool,
}

impl LiveEffects {
    pub fn new(surface: SurfaceSlot, params: &EffectsParams) -> Self {
        Self {
            surface,
            params: params.clamped(),
            handle: None,
            chain: None,
            torn_down: false,
        }
    }

    pub fn params(&self) -> &EffectsParams {
        &self.params
    }

    pub fn chain(&self) -> Option<&EffectsChain> {
        self.chain.as_ref()
    }

    pub fn is_built(&self) -> bool {
        self.chain.is_some()
    }

    /// Context the graph lives in
    pub fn context(&self) -> Option<&AudioContext> {
        self.handle.as_ref().and_then(AudioGraphHandle::context)
    }

    /// React to a surface signal. Ready and play build the graph.
    pub fn handle_event(&mut self, event: SurfaceEvent) -> Option<BuildOutcome> {
        match event {
            SurfaceEvent::Ready | SurfaceEvent::Play => Some(self.ensure_graph()),
            SurfaceEvent::Pause | SurfaceEvent::Finish => None,
        }
    }

    /// Handle every queued surface signal. Returns how many were read.
    pub fn drain_events(&mut self, events: &Receiver<SurfaceEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = events.try_recv() {
            self.handle_event(event);
            count += 1;
        }
        count
    }

    /// Build the graph unless it exists, cannot exist yet, or must not
    pub fn ensure_graph(&mut self) -> BuildOutcome {
        if self.torn_down {
            log::debug!("[Effects] build after teardown ignored");
            return BuildOutcome::Failed(LiveError::GraphConstructionRace);
        }
        if self.chain.is_some() {
            return BuildOutcome::AlreadyBuilt;
        }
        if self.handle.is_some() {
            return BuildOutcome::AlreadyExists;
        }

        let Some(surface) = self.surface.get() else {
            return BuildOutcome::Skipped(SkipReason::NoSurface);
        };
        let Some(context) = surface.backend().and_then(|b| b.context) else {
            return BuildOutcome::Skipped(SkipReason::NoBackendContext);
        };
        if context.state() == ContextState::Closed {
            log::debug!("[Effects] surface context already closed");
            return BuildOutcome::Failed(LiveError::GraphConstructionRace);
        }
        let Some((_, element)) = locate_on_surface(surface.as_ref()) else {
            return BuildOutcome::Skipped(SkipReason::NoMediaElement);
        };

        let element_id = element.id();
        let mut handle = AudioGraphHandle::borrowed(context.clone(), element);
        let source = match handle.ensure_source().cloned() {
            Ok(source) => source,
            Err(e) if e.is_duplicate_source() => {
                log::info!("[Effects] {} already has a source node, leaving it", element_id);
                self.handle = Some(handle);
                return BuildOutcome::AlreadyExists;
            }
            Err(e) => {
                log::warn!("[Effects] source creation failed: {}", e);
                handle.teardown();
                return BuildOutcome::Failed(e.into());
            }
        };

        match EffectsChain::build(&context, &source) {
            Ok(chain) => {
                let applied = chain.apply(&self.params);
                log::info!("[Effects] live on {}, {} params applied", element_id, applied);
                handle.mark_connected();
                self.chain = Some(chain);
                self.handle = Some(handle);
                BuildOutcome::Built
            }
            Err(e) => {
                log::warn!("[Effects] chain build failed: {}", e);
                self.handle = Some(handle);
                BuildOutcome::Failed(e.into())
            }
        }
    }

    /// Replace every value. Returns how many ports changed; zero until
    /// the graph exists.
    pub fn set_params(&mut self, params: &EffectsParams) -> usize {
        self.params = params.clamped();
        self.chain.as_ref().map_or(0, |c| c.apply(&self.params))
    }

    /// Edit values in place, e.g. `fx.update(|p| p.eq_mid = 3.0)`
    pub fn update(&mut self, edit: impl FnOnce(&mut EffectsParams)) -> usize {
        let mut params = self.params.clone();
        edit(&mut params);
        self.set_params(&params)
    }

    /// Unhook the chain from the surface's context and drop the graph
    /// references. The context itself stays open.
    pub fn teardown(&mut self) -> bool {
        if self.torn_down {
            return false;
        }
        self.torn_down = true;
        if let (Some(chain), Some(context)) = (self.chain.take(), self.context()) {
            if context.state() != ContextState::Closed {
                let removed = chain.disconnect(context);
                log::debug!("[Effects] {} edges removed", removed);
            }
        }
        if let Some(mut handle) = self.handle.take() {
            handle.teardown();
        }
        log::info!("[Effects] torn down");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{MediaLocator, SoftwareSurface};
    use bw_core::RenderConfig;
    use bw_engine::{MediaElement, NodeKind};
    use std::sync::Arc;

    fn surface(with_context: bool) -> (Arc<SoftwareSurface>, MediaElement) {
        let mut surface = SoftwareSurface::new(MediaLocator::DirectAccessor);
        if with_context {
            surface = surface.with_context(AudioContext::new(&RenderConfig::default()));
        }
        let el = MediaElement::new(vec![0.0; 512], 48000.0);
        surface.load(&el);
        (Arc::new(surface), el)
    }

    #[test]
    fn test_topology_has_one_feedback_edge() {
        let into_delay = TOPOLOGY
            .iter()
            .filter(|(_, to)| *to == Endpoint::Stage(Stage::DelayLine))
            .count();
        assert_eq!(into_delay, 2);
        assert_eq!(TOPOLOGY[0].0, Source);
        assert!(TOPOLOGY.contains(&(Endpoint::Stage(Stage::DelayWetGain), Destination)));
        for stage in Stage::ALL {
            assert!(TOPOLOGY.iter().any(|(from, _)| *from == Endpoint::Stage(stage)));
        }
    }

    #[test]
    fn test_build_on_ready() {
        let (surface, el) = surface(true);
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface.clone()), &EffectsParams::default());
        assert_eq!(fx.handle_event(SurfaceEvent::Pause), None);
        assert_eq!(fx.handle_event(SurfaceEvent::Ready), Some(BuildOutcome::Built));
        assert_eq!(fx.handle_event(SurfaceEvent::Play), Some(BuildOutcome::AlreadyBuilt));
        assert!(el.has_source());

        let ctx = surface.context().unwrap();
        let chain = fx.chain().unwrap();
        for (from, to) in TOPOLOGY {
            assert!(ctx.is_connected(&chain.endpoint(from), &chain.endpoint(to)));
        }

        let bass = chain.eq_band(0).unwrap();
        assert_eq!(bass.filter_type(), FilterKind::LowShelf);
        assert_eq!(bass.frequency().value(), 250.0);
        let mid = chain.eq_band(2).unwrap();
        assert_eq!(mid.filter_type(), FilterKind::Peaking);
        assert_eq!(mid.q().value(), 1.0);

        let kind = |endpoint| ctx.node_kind(&chain.endpoint(endpoint)).unwrap();
        assert!(kind(Source).is_source());
        assert_eq!(kind(Destination), NodeKind::Destination);
        assert_eq!(kind(Endpoint::Stage(Stage::EqTreble)), NodeKind::BiquadFilter);
        assert_eq!(kind(Endpoint::Stage(Stage::DelayLine)), NodeKind::Delay);
        assert_eq!(kind(Endpoint::Stage(Stage::DelayFeedbackGain)), NodeKind::Gain);
    }

    #[test]
    fn test_teardown_unhooks_chain_from_borrowed_context() {
        let (surface, _el) = surface(true);
        let ctx = surface.context().unwrap();
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface), &EffectsParams::default());
        assert_eq!(fx.ensure_graph(), BuildOutcome::Built);
        let chain = fx.chain().unwrap().clone();
        assert_eq!(ctx.connection_count(), TOPOLOGY.len());

        assert!(fx.teardown());
        assert_eq!(ctx.connection_count(), 0);
        assert!(!ctx.is_connected(chain.wet_gain(), &ctx.destination()));
        assert_ne!(ctx.state(), ContextState::Closed);
        assert_eq!(chain.disconnect(&ctx), 0);
    }

    #[test]
    fn test_skips_without_backend_context() {
        let (surface, el) = surface(false);
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface), &EffectsParams::default());
        assert_eq!(
            fx.ensure_graph(),
            BuildOutcome::Skipped(SkipReason::NoBackendContext)
        );
        assert!(!el.has_source());

        let mut fx = LiveEffects::new(SurfaceSlot::empty(), &EffectsParams::default());
        assert_eq!(fx.ensure_graph(), BuildOutcome::Skipped(SkipReason::NoSurface));
    }

    #[test]
    fn test_already_wrapped_element() {
        let (surface, el) = surface(true);
        let ctx = surface.context().unwrap();
        ctx.create_media_element_source(&el).unwrap();

        let mut fx = LiveEffects::new(SurfaceSlot::with(surface), &EffectsParams::default());
        assert_eq!(fx.ensure_graph(), BuildOutcome::AlreadyExists);
        assert_eq!(fx.ensure_graph(), BuildOutcome::AlreadyExists);
        assert!(!fx.is_built());
        assert_eq!(fx.update(|p| p.eq_mid = 6.0), 0);
        assert_eq!(fx.params().eq_mid, 6.0);
    }

    #[test]
    fn test_pending_params_applied_on_build() {
        let (surface, _el) = surface(true);
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface), &EffectsParams::default());
        assert_eq!(fx.update(|p| p.master_gain_db = 6.0), 0);
        fx.ensure_graph();
        let gain = fx.chain().unwrap().master_gain().gain().value();
        assert!((gain - 10f64.powf(6.0 / 20.0)).abs() < 1e-9);
    }

    #[test]
    fn test_feedback_clamped_below_one() {
        let (surface, _el) = surface(true);
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface), &EffectsParams::default());
        fx.ensure_graph();
        fx.update(|p| p.delay_feedback = 1.5);
        let fb = fx.chain().unwrap().feedback_gain().gain().value();
        assert!(fb < 1.0);
        assert_eq!(fb, DELAY_FEEDBACK.max);
        assert_eq!(fx.params().delay_feedback, DELAY_FEEDBACK.max);
    }

    #[test]
    fn test_teardown_then_build_is_noop() {
        let (surface, el) = surface(true);
        let mut fx = LiveEffects::new(SurfaceSlot::with(surface.clone()), &EffectsParams::default());
        assert!(fx.teardown());
        assert!(!fx.teardown());
        assert_eq!(
            fx.ensure_graph(),
            BuildOutcome::Failed(LiveError::GraphConstructionRace)
        );
        assert!(!el.has_source());
        assert_eq!(surface.context().unwrap().state(), ContextState::Suspended);
    }
}
