//! Playback surface
//!
//! The surface is the external collaborator that owns the media element and,
//! usually, an audio context. The live components only ever look at it
//! through [`PlaybackSurface`] and find its element with the ordered
//! [`MediaLocator`] strategies.

use std::fmt;
use std::sync::Arc;

use bw_core::AnalyserConfig;
use bw_engine::{AnalyserNode, AudioContext, MediaDirectory, MediaElement, MediaStreamSourceNode};
use crossbeam_channel::{Receiver, Sender, bounded};
use parking_lot::Mutex;

use crate::error::{LiveError, LiveResult};

/// What a surface exposes about its playback internals
#[derive(Debug, Clone, Default)]
pub struct SurfaceBackend {
    pub media_element: Option<MediaElement>,
    pub media: Option<MediaElement>,
    pub analyser: Option<AnalyserNode>,
    pub context: Option<AudioContext>,
}

pub trait PlaybackSurface: Send + Sync {
    /// Element handed out by the surface's own accessor
    fn media_element(&self) -> Option<MediaElement>;

    /// Playback backend, if the surface has one
    fn backend(&self) -> Option<SurfaceBackend>;

    fn is_playing(&self) -> bool;
}

/// Signals a surface emits to the live components
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    Ready,
    Play,
    Pause,
    Finish,
}

/// Where the surface might be, shared with whoever mounts it.
/// Empty until the surface exists.
#[derive(Clone, Default)]
pub struct SurfaceSlot(Arc<Mutex<Option<Arc<dyn PlaybackSurface>>>>);

impl fmt::Debug for SurfaceSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SurfaceSlot")
            .field(&self.0.lock().is_some())
            .finish()
    }
}

impl SurfaceSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(surface: Arc<dyn PlaybackSurface>) -> Self {
        let slot = Self::default();
        slot.set(surface);
        slot
    }

    pub fn set(&self, surface: Arc<dyn PlaybackSurface>) {
        *self.0.lock() = Some(surface);
    }

    pub fn clear(&self) {
        *self.0.lock() = None;
    }

    pub fn get(&self) -> Option<Arc<dyn PlaybackSurface>> {
        self.0.lock().clone()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// LOOKUP STRATEGIES
// ═══════════════════════════════════════════════════════════════════════════

/// Ways to find the surface's media element, tried in [`MediaLocator::ORDER`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaLocator {
    /// The surface's own accessor
    DirectAccessor,
    /// `backend.media_element`
    BackendMediaElement,
    /// `backend.media`
    BackendMedia,
    /// Any live element on the page
    DomScan,
}

impl MediaLocator {
    pub const ORDER: [MediaLocator; 4] = [
        MediaLocator::DirectAccessor,
        MediaLocator::BackendMediaElement,
        MediaLocator::BackendMedia,
        MediaLocator::DomScan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MediaLocator::DirectAccessor => "accessor",
            MediaLocator::BackendMediaElement => "backend.media_element",
            MediaLocator::BackendMedia => "backend.media",
            MediaLocator::DomScan => "page scan",
        }
    }

    /// Element this strategy finds, if it is still live
    pub fn find(self, surface: &dyn PlaybackSurface, page: &MediaDirectory) -> Option<MediaElement> {
        match self {
            MediaLocator::DomScan => page.first_live(),
            _ => self.find_on_surface(surface),
        }
    }

    /// Like [`MediaLocator::find`] without the page. `DomScan` finds nothing.
    pub fn find_on_surface(self, surface: &dyn PlaybackSurface) -> Option<MediaElement> {
        let found = match self {
            MediaLocator::DirectAccessor => surface.media_element(),
            MediaLocator::BackendMediaElement => surface.backend().and_then(|b| b.media_element),
            MediaLocator::BackendMedia => surface.backend().and_then(|b| b.media),
            MediaLocator::DomScan => None,
        };
        found.filter(MediaElement::is_live)
    }
}

/// First strategy in order that yields an element
pub fn locate_media(
    surface: &dyn PlaybackSurface,
    page: &MediaDirectory,
) -> Option<(MediaLocator, MediaElement)> {
    MediaLocator::ORDER.iter().find_map(|&locator| {
        let element = locator.find(surface, page)?;
        log::debug!("[Surface] {} found via {}", element.id(), locator.name());
        Some((locator, element))
    })
}

/// First surface-side strategy that yields an element
pub fn locate_on_surface(surface: &dyn PlaybackSurface) -> Option<(MediaLocator, MediaElement)> {
    MediaLocator::ORDER
        .iter()
        .find_map(|&locator| locator.find_on_surface(surface).map(|el| (locator, el)))
}

// ═══════════════════════════════════════════════════════════════════════════
// SOFTWARE SURFACE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
struct SurfaceState {
    element: Option<MediaElement>,
    context: Option<AudioContext>,
    analyser: Option<AnalyserNode>,
    tap: Option<MediaStreamSourceNode>,
}

/// In-process playback surface. `exposure` picks which lookup strategy can
/// see the loaded element; [`MediaLocator::DomScan`] hides it from the
/// surface itself so only the page registry finds it.
pub struct SoftwareSurface {
    exposure: MediaLocator,
    state: Mutex<SurfaceState>,
    event_tx: Sender<SurfaceEvent>,
    event_rx: Receiver<SurfaceEvent>,
}

impl fmt::Debug for SoftwareSurface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SoftwareSurface")
            .field("exposure", &self.exposure)
            .field("element", &state.element.as_ref().map(MediaElement::id))
            .field("has_context", &state.context.is_some())
            .field("has_analyser", &state.analyser.is_some())
            .finish()
    }
}

impl SoftwareSurface {
    pub fn new(exposure: MediaLocator) -> Self {
        let (event_tx, event_rx) = bounded(256);
        Self {
            exposure,
            state: Mutex::new(SurfaceState::default()),
            event_tx,
            event_rx,
        }
    }

    /// Give the backend an audio context
    pub fn with_context(self, context: AudioContext) -> Self {
        self.state.lock().context = Some(context);
        self
    }

    pub fn exposure(&self) -> MediaLocator {
        self.exposure
    }

    pub fn context(&self) -> Option<AudioContext> {
        self.state.lock().context.clone()
    }

    pub fn element(&self) -> Option<MediaElement> {
        self.state.lock().element.clone()
    }

    /// Event receiver
    pub fn events(&self) -> Receiver<SurfaceEvent> {
        self.event_rx.clone()
    }

    fn emit(&self, event: SurfaceEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::warn!("[Surface] event queue full, dropped {:?}", event);
        }
    }

    /// Take over an element and signal ready
    pub fn load(&self, element: &MediaElement) {
        self.state.lock().element = Some(element.clone());
        log::info!("[Surface] loaded {}", element.id());
        self.emit(SurfaceEvent::Ready);
    }

    /// Build the backend analyser, fed from a capture of the loaded element
    /// so the element's source slot stays free
    pub fn enable_analyser(&self, config: &AnalyserConfig) -> LiveResult<AnalyserNode> {
        let mut state = self.state.lock();
        if let Some(analyser) = &state.analyser {
            return Ok(analyser.clone());
        }
        let (Some(context), Some(element)) = (state.context.clone(), state.element.clone()) else {
            return Err(LiveError::Graph(bw_engine::GraphError::InvalidState(
                "analyser needs a context and a loaded element".into(),
            )));
        };

        let stream = element.capture_stream()?;
        let tap = context.create_media_stream_source(&stream)?;
        let analyser = context.create_analyser_with(config)?;
        context.connect(&tap, &analyser)?;

        state.tap = Some(tap);
        state.analyser = Some(analyser.clone());
        Ok(analyser)
    }

    /// Start playback, resuming the surface's own context if it has one
    pub fn play(&self) {
        if let Some(context) = self.context() {
            if context.state() == bw_engine::ContextState::Suspended {
                if let Err(e) = context.resume() {
                    log::warn!("[Surface] context resume failed: {}", e);
                }
            }
        }
        if let Some(element) = self.element() {
            element.play();
            self.emit(SurfaceEvent::Play);
        }
    }

    pub fn pause(&self) {
        if let Some(element) = self.element() {
            element.pause();
            self.emit(SurfaceEvent::Pause);
        }
    }

    /// Emit `Finish` once the element ran out. Returns whether it did.
    pub fn poll_finished(&self) -> bool {
        let ended = self.element().is_some_and(|e| e.has_ended());
        if ended {
            self.emit(SurfaceEvent::Finish);
        }
        ended
    }
}

impl PlaybackSurface for SoftwareSurface {
    fn media_element(&self) -> Option<MediaElement> {
        match self.exposure {
            MediaLocator::DirectAccessor => self.element(),
            _ => None,
        }
    }

    fn backend(&self) -> Option<SurfaceBackend> {
        let state = self.state.lock();
        let exposed = |locator| {
            if self.exposure == locator {
                state.element.clone()
            } else {
                None
            }
        };
        let backend = SurfaceBackend {
            media_element: exposed(MediaLocator::BackendMediaElement),
            media: exposed(MediaLocator::BackendMedia),
            analyser: state.analyser.clone(),
            context: state.context.clone(),
        };
        let empty = backend.media_element.is_none()
            && backend.media.is_none()
            && backend.analyser.is_none()
            && backend.context.is_none();
        (!empty).then_some(backend)
    }

    fn is_playing(&self) -> bool {
        self.element().is_some_and(|e| e.is_playing())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_core::RenderConfig;

    fn element() -> MediaElement {
        MediaElement::new(vec![0.0; 64], 48000.0)
    }

    fn loaded(exposure: MediaLocator) -> (SoftwareSurface, MediaElement) {
        let surface = SoftwareSurface::new(exposure);
        let el = element();
        surface.load(&el);
        (surface, el)
    }

    #[test]
    fn test_each_exposure_found_by_its_strategy() {
        for exposure in MediaLocator::ORDER {
            let (surface, el) = loaded(exposure);
            let page = MediaDirectory::new();
            if exposure == MediaLocator::DomScan {
                page.register(&el);
            }
            let (locator, found) = locate_media(&surface, &page).unwrap();
            assert_eq!(locator, exposure);
            assert!(found.same_element(&el));
        }
    }

    #[test]
    fn test_order_prefers_accessor() {
        let (surface, el) = loaded(MediaLocator::DirectAccessor);
        let page = MediaDirectory::new();
        page.register(&element());
        let (locator, found) = locate_media(&surface, &page).unwrap();
        assert_eq!(locator, MediaLocator::DirectAccessor);
        assert!(found.same_element(&el));
    }

    #[test]
    fn test_destroyed_element_rejected() {
        let (surface, el) = loaded(MediaLocator::DirectAccessor);
        el.destroy();
        assert!(locate_media(&surface, &MediaDirectory::new()).is_none());
    }

    #[test]
    fn test_empty_surface_has_no_backend() {
        let surface = SoftwareSurface::new(MediaLocator::DirectAccessor);
        assert!(surface.backend().is_none());
        assert!(surface.media_element().is_none());
    }

    #[test]
    fn test_events() {
        let (surface, _el) = loaded(MediaLocator::DirectAccessor);
        let rx = surface.events();
        surface.play();
        assert!(surface.is_playing());
        surface.pause();
        let events: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            events,
            vec![SurfaceEvent::Ready, SurfaceEvent::Play, SurfaceEvent::Pause]
        );
    }

    #[test]
    fn test_backend_analyser_leaves_source_slot_free() {
        let context = AudioContext::new(&RenderConfig::default());
        let surface = SoftwareSurface::new(MediaLocator::DirectAccessor).with_context(context.clone());
        let el = element();
        surface.load(&el);

        let analyser = surface.enable_analyser(&AnalyserConfig::default()).unwrap();
        let again = surface.enable_analyser(&AnalyserConfig::default()).unwrap();
        assert!(analyser.same_node(&again));
        assert!(!el.has_source());
        assert!(surface.backend().unwrap().analyser.is_some());
    }

    #[test]
    fn test_surface_lookup_ignores_page() {
        let (surface, el) = loaded(MediaLocator::DomScan);
        assert!(locate_on_surface(&surface).is_none());

        let (surface, el2) = loaded(MediaLocator::BackendMedia);
        let (locator, found) = locate_on_surface(&surface).unwrap();
        assert_eq!(locator, MediaLocator::BackendMedia);
        assert!(found.same_element(&el2));
        assert!(!found.same_element(&el));
    }

    #[test]
    fn test_slot() {
        let slot = SurfaceSlot::empty();
        assert!(slot.get().is_none());
        slot.set(Arc::new(SoftwareSurface::new(MediaLocator::DomScan)));
        assert!(slot.get().is_some());
        slot.clear();
        assert!(slot.get().is_none());
    }
}
