//! Media elements
//!
//! A [`MediaElement`] is a playable mono buffer with a playhead. Source nodes
//! read it without consuming it; whoever drives playback calls
//! [`MediaElement::advance`] once per rendered quantum, so the playhead moves
//! at the same rate no matter how many nodes read the element.
//!
//! Samples are read at the context's rate; callers create the context at
//! the element's sample rate.
//!
//! At most one source node may ever wrap an element. The claim is made on
//! the element itself, so it holds across contexts and is never released.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use bw_core::Sample;
use parking_lot::Mutex;

use crate::error::{GraphError, GraphResult};

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media#{}", self.0)
    }
}

#[derive(Debug)]
struct ElementState {
    samples: Arc<[Sample]>,
    sample_rate: f64,
    playhead: usize,
    playing: bool,
    ended: bool,
    live: bool,
}

/// Playable audio element. Clones refer to the same element.
#[derive(Debug, Clone)]
pub struct MediaElement {
    id: ElementId,
    state: Arc<Mutex<ElementState>>,
    source_claimed: Arc<AtomicBool>,
    capture_supported: bool,
}

impl MediaElement {
    pub fn new(samples: impl Into<Arc<[Sample]>>, sample_rate: f64) -> Self {
        Self {
            id: ElementId(NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed)),
            state: Arc::new(Mutex::new(ElementState {
                samples: samples.into(),
                sample_rate,
                playhead: 0,
                playing: false,
                ended: false,
                live: true,
            })),
            source_claimed: Arc::new(AtomicBool::new(false)),
            capture_supported: true,
        }
    }

    /// Element without stream capture support
    pub fn without_capture(mut self) -> Self {
        self.capture_supported = false;
        self
    }

    pub fn id(&self) -> ElementId {
        self.id
    }

    pub fn same_element(&self, other: &MediaElement) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    pub fn sample_rate(&self) -> f64 {
        self.state.lock().sample_rate
    }

    pub fn duration(&self) -> f64 {
        let state = self.state.lock();
        state.samples.len() as f64 / state.sample_rate
    }

    pub fn current_time(&self) -> f64 {
        let state = self.state.lock();
        state.playhead as f64 / state.sample_rate
    }

    pub fn play(&self) {
        let mut state = self.state.lock();
        if !state.live {
            return;
        }
        if state.ended {
            state.playhead = 0;
            state.ended = false;
        }
        state.playing = true;
    }

    pub fn pause(&self) {
        self.state.lock().playing = false;
    }

    pub fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    pub fn has_ended(&self) -> bool {
        self.state.lock().ended
    }

    pub fn seek(&self, seconds: f64) {
        let mut state = self.state.lock();
        let frame = (seconds.max(0.0) * state.sample_rate) as usize;
        state.playhead = frame.min(state.samples.len());
        state.ended = false;
    }

    /// Move the playhead forward. Reaching the end pauses the element.
    pub fn advance(&self, frames: usize) {
        let mut state = self.state.lock();
        if !state.playing || !state.live {
            return;
        }
        state.playhead = (state.playhead + frames).min(state.samples.len());
        if state.playhead >= state.samples.len() {
            state.playing = false;
            state.ended = true;
            log::debug!("[Media] {} ended", self.id);
        }
    }

    /// Copy samples from the playhead without moving it. Silence while
    /// paused, destroyed or past the end.
    pub fn peek(&self, out: &mut [Sample]) {
        let state = self.state.lock();
        if !state.playing || !state.live {
            out.fill(0.0);
            return;
        }
        let start = state.playhead.min(state.samples.len());
        let available = &state.samples[start..];
        let n = out.len().min(available.len());
        out[..n].copy_from_slice(&available[..n]);
        out[n..].fill(0.0);
    }

    pub fn is_live(&self) -> bool {
        self.state.lock().live
    }

    /// Remove the element from playback for good
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        state.live = false;
        state.playing = false;
    }

    /// Claim the element for a source node
    pub(crate) fn claim_source(&self) -> GraphResult<()> {
        if self.source_claimed.swap(true, Ordering::AcqRel) {
            return Err(GraphError::AlreadyConnected { element: self.id });
        }
        Ok(())
    }

    pub fn has_source(&self) -> bool {
        self.source_claimed.load(Ordering::Acquire)
    }

    pub fn supports_capture(&self) -> bool {
        self.capture_supported
    }

    /// Stream of whatever the element is playing. Does not claim the
    /// element, so it works after a source node was created.
    pub fn capture_stream(&self) -> GraphResult<MediaStream> {
        if !self.capture_supported {
            return Err(GraphError::CaptureUnsupported(self.id));
        }
        if !self.is_live() {
            return Err(GraphError::InvalidState(format!("{} destroyed", self.id)));
        }
        Ok(MediaStream {
            element: self.clone(),
        })
    }
}

/// Captured playback of an element
#[derive(Debug, Clone)]
pub struct MediaStream {
    element: MediaElement,
}

impl MediaStream {
    pub fn element_id(&self) -> ElementId {
        self.element.id
    }

    pub(crate) fn peek(&self, out: &mut [Sample]) {
        self.element.peek(out);
    }
}

/// Registry of audio-capable elements on the current page
#[derive(Debug, Clone, Default)]
pub struct MediaDirectory {
    elements: Arc<Mutex<Vec<MediaElement>>>,
}

impl MediaDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, element: &MediaElement) {
        let mut elements = self.elements.lock();
        if !elements.iter().any(|e| e.same_element(element)) {
            elements.push(element.clone());
        }
    }

    pub fn remove(&self, id: ElementId) {
        self.elements.lock().retain(|e| e.id() != id);
    }

    pub fn len(&self) -> usize {
        self.elements.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.lock().is_empty()
    }

    /// First element still alive, in registration order
    pub fn first_live(&self) -> Option<MediaElement> {
        self.elements.lock().iter().find(|e| e.is_live()).cloned()
    }
}
