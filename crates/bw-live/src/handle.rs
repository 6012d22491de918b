//! Audio graph handle
//!
//! Binds one media element to one context for a component instance. The
//! source node is created at most once; a second creation anywhere fails
//! inside the engine with `AlreadyConnected`, and the handle never retries
//! that path.

use bw_engine::{AudioContext, ContextState, GraphResult, MediaElement, SourceNode};

/// Who closes the context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextOwnership {
    /// Belongs to the playback surface. Never closed here.
    Borrowed,
    /// Created for this handle. Closed on teardown.
    Owned,
}

#[derive(Debug)]
pub struct AudioGraphHandle {
    context: Option<AudioContext>,
    ownership: ContextOwnership,
    element: Option<MediaElement>,
    source: Option<SourceNode>,
    connected: bool,
}

impl AudioGraphHandle {
    pub fn new(context: AudioContext, ownership: ContextOwnership, element: MediaElement) -> Self {
        Self {
            context: Some(context),
            ownership,
            element: Some(element),
            source: None,
            connected: false,
        }
    }

    pub fn borrowed(context: AudioContext, element: MediaElement) -> Self {
        Self::new(context, ContextOwnership::Borrowed, element)
    }

    pub fn owned(context: AudioContext, element: MediaElement) -> Self {
        Self::new(context, ContextOwnership::Owned, element)
    }

    /// `None` once torn down
    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    pub fn ownership(&self) -> ContextOwnership {
        self.ownership
    }

    pub fn element(&self) -> Option<&MediaElement> {
        self.element.as_ref()
    }

    pub fn source(&self) -> Option<&SourceNode> {
        self.source.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn mark_connected(&mut self) {
        self.connected = true;
    }

    pub fn is_torn_down(&self) -> bool {
        self.context.is_none()
    }

    fn parts(&self) -> GraphResult<(&AudioContext, &MediaElement)> {
        match (&self.context, &self.element) {
            (Some(context), Some(element)) => Ok((context, element)),
            _ => Err(bw_engine::GraphError::InvalidState("handle torn down".into())),
        }
    }

    /// Wrap the element in a source node, or return the one already made
    pub fn ensure_source(&mut self) -> GraphResult<&SourceNode> {
        if self.source.is_none() {
            let (context, element) = self.parts()?;
            let node = context.create_media_element_source(element)?;
            self.source = Some(SourceNode::Element(node));
        }
        self.source.as_ref().ok_or_else(|| {
            bw_engine::GraphError::InvalidState("source missing after creation".into())
        })
    }

    /// Source node fed by a capture of the element instead of wrapping it
    pub fn capture_source(&mut self) -> GraphResult<&SourceNode> {
        if self.source.is_none() {
            let (context, element) = self.parts()?;
            let stream = element.capture_stream()?;
            let node = context.create_media_stream_source(&stream)?;
            self.source = Some(SourceNode::Stream(node));
        }
        self.source.as_ref().ok_or_else(|| {
            bw_engine::GraphError::InvalidState("source missing after creation".into())
        })
    }

    /// Drop every reference, closing the context only if it is ours and
    /// still open. Returns `false` if already torn down.
    pub fn teardown(&mut self) -> bool {
        let Some(context) = self.context.take() else {
            return false;
        };
        if self.ownership == ContextOwnership::Owned && context.state() != ContextState::Closed {
            match context.close() {
                Ok(()) => log::info!("[Handle] closed own context {}", context.id()),
                Err(e) => log::warn!("[Handle] close failed: {}", e),
            }
        }
        self.source = None;
        self.element = None;
        self.connected = false;
        true
    }
}
