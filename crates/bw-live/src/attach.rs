//! Attachment / retry engine
//!
//! Bridges "a playback surface is mounted" and "an analysable signal exists".
//! A single interval task polls for the surface's media element; each tick
//! is one attempt. The engine then either reuses the surface's own analyser
//! or wires `source -> analyser -> destination` itself.
//!
//! ```text
//! Idle ──start──▶ Polling ──found──▶ Attached
//!                    │
//!                    ├──budget spent──▶ Exhausted
//!                    └──fatal─────────▶ ErrorTerminal
//! ```
//!
//! Nothing leaves `Exhausted` or `ErrorTerminal`.

use std::sync::Arc;

use bw_core::{AnalyserConfig, AttachConfig};
use bw_engine::{
    AnalyserNode, AudioContext, AudioPlatform, ContextState, ElementId, MediaDirectory,
    MediaElement,
};
use crossbeam_channel::{Receiver, Sender, bounded};

use crate::error::{LiveError, LiveResult};
use crate::handle::{AudioGraphHandle, ContextOwnership};
use crate::scheduler::{Scheduler, TaskId};
use crate::surface::{MediaLocator, SurfaceSlot, locate_media};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachState {
    Idle,
    Polling,
    Attached,
    Exhausted,
    ErrorTerminal,
}

impl AttachState {
    pub fn is_terminal(self) -> bool {
        matches!(self, AttachState::Exhausted | AttachState::ErrorTerminal)
    }
}

/// Where the analyser's signal comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TapOrigin {
    /// Analyser owned by the playback surface
    SurfaceBackend,
    /// Our own source node wrapping the element
    ElementSource,
    /// Stream capture of the element, used when it was already wrapped
    StreamCapture,
}

#[derive(Debug, Clone)]
pub struct Attachment {
    pub analyser: AnalyserNode,
    pub origin: TapOrigin,
    pub locator: MediaLocator,
    pub element: MediaElement,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttachEvent {
    Attached {
        origin: TapOrigin,
        locator: MediaLocator,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
    },
    /// A non-terminal error was absorbed and attaching went on
    Recovered(LiveError),
    Failed(LiveError),
}

/// Outcome of one polling tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachStep {
    Retry,
    Attached,
    Exhausted,
    Failed,
    /// Not polling; the tick did nothing
    Inactive,
}

/// What the engine attaches to
#[derive(Clone)]
pub struct AttachDeps {
    pub surface: SurfaceSlot,
    pub page: MediaDirectory,
    pub platform: Arc<dyn AudioPlatform>,
    /// Context handed in by the host. Preferred over every other.
    pub context: Option<AudioContext>,
}

impl AttachDeps {
    pub fn new(surface: SurfaceSlot, page: MediaDirectory, platform: Arc<dyn AudioPlatform>) -> Self {
        Self {
            surface,
            page,
            platform,
            context: None,
        }
    }

    pub fn with_context(mut self, context: AudioContext) -> Self {
        self.context = Some(context);
        self
    }
}

fn is_open(context: &AudioContext) -> bool {
    context.state() != ContextState::Closed
}

pub struct AttachEngine {
    config: AttachConfig,
    analyser_config: AnalyserConfig,
    deps: AttachDeps,
    state: AttachState,
    attempts: u32,
    task: Option<TaskId>,
    attachment: Option<Attachment>,
    handle: Option<AudioGraphHandle>,
    error: Option<LiveError>,
    event_tx: Sender<AttachEvent>,
    event_rx: Receiver<AttachEvent>,
}

impl AttachEngine {
    pub fn new(config: &AttachConfig, analyser_config: &AnalyserConfig, deps: AttachDeps) -> Self {
        let (event_tx, event_rx) = bounded(64);
        Self {
            config: config.clone(),
            analyser_config: analyser_config.clone(),
            deps,
            state: AttachState::Idle,
            attempts: 0,
            task: None,
            attachment: None,
            handle: None,
            error: None,
            event_tx,
            event_rx,
        }
    }

    pub fn state(&self) -> AttachState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn attachment(&self) -> Option<&Attachment> {
        self.attachment.as_ref()
    }

    /// Graph handle while it is live
    pub fn handle(&self) -> Option<&AudioGraphHandle> {
        self.handle.as_ref().filter(|h| !h.is_torn_down())
    }

    pub fn error(&self) -> Option<&LiveError> {
        self.error.as_ref()
    }

    /// Event receiver
    pub fn events(&self) -> Receiver<AttachEvent> {
        self.event_rx.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.task.is_some()
    }

    fn emit(&self, event: AttachEvent) {
        if self.event_tx.try_send(event).is_err() {
            log::warn!("[Attach] event queue full");
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // POLLING
    // ═══════════════════════════════════════════════════════════════════════

    /// Arm the polling task. `on_tick` must call [`AttachEngine::attempt`].
    /// Only the first call from `Idle` does anything.
    pub fn start(
        &mut self,
        scheduler: &mut Scheduler,
        on_tick: impl FnMut(&mut Scheduler) + 'static,
    ) -> bool {
        if self.state != AttachState::Idle {
            return false;
        }
        self.state = AttachState::Polling;
        self.task = Some(scheduler.set_interval(
            self.config.initial_delay_ms,
            self.config.poll_interval_ms,
            on_tick,
        ));
        log::info!(
            "[Attach] polling every {} ms, {} attempts",
            self.config.poll_interval_ms,
            self.config.max_attempts
        );
        true
    }

    /// Disarm the polling task. `false` if none was armed.
    pub fn cancel_polling(&mut self, scheduler: &mut Scheduler) -> bool {
        match self.task.take() {
            Some(task) => scheduler.cancel(task),
            None => false,
        }
    }

    /// One attempt. Terminal outcomes disarm the polling task.
    pub fn attempt(&mut self, scheduler: &mut Scheduler) -> AttachStep {
        if self.state != AttachState::Polling || self.task.is_none() {
            return AttachStep::Inactive;
        }
        self.attempts += 1;

        let step = match self.try_attach() {
            Ok(Some(attachment)) => {
                log::info!(
                    "[Attach] attached to {} via {} ({:?}) after {} attempts",
                    attachment.element.id(),
                    attachment.locator.name(),
                    attachment.origin,
                    self.attempts
                );
                self.emit(AttachEvent::Attached {
                    origin: attachment.origin,
                    locator: attachment.locator,
                    attempts: self.attempts,
                });
                self.attachment = Some(attachment);
                self.state = AttachState::Attached;
                AttachStep::Attached
            }
            Ok(None) if self.attempts >= self.config.max_attempts => {
                log::warn!("[Attach] media element not found after {} attempts", self.attempts);
                self.error = Some(LiveError::AttachmentTimeout {
                    attempts: self.attempts,
                });
                self.emit(AttachEvent::Exhausted {
                    attempts: self.attempts,
                });
                self.state = AttachState::Exhausted;
                AttachStep::Exhausted
            }
            Ok(None) => AttachStep::Retry,
            Err(e) => {
                log::error!("[Attach] giving up: {}", e);
                self.emit(AttachEvent::Failed(e.clone()));
                self.error = Some(e);
                self.state = AttachState::ErrorTerminal;
                AttachStep::Failed
            }
        };

        if step != AttachStep::Retry {
            self.cancel_polling(scheduler);
        }
        step
    }

    fn try_attach(&mut self) -> LiveResult<Option<Attachment>> {
        let Some(surface) = self.deps.surface.get() else {
            log::debug!("[Attach] attempt {}: no playback surface", self.attempts);
            return Ok(None);
        };
        let Some((locator, element)) = locate_media(surface.as_ref(), &self.deps.page) else {
            log::debug!("[Attach] attempt {}: no media element", self.attempts);
            return Ok(None);
        };

        let backend = surface.backend().unwrap_or_default();
        if let Some(analyser) = backend.analyser.filter(|a| !a.is_detached()) {
            log::info!("[Attach] reusing the surface analyser");
            return Ok(Some(Attachment {
                analyser,
                origin: TapOrigin::SurfaceBackend,
                locator,
                element,
                attempts: self.attempts,
            }));
        }

        let (context, ownership) = self.choose_context(backend.context)?;
        if context.state() == ContextState::Suspended {
            // Fire and forget: a context that stays suspended renders silence
            if let Err(e) = context.resume() {
                log::warn!("[Attach] context resume failed: {}", e);
            }
        }

        let element_id = element.id();
        let mut handle = AudioGraphHandle::new(context, ownership, element.clone());
        match self.wire(&mut handle, element_id) {
            Ok((analyser, origin)) => {
                handle.mark_connected();
                self.handle = Some(handle);
                Ok(Some(Attachment {
                    analyser,
                    origin,
                    locator,
                    element,
                    attempts: self.attempts,
                }))
            }
            Err(e) => {
                handle.teardown();
                Err(e)
            }
        }
    }

    /// Injected context, then the surface's, then a new one of our own
    fn choose_context(
        &self,
        backend: Option<AudioContext>,
    ) -> LiveResult<(AudioContext, ContextOwnership)> {
        if let Some(context) = self.deps.context.clone().filter(is_open) {
            return Ok((context, ContextOwnership::Borrowed));
        }
        if let Some(context) = backend.filter(is_open) {
            return Ok((context, ContextOwnership::Borrowed));
        }
        match self.deps.platform.create_context() {
            Ok(context) => {
                log::info!(
                    "[Attach] created context {} on {}",
                    context.id(),
                    self.deps.platform.name()
                );
                Ok((context, ContextOwnership::Owned))
            }
            Err(e) => Err(LiveError::UnsupportedPlatform(e.to_string())),
        }
    }

    fn wire(
        &self,
        handle: &mut AudioGraphHandle,
        element_id: ElementId,
    ) -> LiveResult<(AnalyserNode, TapOrigin)> {
        let context = handle
            .context()
            .cloned()
            .ok_or(LiveError::ConnectionImpossible(element_id))?;
        let analyser = context.create_analyser_with(&self.analyser_config)?;

        let origin = match handle.ensure_source().map(|_| ()) {
            Ok(()) => TapOrigin::ElementSource,
            Err(e) if e.is_duplicate_source() => {
                let duplicate = LiveError::DuplicateSource(element_id);
                let can_capture = handle.element().is_some_and(MediaElement::supports_capture);
                if !can_capture {
                    log::error!("[Attach] {}, and the element cannot be captured", duplicate);
                    return Err(LiveError::ConnectionImpossible(element_id));
                }
                log::warn!("[Attach] {}, trying capture", duplicate);
                if let Err(e) = handle.capture_source() {
                    log::error!("[Attach] capture failed: {}", e);
                    return Err(LiveError::ConnectionImpossible(element_id));
                }
                self.emit(AttachEvent::Recovered(duplicate));
                TapOrigin::StreamCapture
            }
            Err(e) => return Err(e.into()),
        };

        let source = handle
            .source()
            .cloned()
            .ok_or(LiveError::ConnectionImpossible(element_id))?;
        context.connect(&source, &analyser)?;
        context.connect(&analyser, &context.destination())?;
        Ok((analyser, origin))
    }

    /// Tear down our graph handle and drop the attachment. Closes the
    /// context only if this engine created it.
    pub fn release(&mut self) -> bool {
        let mut released = self.attachment.take().is_some();
        if let Some(mut handle) = self.handle.take() {
            released |= handle.teardown();
        }
        released
    }
}
