//! Metering panel
//!
//! The mounted metering component: one attachment engine plus one meter,
//! driven by the scheduler. Teardown runs in a fixed order:
//!
//! 1. cancel the polling timer
//! 2. cancel the frame loop
//! 3. close the context, only if the engine created it
//! 4. drop analyser and graph references
//!
//! Unmounting twice is harmless.

use std::sync::{Arc, Weak};

use bw_core::LiveConfig;
use bw_viz::RenderTarget;
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

use crate::attach::{AttachDeps, AttachEngine, AttachEvent, AttachState, AttachStep, Attachment};
use crate::handle::ContextOwnership;
use crate::meter::{Meter, MeterSnapshot, MeterStats, MeterStatus};
use crate::scheduler::{Scheduler, TaskId};
use crate::surface::SurfaceSlot;

struct PanelInner {
    attach: AttachEngine,
    meter: Meter,
    surface: SurfaceSlot,
    mounted: bool,
}

impl PanelInner {
    fn on_tick(&mut self, scheduler: &mut Scheduler, weak: Weak<Mutex<PanelInner>>) {
        match self.attach.attempt(scheduler) {
            AttachStep::Attached => {
                let Some(analyser) = self.attach.attachment().map(|a| a.analyser.clone()) else {
                    return;
                };
                self.meter.bind(analyser);
                self.meter
                    .start_loop(scheduler, move |s| schedule_frame(weak, s));
            }
            AttachStep::Exhausted | AttachStep::Failed => {
                if let Some(error) = self.attach.error().cloned() {
                    self.meter.set_error(&error);
                }
            }
            AttachStep::Retry | AttachStep::Inactive => {}
        }
    }

    fn on_frame(&mut self) {
        let playing = self.surface.get().is_some_and(|s| s.is_playing());
        self.meter.frame(playing);
    }
}

fn schedule_frame(weak: Weak<Mutex<PanelInner>>, scheduler: &mut Scheduler) -> TaskId {
    scheduler.request_frame(move |s| {
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let mut inner = inner.lock();
        if !inner.meter.is_running() {
            return;
        }
        inner.on_frame();
        let next = schedule_frame(weak, s);
        inner.meter.rearm(next);
    })
}

/// Mounted metering component
#[derive(Clone)]
pub struct MeterPanel {
    inner: Arc<Mutex<PanelInner>>,
}

impl MeterPanel {
    pub fn new(config: &LiveConfig, deps: AttachDeps) -> Self {
        let surface = deps.surface.clone();
        Self {
            inner: Arc::new(Mutex::new(PanelInner {
                attach: AttachEngine::new(&config.attach, &config.analyser, deps),
                meter: Meter::new(&config.meter),
                surface,
                mounted: false,
            })),
        }
    }

    /// Where the spectrum and VU geometry go each frame
    pub fn with_targets(
        self,
        spectrum: Box<dyn RenderTarget + Send>,
        vu: Box<dyn RenderTarget + Send>,
    ) -> Self {
        self.inner.lock().meter.set_targets(Some(spectrum), Some(vu));
        self
    }

    /// Start polling for the media element. `false` if already mounted once.
    pub fn mount(&self, scheduler: &mut Scheduler) -> bool {
        let weak = Arc::downgrade(&self.inner);
        let mut inner = self.inner.lock();
        let started = inner.attach.start(scheduler, move |s| {
            if let Some(inner) = weak.upgrade() {
                inner.lock().on_tick(s, weak.clone());
            }
        });
        inner.mounted |= started;
        started
    }

    /// Tear everything down. Returns `false` if there was nothing to do.
    pub fn unmount(&self, scheduler: &mut Scheduler) -> bool {
        let mut inner = self.inner.lock();
        let timers = inner.attach.cancel_polling(scheduler);
        let frames = inner.meter.stop_loop(scheduler);
        let graph = inner.attach.release();
        let refs = inner.meter.unbind();
        let was_mounted = std::mem::replace(&mut inner.mounted, false);
        if was_mounted {
            log::info!("[Panel] unmounted");
        }
        timers || frames || graph || refs || was_mounted
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lock().mounted
    }

    pub fn attach_state(&self) -> AttachState {
        self.inner.lock().attach.state()
    }

    pub fn attempts(&self) -> u32 {
        self.inner.lock().attach.attempts()
    }

    pub fn attachment(&self) -> Option<Attachment> {
        self.inner.lock().attach.attachment().cloned()
    }

    /// Ownership of the context the engine wired into, if it wired one
    pub fn context_ownership(&self) -> Option<ContextOwnership> {
        self.inner.lock().attach.handle().map(|h| h.ownership())
    }

    pub fn attach_events(&self) -> Receiver<AttachEvent> {
        self.inner.lock().attach.events()
    }

    pub fn snapshot(&self) -> MeterSnapshot {
        self.inner.lock().meter.snapshot().clone()
    }

    pub fn stats(&self) -> MeterStats {
        self.inner.lock().meter.stats()
    }

    pub fn status(&self) -> MeterStatus {
        self.inner.lock().meter.status().clone()
    }

    pub fn frames(&self) -> u64 {
        self.inner.lock().meter.frames()
    }

    pub fn frame_errors(&self) -> u64 {
        self.inner.lock().meter.frame_errors()
    }

    pub fn loop_starts(&self) -> u32 {
        self.inner.lock().meter.loop_starts()
    }

    pub fn is_frame_loop_running(&self) -> bool {
        self.inner.lock().meter.is_running()
    }

    /// Read access to the meter, e.g. for its draw lists
    pub fn with_meter<R>(&self, f: impl FnOnce(&Meter) -> R) -> R {
        f(&self.inner.lock().meter)
    }
}
