//! One playback session: surface, both live components, scheduler and
//! render driver stepped together one display frame at a time.
//!
//! Both components live in the surface's context, so the rendered output
//! is everything that context plays: the wet effects chain and, once the
//! meter has attached, the dry signal it routes `analyser -> destination`.

use std::sync::Arc;

use anyhow::{Context, Result};
use bw_core::{EffectsParams, LiveConfig, Sample};
use bw_engine::{AudioContext, MediaDirectory, MediaElement, SoftwarePlatform};
use bw_live::{
    AttachDeps, AttachState, LiveEffects, MediaLocator, MeterPanel, MeterStats, RenderDriver,
    Scheduler, SoftwareSurface, SurfaceEvent, SurfaceSlot,
};
use crossbeam_channel::Receiver;

/// `config` rendering at the clip's own rate, checked again after the
/// override
pub fn config_for_clip(mut config: LiveConfig, sample_rate: u32) -> Result<LiveConfig> {
    config.render.sample_rate = sample_rate as f64;
    config
        .validate()
        .with_context(|| format!("clip sample rate {sample_rate} Hz"))?;
    Ok(config)
}

pub struct SessionOptions {
    /// Stop after this much playback; `None` plays to the end
    pub seconds: Option<f64>,
    /// Report every K-th meter frame
    pub frames_every: u64,
    /// Keep the rendered output
    pub capture: bool,
}

#[derive(Debug)]
pub struct SessionReport {
    pub attach_state: AttachState,
    pub attempts: u32,
    pub frames: u64,
    pub frame_errors: u64,
    pub effects_built: bool,
    pub elapsed_ms: u64,
    pub rendered: Vec<Sample>,
}

pub struct Session {
    config: LiveConfig,
    element: MediaElement,
    surface: Arc<SoftwareSurface>,
    slot: SurfaceSlot,
    events: Receiver<SurfaceEvent>,
    panel: MeterPanel,
    effects: LiveEffects,
    scheduler: Scheduler,
    driver: RenderDriver,
}

impl Session {
    pub fn new(config: LiveConfig, preset: &EffectsParams, samples: Vec<Sample>) -> Self {
        let element = MediaElement::new(samples, config.render.sample_rate);
        let page = MediaDirectory::new();
        page.register(&element);

        let surface = Arc::new(
            SoftwareSurface::new(MediaLocator::BackendMediaElement)
                .with_context(AudioContext::new(&config.render)),
        );
        let events = surface.events();
        let slot = SurfaceSlot::empty();

        let panel = MeterPanel::new(
            &config,
            AttachDeps::new(slot.clone(), page, Arc::new(SoftwarePlatform::default())),
        );
        let effects = LiveEffects::new(slot.clone(), preset);
        let scheduler = Scheduler::new(config.render.frame_interval_ms);

        let mut driver = RenderDriver::new(&config.render);
        if let Some(context) = surface.context() {
            driver.add_context(&context);
        }

        Self {
            config,
            element,
            surface,
            slot,
            events,
            panel,
            effects,
            scheduler,
            driver,
        }
    }

    /// Play the clip, calling `on_meter(seconds, stats)` every K-th frame
    pub fn run(
        &mut self,
        options: &SessionOptions,
        mut on_meter: impl FnMut(f64, &MeterStats),
    ) -> Result<SessionReport> {
        let step_ms = self.config.render.frame_interval_ms.max(1);
        let step_frames =
            ((self.config.render.sample_rate * step_ms as f64) / 1000.0).round().max(1.0) as usize;
        let limit_ms = options
            .seconds
            .map_or(u64::MAX, |s| (s.max(0.0) * 1000.0) as u64);
        let every = options.frames_every.max(1);

        self.panel.mount(&mut self.scheduler);
        self.slot.set(self.surface.clone());
        self.surface.load(&self.element);
        self.surface.play();
        log::info!(
            "[Session] playing {:.2}s, {} frames per step",
            self.element.duration(),
            step_frames
        );

        let mut block = vec![0.0; step_frames];
        let mut rendered = Vec::new();
        let mut last_frames = 0;
        loop {
            self.effects.drain_events(&self.events);
            self.driver.render(Some(&self.element), &mut block);
            if options.capture {
                rendered.extend_from_slice(&block);
            }
            self.scheduler.advance(step_ms);

            let frames = self.panel.frames();
            if frames / every > last_frames / every {
                on_meter(self.scheduler.now() as f64 / 1000.0, &self.panel.stats());
            }
            last_frames = frames;

            if self.surface.poll_finished() || self.scheduler.now() >= limit_ms {
                break;
            }
        }
        self.effects.drain_events(&self.events);

        let report = SessionReport {
            attach_state: self.panel.attach_state(),
            attempts: self.panel.attempts(),
            frames: self.panel.frames(),
            frame_errors: self.panel.frame_errors(),
            effects_built: self.effects.is_built(),
            elapsed_ms: self.scheduler.now(),
            rendered,
        };

        self.panel.unmount(&mut self.scheduler);
        self.effects.teardown();
        log::info!("[Session] done after {} ms", report.elapsed_ms);
        Ok(report)
    }
}
