//! Real-time metering
//!
//! Every display frame the meter reads the analyser's byte spectrum and
//! byte waveform into buffers it allocated once, derives RMS, peak and
//! their dB values, and redraws the spectrum and VU geometry.
//!
//! A failing frame (e.g. the analyser's context was closed under us) is
//! logged and skipped. The last good snapshot stays on display.

use bw_core::MeterConfig;
use bw_dsp::meter::{has_signal, peak_of_bytes, rms_of_bytes, to_db_floored};
use bw_engine::AnalyserNode;
use bw_viz::{DrawList, RenderTarget, SpectrumConfig, VuConfig, build_spectrum, build_vu_meter};
use serde::Serialize;

use crate::error::{LiveError, LiveResult};
use crate::scheduler::{Scheduler, TaskId};

/// Values derived from one frame
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterSnapshot {
    /// Linear RMS, 0..1
    pub rms: f64,
    /// Linear peak, 0..1
    pub peak: f64,
    pub db_rms: f64,
    pub db_peak: f64,
    pub frequency_bins: Vec<u8>,
}

/// Numbers shown next to the meters
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeterStats {
    pub rms_percent: f64,
    pub peak_percent: f64,
    pub db: f64,
    pub peak_db: f64,
    /// `peak_db - db`
    pub dynamic_range: f64,
    pub playing: bool,
}

impl MeterSnapshot {
    pub fn stats(&self, playing: bool) -> MeterStats {
        MeterStats {
            rms_percent: self.rms * 100.0,
            peak_percent: self.peak * 100.0,
            db: self.db_rms,
            peak_db: self.db_peak,
            dynamic_range: self.db_peak - self.db_rms,
            playing,
        }
    }
}

/// Developer-facing connection state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeterStatus {
    pub analyser_connected: bool,
    /// Set on the first frame with any non-silent byte
    pub has_data: bool,
    pub error: Option<String>,
}

type BoxedTarget = Box<dyn RenderTarget + Send>;

pub struct Meter {
    floor_db: f64,
    analyser: Option<AnalyserNode>,
    frequency: Vec<u8>,
    time: Vec<u8>,
    snapshot: MeterSnapshot,
    status: MeterStatus,
    playing: bool,
    spectrum_config: SpectrumConfig,
    vu_config: VuConfig,
    spectrum_list: DrawList,
    vu_list: DrawList,
    spectrum_target: Option<BoxedTarget>,
    vu_target: Option<BoxedTarget>,
    frame_task: Option<TaskId>,
    frames: u64,
    frame_errors: u64,
    loop_starts: u32,
}

impl Meter {
    pub fn new(config: &MeterConfig) -> Self {
        let spectrum_config = SpectrumConfig::from(config);
        let vu_config = VuConfig::from(config);
        let floor_db = config.floor_db;
        Self {
            floor_db,
            analyser: None,
            frequency: Vec::new(),
            time: Vec::new(),
            snapshot: MeterSnapshot {
                db_rms: floor_db,
                db_peak: floor_db,
                ..Default::default()
            },
            status: MeterStatus::default(),
            playing: false,
            spectrum_list: DrawList::new(spectrum_config.width, spectrum_config.height),
            vu_list: DrawList::new(vu_config.width, vu_config.height),
            spectrum_config,
            vu_config,
            spectrum_target: None,
            vu_target: None,
            frame_task: None,
            frames: 0,
            frame_errors: 0,
            loop_starts: 0,
        }
    }

    pub fn set_targets(&mut self, spectrum: Option<BoxedTarget>, vu: Option<BoxedTarget>) {
        self.spectrum_target = spectrum;
        self.vu_target = vu;
    }

    /// Start reading from `analyser`. Buffers are sized to its bin count.
    pub fn bind(&mut self, analyser: AnalyserNode) {
        let bins = analyser.frequency_bin_count();
        if self.frequency.len() != bins {
            self.frequency = vec![0; bins];
            self.time = vec![128; bins];
            self.snapshot.frequency_bins = vec![0; bins];
        }
        self.analyser = Some(analyser);
        self.status = MeterStatus {
            analyser_connected: true,
            has_data: false,
            error: None,
        };
        log::info!("[Meter] bound, {} bins", bins);
    }

    /// Drop the analyser. `false` if none was bound.
    pub fn unbind(&mut self) -> bool {
        let had = self.analyser.take().is_some();
        if had {
            self.status.analyser_connected = false;
        }
        had
    }

    pub fn is_bound(&self) -> bool {
        self.analyser.is_some()
    }

    /// Record a failure that keeps the meter inactive
    pub fn set_error(&mut self, error: &LiveError) {
        self.status.analyser_connected = false;
        self.status.error = Some(error.to_string());
    }

    pub fn snapshot(&self) -> &MeterSnapshot {
        &self.snapshot
    }

    pub fn stats(&self) -> MeterStats {
        self.snapshot.stats(self.playing)
    }

    pub fn status(&self) -> &MeterStatus {
        &self.status
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn frame_errors(&self) -> u64 {
        self.frame_errors
    }

    pub fn loop_starts(&self) -> u32 {
        self.loop_starts
    }

    pub fn frequency_buffer(&self) -> &[u8] {
        &self.frequency
    }

    pub fn time_buffer(&self) -> &[u8] {
        &self.time
    }

    pub fn spectrum_draw_list(&self) -> &DrawList {
        &self.spectrum_list
    }

    pub fn vu_draw_list(&self) -> &DrawList {
        &self.vu_list
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FRAME
    // ═══════════════════════════════════════════════════════════════════════

    fn read_frame(&mut self) -> LiveResult<()> {
        let analyser = self
            .analyser
            .as_ref()
            .ok_or_else(|| LiveError::TransientFrame("no analyser bound".into()))?;
        analyser
            .get_byte_frequency_data(&mut self.frequency)
            .map_err(|e| LiveError::TransientFrame(e.to_string()))?;
        analyser
            .get_byte_time_domain_data(&mut self.time)
            .map_err(|e| LiveError::TransientFrame(e.to_string()))?;

        if !self.status.has_data && has_signal(&self.frequency, &self.time) {
            self.status.has_data = true;
            log::debug!("[Meter] signal present");
        }

        let rms = rms_of_bytes(&self.time);
        let peak = peak_of_bytes(&self.time);
        self.snapshot.rms = rms;
        self.snapshot.peak = peak;
        self.snapshot.db_rms = to_db_floored(rms, self.floor_db);
        self.snapshot.db_peak = to_db_floored(peak, self.floor_db);
        self.snapshot.frequency_bins.copy_from_slice(&self.frequency);
        Ok(())
    }

    fn draw(&mut self) {
        build_spectrum(&self.frequency, &self.spectrum_config, &mut self.spectrum_list);
        build_vu_meter(
            self.snapshot.rms,
            self.snapshot.peak,
            &self.vu_config,
            &mut self.vu_list,
        );
        if let Some(target) = self.spectrum_target.as_mut() {
            target.submit(&self.spectrum_list);
        }
        if let Some(target) = self.vu_target.as_mut() {
            target.submit(&self.vu_list);
        }
    }

    /// One display frame. Returns `false` if the frame failed.
    pub fn frame(&mut self, playing: bool) -> bool {
        self.playing = playing;
        match self.read_frame() {
            Ok(()) => {
                self.draw();
                self.frames += 1;
                true
            }
            Err(e) => {
                self.frame_errors += 1;
                log::warn!("[Meter] {}", e);
                false
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════
    // FRAME LOOP
    // ═══════════════════════════════════════════════════════════════════════

    /// Start the frame loop. `arm` schedules the first frame. Refused while
    /// unbound or already running.
    pub fn start_loop(
        &mut self,
        scheduler: &mut Scheduler,
        arm: impl FnOnce(&mut Scheduler) -> TaskId,
    ) -> bool {
        if self.analyser.is_none() || self.frame_task.is_some() {
            return false;
        }
        self.frame_task = Some(arm(scheduler));
        self.loop_starts += 1;
        log::info!("[Meter] frame loop started");
        true
    }

    /// Record the frame armed at the end of the current one
    pub fn rearm(&mut self, task: TaskId) {
        self.frame_task = Some(task);
    }

    pub fn is_running(&self) -> bool {
        self.frame_task.is_some()
    }

    /// Cancel the pending frame. `false` if the loop was not running.
    pub fn stop_loop(&mut self, scheduler: &mut Scheduler) -> bool {
        match self.frame_task.take() {
            Some(task) => {
                let cancelled = scheduler.cancel(task);
                log::info!("[Meter] frame loop stopped after {} frames", self.frames);
                cancelled
            }
            None => false,
        }
    }
}
