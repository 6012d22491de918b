//! FFT analyser with byte readout
//!
//! Holds the most recent `fft_size` input samples and produces the two
//! readouts a metering UI polls every frame:
//! - frequency data: Blackman window, real FFT, magnitude / N, temporal
//!   smoothing, dB, then `[min_db, max_db]` mapped linearly onto `0..=255`
//! - time-domain data: `floor(128 * (1 + x))` clamped to `0..=255`
//!
//! Every buffer is allocated in [`FftAnalyser::new`]; the readouts write into
//! caller-owned slices.

use std::f64::consts::PI;
use std::sync::Arc;

use bw_core::{AnalyserConfig, CoreError, CoreResult, Sample};
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

/// Blackman window coefficient
const BLACKMAN_ALPHA: f64 = 0.16;

pub struct FftAnalyser {
    fft: Arc<dyn RealToComplex<f64>>,
    fft_size: usize,
    smoothing: f64,
    min_decibels: f64,
    max_decibels: f64,

    /// Ring of recent input, `write_pos` is the oldest sample
    history: Vec<Sample>,
    write_pos: usize,

    window: Vec<f64>,
    scratch: Vec<f64>,
    spectrum: Vec<Complex<f64>>,
    smoothed: Vec<f64>,

    /// New input arrived since the spectrum was last computed
    dirty: bool,
}

impl std::fmt::Debug for FftAnalyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FftAnalyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish()
    }
}

impl FftAnalyser {
    pub fn new(config: &AnalyserConfig) -> CoreResult<Self> {
        let fft_size = config.fft_size;
        if !fft_size.is_power_of_two()
            || !(AnalyserConfig::MIN_FFT_SIZE..=AnalyserConfig::MAX_FFT_SIZE).contains(&fft_size)
        {
            return Err(CoreError::InvalidParam(format!("fft_size {fft_size}")));
        }

        let mut planner = RealFftPlanner::new();
        let fft = planner.plan_fft_forward(fft_size);

        let a0 = 0.5 * (1.0 - BLACKMAN_ALPHA);
        let a2 = 0.5 * BLACKMAN_ALPHA;
        let window = (0..fft_size)
            .map(|i| {
                let x = i as f64 / fft_size as f64;
                a0 - 0.5 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
            })
            .collect();

        let mut analyser = Self {
            fft,
            fft_size,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
            history: vec![0.0; fft_size],
            write_pos: 0,
            window,
            scratch: vec![0.0; fft_size],
            spectrum: vec![Complex::new(0.0, 0.0); fft_size / 2 + 1],
            smoothed: vec![0.0; fft_size / 2],
            dirty: true,
        };
        analyser.set_smoothing(config.smoothing)?;
        analyser.set_decibel_range(config.min_decibels, config.max_decibels)?;
        Ok(analyser)
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of frequency bins, `fft_size / 2`
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn smoothing(&self) -> f64 {
        self.smoothing
    }

    pub fn set_smoothing(&mut self, smoothing: f64) -> CoreResult<()> {
        if !(0.0..=1.0).contains(&smoothing) {
            return Err(CoreError::InvalidParam(format!("smoothing {smoothing}")));
        }
        self.smoothing = smoothing;
        Ok(())
    }

    pub fn decibel_range(&self) -> (f64, f64) {
        (self.min_decibels, self.max_decibels)
    }

    pub fn set_decibel_range(&mut self, min_db: f64, max_db: f64) -> CoreResult<()> {
        if min_db.is_nan() || max_db.is_nan() || min_db >= max_db {
            return Err(CoreError::InvalidParam(format!(
                "decibel range {min_db}..{max_db}"
            )));
        }
        self.min_decibels = min_db;
        self.max_decibels = max_db;
        Ok(())
    }

    /// Feed rendered samples
    pub fn push(&mut self, samples: &[Sample]) {
        for &x in samples {
            self.history[self.write_pos] = x;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
        if !samples.is_empty() {
            self.dirty = true;
        }
    }

    pub fn reset(&mut self) {
        self.history.fill(0.0);
        self.smoothed.fill(0.0);
        self.write_pos = 0;
        self.dirty = true;
    }

    #[inline]
    fn history_at(&self, i: usize) -> Sample {
        self.history[(self.write_pos + i) % self.fft_size]
    }

    /// Recompute the smoothed magnitude spectrum if new input arrived.
    /// Repeated calls without new input leave the smoothing state alone.
    fn analyse(&mut self) {
        if !self.dirty {
            return;
        }
        self.dirty = false;

        for i in 0..self.fft_size {
            self.scratch[i] = self.history_at(i) * self.window[i];
        }

        if self.fft.process(&mut self.scratch, &mut self.spectrum).is_err() {
            log::warn!("[Analyser] FFT failed, holding previous spectrum");
            return;
        }

        let scale = 1.0 / self.fft_size as f64;
        let tau = self.smoothing;
        for (bin, c) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let magnitude = c.norm() * scale;
            let next = tau * *bin + (1.0 - tau) * magnitude;
            *bin = if next.is_finite() { next } else { 0.0 };
        }
    }

    /// Smoothed spectrum in dB, one value per bin
    pub fn float_frequency_data(&mut self, out: &mut [f64]) {
        self.analyse();
        for (dst, &mag) in out.iter_mut().zip(&self.smoothed) {
            *dst = 20.0 * mag.log10();
        }
    }

    /// Smoothed spectrum mapped to bytes. Extra output slots are untouched.
    pub fn byte_frequency_data(&mut self, out: &mut [u8]) {
        self.analyse();
        let range = self.max_decibels - self.min_decibels;
        for (dst, &mag) in out.iter_mut().zip(&self.smoothed) {
            let db = 20.0 * mag.log10();
            let scaled = 255.0 / range * (db - self.min_decibels);
            *dst = if scaled.is_finite() {
                scaled.floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
    }

    /// Oldest-first waveform of the current window, mapped to bytes
    pub fn byte_time_domain_data(&self, out: &mut [u8]) {
        let n = out.len().min(self.fft_size);
        for (i, dst) in out.iter_mut().take(n).enumerate() {
            *dst = sample_to_byte(self.history_at(i));
        }
    }

    /// Oldest-first waveform of the current window
    pub fn float_time_domain_data(&self, out: &mut [f64]) {
        let n = out.len().min(self.fft_size);
        for (i, dst) in out.iter_mut().take(n).enumerate() {
            *dst = self.history_at(i);
        }
    }

    /// Bin index nearest to `freq`
    pub fn freq_to_bin(&self, freq: f64, sample_rate: f64) -> usize {
        let bin = (freq * self.fft_size as f64 / sample_rate).round() as usize;
        bin.min(self.frequency_bin_count().saturating_sub(1))
    }
}

/// `floor(128 * (1 + x))` clamped to a byte
#[inline]
pub fn sample_to_byte(x: Sample) -> u8 {
    let v = (128.0 * (1.0 + x)).floor();
    if v.is_nan() { 128 } else { v.clamp(0.0, 255.0) as u8 }
}
