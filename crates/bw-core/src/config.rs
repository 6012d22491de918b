//! Runtime configuration
//!
//! All sections derive serde with `#[serde(default)]`, so a JSON file only
//! needs to name the values it overrides:
//!
//! ```json
//! { "attach": { "max_attempts": 10 }, "effects": { "delay_feedback": 0.5 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::params::{DELAY_FEEDBACK, DELAY_MIX, DELAY_TIME_MS, EQ_GAIN_DB, MASTER_GAIN_DB};
use crate::{DEFAULT_SAMPLE_RATE, METER_FLOOR_DB, RENDER_QUANTUM};

// ═══════════════════════════════════════════════════════════════════════════════
// ATTACHMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Bounded retry policy for locating a media element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachConfig {
    /// Interval between attempts
    pub poll_interval_ms: u64,
    /// Attempt budget before giving up
    pub max_attempts: u32,
    /// Delay before the first attempt
    pub initial_delay_ms: u64,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            max_attempts: 30,
            initial_delay_ms: 200,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ANALYSER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyserConfig {
    pub fft_size: usize,
    pub smoothing: f64,
    pub min_decibels: f64,
    pub max_decibels: f64,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    pub const MIN_FFT_SIZE: usize = 32;
    pub const MAX_FFT_SIZE: usize = 32768;
}

// ═══════════════════════════════════════════════════════════════════════════════
// METER
// ═══════════════════════════════════════════════════════════════════════════════

/// Meter floor and drawing surface sizes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeterConfig {
    pub floor_db: f64,
    pub spectrum_width: f32,
    pub spectrum_height: f32,
    pub vu_width: f32,
    pub vu_height: f32,
}

impl Default for MeterConfig {
    fn default() -> Self {
        Self {
            floor_db: METER_FLOOR_DB,
            spectrum_width: 600.0,
            spectrum_height: 200.0,
            vu_width: 600.0,
            vu_height: 60.0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub sample_rate: f64,
    pub render_quantum: usize,
    /// Display frame period used by the frame loop
    pub frame_interval_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            render_quantum: RENDER_QUANTUM,
            frame_interval_ms: 16,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EFFECTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Live effects control values. Doubles as a JSON preset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectsParams {
    pub master_gain_db: f64,
    pub eq_bass: f64,
    pub eq_low_mid: f64,
    pub eq_mid: f64,
    pub eq_high_mid: f64,
    pub eq_treble: f64,
    pub delay_time_ms: f64,
    pub delay_mix: f64,
    pub delay_feedback: f64,
}

impl Default for EffectsParams {
    fn default() -> Self {
        Self {
            master_gain_db: MASTER_GAIN_DB.default,
            eq_bass: EQ_GAIN_DB.default,
            eq_low_mid: EQ_GAIN_DB.default,
            eq_mid: EQ_GAIN_DB.default,
            eq_high_mid: EQ_GAIN_DB.default,
            eq_treble: EQ_GAIN_DB.default,
            delay_time_ms: DELAY_TIME_MS.default,
            delay_mix: DELAY_MIX.default,
            delay_feedback: DELAY_FEEDBACK.default,
        }
    }
}

impl EffectsParams {
    /// Band gains in signal order (bass first)
    pub fn eq_gains(&self) -> [f64; 5] {
        [
            self.eq_bass,
            self.eq_low_mid,
            self.eq_mid,
            self.eq_high_mid,
            self.eq_treble,
        ]
    }

    /// Copy with every value forced into its legal range
    pub fn clamped(&self) -> Self {
        Self {
            master_gain_db: MASTER_GAIN_DB.clamp(self.master_gain_db),
            eq_bass: EQ_GAIN_DB.clamp(self.eq_bass),
            eq_low_mid: EQ_GAIN_DB.clamp(self.eq_low_mid),
            eq_mid: EQ_GAIN_DB.clamp(self.eq_mid),
            eq_high_mid: EQ_GAIN_DB.clamp(self.eq_high_mid),
            eq_treble: EQ_GAIN_DB.clamp(self.eq_treble),
            delay_time_ms: DELAY_TIME_MS.clamp(self.delay_time_ms),
            delay_mix: DELAY_MIX.clamp(self.delay_mix),
            delay_feedback: DELAY_FEEDBACK.clamp(self.delay_feedback),
        }
    }

    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Names of the fields outside their legal range
    pub fn out_of_range(&self) -> Vec<&'static str> {
        [
            ("master_gain_db", MASTER_GAIN_DB, self.master_gain_db),
            ("eq_bass", EQ_GAIN_DB, self.eq_bass),
            ("eq_low_mid", EQ_GAIN_DB, self.eq_low_mid),
            ("eq_mid", EQ_GAIN_DB, self.eq_mid),
            ("eq_high_mid", EQ_GAIN_DB, self.eq_high_mid),
            ("eq_treble", EQ_GAIN_DB, self.eq_treble),
            ("delay_time_ms", DELAY_TIME_MS, self.delay_time_ms),
            ("delay_mix", DELAY_MIX, self.delay_mix),
            ("delay_feedback", DELAY_FEEDBACK, self.delay_feedback),
        ]
        .into_iter()
        .filter(|(_, range, value)| !range.contains(*value))
        .map(|(name, ..)| name)
        .collect()
    }

    /// Read a preset. Out-of-range values are kept and reported; they are
    /// clamped when applied.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let params = Self::from_json_str(&text)?;
        for name in params.out_of_range() {
            log::warn!("[Config] {}: {} out of range, will be clamped", path.display(), name);
        }
        Ok(params)
    }

    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOP LEVEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Complete configuration for a live session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub attach: AttachConfig,
    pub analyser: AnalyserConfig,
    pub meter: MeterConfig,
    pub render: RenderConfig,
    pub effects: EffectsParams,
}

impl LiveConfig {
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        log::info!("[Config] Loaded {}", path.display());
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> CoreResult<()> {
        if self.attach.poll_interval_ms == 0 {
            return Err(CoreError::InvalidParam(
                "attach.poll_interval_ms must be > 0".into(),
            ));
        }
        if self.attach.max_attempts == 0 {
            return Err(CoreError::InvalidParam(
                "attach.max_attempts must be > 0".into(),
            ));
        }

        let fft = self.analyser.fft_size;
        if !fft.is_power_of_two()
            || !(AnalyserConfig::MIN_FFT_SIZE..=AnalyserConfig::MAX_FFT_SIZE).contains(&fft)
        {
            return Err(CoreError::InvalidParam(format!(
                "analyser.fft_size {fft} is not a power of two in 32..=32768"
            )));
        }
        if !(0.0..=1.0).contains(&self.analyser.smoothing) {
            return Err(CoreError::InvalidParam(format!(
                "analyser.smoothing {} outside 0..=1",
                self.analyser.smoothing
            )));
        }
        if self.analyser.min_decibels >= self.analyser.max_decibels {
            return Err(CoreError::InvalidParam(
                "analyser.min_decibels must be below max_decibels".into(),
            ));
        }

        if !self.meter.floor_db.is_finite() || self.meter.floor_db >= 0.0 {
            return Err(CoreError::InvalidParam(format!(
                "meter.floor_db {} must be finite and negative",
                self.meter.floor_db
            )));
        }

        let sr = self.render.sample_rate;
        if !sr.is_finite() || !(8000.0..=384_000.0).contains(&sr) {
            return Err(CoreError::InvalidSampleRate(sr));
        }
        if self.render.render_quantum == 0 || self.render.frame_interval_ms == 0 {
            return Err(CoreError::InvalidParam(
                "render.render_quantum and render.frame_interval_ms must be > 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = LiveConfig::default();
        assert_eq!(config.attach.poll_interval_ms, 200);
        assert_eq!(config.attach.max_attempts, 30);
        assert_eq!(config.analyser.fft_size, 2048);
        assert_eq!(config.analyser.smoothing, 0.8);
        assert_eq!(config.meter.floor_db, -60.0);
        assert_eq!(config.render.render_quantum, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config =
            LiveConfig::from_json_str(r#"{ "attach": { "max_attempts": 5 } }"#).unwrap();
        assert_eq!(config.attach.max_attempts, 5);
        assert_eq!(config.attach.poll_interval_ms, 200);
        assert_eq!(config.analyser.fft_size, 2048);
    }

    #[test]
    fn test_validate_rejects_bad_fft() {
        let err = LiveConfig::from_json_str(r#"{ "analyser": { "fft_size": 1000 } }"#);
        assert!(matches!(err, Err(CoreError::InvalidParam(_))));
    }

    #[test]
    fn test_validate_rejects_bad_sample_rate() {
        let err = LiveConfig::from_json_str(r#"{ "render": { "sample_rate": 10.0 } }"#);
        assert!(matches!(err, Err(CoreError::InvalidSampleRate(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "meter": {{ "floor_db": -90.0 }} }}"#).unwrap();
        let config = LiveConfig::load(file.path()).unwrap();
        assert_eq!(config.meter.floor_db, -90.0);
    }

    #[test]
    fn test_effects_preset_clamped() {
        let preset = EffectsParams::from_json_str(
            r#"{ "eq_bass": 40.0, "delay_feedback": 1.5, "delay_time_ms": 5.0 }"#,
        )
        .unwrap();
        assert_eq!(
            preset.out_of_range(),
            vec!["eq_bass", "delay_time_ms", "delay_feedback"]
        );
        let clamped = preset.clamped();
        assert!(clamped.out_of_range().is_empty());
        assert_eq!(clamped.eq_bass, 12.0);
        assert!(clamped.delay_feedback < 1.0);
        assert_eq!(clamped.delay_time_ms, 50.0);
        assert_eq!(clamped.eq_mid, 0.0);
    }

    #[test]
    fn test_effects_preset_json_round_trip() {
        let params = EffectsParams {
            eq_mid: 3.5,
            ..Default::default()
        };
        let text = params.to_json_pretty().unwrap();
        assert_eq!(EffectsParams::from_json_str(&text).unwrap(), params);
    }
}
