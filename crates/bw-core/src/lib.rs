//! bw-core: Shared types, parameters and configuration for Brainwave Live
//!
//! This crate provides the foundational types used across all Brainwave crates.

mod config;
mod error;
mod params;

pub use config::*;
pub use error::*;
pub use params::*;

/// Type alias for audio samples
pub type Sample = f64;

/// Default render sample rate
pub const DEFAULT_SAMPLE_RATE: f64 = 48000.0;

/// Frames processed per graph render quantum
pub const RENDER_QUANTUM: usize = 128;

/// Lowest level the meters report, in dB
pub const METER_FLOOR_DB: f64 = -60.0;

/// Decibel value wrapper
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Decibels(pub f64);

impl Decibels {
    pub const ZERO: Self = Self(0.0);
    pub const FLOOR: Self = Self(METER_FLOOR_DB);

    /// Convert a linear amplitude to dB, floored for meter display.
    ///
    /// Zero, negative and non-finite results all collapse to `floor`,
    /// so a meter never shows `-inf` or `NaN`.
    #[inline]
    pub fn from_amplitude_floored(amplitude: f64, floor: f64) -> Self {
        if amplitude > 0.0 {
            let db = 20.0 * amplitude.log10();
            if db.is_finite() {
                return Self(db.max(floor));
            }
        }
        Self(floor)
    }

    /// Convert a linear gain to dB (unfloored)
    #[inline]
    pub fn from_gain(gain: f64) -> Self {
        if gain <= 0.0 {
            Self(f64::NEG_INFINITY)
        } else {
            Self(20.0 * gain.log10())
        }
    }

    /// Linear gain for this level: `10^(dB/20)`
    #[inline]
    pub fn to_gain(self) -> f64 {
        if self.0 <= -144.0 {
            0.0
        } else {
            10.0_f64.powf(self.0 / 20.0)
        }
    }

    #[inline]
    pub fn value(self) -> f64 {
        self.0
    }
}

impl Default for Decibels {
    fn default() -> Self {
        Self::ZERO
    }
}
