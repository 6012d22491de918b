//! Parameter types for live processors

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Legal range and default of one control
///
/// Every user-facing control value passes through [`ParamRange::clamp`]
/// before it reaches a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: f64,
    pub max: f64,
    pub default: f64,
}

impl ParamRange {
    pub const fn new(min: f64, max: f64, default: f64) -> Self {
        Self { min, max, default }
    }

    /// Clamp into range. Non-finite input falls back to the default.
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_finite() {
            value.clamp(self.min, self.max)
        } else {
            self.default
        }
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }

    /// Normalize an actual value to 0-1
    pub fn normalize(&self, value: f64) -> f64 {
        let clamped = self.clamp(value);
        (clamped - self.min) / (self.max - self.min)
    }
}

/// Per-band EQ gain in dB
pub const EQ_GAIN_DB: ParamRange = ParamRange::new(-12.0, 12.0, 0.0);

/// Master gain in dB
pub const MASTER_GAIN_DB: ParamRange = ParamRange::new(-12.0, 12.0, 0.0);

/// Delay time in milliseconds
pub const DELAY_TIME_MS: ParamRange = ParamRange::new(50.0, 1000.0, 250.0);

/// Delay wet mix (linear)
pub const DELAY_MIX: ParamRange = ParamRange::new(0.0, 1.0, 0.0);

/// Delay feedback gain (linear). Both bounds are reachable, so the
/// strongest setting is exactly 0.9. Anything below 1.0 keeps the
/// feedback loop decaying.
pub const DELAY_FEEDBACK: ParamRange = ParamRange::new(0.0, 0.9, 0.3);

/// Atomic parameter for lock-free access
#[derive(Debug)]
pub struct AtomicParam {
    bits: AtomicU64,
}

impl AtomicParam {
    pub fn new(value: f64) -> Self {
        Self {
            bits: AtomicU64::new(value.to_bits()),
        }
    }

    #[inline]
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    #[inline]
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
    }

    /// Store `value` unless it already holds exactly that value.
    /// Returns true when the stored value changed.
    #[inline]
    pub fn replace_if_changed(&self, value: f64) -> bool {
        let new_bits = value.to_bits();
        self.bits.swap(new_bits, Ordering::Relaxed) != new_bits
    }
}

impl Default for AtomicParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
