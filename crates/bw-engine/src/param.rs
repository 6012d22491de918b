//! Parameter ports
//!
//! An [`AudioParam`] is a named `f64` cell shared between a node handle and
//! the node's render-side processor. Writes are plain stores; they never
//! touch graph topology.

use std::sync::Arc;

use bw_core::AtomicParam;

#[derive(Debug, Clone)]
pub struct AudioParam {
    name: &'static str,
    value: Arc<AtomicParam>,
    default: f64,
    min: f64,
    max: f64,
}

impl AudioParam {
    pub fn new(name: &'static str, default: f64, min: f64, max: f64) -> Self {
        Self {
            name,
            value: Arc::new(AtomicParam::new(default)),
            default,
            min,
            max,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value.get()
    }

    pub fn default_value(&self) -> f64 {
        self.default
    }

    /// Nominal range the value is clamped into
    pub fn range(&self) -> (f64, f64) {
        (self.min, self.max)
    }

    /// Store a new value, clamped to the nominal range. NaN is ignored.
    /// Returns true when the stored value changed.
    pub fn set_value(&self, value: f64) -> bool {
        if value.is_nan() {
            log::debug!("[Param] {} ignoring NaN", self.name);
            return false;
        }
        self.value.replace_if_changed(value.clamp(self.min, self.max))
    }

    /// Both handles point at the same cell
    pub fn shares_cell(&self, other: &AudioParam) -> bool {
        Arc::ptr_eq(&self.value, &other.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamps_to_nominal_range() {
        let p = AudioParam::new("gain", 1.0, 0.0, 2.0);
        p.set_value(5.0);
        assert_eq!(p.value(), 2.0);
        p.set_value(-1.0);
        assert_eq!(p.value(), 0.0);
    }

    #[test]
    fn test_set_reports_change() {
        let p = AudioParam::new("gain", 1.0, 0.0, 2.0);
        assert!(!p.set_value(1.0));
        assert!(p.set_value(0.5));
        assert!(!p.set_value(0.5));
        assert!(!p.set_value(f64::NAN));
        assert_eq!(p.value(), 0.5);
    }

    #[test]
    fn test_clones_share_cell() {
        let p = AudioParam::new("q", 1.0, 0.0, 10.0);
        let q = p.clone();
        q.set_value(3.0);
        assert_eq!(p.value(), 3.0);
        assert!(p.shares_cell(&q));
    }
}
