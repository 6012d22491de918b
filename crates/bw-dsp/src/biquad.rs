//! Biquad filter implementation using Transposed Direct Form II
//!
//! Shelving filters use a fixed slope of S = 1 and ignore Q, matching the
//! way browser audio graphs define `lowshelf` / `highshelf`.

use bw_core::Sample;
use std::f64::consts::{FRAC_1_SQRT_2, PI};

use crate::{MonoProcessor, Processor};

/// Biquad filter types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Peaking,
    LowShelf,
    HighShelf,
}

/// Biquad coefficients
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

/// Terms every cookbook design starts from
struct Warp {
    cos: f64,
    alpha: f64,
}

impl Warp {
    fn new(freq: f64, q: f64, sample_rate: f64) -> Self {
        let w = 2.0 * PI * freq / sample_rate;
        Self {
            cos: w.cos(),
            alpha: w.sin() / (2.0 * q),
        }
    }
}

/// dB to the cookbook's `A` (amplitude square root)
#[inline]
fn shelf_amplitude(gain_db: f64) -> f64 {
    10.0_f64.powf(gain_db / 40.0)
}

impl BiquadCoeffs {
    pub fn lowpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let Warp { cos, alpha } = Warp::new(freq, q, sample_rate);
        let k = (1.0 - cos) / 2.0;
        Self::normalized(k, 2.0 * k, k, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    pub fn highpass(freq: f64, q: f64, sample_rate: f64) -> Self {
        let Warp { cos, alpha } = Warp::new(freq, q, sample_rate);
        let k = (1.0 + cos) / 2.0;
        Self::normalized(k, -2.0 * k, k, 1.0 + alpha, -2.0 * cos, 1.0 - alpha)
    }

    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = shelf_amplitude(gain_db);
        let Warp { cos, alpha } = Warp::new(freq, q, sample_rate);
        Self::normalized(
            1.0 + alpha * a,
            -2.0 * cos,
            1.0 - alpha * a,
            1.0 + alpha / a,
            -2.0 * cos,
            1.0 - alpha / a,
        )
    }

    /// Low shelf, slope 1
    pub fn low_shelf(freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::shelf(freq, gain_db, sample_rate, 1.0)
    }

    /// High shelf, slope 1
    pub fn high_shelf(freq: f64, gain_db: f64, sample_rate: f64) -> Self {
        Self::shelf(freq, gain_db, sample_rate, -1.0)
    }

    /// Both shelves; `side` is +1 for low, -1 for high
    fn shelf(freq: f64, gain_db: f64, sample_rate: f64, side: f64) -> Self {
        let a = shelf_amplitude(gain_db);
        let Warp { cos, alpha } = Warp::new(freq, FRAC_1_SQRT_2, sample_rate);
        let t = 2.0 * a.sqrt() * alpha;
        let tilt = side * (a - 1.0) * cos;

        Self::normalized(
            a * ((a + 1.0) - tilt + t),
            2.0 * side * a * ((a - 1.0) - side * (a + 1.0) * cos),
            a * ((a + 1.0) - tilt - t),
            (a + 1.0) + tilt + t,
            -2.0 * side * ((a - 1.0) + side * (a + 1.0) * cos),
            (a + 1.0) + tilt - t,
        )
    }

    /// Bypass (unity gain, no filtering)
    pub fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    #[inline]
    fn normalized(b0: f64, b1: f64, b2: f64, a0: f64, a1: f64, a2: f64) -> Self {
        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Magnitude response at `freq`, linear
    pub fn magnitude_at(&self, freq: f64, sample_rate: f64) -> f64 {
        let w = 2.0 * PI * freq / sample_rate;
        let (c1, s1) = (w.cos(), w.sin());
        let (c2, s2) = ((2.0 * w).cos(), (2.0 * w).sin());

        let num_re = self.b0 + self.b1 * c1 + self.b2 * c2;
        let num_im = -(self.b1 * s1 + self.b2 * s2);
        let den_re = 1.0 + self.a1 * c1 + self.a2 * c2;
        let den_im = -(self.a1 * s1 + self.a2 * s2);

        ((num_re * num_re + num_im * num_im) / (den_re * den_re + den_im * den_im)).sqrt()
    }
}

/// Filter design parameters. Coefficients are derived from these.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadDesign {
    pub kind: FilterKind,
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64,
}

impl Default for BiquadDesign {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            frequency: 350.0,
            q: 1.0,
            gain_db: 0.0,
        }
    }
}

impl BiquadDesign {
    pub fn coeffs(&self, sample_rate: f64) -> BiquadCoeffs {
        let nyquist = sample_rate * 0.5;
        let freq = self.frequency.clamp(1.0, nyquist * 0.999);
        let q = if self.q > 1e-4 { self.q } else { 1e-4 };

        match self.kind {
            FilterKind::Lowpass => BiquadCoeffs::lowpass(freq, q, sample_rate),
            FilterKind::Highpass => BiquadCoeffs::highpass(freq, q, sample_rate),
            FilterKind::Peaking => BiquadCoeffs::peaking(freq, q, self.gain_db, sample_rate),
            FilterKind::LowShelf => BiquadCoeffs::low_shelf(freq, self.gain_db, sample_rate),
            FilterKind::HighShelf => BiquadCoeffs::high_shelf(freq, self.gain_db, sample_rate),
        }
    }
}

/// Transposed Direct Form II biquad filter
#[derive(Debug, Clone)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    design: Option<BiquadDesign>,
    z1: f64,
    z2: f64,
    sample_rate: f64,
}

impl BiquadTDF2 {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            coeffs: BiquadCoeffs::bypass(),
            design: None,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
        }
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    pub fn design(&self) -> Option<BiquadDesign> {
        self.design
    }

    /// Apply a design. Coefficients are only recomputed when the design
    /// differs from the current one; returns true when they were.
    pub fn configure(&mut self, design: BiquadDesign) -> bool {
        if self.design == Some(design) {
            return false;
        }
        self.coeffs = design.coeffs(self.sample_rate);
        self.design = Some(design);
        true
    }

    /// Set as bypass
    pub fn set_bypass(&mut self) {
        self.coeffs = BiquadCoeffs::bypass();
        self.design = None;
    }
}

impl Processor for BiquadTDF2 {
    fn reset(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }
}

impl MonoProcessor for BiquadTDF2 {
    #[inline(always)]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.z1;
        self.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.z2;
        self.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SR: f64 = 48000.0;

    fn design(kind: FilterKind, frequency: f64, gain_db: f64) -> BiquadDesign {
        BiquadDesign {
            kind,
            frequency,
            q: 1.0,
            gain_db,
        }
    }

    #[test]
    fn test_peaking_gain_at_center() {
        let c = design(FilterKind::Peaking, 1250.0, 6.0).coeffs(SR);
        let db = 20.0 * c.magnitude_at(1250.0, SR).log10();
        assert_relative_eq!(db, 6.0, epsilon = 0.01);
    }

    #[test]
    fn test_flat_at_zero_gain() {
        for kind in [FilterKind::Peaking, FilterKind::LowShelf, FilterKind::HighShelf] {
            let c = design(kind, 1000.0, 0.0).coeffs(SR);
            for f in [50.0, 1000.0, 10000.0] {
                assert_relative_eq!(c.magnitude_at(f, SR), 1.0, epsilon = 1e-9);
            }
        }
    }

    #[test]
    fn test_shelves_reach_full_gain() {
        let low = design(FilterKind::LowShelf, 250.0, 12.0).coeffs(SR);
        let high = design(FilterKind::HighShelf, 4000.0, -12.0).coeffs(SR);

        assert_relative_eq!(20.0 * low.magnitude_at(10.0, SR).log10(), 12.0, epsilon = 0.1);
        assert_relative_eq!(20.0 * low.magnitude_at(15000.0, SR).log10(), 0.0, epsilon = 0.1);
        assert_relative_eq!(20.0 * high.magnitude_at(20000.0, SR).log10(), -12.0, epsilon = 0.2);
        assert_relative_eq!(20.0 * high.magnitude_at(20.0, SR).log10(), 0.0, epsilon = 0.1);
    }

    #[test]
    fn test_shelf_ignores_q() {
        let a = BiquadDesign {
            q: 0.3,
            ..design(FilterKind::LowShelf, 250.0, 6.0)
        };
        let b = BiquadDesign {
            q: 8.0,
            ..design(FilterKind::LowShelf, 250.0, 6.0)
        };
        assert_eq!(a.coeffs(SR), b.coeffs(SR));
    }

    #[test]
    fn test_configure_recomputes_only_on_change() {
        let mut filter = BiquadTDF2::new(SR);
        let d = design(FilterKind::Peaking, 375.0, 3.0);
        assert!(filter.configure(d));
        assert!(!filter.configure(d));
        assert!(filter.configure(BiquadDesign { gain_db: 4.0, ..d }));
    }

    #[test]
    fn test_lowpass_attenuates_highs() {
        let mut filter = BiquadTDF2::new(SR);
        filter.configure(BiquadDesign {
            kind: FilterKind::Lowpass,
            frequency: 500.0,
            q: FRAC_1_SQRT_2,
            gain_db: 0.0,
        });
        let mut buf: Vec<f64> = (0..4800)
            .map(|i| (2.0 * PI * 10000.0 * i as f64 / SR).sin())
            .collect();
        filter.process_block(&mut buf);
        let tail_peak = buf[2400..].iter().fold(0.0_f64, |m, x| m.max(x.abs()));
        assert!(tail_peak < 0.02);
    }

    #[test]
    fn test_highpass_blocks_dc() {
        let mut filter = BiquadTDF2::new(SR);
        filter.configure(BiquadDesign {
            kind: FilterKind::Highpass,
            frequency: 200.0,
            q: FRAC_1_SQRT_2,
            gain_db: 0.0,
        });
        let mut buf = vec![1.0; 48000];
        filter.process_block(&mut buf);
        assert!(buf[47999].abs() < 1e-6);
    }
}
