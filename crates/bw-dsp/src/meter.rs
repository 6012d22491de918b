//! Meter math over analyser byte buffers
//!
//! Time-domain bytes are centered at 128; `(b - 128) / 128` maps them to
//! roughly `[-1, 1)`.

use bw_core::Decibels;

/// Byte value of a zero sample
pub const BYTE_CENTER: u8 = 128;

#[inline]
pub fn normalize_byte(b: u8) -> f64 {
    (b as f64 - 128.0) / 128.0
}

/// Root mean square of the normalized samples. Empty input is silence.
pub fn rms_of_bytes(samples: &[u8]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f64 = samples
        .iter()
        .map(|&b| {
            let x = normalize_byte(b);
            x * x
        })
        .sum();
    (sum_squares / samples.len() as f64).sqrt()
}

/// Largest absolute normalized sample
pub fn peak_of_bytes(samples: &[u8]) -> f64 {
    samples
        .iter()
        .map(|&b| normalize_byte(b).abs())
        .fold(0.0, f64::max)
}

/// `20 * log10(value)`, with zero, negative and non-finite results reported
/// as `floor`
#[inline]
pub fn to_db_floored(value: f64, floor: f64) -> f64 {
    Decibels::from_amplitude_floored(value, floor).value()
}

/// True once the analyser shows anything but silence
pub fn has_signal(frequency: &[u8], time_domain: &[u8]) -> bool {
    frequency.iter().any(|&b| b > 0) || time_domain.iter().any(|&b| b != BYTE_CENTER)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_byte(128), 0.0);
        assert_eq!(normalize_byte(0), -1.0);
        assert_relative_eq!(normalize_byte(255), 127.0 / 128.0);
    }

    #[test]
    fn test_silence() {
        let silence = [128u8; 1024];
        assert_eq!(rms_of_bytes(&silence), 0.0);
        assert_eq!(peak_of_bytes(&silence), 0.0);
        assert_eq!(to_db_floored(rms_of_bytes(&silence), -60.0), -60.0);
        assert!(!has_signal(&[0u8; 16], &silence));
    }

    #[test]
    fn test_empty_buffer() {
        assert_eq!(rms_of_bytes(&[]), 0.0);
        assert_eq!(peak_of_bytes(&[]), 0.0);
    }

    #[test]
    fn test_square_wave_rms() {
        let buf: Vec<u8> = (0..64).map(|i| if i % 2 == 0 { 64 } else { 192 }).collect();
        assert_relative_eq!(rms_of_bytes(&buf), 0.5);
        assert_relative_eq!(peak_of_bytes(&buf), 0.5);
        assert_relative_eq!(to_db_floored(0.5, -60.0), -6.0206, epsilon = 1e-4);
    }

    #[test]
    fn test_has_signal_from_spectrum_alone() {
        let mut freq = [0u8; 8];
        freq[3] = 1;
        assert!(has_signal(&freq, &[128u8; 8]));
    }
}
