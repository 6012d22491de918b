//! DSP Integration Tests
//!
//! Verifies:
//! - Meter invariants over analyser readouts and arbitrary byte buffers
//!   (range, peak >= rms, floors)
//! - Five-band EQ chain is transparent at 0 dB and stable at extremes
//! - Feedback through the two-phase delay decays while feedback < 1

use std::f64::consts::PI;

use bw_core::AnalyserConfig;
use bw_dsp::analyser::FftAnalyser;
use bw_dsp::biquad::{BiquadDesign, BiquadTDF2, FilterKind};
use bw_dsp::delay::DelayLine;
use bw_dsp::meter::{peak_of_bytes, rms_of_bytes, to_db_floored};
use bw_dsp::MonoProcessor;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

const SAMPLE_RATE: f64 = 48000.0;
const QUANTUM: usize = 128;

/// Generate test sine wave
fn generate_sine(samples: usize, freq: f64, amplitude: f64) -> Vec<f64> {
    (0..samples)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            amplitude * (2.0 * PI * freq * t).sin()
        })
        .collect()
}

/// Check signal has no NaN or Infinity
fn is_valid_signal(signal: &[f64]) -> bool {
    signal.iter().all(|&x| x.is_finite())
}

fn eq_chain(gains: [f64; 5]) -> Vec<BiquadTDF2> {
    let bands = [
        (FilterKind::LowShelf, 250.0, 1.0),
        (FilterKind::Peaking, 375.0, 1.0),
        (FilterKind::Peaking, 1250.0, 1.0),
        (FilterKind::Peaking, 3000.0, 1.0),
        (FilterKind::HighShelf, 4000.0, 1.0),
    ];
    bands
        .iter()
        .zip(gains)
        .map(|(&(kind, frequency, q), gain_db)| {
            let mut filter = BiquadTDF2::new(SAMPLE_RATE);
            filter.configure(BiquadDesign {
                kind,
                frequency,
                q,
                gain_db,
            });
            filter
        })
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// METER INVARIANTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_meter_range_and_ordering_over_analyser_output() {
    let mut analyser = FftAnalyser::new(&AnalyserConfig::default()).unwrap();
    let mut time = vec![0u8; analyser.frequency_bin_count()];

    for amplitude in [0.01, 0.1, 0.5, 0.9, 1.0, 2.0] {
        analyser.push(&generate_sine(2048, 440.0, amplitude));
        analyser.byte_time_domain_data(&mut time);

        let rms = rms_of_bytes(&time);
        let peak = peak_of_bytes(&time);
        assert!((0.0..=1.0).contains(&rms), "rms {rms} at {amplitude}");
        assert!((0.0..=1.0).contains(&peak), "peak {peak} at {amplitude}");
        assert!(peak >= rms);
    }
}

/// Bounds and `rms <= peak` for one buffer. The mean of squares can round
/// a hair above the largest square, hence the tolerance.
fn assert_meter_bounds(buf: &[u8]) {
    let rms = rms_of_bytes(buf);
    let peak = peak_of_bytes(buf);
    assert!((0.0..=1.0).contains(&rms), "rms {rms} over {} bytes", buf.len());
    assert!((0.0..=1.0).contains(&peak), "peak {peak} over {} bytes", buf.len());
    assert!(rms <= peak + 1e-12, "rms {rms} > peak {peak} over {} bytes", buf.len());
}

#[test]
fn test_meter_bounds_over_every_short_buffer() {
    assert_meter_bounds(&[]);
    for a in 0..=255u8 {
        assert_meter_bounds(&[a]);
        for b in 0..=255u8 {
            assert_meter_bounds(&[a, b]);
        }
    }
}

#[test]
fn test_meter_bounds_over_random_buffers() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5EED);
    for _ in 0..500 {
        let len = rng.random_range(1..=4096);
        let buf: Vec<u8> = (0..len).map(|_| rng.random()).collect();
        assert_meter_bounds(&buf);
    }
    // Extremes and near-silence mixed in runs
    for _ in 0..500 {
        let len = rng.random_range(1..=512);
        let buf: Vec<u8> = (0..len)
            .map(|_| match rng.random_range(0..4) {
                0 => 0,
                1 => 255,
                2 => 128,
                _ => rng.random_range(126..=130),
            })
            .collect();
        assert_meter_bounds(&buf);
    }
}

#[test]
fn test_full_scale_alternating_bytes() {
    let buf: Vec<u8> = (0..1024).map(|i| if i % 2 == 0 { 0 } else { 255 }).collect();
    let peak = peak_of_bytes(&buf);
    let rms = rms_of_bytes(&buf);
    assert!((peak - 1.0).abs() < 1e-9);
    assert!(to_db_floored(peak, -60.0).abs() < 0.1);
    assert!(to_db_floored(rms, -60.0).abs() < 0.1);
}

#[test]
fn test_silence_floors_at_minus_sixty() {
    let mut analyser = FftAnalyser::new(&AnalyserConfig::default()).unwrap();
    analyser.push(&[0.0; 2048]);
    let mut time = vec![0u8; 1024];
    analyser.byte_time_domain_data(&mut time);

    let db = to_db_floored(rms_of_bytes(&time), -60.0);
    assert_eq!(db, -60.0);
    assert!(db.is_finite());
}

// ═══════════════════════════════════════════════════════════════════════════════
// EQ CHAIN
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_flat_eq_chain_is_transparent() {
    let mut chain = eq_chain([0.0; 5]);
    let input = generate_sine(4800, 1000.0, 0.5);
    let mut output = input.clone();
    for filter in &mut chain {
        filter.process_block(&mut output);
    }
    for (a, b) in input.iter().zip(&output) {
        assert!((a - b).abs() < 1e-9);
    }
}

#[test]
fn test_extreme_eq_chain_stays_finite() {
    let mut chain = eq_chain([12.0, -12.0, 12.0, -12.0, 12.0]);
    let mut output = generate_sine(48000, 100.0, 1.0);
    output.extend(generate_sine(48000, 8000.0, 1.0));
    for filter in &mut chain {
        filter.process_block(&mut output);
    }
    assert!(is_valid_signal(&output));
    let peak = output.iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    assert!(peak < 8.0);
}

// ═══════════════════════════════════════════════════════════════════════════════
// FEEDBACK DELAY
// ═══════════════════════════════════════════════════════════════════════════════

/// delay -> wet gain -> feedback gain -> delay, driven in render quanta
fn run_feedback_loop(feedback: f64, quanta: usize) -> Vec<f64> {
    let mut delay = DelayLine::new(SAMPLE_RATE, 1.0, QUANTUM);
    delay.set_delay_seconds(0.05);

    let mut out = Vec::with_capacity(quanta * QUANTUM);
    let mut delayed = [0.0; QUANTUM];
    for q in 0..quanta {
        let mut input = [0.0; QUANTUM];
        if q == 0 {
            input[0] = 1.0;
        }
        delay.read_block(&mut delayed);
        let mut write = [0.0; QUANTUM];
        for i in 0..QUANTUM {
            write[i] = input[i] + delayed[i] * feedback;
        }
        delay.write_block(&write);
        out.extend_from_slice(&delayed);
    }
    out
}

#[test]
fn test_feedback_below_unity_decays() {
    let out = run_feedback_loop(0.9, 2000);
    assert!(is_valid_signal(&out));
    let head = out[..QUANTUM * 100].iter().fold(0.0_f64, |m, x| m.max(x.abs()));
    let tail = out[out.len() - QUANTUM * 100..]
        .iter()
        .fold(0.0_f64, |m, x| m.max(x.abs()));
    assert!(tail < head * 0.01, "tail {tail} head {head}");
}

#[test]
fn test_echo_spacing_matches_delay_time() {
    let out = run_feedback_loop(0.5, 64);
    let d = (0.05 * SAMPLE_RATE) as usize;
    assert!((out[d] - 1.0).abs() < 1e-12);
    assert!((out[2 * d] - 0.5).abs() < 1e-12);
    assert!((out[3 * d] - 0.25).abs() < 1e-12);
}
