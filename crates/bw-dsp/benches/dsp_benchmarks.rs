//! Analyser and filter benchmarks

use std::hint::black_box;

use bw_core::AnalyserConfig;
use bw_dsp::biquad::{BiquadDesign, BiquadTDF2, FilterKind};
use bw_dsp::meter::{peak_of_bytes, rms_of_bytes};
use bw_dsp::{FftAnalyser, MonoProcessor};
use criterion::{Criterion, criterion_group, criterion_main};

fn bench_biquad_quantum(c: &mut Criterion) {
    let mut filter = BiquadTDF2::new(48000.0);
    filter.configure(BiquadDesign {
        kind: FilterKind::Peaking,
        frequency: 1250.0,
        q: 1.0,
        gain_db: 6.0,
    });

    let mut buffer: Vec<f64> = (0..128).map(|i| (i as f64 * 0.01).sin()).collect();

    c.bench_function("biquad_peaking_128", |b| {
        b.iter(|| {
            filter.process_block(black_box(&mut buffer));
        })
    });
}

fn bench_meter_frame(c: &mut Criterion) {
    let mut analyser = FftAnalyser::new(&AnalyserConfig::default()).unwrap();
    let input: Vec<f64> = (0..2048).map(|i| (i as f64 * 0.02).sin() * 0.5).collect();
    let mut freq = vec![0u8; analyser.frequency_bin_count()];
    let mut time = vec![0u8; analyser.frequency_bin_count()];

    c.bench_function("meter_frame_fft2048", |b| {
        b.iter(|| {
            analyser.push(black_box(&input[..128]));
            analyser.byte_frequency_data(&mut freq);
            analyser.byte_time_domain_data(&mut time);
            black_box((rms_of_bytes(&time), peak_of_bytes(&time)))
        })
    });
}

criterion_group!(benches, bench_biquad_quantum, bench_meter_frame);
criterion_main!(benches);
