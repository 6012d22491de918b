//! bw-dsp: DSP primitives for Brainwave Live
//!
//! ## Modules
//! - `biquad` - TDF-II biquads (lowpass, highpass, peaking, slope-1 shelves)
//! - `delay` - Ring-buffer delay line with block read/write phases
//! - `analyser` - FFT analyser with byte-scaled spectrum and waveform readout
//! - `meter` - RMS / peak / dB math over analyser byte buffers

pub mod analyser;
pub mod biquad;
pub mod delay;
pub mod meter;

use bw_core::Sample;

pub use analyser::FftAnalyser;
pub use biquad::{BiquadCoeffs, BiquadDesign, BiquadTDF2, FilterKind};
pub use delay::DelayLine;

/// Stateful processor that can be cleared back to silence
pub trait Processor: Send + Sync {
    fn reset(&mut self);
}

/// Sample-at-a-time processing with a block helper
pub trait MonoProcessor: Processor {
    fn process_sample(&mut self, input: Sample) -> Sample;

    #[inline]
    fn process_block(&mut self, buffer: &mut [Sample]) {
        buffer
            .iter_mut()
            .for_each(|s| *s = self.process_sample(*s));
    }
}
