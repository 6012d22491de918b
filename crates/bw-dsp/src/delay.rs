//! Delay line
//!
//! A ring buffer that can be driven two ways:
//! - per sample, through [`MonoProcessor`] (write, then read `delay` samples back)
//! - per block, in two phases: [`DelayLine::read_block`] then
//!   [`DelayLine::write_block`]. This is what lets a graph close a feedback
//!   loop through the delay, because the output of a block never depends on
//!   that block's input as long as the delay is at least one block long.
//!
//! Fractional delays are linearly interpolated.

use bw_core::Sample;

use crate::{MonoProcessor, Processor};

/// Mono delay line with a fixed maximum length
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<Sample>,
    write_pos: usize,
    delay_samples: f64,
    max_delay_samples: usize,
    max_delay_seconds: f64,
    sample_rate: f64,
}

impl DelayLine {
    /// `block_headroom` is the largest block that will be passed to the
    /// two-phase API.
    pub fn new(sample_rate: f64, max_delay_seconds: f64, block_headroom: usize) -> Self {
        let max_delay_samples = (max_delay_seconds * sample_rate).ceil().max(1.0) as usize;
        Self {
            buffer: vec![0.0; max_delay_samples + block_headroom + 2],
            write_pos: 0,
            delay_samples: 0.0,
            max_delay_samples,
            max_delay_seconds,
            sample_rate,
        }
    }

    pub fn max_delay_seconds(&self) -> f64 {
        self.max_delay_seconds
    }

    pub fn delay_samples(&self) -> f64 {
        self.delay_samples
    }

    /// Set delay in seconds, clamped to `0..=max`
    pub fn set_delay_seconds(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        self.set_delay_samples(seconds * self.sample_rate);
    }

    pub fn set_delay_samples(&mut self, samples: f64) {
        self.delay_samples = samples.clamp(0.0, self.max_delay_samples as f64);
    }

    /// Sample written `age` samples before the current write position
    #[inline]
    fn tap(&self, age: f64) -> Sample {
        let len = self.buffer.len();
        let whole = age.floor();
        let frac = age - whole;
        let whole = whole as usize;

        let idx0 = (self.write_pos + len - whole % len) % len;
        let idx1 = (idx0 + len - 1) % len;
        let a = self.buffer[idx0];
        if frac == 0.0 {
            a
        } else {
            a + (self.buffer[idx1] - a) * frac
        }
    }

    /// Phase one: produce the delayed block for the upcoming `out.len()`
    /// samples, using only what has already been written.
    ///
    /// The effective delay is at least `out.len()` samples.
    pub fn read_block(&self, out: &mut [Sample]) {
        let n = out.len();
        let delay = self.delay_samples.max(n as f64);
        for (i, sample) in out.iter_mut().enumerate() {
            // sample i lands at write_pos + 1 + i
            *sample = self.tap(delay - 1.0 - i as f64);
        }
    }

    /// Phase two: append the block's input
    pub fn write_block(&mut self, input: &[Sample]) {
        let len = self.buffer.len();
        for &x in input {
            self.write_pos = (self.write_pos + 1) % len;
            self.buffer[self.write_pos] = x;
        }
    }
}

impl Processor for DelayLine {
    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

impl MonoProcessor for DelayLine {
    #[inline]
    fn process_sample(&mut self, input: Sample) -> Sample {
        let len = self.buffer.len();
        self.write_pos = (self.write_pos + 1) % len;
        self.buffer[self.write_pos] = input;
        self.tap(self.delay_samples)
    }
}
