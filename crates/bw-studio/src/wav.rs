//! WAV in/out for the host

use std::path::Path;

use anyhow::{Context, Result, bail};
use bw_core::Sample;

/// Decoded file, downmixed to mono
pub struct MonoClip {
    pub samples: Vec<Sample>,
    pub sample_rate: u32,
    pub source_channels: u16,
}

/// Read any PCM or float WAV and average its channels
pub fn read_mono(path: &Path) -> Result<MonoClip> {
    let reader =
        hound::WavReader::open(path).with_context(|| format!("opening {}", path.display()))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        bail!("{} has no channels", path.display());
    }

    let interleaved: Vec<Sample> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(|v| v as Sample))
            .collect::<std::result::Result<_, _>>(),
        hound::SampleFormat::Int => {
            let max_val = (1i64 << (spec.bits_per_sample - 1)) as Sample;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as Sample / max_val))
                .collect::<std::result::Result<_, _>>()
        }
    }
    .with_context(|| format!("decoding {}", path.display()))?;

    let samples = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<Sample>() / channels as Sample)
        .collect();

    Ok(MonoClip {
        samples,
        sample_rate: spec.sample_rate,
        source_channels: spec.channels,
    })
}

/// Write mono 16-bit PCM, clipping to full scale
pub fn write_pcm16(path: &Path, samples: &[Sample], sample_rate: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer =
        hound::WavWriter::create(path, spec).with_context(|| format!("creating {}", path.display()))?;
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * i16::MAX as Sample).round() as i16;
        writer.write_sample(v)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_stereo_is_averaged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44100,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for (l, r) in [(1.0f32, 0.0f32), (0.5, -0.5), (-1.0, -1.0)] {
            writer.write_sample(l).unwrap();
            writer.write_sample(r).unwrap();
        }
        writer.finalize().unwrap();

        let clip = read_mono(&path).unwrap();
        assert_eq!(clip.sample_rate, 44100);
        assert_eq!(clip.source_channels, 2);
        assert_eq!(clip.samples.len(), 3);
        assert_relative_eq!(clip.samples[0], 0.5);
        assert_relative_eq!(clip.samples[1], 0.0);
        assert_relative_eq!(clip.samples[2], -1.0);
    }

    #[test]
    fn test_write_clips_to_full_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.wav");
        write_pcm16(&path, &[2.0, -3.0, 0.0], 48000).unwrap();

        let mut reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().bits_per_sample, 16);
        let values: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(values, vec![i16::MAX, -i16::MAX, 0]);
    }

    #[test]
    fn test_missing_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_mono(&dir.path().join("nope.wav")).is_err());
    }
}
