//! WAV helpers for the canonical pipeline format (16 kHz mono 16-bit PCM).
//!
//! Errors stay as `hound::Error`; callers map them onto their own stage
//! error so failure attribution names the stage, not the codec.

use std::path::Path;

/// Canonical sample rate required by every downstream engine.
pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u16 = 1;
pub const BITS_PER_SAMPLE: u16 = 16;

pub fn canonical_spec() -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate: SAMPLE_RATE,
        bits_per_sample: BITS_PER_SAMPLE,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Read all samples from a canonical-format WAV file.
pub fn read_samples(path: &Path) -> Result<Vec<i16>, hound::Error> {
    let mut reader = hound::WavReader::open(path)?;
    reader.samples::<i16>().collect()
}

/// Write samples as a canonical-format WAV file.
pub fn write_samples(path: &Path, samples: &[i16]) -> Result<(), hound::Error> {
    let mut writer = hound::WavWriter::create(path, canonical_spec())?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()
}

/// Duration in seconds read from a WAV header.
pub fn duration_seconds(path: &Path) -> Result<f64, hound::Error> {
    let reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    Ok(reader.duration() as f64 / spec.sample_rate as f64)
}
