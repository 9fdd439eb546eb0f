//! Audio test file generation
//!
//! Writes small WAV files with known content: sine tones for realistic
//! material, and 32-bit float files holding one constant value per channel
//! so the downmix and gain stages can be checked exactly.

use hound::{WavSpec, WavWriter};
use std::f32::consts::PI;
use std::path::Path;

/// Generate a 16-bit sine tone on every channel
pub fn generate_sine_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    channels: u16,
    duration_ms: u64,
    frequency_hz: f32,
    amplitude: f32,
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;

    let total_frames = (sample_rate as u64 * duration_ms) / 1000;
    for frame in 0..total_frames {
        let t = frame as f32 / sample_rate as f32;
        let sample = (2.0 * PI * frequency_hz * t).sin() * amplitude;
        let sample_i16 = (sample * i16::MAX as f32) as i16;
        for _ in 0..channels {
            writer.write_sample(sample_i16)?;
        }
    }

    writer.finalize()
}

/// Generate a 32-bit float file where channel `n` holds `values[n]` in
/// every frame
pub fn generate_constant_wav<P: AsRef<Path>>(
    path: P,
    sample_rate: u32,
    frames: u64,
    values: &[f32],
) -> Result<(), hound::Error> {
    let spec = WavSpec {
        channels: values.len() as u16,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = WavWriter::create(path, spec)?;

    for _ in 0..frames {
        for value in values {
            writer.write_sample(*value)?;
        }
    }

    writer.finalize()
}
