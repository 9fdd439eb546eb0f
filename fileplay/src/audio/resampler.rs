//! Streaming sample-rate conversion using rubato
//!
//! Converts blocks of interleaved file audio to the host rate (optionally
//! pitch-shifted). Blocks arrive in arbitrary sizes from the file reader, so
//! input frames the converter cannot consume yet are carried over to the
//! front of the next block. At end of input the carry and the converter's
//! internal delay line are flushed.
//!
//! Output is aligned with the input: the filter's leading delay is dropped
//! after every reset, and the flush stops once `round(fed * ratio)` frames
//! have been emitted, so a converted file is exactly as long as the ratio
//! says and carries no trailing padding.

use crate::error::{Error, Result};
use rubato::{
    FastFixedIn, PolynomialDegree, Resampler as RubatoResampler, SincFixedIn,
    SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Frames handed to rubato per `process` call
pub const CHUNK_FRAMES: usize = 1024;

/// Ordered quality/cost tiers for the sample-rate converter.
///
/// Tier indices 0..=4 run from best (slowest) to cheapest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SrcQuality {
    SincBest = 0,
    SincMedium = 1,
    #[default]
    SincFastest = 2,
    ZeroOrderHold = 3,
    Linear = 4,
}

impl SrcQuality {
    /// Numeric tier index
    pub fn tier(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u32> for SrcQuality {
    type Error = Error;

    fn try_from(tier: u32) -> Result<Self> {
        match tier {
            0 => Ok(SrcQuality::SincBest),
            1 => Ok(SrcQuality::SincMedium),
            2 => Ok(SrcQuality::SincFastest),
            3 => Ok(SrcQuality::ZeroOrderHold),
            4 => Ok(SrcQuality::Linear),
            other => Err(Error::InvalidParameter(format!(
                "SRC quality tier {} out of range 0..=4",
                other
            ))),
        }
    }
}

impl std::fmt::Display for SrcQuality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SrcQuality::SincBest => write!(f, "sinc_best"),
            SrcQuality::SincMedium => write!(f, "sinc_medium"),
            SrcQuality::SincFastest => write!(f, "sinc_fastest"),
            SrcQuality::ZeroOrderHold => write!(f, "zero_order_hold"),
            SrcQuality::Linear => write!(f, "linear"),
        }
    }
}

impl std::str::FromStr for SrcQuality {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sinc_best" => Ok(SrcQuality::SincBest),
            "sinc_medium" => Ok(SrcQuality::SincMedium),
            "sinc_fastest" => Ok(SrcQuality::SincFastest),
            "zero_order_hold" => Ok(SrcQuality::ZeroOrderHold),
            "linear" => Ok(SrcQuality::Linear),
            other => other
                .parse::<u32>()
                .map_err(|_| Error::InvalidParameter(format!("Unknown SRC quality '{}'", other)))
                .and_then(SrcQuality::try_from),
        }
    }
}

/// rubato's `Resampler` trait is generic over its buffers, so the concrete
/// converters are dispatched through an enum.
enum Engine {
    Sinc(SincFixedIn<f32>),
    Poly(FastFixedIn<f32>),
}

impl Engine {
    fn input_frames_next(&self) -> usize {
        match self {
            Engine::Sinc(r) => r.input_frames_next(),
            Engine::Poly(r) => r.input_frames_next(),
        }
    }

    fn output_buffer_allocate(&self) -> Vec<Vec<f32>> {
        match self {
            Engine::Sinc(r) => r.output_buffer_allocate(true),
            Engine::Poly(r) => r.output_buffer_allocate(true),
        }
    }

    fn process(&mut self, input: &[Vec<f32>], output: &mut [Vec<f32>]) -> Result<(usize, usize)> {
        let result = match self {
            Engine::Sinc(r) => r.process_into_buffer(input, output, None),
            Engine::Poly(r) => r.process_into_buffer(input, output, None),
        };
        result.map_err(|e| Error::Resample(format!("Resampling failed: {}", e)))
    }

    fn process_partial(
        &mut self,
        input: Option<&[Vec<f32>]>,
        output: &mut [Vec<f32>],
    ) -> Result<(usize, usize)> {
        let result = match self {
            Engine::Sinc(r) => r.process_partial_into_buffer(input, output, None),
            Engine::Poly(r) => r.process_partial_into_buffer(input, output, None),
        };
        result.map_err(|e| Error::Resample(format!("Resampling flush failed: {}", e)))
    }

    fn reset(&mut self) {
        match self {
            Engine::Sinc(r) => r.reset(),
            Engine::Poly(r) => r.reset(),
        }
    }

    fn output_delay(&self) -> usize {
        match self {
            Engine::Sinc(r) => r.output_delay(),
            Engine::Poly(r) => r.output_delay(),
        }
    }
}

/// Frame accounting since the last reset
#[derive(Debug, Default)]
struct Alignment {
    /// Leading output frames still to drop (filter delay)
    skip: usize,
    /// Input frames accepted
    fed: u64,
    /// Output frames emitted after the delay was dropped
    emitted: u64,
}

impl Alignment {
    fn new(delay: usize) -> Self {
        Self {
            skip: delay,
            ..Self::default()
        }
    }

    /// Output frames a fully flushed input should produce
    fn target(&self, ratio: f64) -> u64 {
        (self.fed as f64 * ratio).round() as u64
    }

    /// Range of `produced` engine frames to emit, never passing `limit`
    fn take(&mut self, produced: usize, limit: Option<u64>) -> std::ops::Range<usize> {
        let start = self.skip.min(produced);
        self.skip -= start;
        let mut end = produced;
        if let Some(limit) = limit {
            let room = limit.saturating_sub(self.emitted) as usize;
            end = end.min(start + room);
        }
        self.emitted += (end - start) as u64;
        start..end
    }
}

/// Empty flush passes allowed to push the delay line out
const MAX_FLUSH_PASSES: usize = 4;

/// Block-streaming sample-rate converter.
///
/// A ratio of exactly 1.0 bypasses rubato entirely and copies input through.
pub struct Converter {
    engine: Option<Engine>,
    ratio: f64,
    quality: SrcQuality,
    channels: usize,
    /// Planar input not yet consumed by the engine
    carry: Vec<Vec<f32>>,
    /// Planar scratch sized for the engine's largest output
    scratch: Vec<Vec<f32>>,
    alignment: Alignment,
}

impl Converter {
    /// Create a converter for `channels` interleaved channels at `ratio`
    /// (output rate / input rate).
    pub fn new(quality: SrcQuality, ratio: f64, channels: usize) -> Result<Self> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(Error::InvalidParameter(format!("Invalid resample ratio {}", ratio)));
        }
        if channels == 0 {
            return Err(Error::InvalidParameter("Converter needs at least one channel".to_string()));
        }

        let engine = if is_unity(ratio) {
            None
        } else {
            Some(Self::create_engine(quality, ratio, channels)?)
        };
        let scratch = engine
            .as_ref()
            .map(Engine::output_buffer_allocate)
            .unwrap_or_default();
        let alignment = Alignment::new(engine.as_ref().map_or(0, Engine::output_delay));

        debug!(
            "Created converter: ratio={:.6}, quality={}, channels={}, bypass={}",
            ratio,
            quality,
            channels,
            engine.is_none()
        );

        Ok(Self {
            engine,
            ratio,
            quality,
            channels,
            carry: vec![Vec::with_capacity(CHUNK_FRAMES * 2); channels],
            scratch,
            alignment,
        })
    }

    fn create_engine(quality: SrcQuality, ratio: f64, channels: usize) -> Result<Engine> {
        let sinc = |sinc_len, f_cutoff, oversampling_factor, interpolation, window| {
            SincInterpolationParameters {
                sinc_len,
                f_cutoff,
                interpolation,
                oversampling_factor,
                window,
            }
        };

        let engine = match quality {
            SrcQuality::SincBest => Engine::Sinc(
                SincFixedIn::<f32>::new(
                    ratio,
                    1.0,
                    sinc(256, 0.95, 256, SincInterpolationType::Cubic, WindowFunction::BlackmanHarris2),
                    CHUNK_FRAMES,
                    channels,
                )
                .map_err(|e| Error::Resample(format!("Failed to create sinc resampler: {}", e)))?,
            ),
            SrcQuality::SincMedium => Engine::Sinc(
                SincFixedIn::<f32>::new(
                    ratio,
                    1.0,
                    sinc(128, 0.925, 128, SincInterpolationType::Linear, WindowFunction::Blackman2),
                    CHUNK_FRAMES,
                    channels,
                )
                .map_err(|e| Error::Resample(format!("Failed to create sinc resampler: {}", e)))?,
            ),
            SrcQuality::SincFastest => Engine::Sinc(
                SincFixedIn::<f32>::new(
                    ratio,
                    1.0,
                    sinc(64, 0.915, 64, SincInterpolationType::Linear, WindowFunction::Hann2),
                    CHUNK_FRAMES,
                    channels,
                )
                .map_err(|e| Error::Resample(format!("Failed to create sinc resampler: {}", e)))?,
            ),
            SrcQuality::ZeroOrderHold => Engine::Poly(
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Nearest, CHUNK_FRAMES, channels)
                    .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))?,
            ),
            SrcQuality::Linear => Engine::Poly(
                FastFixedIn::<f32>::new(ratio, 1.0, PolynomialDegree::Linear, CHUNK_FRAMES, channels)
                    .map_err(|e| Error::Resample(format!("Failed to create resampler: {}", e)))?,
            ),
        };
        Ok(engine)
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn quality(&self) -> SrcQuality {
        self.quality
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    /// True when no conversion is performed
    pub fn is_bypass(&self) -> bool {
        self.engine.is_none()
    }

    /// True when this converter already matches the requested setup
    pub fn matches(&self, quality: SrcQuality, ratio: f64, channels: usize) -> bool {
        self.channels == channels && self.ratio == ratio && (self.is_bypass() || self.quality == quality)
    }

    /// Discard carried input and the engine's filter state
    pub fn reset(&mut self) {
        for ch in self.carry.iter_mut() {
            ch.clear();
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.reset();
            self.alignment = Alignment::new(engine.output_delay());
        }
    }

    /// Convert one block of interleaved input, appending interleaved output
    /// to `output`.
    ///
    /// Input frames beyond the last full rubato chunk are kept for the next
    /// call unless `end_of_input` is set, in which case everything pending is
    /// flushed and the converter is left empty.
    pub fn process(&mut self, input: &[f32], end_of_input: bool, output: &mut Vec<f32>) -> Result<()> {
        let Some(engine) = self.engine.as_mut() else {
            output.extend_from_slice(input);
            return Ok(());
        };

        deinterleave_into(input, self.channels, &mut self.carry);
        self.alignment.fed += (input.len() / self.channels) as u64;

        loop {
            let need = engine.input_frames_next();
            if self.carry[0].len() < need {
                break;
            }
            let (used, produced) = engine.process(&self.carry, &mut self.scratch)?;
            for ch in self.carry.iter_mut() {
                ch.drain(..used);
            }
            let range = self.alignment.take(produced, None);
            interleave_into(&self.scratch, range, output);
        }

        if end_of_input {
            let target = self.alignment.target(self.ratio);
            if !self.carry[0].is_empty() {
                let (_, produced) = engine.process_partial(Some(self.carry.as_slice()), &mut self.scratch)?;
                for ch in self.carry.iter_mut() {
                    ch.clear();
                }
                let range = self.alignment.take(produced, Some(target));
                interleave_into(&self.scratch, range, output);
            }
            // Push the delay line out, stopping at the last real frame
            let mut passes = 0;
            while self.alignment.emitted < target && passes < MAX_FLUSH_PASSES {
                let (_, produced) = engine.process_partial(None, &mut self.scratch)?;
                let range = self.alignment.take(produced, Some(target));
                interleave_into(&self.scratch, range, output);
                passes += 1;
            }
        }

        Ok(())
    }
}

fn is_unity(ratio: f64) -> bool {
    (ratio - 1.0).abs() < f64::EPSILON
}

/// Append interleaved samples to planar channel buffers.
///
/// Input:  [L, R, L, R, ...]
/// Output: [[.., L, L], [.., R, R]]
fn deinterleave_into(samples: &[f32], channels: usize, planar: &mut [Vec<f32>]) {
    for frame in samples.chunks_exact(channels) {
        for (ch, sample) in planar.iter_mut().zip(frame) {
            ch.push(*sample);
        }
    }
}

/// Append frames `frames` of planar buffers as interleaved samples.
fn interleave_into(planar: &[Vec<f32>], frames: std::ops::Range<usize>, output: &mut Vec<f32>) {
    output.reserve(frames.len() * planar.len());
    for frame_idx in frames {
        for ch in planar {
            output.push(ch[frame_idx]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frames: usize, channels: usize, rate: f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let s = (2.0 * std::f32::consts::PI * 440.0 * i as f32 / rate).sin() * 0.5;
            for _ in 0..channels {
                out.push(s);
            }
        }
        out
    }

    #[test]
    fn test_deinterleave_appends() {
        let mut planar = vec![vec![0.0], vec![0.5]];
        deinterleave_into(&[1.0, 2.0, 3.0, 4.0], 2, &mut planar);
        assert_eq!(planar[0], vec![0.0, 1.0, 3.0]);
        assert_eq!(planar[1], vec![0.5, 2.0, 4.0]);
    }

    #[test]
    fn test_interleave_range() {
        let planar = vec![vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 6.0]];
        let mut out = Vec::new();
        interleave_into(&planar, 1..3, &mut out);
        assert_eq!(out, vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_unity_ratio_bypasses() {
        let mut conv = Converter::new(SrcQuality::SincBest, 1.0, 2).unwrap();
        assert!(conv.is_bypass());

        let input = vec![0.1, 0.2, 0.3, 0.4];
        let mut out = Vec::new();
        conv.process(&input, false, &mut out).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_quality_tier_bounds() {
        assert_eq!(SrcQuality::try_from(0).unwrap(), SrcQuality::SincBest);
        assert_eq!(SrcQuality::try_from(4).unwrap(), SrcQuality::Linear);
        assert!(SrcQuality::try_from(5).is_err());
        assert_eq!(SrcQuality::default().tier(), 2);
        assert_eq!("linear".parse::<SrcQuality>().unwrap(), SrcQuality::Linear);
        assert_eq!("3".parse::<SrcQuality>().unwrap(), SrcQuality::ZeroOrderHold);
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        assert!(Converter::new(SrcQuality::Linear, 0.0, 2).is_err());
        assert!(Converter::new(SrcQuality::Linear, f64::NAN, 2).is_err());
        assert!(Converter::new(SrcQuality::Linear, 2.0, 0).is_err());
    }

    #[test]
    fn test_carry_holds_partial_chunk() {
        let mut conv = Converter::new(SrcQuality::Linear, 2.0, 1).unwrap();
        let mut out = Vec::new();

        // Less than one chunk: nothing can be produced yet
        conv.process(&sine(CHUNK_FRAMES / 2, 1, 44100.0), false, &mut out).unwrap();
        assert!(out.is_empty());

        // Completing the chunk releases output
        conv.process(&sine(CHUNK_FRAMES / 2, 1, 44100.0), false, &mut out).unwrap();
        assert!(!out.is_empty());
    }

    #[test]
    fn test_output_length_tracks_ratio() {
        for quality in [SrcQuality::SincFastest, SrcQuality::ZeroOrderHold, SrcQuality::Linear] {
            let ratio = 48000.0 / 44100.0;
            let mut conv = Converter::new(quality, ratio, 2).unwrap();
            let input_frames = 10 * CHUNK_FRAMES + 300;
            let mut out = Vec::new();
            conv.process(&sine(input_frames, 2, 44100.0), true, &mut out).unwrap();

            let expected = (input_frames as f64 * ratio).round() as usize;
            assert_eq!(out.len() / 2, expected, "{}", quality);
        }
    }

    #[test]
    fn test_flush_adds_no_trailing_silence() {
        for quality in [SrcQuality::SincFastest, SrcQuality::Linear] {
            let mut conv = Converter::new(quality, 2.0, 1).unwrap();
            let mut out = Vec::new();
            conv.process(&[0.5; 3000], true, &mut out).unwrap();
            assert_eq!(out.len(), 6000, "{}", quality);

            let quiet_tail = out.iter().rev().take_while(|s| s.abs() < 0.1).count();
            assert!(quiet_tail <= 8, "{}: {} quiet trailing frames", quality, quiet_tail);
            let quiet_head = out.iter().take_while(|s| s.abs() < 0.1).count();
            assert!(quiet_head <= 8, "{}: {} quiet leading frames", quality, quiet_head);
        }
    }

    #[test]
    fn test_flush_after_reset_restarts_accounting() {
        let mut conv = Converter::new(SrcQuality::Linear, 2.0, 1).unwrap();
        let mut out = Vec::new();
        conv.process(&[0.5; 5000], false, &mut out).unwrap();
        conv.reset();

        out.clear();
        conv.process(&[0.5; 1500], true, &mut out).unwrap();
        assert_eq!(out.len(), 3000);

        // A second pass over the same input is identical
        conv.reset();
        let mut again = Vec::new();
        conv.process(&[0.5; 1500], true, &mut again).unwrap();
        assert_eq!(again, out);
    }

    #[test]
    fn test_reset_clears_carry() {
        let mut conv = Converter::new(SrcQuality::Linear, 0.5, 1).unwrap();
        let mut out = Vec::new();
        conv.process(&sine(100, 1, 44100.0), false, &mut out).unwrap();
        conv.reset();
        conv.process(&sine(CHUNK_FRAMES - 100, 1, 44100.0), false, &mut out).unwrap();
        // 100 + (CHUNK - 100) would have completed a chunk without the reset
        assert!(out.is_empty());
    }

    #[test]
    fn test_matches() {
        let conv = Converter::new(SrcQuality::Linear, 2.0, 2).unwrap();
        assert!(conv.matches(SrcQuality::Linear, 2.0, 2));
        assert!(!conv.matches(SrcQuality::SincBest, 2.0, 2));
        assert!(!conv.matches(SrcQuality::Linear, 1.5, 2));

        let bypass = Converter::new(SrcQuality::Linear, 1.0, 2).unwrap();
        assert!(bypass.matches(SrcQuality::SincBest, 1.0, 2));
    }
}
