//! Streaming audio file reader using symphonia
//!
//! Unlike a whole-file decode, the reader hands out interleaved `f32` frames
//! block by block so the streaming task can interleave reads with ring
//! writes, and it can reposition to any frame (decode-and-skip after an
//! accurate seek to the nearest packet).

use crate::audio::types::{FileFormat, FileInfo, FileTag};
use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{MetadataOptions, MetadataRevision, StandardTagKey};
use symphonia::core::probe::{Hint, ProbeResult};
use symphonia::core::units::{Time, TimeBase};
use tracing::{debug, warn};

/// File extensions the decoder is built to open
const SUPPORTED_EXTENSIONS: &[&str] = &["wav", "flac", "mp3", "ogg", "oga", "m4a", "mp4", "aac"];

/// Extensions of the formats enabled in this build
pub fn supported_extensions() -> &'static [&'static str] {
    SUPPORTED_EXTENSIONS
}

/// Duration of a file in seconds without loading it into a player.
///
/// Returns 0.0 when the file cannot be opened.
pub fn file_duration(path: impl AsRef<Path>) -> f32 {
    match FileReader::open(path.as_ref()) {
        Ok(reader) => reader.info().duration(),
        Err(e) => {
            debug!("Duration query failed: {}", e);
            0.0
        }
    }
}

/// Read a text tag from a file without loading it into a player.
///
/// Returns an empty string when the file or the tag is missing.
pub fn file_tag(path: impl AsRef<Path>, tag: FileTag) -> String {
    let mut probed = match probe(path.as_ref()) {
        Ok(probed) => probed,
        Err(e) => {
            debug!("Tag query failed: {}", e);
            return String::new();
        }
    };
    let key = standard_key(tag);

    // Tags embedded in the container take precedence over ones found while probing
    if let Some(value) = probed
        .format
        .metadata()
        .current()
        .and_then(|rev| find_tag(rev, key))
    {
        return value;
    }
    probed
        .metadata
        .get()
        .and_then(|meta| meta.current().and_then(|rev| find_tag(rev, key)))
        .unwrap_or_default()
}

fn standard_key(tag: FileTag) -> StandardTagKey {
    match tag {
        FileTag::Title => StandardTagKey::TrackTitle,
        FileTag::Copyright => StandardTagKey::Copyright,
        FileTag::Software => StandardTagKey::Encoder,
        FileTag::Artist => StandardTagKey::Artist,
        FileTag::Comment => StandardTagKey::Comment,
        FileTag::Date => StandardTagKey::Date,
        FileTag::Album => StandardTagKey::Album,
        FileTag::License => StandardTagKey::License,
        FileTag::TrackNumber => StandardTagKey::TrackNumber,
        FileTag::Genre => StandardTagKey::Genre,
    }
}

fn find_tag(revision: &MetadataRevision, key: StandardTagKey) -> Option<String> {
    revision
        .tags()
        .iter()
        .find(|t| t.std_key == Some(key))
        .map(|t| t.value.to_string())
}

fn probe(path: &Path) -> Result<ProbeResult> {
    let file = File::open(path)
        .map_err(|e| Error::FileOpen(format!("{}: {}", path.display(), e)))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Create a hint to help the format registry guess the format
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::FileOpen(format!("{}: unsupported format ({})", path.display(), e)))
}

/// Convert a track timestamp to frames at `sample_rate`
fn ts_to_frames(time_base: Option<TimeBase>, sample_rate: u32, ts: u64) -> u64 {
    match time_base {
        Some(tb) if !(tb.numer == 1 && tb.denom == sample_rate) => {
            let time = tb.calc_time(ts);
            ((time.seconds as f64 + time.frac) * sample_rate as f64).round() as u64
        }
        _ => ts,
    }
}

/// Convert frames at `sample_rate` to a track timestamp
fn frames_to_ts(time_base: Option<TimeBase>, sample_rate: u32, frames: u64) -> u64 {
    match time_base {
        Some(tb) if !(tb.numer == 1 && tb.denom == sample_rate) => {
            tb.calc_timestamp(Time::from(frames as f64 / sample_rate as f64))
        }
        _ => frames,
    }
}

/// Count frames by scanning packet durations, for containers that do not
/// report a length up front.
fn count_frames(path: &Path, track_id: u32, time_base: Option<TimeBase>, sample_rate: u32) -> Result<u64> {
    let mut format = probe(path)?.format;
    let mut total_ts = 0u64;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total_ts += packet.dur(),
            Ok(_) => continue,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => {
                warn!("Stopped frame count scan early: {}", e);
                break;
            }
        }
    }
    Ok(ts_to_frames(time_base, sample_rate, total_ts))
}

/// Block-oriented reader over one audio track of a file.
pub struct FileReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    time_base: Option<TimeBase>,
    info: FileInfo,
    /// Conversion buffer, recreated only when a packet outgrows it
    sample_buf: Option<(usize, SampleBuffer<f32>)>,
    /// Interleaved samples of the last decoded packet
    pending: Vec<f32>,
    pending_pos: usize,
    /// Frames still to discard after a seek landed before the target
    skip_frames: u64,
    exhausted: bool,
}

impl FileReader {
    /// Open a file and prepare its first audio track for reading.
    ///
    /// # Errors
    /// - File missing or unreadable
    /// - Unsupported container or codec
    /// - No audio track, unknown sample rate, or zero channels
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Opening audio file: {}", path.display());
        let format = probe(path)?.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::FileOpen(format!("{}: no audio track found", path.display())))?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let sample_rate = params
            .sample_rate
            .filter(|rate| *rate > 0)
            .ok_or_else(|| Error::FileOpen(format!("{}: sample rate not found", path.display())))?;

        let codecs = symphonia::default::get_codecs();
        let decoder = codecs
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;
        let codec = codecs
            .get_codec(params.codec)
            .map(|d| d.short_name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let mut reader = Self {
            format,
            decoder,
            track_id,
            time_base: params.time_base,
            info: FileInfo {
                sample_rate,
                channels: params.channels.map(|c| c.count()).unwrap_or(0),
                frames: 0,
                format: FileFormat {
                    codec,
                    bits_per_sample: params.bits_per_sample,
                },
            },
            sample_buf: None,
            pending: Vec::new(),
            pending_pos: 0,
            skip_frames: 0,
            exhausted: false,
        };

        // Some codecs only reveal their layout once the first packet is decoded
        if reader.info.channels == 0 {
            reader.decode_next();
        }
        if reader.info.channels == 0 {
            return Err(Error::FileOpen(format!("{}: file has no channels", path.display())));
        }

        reader.info.frames = match params.n_frames {
            Some(frames) => frames,
            None => count_frames(path, track_id, params.time_base, sample_rate)?,
        };

        debug!(
            "Audio format: sample_rate={}, channels={}, frames={}, codec={}",
            reader.info.sample_rate, reader.info.channels, reader.info.frames, reader.info.format.codec
        );

        Ok(reader)
    }

    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// True once the end of the track has been reached (or a seek failed)
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.pending_pos >= self.pending.len()
    }

    /// Append up to `max_frames` interleaved frames to `output`.
    ///
    /// Returns the number of frames appended; fewer than `max_frames` means
    /// the end of the track was reached.
    pub fn read_frames(&mut self, output: &mut Vec<f32>, max_frames: usize) -> usize {
        let channels = self.info.channels;
        let mut frames = 0;

        while frames < max_frames {
            if self.pending_pos >= self.pending.len() {
                if self.exhausted || !self.decode_next() {
                    break;
                }
                continue;
            }

            let available = (self.pending.len() - self.pending_pos) / channels;
            let take = available.min(max_frames - frames);
            let end = self.pending_pos + take * channels;
            output.extend_from_slice(&self.pending[self.pending_pos..end]);
            self.pending_pos = end;
            frames += take;
        }

        frames
    }

    /// Reposition so the next read starts at `frame` (native rate).
    ///
    /// A failed seek leaves the reader exhausted, so the caller sees a short
    /// read rather than stale audio.
    pub fn seek(&mut self, frame: u64) -> Result<()> {
        self.pending.clear();
        self.pending_pos = 0;
        self.skip_frames = 0;
        self.exhausted = false;

        let ts = frames_to_ts(self.time_base, self.info.sample_rate, frame);
        match self.format.seek(
            SeekMode::Accurate,
            SeekTo::TimeStamp {
                ts,
                track_id: self.track_id,
            },
        ) {
            Ok(seeked) => {
                self.decoder.reset();
                self.skip_frames = ts_to_frames(
                    self.time_base,
                    self.info.sample_rate,
                    seeked.required_ts.saturating_sub(seeked.actual_ts),
                );
                Ok(())
            }
            Err(e) => {
                self.exhausted = true;
                Err(Error::Decode(format!("Seek to frame {} failed: {}", frame, e)))
            }
        }
    }

    /// Decode the next packet of our track into `pending`.
    ///
    /// Returns false at end of stream or on an unrecoverable error.
    fn decode_next(&mut self) -> bool {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    debug!("Reached end of file");
                    self.exhausted = true;
                    return false;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    self.exhausted = true;
                    return false;
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
                Err(e) => {
                    warn!("Decoder failed: {}", e);
                    self.exhausted = true;
                    return false;
                }
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if self.info.channels == 0 {
                self.info.channels = channels;
            } else if channels != self.info.channels {
                warn!(
                    "Dropping packet with {} channels (stream has {})",
                    channels, self.info.channels
                );
                continue;
            }

            let frames_capacity = decoded.capacity();
            let needs_buffer = self
                .sample_buf
                .as_ref()
                .map_or(true, |(capacity, _)| *capacity < frames_capacity);
            if needs_buffer {
                self.sample_buf = Some((frames_capacity, SampleBuffer::new(frames_capacity as u64, spec)));
            }
            let Some((_, buf)) = self.sample_buf.as_mut() else {
                continue;
            };
            buf.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending.extend_from_slice(buf.samples());
            self.pending_pos = 0;

            if self.skip_frames > 0 {
                let frames = (self.pending.len() / channels) as u64;
                let skip = self.skip_frames.min(frames);
                self.pending_pos = skip as usize * channels;
                self.skip_frames -= skip;
            }
            return true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{SampleFormat, WavSpec, WavWriter};

    fn write_ramp(path: &Path, frames: u32, channels: u16, sample_rate: u32) {
        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            for ch in 0..channels {
                writer.write_sample(i as f32 / frames as f32 + ch as f32 * 0.001).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn test_timestamp_conversion_identity() {
        let tb = Some(TimeBase::new(1, 44100));
        assert_eq!(ts_to_frames(tb, 44100, 1234), 1234);
        assert_eq!(frames_to_ts(tb, 44100, 1234), 1234);
        assert_eq!(ts_to_frames(None, 44100, 99), 99);
    }

    #[test]
    fn test_timestamp_conversion_scaled() {
        // Millisecond time base on a 48 kHz stream
        let tb = Some(TimeBase::new(1, 1000));
        assert_eq!(ts_to_frames(tb, 48000, 500), 24000);
        assert_eq!(frames_to_ts(tb, 48000, 24000), 500);
    }

    #[test]
    fn test_open_reports_info() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 4410, 2, 44100);

        let reader = FileReader::open(&path).unwrap();
        assert_eq!(reader.info().sample_rate, 44100);
        assert_eq!(reader.info().channels, 2);
        assert_eq!(reader.info().frames, 4410);
        assert!((file_duration(&path) - 0.1).abs() < 1e-4);
    }

    #[test]
    fn test_read_until_short_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 1000, 1, 8000);

        let mut reader = FileReader::open(&path).unwrap();
        let mut out = Vec::new();
        let mut total = 0;
        loop {
            let got = reader.read_frames(&mut out, 300);
            total += got;
            if got < 300 {
                break;
            }
        }
        assert_eq!(total, 1000);
        assert_eq!(out.len(), 1000);
        assert!(reader.is_exhausted());
    }

    #[test]
    fn test_seek_lands_on_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        write_ramp(&path, 2000, 2, 8000);

        let mut reader = FileReader::open(&path).unwrap();
        reader.seek(1500).unwrap();
        let mut out = Vec::new();
        assert_eq!(reader.read_frames(&mut out, 10), 10);
        assert!((out[0] - 1500.0 / 2000.0).abs() < 1e-6);
        assert!((out[1] - (1500.0 / 2000.0 + 0.001)).abs() < 1e-6);

        // Seeking back to the start re-arms an exhausted reader
        let mut rest = Vec::new();
        reader.read_frames(&mut rest, 10_000);
        assert!(reader.is_exhausted());
        reader.seek(0).unwrap();
        let mut first = Vec::new();
        assert_eq!(reader.read_frames(&mut first, 1), 1);
        assert_eq!(first[0], 0.0);
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(FileReader::open(Path::new("/nonexistent/missing.wav")).is_err());
        assert_eq!(file_duration("/nonexistent/missing.wav"), 0.0);
        assert_eq!(file_tag("/nonexistent/missing.wav", FileTag::Title), "");
    }

    #[test]
    fn test_untagged_file_has_empty_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plain.wav");
        write_ramp(&path, 100, 1, 8000);
        assert_eq!(file_tag(&path, FileTag::Artist), "");
    }
}
