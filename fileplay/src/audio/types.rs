//! Audio file description types

use crate::error::{Error, Result};

/// Codec-level format of an open file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFormat {
    /// Codec short name as reported by symphonia (e.g. "pcm_s16le", "flac")
    pub codec: String,
    /// Bits per decoded sample, when the codec reports it
    pub bits_per_sample: Option<u32>,
}

/// Stream properties discovered when a file is opened
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    /// Native sample rate of the file
    pub sample_rate: u32,
    /// Interleaved channel count (>= 1)
    pub channels: usize,
    /// Total frames at the native sample rate
    pub frames: u64,
    pub format: FileFormat,
}

impl FileInfo {
    /// Duration in seconds at the native sample rate
    pub fn duration(&self) -> f32 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        (self.frames as f64 / self.sample_rate as f64) as f32
    }
}

/// Text tags that can be queried from a file without loading it.
///
/// Numeric codes follow the conventional sound-file library string ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileTag {
    Title = 1,
    Copyright = 2,
    Software = 3,
    Artist = 4,
    Comment = 5,
    Date = 6,
    Album = 7,
    License = 8,
    TrackNumber = 9,
    Genre = 16,
}

impl FileTag {
    pub const ALL: [FileTag; 10] = [
        FileTag::Title,
        FileTag::Copyright,
        FileTag::Software,
        FileTag::Artist,
        FileTag::Comment,
        FileTag::Date,
        FileTag::Album,
        FileTag::License,
        FileTag::TrackNumber,
        FileTag::Genre,
    ];
}

impl TryFrom<u32> for FileTag {
    type Error = Error;

    fn try_from(code: u32) -> Result<Self> {
        FileTag::ALL
            .into_iter()
            .find(|tag| *tag as u32 == code)
            .ok_or_else(|| Error::InvalidParameter(format!("Unknown file tag code {}", code)))
    }
}

impl std::fmt::Display for FileTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FileTag::Title => "title",
            FileTag::Copyright => "copyright",
            FileTag::Software => "software",
            FileTag::Artist => "artist",
            FileTag::Comment => "comment",
            FileTag::Date => "date",
            FileTag::Album => "album",
            FileTag::License => "license",
            FileTag::TrackNumber => "tracknumber",
            FileTag::Genre => "genre",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for FileTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        FileTag::ALL
            .into_iter()
            .find(|tag| tag.to_string() == lower)
            .ok_or_else(|| Error::InvalidParameter(format!("Unknown file tag '{}'", s)))
    }
}
