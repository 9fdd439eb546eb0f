//! Audio file decoding and the sample pipeline (conversion + downmix)

pub mod decoder;
pub mod downmix;
pub mod resampler;
pub mod types;

pub use decoder::{file_duration, file_tag, supported_extensions, FileReader};
pub use downmix::{clamp_track, downmix, DOWNMIX};
pub use resampler::{Converter, SrcQuality};
pub use types::{FileFormat, FileInfo, FileTag};
