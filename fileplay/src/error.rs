//! Error types for fileplay
//!
//! Defines the crate error type using thiserror for clear error propagation.
//! Nothing in here ever crosses the render callback: that path degrades to
//! silence instead of returning errors.

use thiserror::Error;

/// Main error type for the fileplay engine
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio decoding errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Sample-rate converter construction or processing errors
    #[error("Resampler error: {0}")]
    Resample(String),

    /// File could not be opened as playable audio
    #[error("Failed to open file: {0}")]
    FileOpen(String),

    /// Background streaming thread could not be spawned
    #[error("Failed to create streaming task: {0}")]
    TaskCreation(String),

    /// Parameter outside its accepted domain
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Invalid state for operation
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Registry has no free slot
    #[error("Player capacity exceeded ({0} instances)")]
    CapacityExceeded(usize),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience Result type using the fileplay Error
pub type Result<T> = std::result::Result<T, Error>;
