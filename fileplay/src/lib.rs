//! # fileplay
//!
//! Multi-instance real-time audio file player.
//!
//! **Purpose:** Stream audio files to stereo output pairs from a host audio
//! callback that must never block. Each player decodes and resamples on its
//! own background thread and hands samples to the render callback through
//! lock-free ring channels.
//!
//! **Architecture:** symphonia decode + rubato conversion on a streaming
//! thread, ringbuf handoff, render callback driven by the host (cpal in the
//! bundled binary).

pub mod audio;
pub mod config;
pub mod error;
pub mod host;
pub mod playback;
pub mod registry;

pub use audio::{file_duration, file_tag, supported_extensions, FileFormat, FileTag, SrcQuality};
pub use config::{EngineConfig, TomlConfig};
pub use error::{Error, Result};
pub use host::{enable_debug, is_debug};
pub use playback::{
    active_streaming_tasks, EventKind, FileLifecycle, NotificationTarget, Player, Renderer,
    TransportState, TriggerEvent,
};
pub use registry::PlayerRegistry;
