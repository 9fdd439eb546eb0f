//! Configuration management for fileplay
//!
//! Engine defaults come from an optional TOML file. Every field has a
//! built-in default, so an empty (or absent) file yields a working engine.
//!
//! ```toml
//! [engine]
//! max_players = 16
//! buffer_size = 48000
//! buffer_count = 5
//! src_quality = "sinc_fastest"
//!
//! [logging]
//! level = "debug"
//! ```

use crate::audio::SrcQuality;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Top-level configuration file layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl TomlConfig {
    /// Load and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_toml(&text)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse and validate configuration text
    pub fn from_toml(text: &str) -> Result<Self> {
        let config: TomlConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }
}

/// Engine-wide settings and per-instance defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registry capacity
    #[serde(default = "default_max_players")]
    pub max_players: usize,

    /// Samples read from the file per streaming block; also the unit of the
    /// ring channel size. Initial value for new instances.
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Ring channel capacity in multiples of `buffer_size` (must exceed 1).
    /// Initial value for new instances.
    #[serde(default = "default_buffer_count")]
    pub buffer_count: usize,

    /// Initial converter quality for new instances
    #[serde(default)]
    pub src_quality: SrcQuality,

    /// MIDI note that plays the file at its original pitch
    #[serde(default = "default_reference_note")]
    pub reference_note: u8,

    /// Map CC 1/7/68/69 to position, gain, transport and loop
    #[serde(default)]
    pub cc_mapping: bool,

    /// Sleep between polls of every cross-thread handshake
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Minimum position change (seconds) worth a notification
    #[serde(default = "default_position_threshold")]
    pub position_threshold: f32,

    /// Minimum gain change worth a notification
    #[serde(default = "default_gain_threshold")]
    pub gain_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_players: default_max_players(),
            buffer_size: default_buffer_size(),
            buffer_count: default_buffer_count(),
            src_quality: SrcQuality::default(),
            reference_note: default_reference_note(),
            cc_mapping: false,
            poll_interval_ms: default_poll_interval_ms(),
            position_threshold: default_position_threshold(),
            gain_threshold: default_gain_threshold(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_players == 0 {
            return Err(Error::Config("max_players must be at least 1".to_string()));
        }
        if self.buffer_size == 0 {
            return Err(Error::Config("buffer_size must be at least 1".to_string()));
        }
        if self.buffer_count < 2 {
            return Err(Error::Config("buffer_count must be greater than 1".to_string()));
        }
        if self.reference_note > 127 {
            return Err(Error::Config(format!(
                "reference_note {} is not a MIDI note",
                self.reference_note
            )));
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be at least 1".to_string()));
        }
        if self.position_threshold < 0.0 || self.gain_threshold < 0.0 {
            return Err(Error::Config("notification thresholds must not be negative".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_players() -> usize {
    16
}

fn default_buffer_size() -> usize {
    48000
}

fn default_buffer_count() -> usize {
    5
}

fn default_reference_note() -> u8 {
    60
}

fn default_poll_interval_ms() -> u64 {
    10
}

fn default_position_threshold() -> f32 {
    0.1
}

fn default_gain_threshold() -> f32 {
    0.01
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = TomlConfig::from_toml("").unwrap();
        assert_eq!(config.engine.max_players, 16);
        assert_eq!(config.engine.buffer_size, 48000);
        assert_eq!(config.engine.buffer_count, 5);
        assert_eq!(config.engine.src_quality, SrcQuality::SincFastest);
        assert_eq!(config.engine.reference_note, 60);
        assert!(!config.engine.cc_mapping);
        assert_eq!(config.engine.poll_interval(), Duration::from_millis(10));
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_partial_override() {
        let config = TomlConfig::from_toml(
            r#"
            [engine]
            buffer_size = 4096
            src_quality = "linear"
            cc_mapping = true

            [logging]
            level = "debug"
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.buffer_size, 4096);
        assert_eq!(config.engine.buffer_count, 5);
        assert_eq!(config.engine.src_quality, SrcQuality::Linear);
        assert!(config.engine.cc_mapping);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        assert!(TomlConfig::from_toml("[engine]\nbuffer_count = 1").is_err());
        assert!(TomlConfig::from_toml("[engine]\nmax_players = 0").is_err());
        assert!(TomlConfig::from_toml("[engine]\nreference_note = 200").is_err());
        assert!(TomlConfig::from_toml("[engine]\nsrc_quality = \"best\"").is_err());
        assert!(TomlConfig::from_toml("engine = 3").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = TomlConfig::load(Path::new("/nonexistent/fileplay.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
