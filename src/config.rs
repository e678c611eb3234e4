//! Engine configuration, optionally loaded from ~/.chiptrack/audio.yaml.

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Errors reading or writing a configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Settings fixed when an engine is opened.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Output sample rate in Hz. Uploaded PCM must already be at this rate.
    pub sample_rate: u32,
    /// Number of simultaneous tracks.
    pub tracks: usize,
    /// Frames rendered per mixer pass.
    pub chunk_size: usize,
    pub master_volume: f32,
    /// Maximum number of uploaded samples held at once.
    pub max_samples: usize,
    /// Slots in the queue of buffers waiting to be freed off the audio thread.
    pub retire_capacity: usize,
    /// Seed for the noise generators. Random when absent.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            tracks: 16,
            chunk_size: 1024,
            master_volume: 1.0,
            max_samples: 256,
            retire_capacity: 256,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Load from ~/.chiptrack/audio.yaml. Returns `None` if the file is missing or unreadable.
    pub fn load() -> Option<Self> {
        let path = default_config_path()?;
        let content = std::fs::read_to_string(path).ok()?;
        serde_yaml::from_str(&content).ok()
    }

    /// Load from `path`, falling back to defaults when the file does not exist.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    /// Write to `path`, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Reject settings no engine can run with.
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.sample_rate == 0 {
            return Err(EngineError::InvalidArgument("sample rate must be positive"));
        }
        if self.tracks == 0 {
            return Err(EngineError::InvalidArgument("track count must be positive"));
        }
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidArgument("chunk size must be positive"));
        }
        if !self.master_volume.is_finite() {
            return Err(EngineError::InvalidArgument("master volume must be finite"));
        }
        Ok(())
    }
}

/// ~/.chiptrack/audio.yaml
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".chiptrack").join("audio.yaml"))
}
