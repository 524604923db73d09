use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::timing::MetronomeConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse: {0}")]
    Parse(#[from] ron::error::SpannedError),
    #[error("config serialize: {0}")]
    Serialize(#[from] ron::Error),
}

/// Player settings, stored as RON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Substring of the output port name. First port if unset or unmatched.
    pub output_port: Option<String>,
    pub input_port: Option<String>,
    pub tick_interval_ms: u64,
    pub input_queue_capacity: usize,
    pub metronome: MetronomeConfig,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            output_port: None,
            input_port: None,
            tick_interval_ms: 4,
            input_queue_capacity: 1024,
            metronome: MetronomeConfig::default(),
        }
    }
}

impl PlayerConfig {
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let ron_string = ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())?;
        fs::write(path, ron_string)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ron_string = fs::read_to_string(path)?;
        let config: PlayerConfig = ron::from_str(&ron_string)?;
        Ok(config)
    }
}
