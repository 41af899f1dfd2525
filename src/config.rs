//! Tunables for a rating session, stored as [ron] so a lab can keep a
//! preset per device:
//!
//! ```text
//! (baud_rate:9600,read_timeout_ms:100,tick_interval_ms:10,frame_size:1024)
//! ```
//!
//! Fields left out of a preset take their defaults.

use crate::playback::FRAME_SIZE;
use crate::rating_source::{DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};

use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    fmt,
    fs::{read_to_string, write},
    io,
    path::Path,
    time::Duration,
};

/// Spacing between polls of the rating port.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Session tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Line speed of the rating device.
    pub baud_rate: u32,
    /// How long one read waits for a complete line.
    pub read_timeout_ms: u64,
    /// Pause between the end of one poll and the start of the next.
    pub tick_interval_ms: u64,
    /// Sample-frames per write to the audio output.
    pub frame_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout_ms: DEFAULT_READ_TIMEOUT.as_millis() as u64,
            tick_interval_ms: DEFAULT_TICK_INTERVAL.as_millis() as u64,
            frame_size: FRAME_SIZE,
        }
    }
}

/// Failed to load or save a [SessionConfig].
#[derive(Debug)]
pub enum ConfigError {
    /// Returned when reading or writing the file fails.
    IoError(io::Error),
    /// Returned when serialization fails.
    RonError(ron::Error),
    /// Returned when the file is not a valid preset.
    RonSpannedError(ron::de::SpannedError),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ConfigError as CE;
        let msg = match self {
            CE::IoError(error) => Cow::from(format!("io error: {}", error)),
            CE::RonError(error) => Cow::from(format!("ron error: {}", error)),
            CE::RonSpannedError(error) => Cow::from(format!("ron spanning error: {}", error)),
        };

        write!(f, "{}", msg)
    }
}

impl std::error::Error for ConfigError {}

impl SessionConfig {
    /// Timeout for one read of the rating port.
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Spacing between polls.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Load a preset from `path`.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = read_to_string(path).map_err(ConfigError::IoError)?;
        Self::from_ron(&text)
    }

    /// Parse a preset.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        ron::de::from_str(text).map_err(ConfigError::RonSpannedError)
    }

    /// Save as a preset at `path`.
    pub fn to_path(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let text = ron::ser::to_string(self).map_err(ConfigError::RonError)?;
        write(path, text).map_err(ConfigError::IoError)
    }
}
