//! Context configuration via `choreo.toml`
//!
//! A context opened on a directory reads `choreo.toml` from it; on first
//! open a commented default file is written. Programmatic callers can build
//! a [`ChoreoConfig`] directly and hand it to `Context::open`.

use choreo_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config file name placed in the data directory.
pub const CONFIG_FILE_NAME: &str = "choreo.toml";

/// Context configuration loaded from `choreo.toml`.
///
/// # Example
///
/// ```toml
/// transition_retries = 16
/// event_channel_capacity = 1024
/// persist_entities = true
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChoreoConfig {
    /// CAS retries on a contended lifecycle transition before giving up
    #[serde(default = "default_transition_retries")]
    pub transition_retries: u32,
    /// Capacity of the bounded lifecycle event channel
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Directory for file-backed stores; in-memory stores when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Write entity records to the entity store on every change
    #[serde(default = "default_persist_entities")]
    pub persist_entities: bool,
}

fn default_transition_retries() -> u32 {
    16
}

fn default_event_channel_capacity() -> usize {
    1024
}

fn default_persist_entities() -> bool {
    true
}

impl Default for ChoreoConfig {
    fn default() -> Self {
        Self {
            transition_retries: default_transition_retries(),
            event_channel_capacity: default_event_channel_capacity(),
            data_dir: None,
            persist_entities: default_persist_entities(),
        }
    }
}

impl ChoreoConfig {
    /// Reject values the engine cannot run with.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a zero event channel capacity.
    pub fn validate(&self) -> Result<()> {
        if self.event_channel_capacity == 0 {
            return Err(Error::invalid_input(
                "event_channel_capacity in choreo.toml must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse and validate config text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ChoreoConfig = toml::from_str(content)
            .map_err(|e| Error::invalid_input(format!("Failed to parse choreo.toml: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse config from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed or validated.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| match e {
            Error::InvalidInput(msg) => {
                Error::invalid_input(format!("{} ({})", msg, path.display()))
            }
            other => other,
        })
    }

    /// Load config from `path`, writing the default file first if missing.
    pub fn load(path: &Path) -> Result<Self> {
        Self::write_default_if_missing(path)?;
        Self::from_file(path)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# choreodata configuration
#
# Attempts made on a contended lifecycle transition before the call fails
# with StateTransitionExhausted (default: 16)
transition_retries = 16

# Lifecycle events buffered between publishers and the registry worker.
# Publishers block when the channel is full (default: 1024)
event_channel_capacity = 1024

# Write every entity change to the entity store so a restart can
# rebuild the registry (default: true)
persist_entities = true
"#
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_toml_parses_to_default() {
        let config = ChoreoConfig::from_toml_str(ChoreoConfig::default_toml()).unwrap();
        assert_eq!(config, ChoreoConfig::default());
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = ChoreoConfig::from_toml_str("").unwrap();
        assert_eq!(config.transition_retries, 16);
        assert_eq!(config.event_channel_capacity, 1024);
        assert!(config.persist_entities);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = ChoreoConfig::from_toml_str("event_channel_capacity = 0").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn garbage_is_rejected() {
        let err = ChoreoConfig::from_toml_str("transition_retries = \"many\"").unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn load_creates_default_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        assert!(!path.exists());

        let config = ChoreoConfig::load(&path).unwrap();
        assert!(path.exists());
        assert_eq!(config, ChoreoConfig::default());
    }

    #[test]
    fn load_does_not_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "transition_retries = 3\n").unwrap();

        let config = ChoreoConfig::load(&path).unwrap();
        assert_eq!(config.transition_retries, 3);
    }

    #[test]
    fn write_to_file_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        let config = ChoreoConfig {
            transition_retries: 4,
            event_channel_capacity: 8,
            data_dir: Some(dir.path().to_path_buf()),
            persist_entities: false,
        };
        config.write_to_file(&path).unwrap();
        assert_eq!(ChoreoConfig::from_file(&path).unwrap(), config);
    }
}
