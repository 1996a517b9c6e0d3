//! Load-path configuration

use crate::{retry::RetryParameters, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoadPathConfig {
    /// Default for `attach` and `unload`: set up a media pipeline when supported
    pub initialize_media_source: bool,
    /// Retry schedule for manifest fetches
    pub manifest_retry: RetryParameters,
    /// Retry schedule for DRM session setup
    pub drm_retry: RetryParameters,
    /// Events buffered per subscriber before slow receivers lag
    pub event_capacity: usize,
}

impl Default for LoadPathConfig {
    fn default() -> Self {
        Self {
            initialize_media_source: true,
            manifest_retry: RetryParameters::default(),
            drm_retry: RetryParameters::default(),
            event_capacity: 256,
        }
    }
}

impl LoadPathConfig {
    /// Parse and validate a JSON document
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: LoadPathConfig =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and validate a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.manifest_retry.validate()?;
        self.drm_retry.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::InvalidConfig("event_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = LoadPathConfig::default();
        assert!(config.initialize_media_source);
        assert_eq!(config.manifest_retry.max_attempts, 2);
        assert_eq!(config.event_capacity, 256);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = LoadPathConfig::from_json_str(
            r#"{"initialize_media_source": false, "manifest_retry": {"max_attempts": 5}}"#,
        )
        .unwrap();
        assert!(!config.initialize_media_source);
        assert_eq!(config.manifest_retry.max_attempts, 5);
        assert_eq!(config.manifest_retry.base_delay_ms, 1000);
        assert_eq!(config.drm_retry, RetryParameters::default());
    }

    #[test]
    fn test_rejects_unknown_and_invalid_values() {
        assert!(matches!(
            LoadPathConfig::from_json_str(r#"{"retries": 3}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            LoadPathConfig::from_json_str(r#"{"drm_retry": {"max_attempts": 0}}"#),
            Err(Error::InvalidConfig(_))
        ));
        assert!(matches!(
            LoadPathConfig::from_json_str(r#"{"event_capacity": 0}"#),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loader.json");
        std::fs::write(&path, r#"{"event_capacity": 16}"#).unwrap();
        assert_eq!(LoadPathConfig::from_file(&path).unwrap().event_capacity, 16);

        assert!(matches!(
            LoadPathConfig::from_file(dir.path().join("missing.json")),
            Err(Error::Io(_))
        ));
    }
}
