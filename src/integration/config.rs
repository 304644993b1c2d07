//! Integration manager configuration
//!
//! Loaded from YAML. Every field has a default, so an empty document is
//! a valid configuration.

use super::error::{IntegrationError, IntegrationResult};
use super::queue::DEFAULT_QUEUE_CAPACITY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationConfig {
    /// Maximum number of pending events
    pub queue_capacity: usize,
    /// Minimum spacing between synchronization rounds; 0 disables the limit
    pub sync_interval_ms: u64,
    /// Maximum number of tracked service providers
    pub max_providers: usize,
    pub initial_model_capacity: usize,
    pub initial_handler_capacity: usize,
}

impl Default for IntegrationConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sync_interval_ms: 1000,
            max_providers: 64,
            initial_model_capacity: 8,
            initial_handler_capacity: 8,
        }
    }
}

impl IntegrationConfig {
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn with_sync_interval_ms(mut self, interval: u64) -> Self {
        self.sync_interval_ms = interval;
        self
    }

    pub fn with_max_providers(mut self, max: usize) -> Self {
        self.max_providers = max;
        self
    }

    pub fn from_yaml_str(yaml: &str) -> IntegrationResult<Self> {
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> IntegrationResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn to_yaml(&self) -> IntegrationResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// `<config dir>/integration-bus/config.yaml`
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
        config_dir.join("integration-bus").join("config.yaml")
    }

    pub fn validate(&self) -> IntegrationResult<()> {
        if self.queue_capacity == 0 {
            return Err(IntegrationError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.max_providers == 0 {
            return Err(IntegrationError::Config(
                "max_providers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_yields_defaults() {
        let config = IntegrationConfig::from_yaml_str("").unwrap();
        assert_eq!(config, IntegrationConfig::default());
        assert_eq!(config.queue_capacity, 100);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = IntegrationConfig::from_yaml_str("queue_capacity: 5\nsync_interval_ms: 0\n").unwrap();
        assert_eq!(config.queue_capacity, 5);
        assert_eq!(config.sync_interval_ms, 0);
        assert_eq!(config.max_providers, 64);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = IntegrationConfig::from_yaml_str("queue_capacity: 0").unwrap_err();
        assert!(matches!(err, IntegrationError::Config(_)));
    }

    #[test]
    fn malformed_yaml_is_reported() {
        let err = IntegrationConfig::from_yaml_str("queue_capacity: [oops").unwrap_err();
        assert!(matches!(err, IntegrationError::Yaml(_)));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_providers: 3").unwrap();
        let config = IntegrationConfig::load(file.path()).unwrap();
        assert_eq!(config.max_providers, 3);
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = IntegrationConfig::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, IntegrationError::Io(_)));
    }

    #[test]
    fn yaml_output_parses_back() {
        let config = IntegrationConfig::default().with_queue_capacity(7);
        let yaml = config.to_yaml().unwrap();
        assert_eq!(IntegrationConfig::from_yaml_str(&yaml).unwrap(), config);
    }
}
