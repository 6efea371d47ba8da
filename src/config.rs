//! Configuration for typist identification.

use crate::core::backend::{BackendKind, SessionSettings};
use crate::core::kernel_vote::VotingSettings;
use crate::core::model::{Bandwidth, ModelOptions};
use crate::core::registry::IdentitySource;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default gap threshold in seconds; longer gaps are pauses.
pub const DEFAULT_GAP_THRESHOLD_SECS: f64 = 1.2;

/// Default number of recent scores summed per identity.
pub const DEFAULT_WINDOW_LENGTH: usize = 100;

/// Main configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Inter-key gaps at or above this many seconds are not rhythm samples
    pub gap_threshold_secs: f64,

    /// Timing model fitting
    pub model: ModelOptions,

    /// Backend and aggregation settings
    pub session: SessionSettings,

    /// Known identities, in tie-break order
    pub identities: Vec<IdentitySource>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gap_threshold_secs: DEFAULT_GAP_THRESHOLD_SECS,
            model: ModelOptions::default(),
            session: SessionSettings {
                backend: BackendKind::Parametric,
                window_length: DEFAULT_WINDOW_LENGTH,
                voting: VotingSettings::default(),
            },
            identities: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from a file, falling back to defaults if it does
    /// not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a file.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("typist-id")
            .join("config.json")
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.gap_threshold_secs.is_finite() && self.gap_threshold_secs > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "gap threshold must be positive, got {}",
                self.gap_threshold_secs
            )));
        }
        self.session
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if self.model.min_samples == 0 {
            return Err(ConfigError::Invalid(
                "minimum samples per key-pair must be at least 1".to_string(),
            ));
        }
        if let Bandwidth::Fixed(h) = self.model.bandwidth {
            if !(h.is_finite() && h > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "fixed bandwidth must be positive, got {h}"
                )));
            }
        }
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::kernel_vote::FallbackPolicy;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.gap_threshold_secs, 1.2);
        assert_eq!(config.session.window_length, 100);
        assert_eq!(config.session.voting.history_length, 200);
        assert_eq!(config.session.voting.fallback, FallbackPolicy::Undetermined);
        assert!(config.model.log_transform);
        assert_eq!(config.model.min_samples, 1);
        assert!(config.identities.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = Config::default();
        config.session.window_length = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        let mut config = Config::default();
        config.gap_threshold_secs = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.bandwidth = Bandwidth::Fixed(-0.1);
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.session.voting.history_length = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.min_samples = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = serde_json::from_str(
            r#"{
                "gap_threshold_secs": 1.0,
                "session": { "backend": "kernel-vote", "window_length": 20,
                             "voting": { "history_length": 50,
                                         "fallback": { "policy": "random", "seed": 3 } } },
                "identities": [ { "label": "steven", "files": ["data/steven.txt"] } ]
            }"#,
        )
        .unwrap();

        assert_eq!(config.gap_threshold_secs, 1.0);
        assert_eq!(config.session.backend, BackendKind::KernelVote);
        assert_eq!(
            config.session.voting.fallback,
            FallbackPolicy::Random { seed: Some(3) }
        );
        assert_eq!(config.identities[0].label, "steven");
        assert_eq!(config.model, ModelOptions::default());

        let config: Config =
            serde_json::from_str(r#"{ "model": { "min_samples": 10 } }"#).unwrap();
        assert_eq!(config.model.min_samples, 10);
        assert!(config.model.log_transform);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let mut config = Config::default();
        config.model.bandwidth = Bandwidth::Fixed(0.05);
        config.save_to(&path).unwrap();

        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let config = Config::load_from(Path::new("/nonexistent/typist-id/config.json")).unwrap();
        assert_eq!(config, Config::default());
    }
}
