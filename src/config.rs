use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::ensemble::ForestConfig;
use crate::forecast::ForecastConfig;
use crate::injury::InjuryConfig;
use crate::logging::LogConfig;
use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;

/// Main application configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Configuration metadata
    pub metadata: ConfigMetadata,

    /// Trend forecaster settings
    pub forecast: ForecastConfig,

    /// Fatigue classifier ensemble
    pub fatigue: ForestConfig,

    /// Injury classifier settings
    pub injury: InjuryConfig,

    /// Session scoring rule
    pub session: SessionConfig,

    /// Persistence settings
    pub database: DatabaseSettings,

    /// Logging settings
    pub logging: LogConfig,
}

/// Configuration metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigMetadata {
    /// Configuration format version
    pub version: String,

    /// Last time the file was written, unset for in-memory defaults
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for ConfigMetadata {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            updated_at: None,
        }
    }
}

/// Database location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// SQLite file holding session and fatigue records
    pub path: PathBuf,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("loadrisk")
                .join("loadrisk.db"),
        }
    }
}

/// Configuration management implementation
impl AppConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: AppConfig =
            toml::from_str(&content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.metadata.updated_at = Some(Utc::now());

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(&path, toml_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("loadrisk")
            .join("config.toml")
    }

    /// Load an explicit file, or the default location falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        let config_path = Self::default_config_path();
        if !config_path.exists() {
            tracing::debug!(path = %config_path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_file(&config_path)
    }

    /// Reject settings the models cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.forecast.horizon == 0 {
            anyhow::bail!("forecast.horizon must be at least 1");
        }
        if !(0.0..=1.0).contains(&self.forecast.changepoint_range) {
            anyhow::bail!("forecast.changepoint_range must lie in [0, 1]");
        }
        if self.forecast.penalty < 0.0 || !(0.0..=1.0).contains(&self.forecast.l1_ratio) {
            anyhow::bail!("forecast.penalty must be >= 0 and forecast.l1_ratio in [0, 1]");
        }
        for (section, forest) in [("fatigue", &self.fatigue), ("injury.forest", &self.injury.forest)] {
            if forest.n_trees == 0 {
                anyhow::bail!("{}.n_trees must be at least 1", section);
            }
            if forest.max_depth == Some(0) {
                anyhow::bail!("{}.max_depth must be at least 1 when set", section);
            }
        }
        if !(self.injury.test_fraction > 0.0 && self.injury.test_fraction < 1.0) {
            anyhow::bail!("injury.test_fraction must lie strictly between 0 and 1");
        }
        if self.session.load_threshold <= 0 {
            anyhow::bail!("session.load_threshold must be positive");
        }
        Ok(())
    }

    /// Model settings for the risk pipeline
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            forecast: self.forecast.clone(),
            fatigue: self.fatigue.clone(),
            injury: self.injury.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_config_serialization() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let deserialized: AppConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.forecast, deserialized.forecast);
        assert_eq!(config.injury, deserialized.injury);
        assert_eq!(deserialized.session.load_threshold, 500);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [session]
            load_threshold = 650

            [injury]
            test_fraction = 0.25
            "#,
        )
        .unwrap();

        assert_eq!(config.session.load_threshold, 650);
        assert_eq!(config.injury.test_fraction, 0.25);
        assert_eq!(config.injury.forest.n_trees, 200);
        assert_eq!(config.forecast.horizon, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = AppConfig::default();
        config.forecast.horizon = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.injury.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.session.load_threshold = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.fatigue.max_depth = Some(0);
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.injury.forest.max_depth = Some(0);
        assert!(config.validate().is_err());
        config.injury.forest.max_depth = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_compare_equal() {
        assert_eq!(AppConfig::default(), AppConfig::default());
        assert_eq!(AppConfig::default().metadata.updated_at, None);
    }

    #[test]
    fn test_config_file_io() {
        let temp_dir = tempdir().unwrap();
        let config_path = temp_dir.path().join("nested").join("config.toml");

        let mut original_config = AppConfig::default();
        original_config.session.load_threshold = 450;
        original_config.save_to_file(&config_path).unwrap();

        let loaded_config = AppConfig::load_or_default(Some(&config_path)).unwrap();
        assert_eq!(loaded_config, original_config);
        assert!(loaded_config.metadata.updated_at.is_some());
        assert_eq!(loaded_config.session.load_threshold, 450);
        assert_eq!(loaded_config.pipeline().forecast.horizon, 7);
    }
}
