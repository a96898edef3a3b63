//! Configuration management for Obol
//!
//! Engine settings live in a YAML file and fall back to defaults when no
//! file is present. Configuration covers the billing currency, demand
//! aggregation, and logging; tariff documents are separate inputs and
//! never come from here.

use crate::error::{ObolError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// ISO 4217 code bill amounts are denominated in
    pub currency: String,

    /// Demand aggregation settings
    pub demand: DemandConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Demand aggregation settings
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DemandConfig {
    /// Bucketing interval in minutes
    pub interval_minutes: u32,

    /// How bucket kVA readings fold into the demand figure
    pub aggregation: DemandAggregation,
}

/// Demand figure aggregation mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandAggregation {
    /// Highest bucket reading
    #[default]
    Max,

    /// Arithmetic mean of bucket readings
    Mean,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            currency: "AUD".to_string(),
            demand: DemandConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            aggregation: DemandAggregation::Max,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/obol.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration with fallback to defaults
    pub fn load() -> Result<Self> {
        // Try to load from default locations
        let default_paths = ["obol_config.yaml", "/etc/obol/config.yaml"];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(EngineConfig::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.currency.len() != 3 || !self.currency.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ObolError::config(
                "currency must be a 3-letter ISO 4217 code",
            ));
        }

        if self.demand.interval_minutes == 0 || self.demand.interval_minutes > 1440 {
            return Err(ObolError::config(
                "demand.interval_minutes must be between 1 and 1440",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.currency, "AUD");
        assert_eq!(config.demand.interval_minutes, 30);
        assert_eq!(config.demand.aggregation, DemandAggregation::Max);
        assert_eq!(config.logging.level, "INFO");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = EngineConfig::default();

        config.currency = "dollars".to_string();
        assert!(config.validate().is_err());

        config.currency = "NZD".to_string();
        assert!(config.validate().is_ok());

        config.demand.interval_minutes = 0;
        assert!(config.validate().is_err());

        config.demand.interval_minutes = 2000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "currency: NZD\ndemand:\n  aggregation: mean\n";
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.currency, "NZD");
        assert_eq!(config.demand.aggregation, DemandAggregation::Mean);
        assert_eq!(config.demand.interval_minutes, 30);
        assert_eq!(config.logging.level, "INFO");
    }

    #[test]
    fn test_yaml_round_trip() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut config = EngineConfig::default();
        config.currency = "NZD".to_string();
        config.demand.interval_minutes = 15;

        config.save_to_file(file.path()).unwrap();
        let restored = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(restored.currency, "NZD");
        assert_eq!(restored.demand.interval_minutes, 15);
    }
}
