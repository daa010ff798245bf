//! Configuration management for the borrow anomaly service

use crate::models::ensemble::EnsembleConfig;
use anyhow::{Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

/// Environment variable overriding the configuration file path
pub const CONFIG_PATH_ENV: &str = "BORROW_ANOMALY_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub detection: EnsembleConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject for incoming batch scoring requests
    pub request_subject: String,
    /// Subject for per-transaction anomaly events
    pub anomaly_subject: String,
    /// Queue group shared by service replicas
    #[serde(default)]
    pub queue_group: Option<String>,
}

/// Where the ensemble's historical data comes from
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HistorySourceKind {
    /// Seeded generator of typical borrow patterns
    #[default]
    Synthetic,
    /// JSON array of past borrow transactions
    File,
}

/// Historical data configuration
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HistoryConfig {
    #[serde(default)]
    pub source: HistorySourceKind,
    /// Number of synthetic samples
    #[serde(default = "default_history_samples")]
    pub samples: usize,
    /// Seed for the synthetic generator
    #[serde(default = "default_history_seed")]
    pub seed: u64,
    /// Path of the history file (file source only)
    #[serde(default)]
    pub path: Option<String>,
}

fn default_history_samples() -> usize {
    500
}

fn default_history_seed() -> u64 {
    42
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            source: HistorySourceKind::Synthetic,
            samples: default_history_samples(),
            seed: default_history_seed(),
            path: None,
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum number of batches scored concurrently
    pub workers: usize,
    /// Interval between metrics summaries in seconds
    #[serde(default = "default_metrics_interval")]
    pub metrics_interval_secs: u64,
}

fn default_metrics_interval() -> u64 {
    30
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from `$BORROW_ANOMALY_CONFIG` or `config/config.toml`
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from_path(path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                request_subject: "equipment.borrow.score".to_string(),
                anomaly_subject: "equipment.anomaly".to_string(),
                queue_group: None,
            },
            detection: EnsembleConfig::default(),
            history: HistoryConfig::default(),
            pipeline: PipelineConfig {
                workers: 4,
                metrics_interval_secs: default_metrics_interval(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature_extractor::Feature;
    use crate::models::detector::{DetectorConfig, Direction};
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.nats.queue_group, None);
        assert_eq!(config.detection.features.len(), 8);
        assert_eq!(config.detection.score_floor, -5.0);
        assert_eq!(config.detection.score_ceiling, 1.0);
        assert_eq!(config.history.source, HistorySourceKind::Synthetic);
        assert_eq!(config.history.samples, 500);
    }

    #[test]
    fn test_load_from_toml() {
        let toml = r#"
[nats]
url = "nats://nats:4222"
request_subject = "borrow.score"
anomaly_subject = "borrow.anomaly"
queue_group = "scorers"

[detection]
score_floor = -3.0

[[detection.features]]
feature = "num_items"
detector = { kind = "threshold", percentile = 90.0, direction = "upper" }

[[detection.features]]
feature = "is_unusual_hour"
detector = { kind = "isolation_forest", contamination = 0.05, n_estimators = 50 }

[history]
source = "file"
path = "data/history.json"

[pipeline]
workers = 2

[logging]
level = "debug"
format = "pretty"
"#;
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(toml.as_bytes()).unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();

        assert_eq!(config.nats.request_subject, "borrow.score");
        assert_eq!(config.nats.queue_group.as_deref(), Some("scorers"));
        assert_eq!(config.detection.score_floor, -3.0);
        assert_eq!(config.detection.score_ceiling, 1.0);
        assert_eq!(config.detection.features.len(), 2);
        assert_eq!(
            config.detection.detector_for(Feature::NumItems).unwrap(),
            &DetectorConfig::Threshold {
                percentile: 90.0,
                direction: Direction::Upper,
            }
        );
        assert_eq!(
            config.detection.detector_for(Feature::IsUnusualHour).unwrap(),
            &DetectorConfig::IsolationForest {
                contamination: 0.05,
                n_estimators: 50,
                seed: 42,
            }
        );
        assert_eq!(config.history.source, HistorySourceKind::File);
        assert_eq!(config.history.path.as_deref(), Some("data/history.json"));
        assert_eq!(config.pipeline.metrics_interval_secs, 30);
    }
}
