//! Configuration management for the fraud scoring pipeline

use crate::demo::DemoTrigger;
use crate::training::TrainingConfig;
use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub storage: StorageConfig,
    pub training: TrainingConfig,
    pub scoring: ScoringConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection and request subjects
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Single feature-vector scoring requests
    pub score_subject: String,
    /// Batch scoring requests (JSON rows or CSV text)
    pub batch_subject: String,
    /// Simulated payments carrying only an amount
    pub payment_subject: String,
    pub health_subject: String,
    /// Metrics report requests
    pub metrics_subject: String,
    /// Random reference row requests
    pub sample_subject: String,
    /// Every scoring result is also published here
    pub result_subject: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            score_subject: "fraud.score".to_string(),
            batch_subject: "fraud.score.batch".to_string(),
            payment_subject: "fraud.payment".to_string(),
            health_subject: "fraud.health".to_string(),
            metrics_subject: "fraud.metrics".to_string(),
            sample_subject: "fraud.sample".to_string(),
            result_subject: "fraud.results".to_string(),
        }
    }
}

impl NatsConfig {
    /// All request subjects the service answers on
    pub fn request_subjects(&self) -> Vec<&str> {
        vec![
            self.score_subject.as_str(),
            self.batch_subject.as_str(),
            self.payment_subject.as_str(),
            self.health_subject.as_str(),
            self.metrics_subject.as_str(),
            self.sample_subject.as_str(),
        ]
    }
}

/// Dataset and artifact locations
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Labeled CSV used for training and random sampling
    pub dataset_path: PathBuf,
    /// Serialized fitted pipeline
    pub model_path: PathBuf,
    /// Metrics report written by training
    pub metrics_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dataset_path: PathBuf::from("data/creditcard.csv"),
            model_path: PathBuf::from("models/model.bin"),
            metrics_path: PathBuf::from("models/metrics.json"),
        }
    }
}

/// Online scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Probability at or above which a transaction is flagged
    pub threshold: f64,
    /// Train at startup when no pipeline artifact exists
    pub train_if_missing: bool,
    /// Amount override applied to simulated payments only
    pub demo: DemoTrigger,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            train_if_missing: true,
            demo: DemoTrigger::default(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrently processed requests
    pub workers: usize,
    /// Seconds between scoring statistics summaries
    pub report_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            report_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default file plus environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// The file is optional. `FRAUD__SECTION__KEY` environment variables
    /// override it, e.g. `FRAUD__SCORING__THRESHOLD=0.7`.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("FRAUD")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.scoring.threshold) {
            bail!(
                "scoring.threshold must be within [0, 1], got {}",
                self.scoring.threshold
            );
        }
        if !(self.training.test_size > 0.0 && self.training.test_size < 1.0) {
            bail!(
                "training.test_size must be within (0, 1), got {}",
                self.training.test_size
            );
        }
        if self.training.forest.n_estimators == 0 {
            bail!("training.forest.n_estimators must be at least 1");
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::forest::MaxFeatures;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.scoring.threshold, 0.5);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.forest.max_features, MaxFeatures::Sqrt);
        assert_eq!(config.storage.model_path, PathBuf::from("models/model.bin"));
        assert_eq!(config.nats.request_subjects().len(), 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[training]
seed = 7

[training.forest]
n_estimators = 12
max_features = "log2"

[scoring.demo]
enabled = false
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.training.seed, 7);
        assert_eq!(config.training.forest.n_estimators, 12);
        assert_eq!(config.training.forest.max_features, MaxFeatures::Log2);
        assert_eq!(config.training.forest.min_samples_split, 2);
        assert!(!config.scoring.demo.enabled);
        assert_eq!(config.scoring.demo.trigger_amount, 9999.0);
        assert_eq!(config.pipeline.workers, 4);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.storage.dataset_path, PathBuf::from("data/creditcard.csv"));
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = AppConfig::default();
        config.scoring.threshold = 1.5;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());
    }
}
