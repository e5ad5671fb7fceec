//! Offline training: split, fit transform and classifier, evaluate, persist

use crate::dataset::Dataset;
use crate::error::{PipelineError, Result};
use crate::evaluation::Evaluator;
use crate::models::forest::ForestConfig;
use crate::models::loader::ArtifactStore;
use crate::models::pipeline::FittedPipeline;
use crate::preprocessing::{Preprocessor, StandardScaler};
use crate::types::report::MetricsReport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Training run settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    /// Seeds both the split and the classifier
    pub seed: u64,
    pub forest: ForestConfig,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: 0.2,
            seed: 42,
            forest: ForestConfig::default(),
        }
    }
}

/// Result of a training run
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub pipeline: FittedPipeline,
    pub report: MetricsReport,
    pub train_rows: usize,
    pub test_rows: usize,
}

pub struct Trainer {
    config: TrainingConfig,
    evaluator: Evaluator,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            evaluator: Evaluator::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: Evaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Fit and evaluate in memory; nothing is persisted
    pub fn fit(&self, dataset: &Dataset) -> Result<TrainingOutcome> {
        let started = Instant::now();
        let (train, test) = dataset.stratified_split(self.config.test_size, self.config.seed)?;
        info!(
            train = train.len(),
            test = test.len(),
            train_positives = train.positive_count(),
            test_positives = test.positive_count(),
            "Stratified split complete"
        );

        let train_rows = train.features();
        let scaler = StandardScaler::fit(&train_rows)?;
        let train_scaled = scaler.transform_batch(&train_rows);

        let fit_started = Instant::now();
        let forest = self
            .config
            .forest
            .fit(&train_scaled, &train.labels(), self.config.seed)?;
        info!(
            trees = forest.tree_count(),
            elapsed_ms = fit_started.elapsed().as_millis() as u64,
            "Classifier fitted"
        );

        let test_scaled = scaler.transform_batch(&test.features());
        let report = self.evaluator.evaluate(
            &forest,
            &test_scaled,
            &test.labels(),
            dataset.class_balance(),
        );
        if !report.is_finite() {
            return Err(PipelineError::Training(
                "evaluation produced non-finite metrics".to_string(),
            ));
        }

        info!(
            accuracy = report.accuracy,
            precision = report.precision,
            recall = report.recall,
            f1 = report.f1,
            auc = report.auc,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation complete"
        );

        Ok(TrainingOutcome {
            pipeline: FittedPipeline::new(scaler, forest, self.config.seed),
            report,
            train_rows: train.len(),
            test_rows: test.len(),
        })
    }

    /// Load the dataset, train, and persist pipeline and report together.
    ///
    /// Any failure before persistence leaves existing artifacts untouched.
    pub fn run<P: AsRef<Path>>(&self, dataset_path: P, store: &ArtifactStore) -> Result<TrainingOutcome> {
        let dataset = Dataset::load_csv(dataset_path)?;
        let outcome = self.fit(&dataset)?;
        store.persist(&outcome.pipeline, &outcome.report)?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{quick_config, synthetic_dataset};

    #[test]
    fn test_same_seed_same_report() {
        let dataset = synthetic_dataset(200);
        let trainer = Trainer::new(quick_config());

        let a = trainer.fit(&dataset).unwrap();
        let b = trainer.fit(&dataset).unwrap();

        assert_eq!(a.report, b.report);
        assert_eq!(a.pipeline.classifier(), b.pipeline.classifier());
        assert_eq!(a.pipeline.transform(), b.pipeline.transform());
    }

    #[test]
    fn test_split_sizes_and_report_shape() {
        let dataset = synthetic_dataset(200);
        let outcome = Trainer::new(quick_config()).fit(&dataset).unwrap();

        assert_eq!(outcome.train_rows, 160);
        assert_eq!(outcome.test_rows, 40);
        assert_eq!(outcome.report.confusion_matrix.total(), 40);
        assert_eq!(outcome.report.threshold_analysis.len(), 9);
        assert_eq!(outcome.report.feature_importance.len(), 10);
        assert_eq!(outcome.report.eda.total_transactions, 200);
        assert_eq!(outcome.report.eda.fraud_count, 10);
        assert!(outcome.report.is_finite());
    }

    #[test]
    fn test_scaler_fitted_on_train_only() {
        let dataset = synthetic_dataset(200);
        let config = quick_config();
        let outcome = Trainer::new(config.clone()).fit(&dataset).unwrap();

        let (train, _) = dataset
            .stratified_split(config.test_size, config.seed)
            .unwrap();
        let expected = StandardScaler::fit(&train.features()).unwrap();
        assert_eq!(outcome.pipeline.transform(), &expected);
    }

    #[test]
    fn test_run_missing_dataset_persists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.bin"), dir.path().join("metrics.json"));

        let err = Trainer::new(quick_config())
            .run(dir.path().join("absent.csv"), &store)
            .unwrap_err();

        assert!(matches!(err, PipelineError::DataNotFound { .. }));
        assert!(!store.model_path().exists());
        assert!(!store.metrics_path().exists());
    }
}
