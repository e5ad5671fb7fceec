//! Online scoring against the currently installed pipeline.
//!
//! The pipeline and reference dataset are held behind `ArcSwapOption`
//! handles: scoring calls take a snapshot without locking, and a reload
//! swaps in a fresh handle while in-flight calls finish on the old one.

use crate::dataset::{read_feature_rows, Dataset, LabeledExample};
use crate::error::{PipelineError, Result, SchemaError};
use crate::features::FeatureVector;
use crate::models::loader::ArtifactStore;
use crate::models::pipeline::FittedPipeline;
use crate::training::Trainer;
use crate::types::report::MetricsReport;
use crate::types::verdict::{BatchSummary, Health, ScoringResult};
use arc_swap::ArcSwapOption;
use rand::Rng;
use rayon::prelude::*;
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// How `ScoringService::load_or_train` left the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    Loaded,
    Trained,
    /// Serving without a model
    Untrained,
}

pub struct ScoringService {
    pipeline: ArcSwapOption<FittedPipeline>,
    reference: ArcSwapOption<Dataset>,
    store: ArtifactStore,
    threshold: f64,
}

impl ScoringService {
    pub fn new(store: ArtifactStore, threshold: f64) -> Self {
        Self {
            pipeline: ArcSwapOption::empty(),
            reference: ArcSwapOption::empty(),
            store,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Current pipeline snapshot
    pub fn pipeline(&self) -> Option<Arc<FittedPipeline>> {
        self.pipeline.load_full()
    }

    /// Swap in a freshly fitted pipeline
    pub fn install_pipeline(&self, pipeline: FittedPipeline) {
        info!(
            model = %pipeline.model_name(),
            trained_at = %pipeline.trained_at(),
            "Pipeline installed"
        );
        self.pipeline.store(Some(Arc::new(pipeline)));
    }

    /// Reload the persisted pipeline.
    ///
    /// Returns `false` when no artifact exists; the current pipeline, if any,
    /// stays installed.
    pub fn reload(&self) -> Result<bool> {
        match self.store.load_pipeline()? {
            Some(pipeline) => {
                self.install_pipeline(pipeline);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Install the persisted pipeline, training one first if allowed.
    ///
    /// Never fails: an unreadable artifact falls through to training, and a
    /// failed training run leaves the service up without a model so scoring
    /// requests report `model_unavailable`.
    pub fn load_or_train<P: AsRef<Path>>(
        &self,
        trainer: &Trainer,
        dataset_path: P,
        train_if_missing: bool,
    ) -> Startup {
        match self.reload() {
            Ok(true) => return Startup::Loaded,
            Ok(false) => info!("No pipeline artifact found"),
            Err(e) => warn!(kind = e.kind(), error = %e, "Pipeline artifact unusable"),
        }

        if !train_if_missing {
            warn!("Training on startup is disabled; serving without a model");
            return Startup::Untrained;
        }

        info!("Training on startup");
        match trainer.run(dataset_path, &self.store) {
            Ok(outcome) => {
                info!(
                    train_rows = outcome.train_rows,
                    test_rows = outcome.test_rows,
                    auc = outcome.report.auc,
                    "Startup training complete"
                );
                self.install_pipeline(outcome.pipeline);
                Startup::Trained
            }
            Err(e @ PipelineError::DataNotFound { .. }) => {
                warn!(error = %e, "Cannot train on startup; serving without a model");
                Startup::Untrained
            }
            Err(e) => {
                error!(kind = e.kind(), error = %e, "Startup training failed; serving without a model");
                Startup::Untrained
            }
        }
    }

    pub fn install_reference(&self, dataset: Dataset) {
        self.reference.store(Some(Arc::new(dataset)));
    }

    /// Load the reference dataset used for random sampling
    pub fn load_reference_dataset<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let dataset = Dataset::load_csv(path)?;
        let rows = dataset.len();
        self.install_reference(dataset);
        Ok(rows)
    }

    pub fn health(&self) -> Health {
        let model_loaded = self.pipeline.load().is_some();
        Health {
            status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
            model_loaded,
            data_loaded: self.reference.load().is_some(),
        }
    }

    fn require_pipeline(&self) -> Result<Arc<FittedPipeline>> {
        self.pipeline.load_full().ok_or(PipelineError::ModelUnavailable)
    }

    /// Score a single validated feature vector
    pub fn score(&self, features: &FeatureVector) -> Result<ScoringResult> {
        let started = Instant::now();
        let pipeline = self.require_pipeline()?;
        let (_, probability) = pipeline.predict(features, self.threshold)?;

        let result = ScoringResult::new(probability, self.threshold, pipeline.model_name())
            .with_processing_time(started.elapsed());
        debug!(
            score_id = %result.score_id,
            probability,
            label = ?result.label,
            "Transaction scored"
        );
        Ok(result)
    }

    /// Validate a JSON object against the feature contract, then score it
    pub fn score_json(&self, value: &Value) -> Result<ScoringResult> {
        let features = FeatureVector::from_json(value)?;
        self.score(&features)
    }

    /// Score every row and aggregate; any failing row fails the batch
    pub fn score_batch(&self, rows: &[FeatureVector]) -> Result<BatchSummary> {
        let started = Instant::now();
        let pipeline = self.require_pipeline()?;
        let threshold = self.threshold;

        let labels = rows
            .par_iter()
            .map(|row| pipeline.predict(row, threshold).map(|(label, _)| label))
            .collect::<Result<Vec<_>>>()?;
        let fraud_count = labels.iter().filter(|label| label.is_fraud()).count();

        let summary = BatchSummary::from_counts(rows.len(), fraud_count, started.elapsed());
        info!(
            total = summary.total_transactions,
            fraud = summary.fraud_count,
            elapsed_ms = summary.processing_time_ms,
            "Batch scored"
        );
        Ok(summary)
    }

    /// Validate every JSON row before scoring any of them
    pub fn score_batch_json(&self, rows: &[Value]) -> Result<BatchSummary> {
        let features = rows
            .iter()
            .enumerate()
            .map(|(i, row)| FeatureVector::from_json(row).map_err(|e| e.at(i)))
            .collect::<std::result::Result<Vec<_>, SchemaError>>()?;
        self.score_batch(&features)
    }

    /// Score a CSV upload with a header line
    pub fn score_batch_csv<R: Read>(&self, reader: R) -> Result<BatchSummary> {
        let rows = read_feature_rows(reader)?;
        self.score_batch(&rows)
    }

    /// The report persisted by the last training run
    pub fn metrics_report(&self) -> Result<MetricsReport> {
        self.store.load_report()
    }

    /// Uniformly random reference row
    pub fn random_sample(&self) -> Result<LabeledExample> {
        self.random_sample_with(&mut rand::thread_rng())
    }

    pub fn random_sample_with<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<LabeledExample> {
        let reference = self
            .reference
            .load_full()
            .ok_or(PipelineError::DatasetUnavailable)?;
        reference
            .sample(rng)
            .copied()
            .ok_or(PipelineError::DatasetUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{quick_config, synthetic_dataset};
    use crate::training::Trainer;
    use crate::types::verdict::Label;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;
    use tempfile::TempDir;

    fn service() -> (TempDir, ScoringService) {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("model.bin"), dir.path().join("metrics.json"));
        (dir, ScoringService::new(store, 0.5))
    }

    fn trained_service() -> (TempDir, ScoringService, Dataset) {
        let (dir, service) = service();
        let dataset = synthetic_dataset(200);
        let outcome = Trainer::new(quick_config()).fit(&dataset).unwrap();
        service.install_pipeline(outcome.pipeline);
        (dir, service, dataset)
    }

    fn legitimate_row(dataset: &Dataset) -> FeatureVector {
        dataset
            .examples()
            .iter()
            .find(|e| e.label == Label::Legitimate)
            .unwrap()
            .features
    }

    fn as_json(features: &FeatureVector) -> Value {
        serde_json::to_value(features).unwrap()
    }

    #[test]
    fn test_score_without_pipeline_is_unavailable() {
        let (_dir, service) = service();
        let row = FeatureVector::from_values([0.0; crate::features::FEATURE_COUNT]);

        let err = service.score(&row).unwrap_err();
        assert!(matches!(err, PipelineError::ModelUnavailable));
        assert!(err.is_recoverable());
        assert!(!service.health().model_loaded);
    }

    #[test]
    fn test_missing_amount_is_schema_error() {
        let (_dir, service, dataset) = trained_service();
        let mut value = as_json(&legitimate_row(&dataset));
        value.as_object_mut().unwrap().remove("Amount");

        match service.score_json(&value).unwrap_err() {
            PipelineError::Schema(SchemaError::MissingField { field, .. }) => {
                assert_eq!(field, "Amount")
            }
            other => panic!("expected missing field, got {other}"),
        }
    }

    #[test]
    fn test_score_result_agrees_with_threshold() {
        let (_dir, service, dataset) = trained_service();

        for example in dataset.examples().iter().take(50) {
            let result = service.score(&example.features).unwrap();
            assert!((0.0..=1.0).contains(&result.probability));
            assert_eq!(result.is_flagged(), result.probability >= 0.5);
            assert_eq!(result.threshold, 0.5);
            assert_eq!(result.model, "RandomForestClassifier");
        }
    }

    #[test]
    fn test_identical_legitimate_batch_has_no_fraud() {
        let (_dir, service, dataset) = trained_service();
        let rows = vec![legitimate_row(&dataset); 1000];

        let summary = service.score_batch(&rows).unwrap();
        assert_eq!(summary.total_transactions, 1000);
        assert_eq!(summary.fraud_count, 0);
        assert_eq!(summary.fraud_percentage, 0.0);
    }

    #[test]
    fn test_batch_rejects_bad_row_with_index() {
        let (_dir, service, dataset) = trained_service();
        let good = as_json(&legitimate_row(&dataset));
        let mut bad = good.clone();
        bad["V3"] = json!("abc");

        let err = service
            .score_batch_json(&[good.clone(), good, bad])
            .unwrap_err();
        match err {
            PipelineError::Schema(SchemaError::NonNumeric { field, row, .. }) => {
                assert_eq!(field, "V3");
                assert_eq!(row, Some(2));
            }
            other => panic!("expected non-numeric cell, got {other}"),
        }
    }

    #[test]
    fn test_report_before_training_is_not_found() {
        let (_dir, service) = service();
        let err = service.metrics_report().unwrap_err();
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn test_reload_picks_up_persisted_pipeline() {
        let (_dir, service) = service();
        assert!(!service.reload().unwrap());

        let outcome = Trainer::new(quick_config())
            .fit(&synthetic_dataset(200))
            .unwrap();
        service
            .store()
            .persist(&outcome.pipeline, &outcome.report)
            .unwrap();

        assert!(service.reload().unwrap());
        assert!(service.health().model_loaded);
        let report = service.metrics_report().unwrap();
        assert_eq!(report.confusion_matrix, outcome.report.confusion_matrix);
        assert_eq!(report.threshold_analysis.len(), 9);
    }

    #[test]
    fn test_corrupt_artifact_does_not_stop_startup() {
        let (dir, service) = service();
        std::fs::write(dir.path().join("model.bin"), b"not a pipeline").unwrap();
        assert_eq!(service.reload().unwrap_err().kind(), "artifact_error");

        let trainer = Trainer::new(quick_config());
        let startup = service.load_or_train(&trainer, dir.path().join("missing.csv"), true);
        assert_eq!(startup, Startup::Untrained);
        assert!(!service.health().model_loaded);

        let startup = service.load_or_train(&trainer, dir.path().join("missing.csv"), false);
        assert_eq!(startup, Startup::Untrained);
    }

    #[test]
    fn test_failed_startup_training_serves_without_model() {
        let (dir, service) = service();
        let dataset_path = dir.path().join("data.csv");
        std::fs::write(&dataset_path, "Time,V1,Amount,Class\n0,1,2,0\n").unwrap();

        let startup = service.load_or_train(&Trainer::new(quick_config()), &dataset_path, true);
        assert_eq!(startup, Startup::Untrained);
        let row = FeatureVector::from_values([0.0; crate::features::FEATURE_COUNT]);
        assert!(matches!(service.score(&row), Err(PipelineError::ModelUnavailable)));
    }

    #[test]
    fn test_startup_replaces_corrupt_artifact_by_training() {
        let (dir, service) = service();
        std::fs::write(dir.path().join("model.bin"), b"garbage").unwrap();

        let dataset_path = dir.path().join("data.csv");
        let mut text = crate::features::FEATURE_NAMES.join(",");
        text.push_str(",Class\n");
        for example in synthetic_dataset(200).examples() {
            let cells: Vec<String> = example.features.values().iter().map(|v| v.to_string()).collect();
            text.push_str(&format!("{},{}\n", cells.join(","), example.label.as_u8()));
        }
        std::fs::write(&dataset_path, text).unwrap();

        let startup = service.load_or_train(&Trainer::new(quick_config()), &dataset_path, true);
        assert_eq!(startup, Startup::Trained);
        assert!(service.health().model_loaded);
        assert!(service.reload().unwrap());
    }

    #[test]
    fn test_scoring_continues_across_pipeline_swaps() {
        let (_dir, service, dataset) = trained_service();
        let replacement = Trainer::new(quick_config()).fit(&dataset).unwrap();
        service
            .store()
            .persist(&replacement.pipeline, &replacement.report)
            .unwrap();
        let rows = dataset.features();

        std::thread::scope(|scope| {
            for worker in 0..4 {
                let service = &service;
                let rows = &rows;
                scope.spawn(move || {
                    for row in rows.iter().skip(worker).step_by(4) {
                        let result = service.score(row).unwrap();
                        assert!((0.0..=1.0).contains(&result.probability));
                    }
                });
            }
            scope.spawn(|| {
                for i in 0..20 {
                    if i % 2 == 0 {
                        service.install_pipeline(replacement.pipeline.clone());
                    } else {
                        assert!(service.reload().unwrap());
                    }
                }
            });
        });

        assert!(service.health().model_loaded);
    }

    #[test]
    fn test_random_sample() {
        let (_dir, service) = service();
        assert!(matches!(
            service.random_sample(),
            Err(PipelineError::DatasetUnavailable)
        ));

        let dataset = synthetic_dataset(20);
        service.install_reference(dataset.clone());
        assert!(service.health().data_loaded);

        let mut rng = StdRng::seed_from_u64(3);
        let sample = service.random_sample_with(&mut rng).unwrap();
        assert!(dataset.examples().contains(&sample));
    }
}
