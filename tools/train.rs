//! Offline training
//!
//! Fits the preprocessing transform and classifier on the configured dataset,
//! evaluates on the stratified hold-out and persists pipeline and report.
//!
//! Usage: train [dataset.csv]

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::AppConfig, logging::init_tracing, models::ArtifactStore, training::Trainer,
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;

fn main() -> Result<()> {
    let config = AppConfig::load()?;
    init_tracing(&config.logging)?;

    let dataset_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| config.storage.dataset_path.clone());

    info!(
        dataset = %dataset_path.display(),
        seed = config.training.seed,
        test_size = config.training.test_size,
        trees = config.training.forest.n_estimators,
        "Starting training run"
    );

    let started = Instant::now();
    let store = ArtifactStore::from_config(&config.storage);
    let outcome = Trainer::new(config.training.clone())
        .run(&dataset_path, &store)
        .with_context(|| format!("Training on {} failed", dataset_path.display()))?;

    let report = &outcome.report;
    info!(
        accuracy = report.accuracy,
        precision = report.precision,
        recall = report.recall,
        f1 = report.f1,
        auc = report.auc,
        tn = report.confusion_matrix.true_negatives,
        fp = report.confusion_matrix.false_positives,
        fn_ = report.confusion_matrix.false_negatives,
        tp = report.confusion_matrix.true_positives,
        "Hold-out metrics"
    );
    for entry in report.feature_importance.iter().take(5) {
        info!(feature = %entry.feature, importance = entry.importance, "Top feature");
    }
    info!(
        model = %store.model_path().display(),
        metrics = %store.metrics_path().display(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Training complete"
    );

    Ok(())
}
