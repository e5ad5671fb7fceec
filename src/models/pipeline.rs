//! Fitted preprocessing transform + classifier, persisted as one unit

use crate::error::{PipelineError, Result, SchemaError};
use crate::features::{feature_names, FeatureVector};
use crate::models::classifier::Classifier;
use crate::models::forest::RandomForest;
use crate::preprocessing::{Preprocessor, StandardScaler};
use crate::types::verdict::Label;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Bumped whenever the persisted layout changes
pub const ARTIFACT_VERSION: u32 = 1;

/// Immutable trained pipeline.
///
/// Raw feature vectors go in; the transform and classifier are always applied
/// together, so train/serve skew is impossible through this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPipeline<P = StandardScaler, C = RandomForest> {
    format_version: u32,
    /// Contract the pipeline was trained against
    feature_names: Vec<String>,
    transform: P,
    classifier: C,
    seed: u64,
    trained_at: DateTime<Utc>,
}

impl<P: Preprocessor, C: Classifier> FittedPipeline<P, C> {
    pub fn new(transform: P, classifier: C, seed: u64) -> Self {
        Self {
            format_version: ARTIFACT_VERSION,
            feature_names: feature_names(),
            transform,
            classifier,
            seed,
            trained_at: Utc::now(),
        }
    }

    /// Reject artifacts trained against a different contract or layout
    pub fn check_contract(&self) -> std::result::Result<(), SchemaError> {
        let expected = feature_names();
        if self.format_version != ARTIFACT_VERSION || self.feature_names != expected {
            return Err(SchemaError::FeatureMismatch {
                expected,
                found: self.feature_names.clone(),
            });
        }
        Ok(())
    }

    /// Fraud probability for a raw (untransformed) feature vector
    pub fn predict_proba(&self, features: &FeatureVector) -> Result<f64> {
        let transformed = self.transform.transform(features);
        let probability = self.classifier.predict_proba(&transformed);

        if !probability.is_finite() || !(0.0..=1.0).contains(&probability) {
            return Err(PipelineError::Inference {
                context: format!(
                    "{} produced out-of-range probability {}",
                    self.classifier.name(),
                    probability
                ),
            });
        }
        Ok(probability)
    }

    /// Label and probability at `threshold`
    pub fn predict(&self, features: &FeatureVector, threshold: f64) -> Result<(Label, f64)> {
        let probability = self.predict_proba(features)?;
        Ok((Label::from_probability(probability, threshold), probability))
    }

    pub fn transform(&self) -> &P {
        &self.transform
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    pub fn model_name(&self) -> &str {
        self.classifier.name()
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }
}
