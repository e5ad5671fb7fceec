//! Binary probabilistic classifier interface

use crate::features::FeatureVector;
use crate::types::verdict::Label;

/// A fitted binary classifier over transformed feature vectors.
///
/// `predict` is always derived from `predict_proba`, so a label never
/// disagrees with its probability at the stated threshold.
pub trait Classifier: Send + Sync {
    /// Probability of the fraudulent class, in [0, 1]
    fn predict_proba(&self, features: &FeatureVector) -> f64;

    fn predict(&self, features: &FeatureVector, threshold: f64) -> Label {
        Label::from_probability(self.predict_proba(features), threshold)
    }

    /// Per-field importance in contract order, summing to 1.0
    fn feature_importances(&self) -> Vec<f64>;

    /// Model family name reported alongside scores
    fn name(&self) -> &str;
}
