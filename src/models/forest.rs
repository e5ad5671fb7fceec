//! Seeded random forest classifier

use crate::error::{PipelineError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::models::classifier::Classifier;
use crate::models::tree::{DecisionTree, TreeParams};
use crate::types::verdict::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MODEL_NAME: &str = "RandomForestClassifier";

/// Features considered per split
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MaxFeatures {
    #[default]
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Random forest hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestConfig {
    /// Number of trees
    pub n_estimators: usize,
    /// Maximum tree depth (unbounded when absent)
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    /// Draw each tree's training rows with replacement
    pub bootstrap: bool,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 50,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
        }
    }
}

impl ForestConfig {
    /// Fit a forest. Identical inputs and seed give identical trees: each
    /// tree's seed is drawn up front, so parallel growth order is irrelevant.
    pub fn fit(&self, rows: &[FeatureVector], labels: &[Label], seed: u64) -> Result<RandomForest> {
        if rows.is_empty() {
            return Err(PipelineError::Training(
                "cannot fit classifier on an empty partition".to_string(),
            ));
        }
        if rows.len() != labels.len() {
            return Err(PipelineError::Training(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            )));
        }
        if self.n_estimators == 0 {
            return Err(PipelineError::Training(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let params = TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features.resolve(FEATURE_COUNT),
        };

        let mut master = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..self.n_estimators).map(|_| master.gen()).collect();
        let n = rows.len();
        let bootstrap = self.bootstrap;

        let trees: Vec<DecisionTree> = tree_seeds
            .par_iter()
            .map(|&tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let samples: Vec<usize> = if bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                DecisionTree::fit(rows, labels, samples, &params, &mut rng)
            })
            .collect();

        let importances = average_importances(&trees);

        debug!(
            trees = trees.len(),
            nodes = trees.iter().map(DecisionTree::node_count).sum::<usize>(),
            max_features = params.max_features,
            "Random forest fitted"
        );

        Ok(RandomForest { trees, importances })
    }
}

/// Mean of per-tree importances, renormalized; uniform when no tree split
fn average_importances(trees: &[DecisionTree]) -> Vec<f64> {
    let mut importances = vec![0.0; FEATURE_COUNT];
    for tree in trees {
        for (total, v) in importances.iter_mut().zip(tree.feature_importances()) {
            *total += v;
        }
    }

    let sum: f64 = importances.iter().sum();
    if sum > 0.0 {
        importances.iter_mut().for_each(|v| *v /= sum);
    } else {
        importances.fill(1.0 / FEATURE_COUNT as f64);
    }
    importances
}

/// Fitted random forest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn tree_count(&self) -> usize {
        self.trees.len()
    }
}

impl Classifier for RandomForest {
    fn predict_proba(&self, features: &FeatureVector) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        let total: f64 = self.trees.iter().map(|t| t.predict_proba(features)).sum();
        (total / self.trees.len() as f64).clamp(0.0, 1.0)
    }

    fn feature_importances(&self) -> Vec<f64> {
        self.importances.clone()
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::synthesize_features_at;

    fn training_data(seed: u64) -> (Vec<FeatureVector>, Vec<Label>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..200 {
            let fraud = i % 10 == 0;
            rows.push(synthesize_features_at(i as f64, 50.0, fraud, &mut rng));
            labels.push(if fraud {
                Label::Fraudulent
            } else {
                Label::Legitimate
            });
        }
        (rows, labels)
    }

    fn small_config() -> ForestConfig {
        ForestConfig {
            n_estimators: 8,
            ..ForestConfig::default()
        }
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(30), 5);
        assert_eq!(MaxFeatures::Log2.resolve(30), 4);
        assert_eq!(MaxFeatures::All.resolve(30), 30);
        assert_eq!(MaxFeatures::Sqrt.resolve(1), 1);
    }

    #[test]
    fn test_fit_is_seeded() {
        let (rows, labels) = training_data(3);
        let a = small_config().fit(&rows, &labels, 42).unwrap();
        let b = small_config().fit(&rows, &labels, 42).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_probabilities_in_range_and_predict_agrees() {
        let (rows, labels) = training_data(3);
        let forest = small_config().fit(&rows, &labels, 42).unwrap();

        for row in &rows {
            let p = forest.predict_proba(row);
            assert!((0.0..=1.0).contains(&p));
            for threshold in [0.1, 0.5, 0.9] {
                assert_eq!(forest.predict(row, threshold).is_fraud(), p >= threshold);
            }
        }
    }

    #[test]
    fn test_importances_sum_to_one() {
        let (rows, labels) = training_data(3);
        let forest = small_config().fit(&rows, &labels, 42).unwrap();

        let importances = forest.feature_importances();
        assert_eq!(importances.len(), FEATURE_COUNT);
        assert!((importances.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_single_class_gives_uniform_importances() {
        let (rows, _) = training_data(3);
        let labels = vec![Label::Legitimate; rows.len()];
        let forest = small_config().fit(&rows, &labels, 42).unwrap();

        assert_eq!(forest.predict_proba(&rows[0]), 0.0);
        let importances = forest.feature_importances();
        assert!(importances
            .iter()
            .all(|&v| (v - 1.0 / FEATURE_COUNT as f64).abs() < 1e-12));
    }

    #[test]
    fn test_fit_rejects_bad_input() {
        assert!(small_config().fit(&[], &[], 1).is_err());

        let (rows, labels) = training_data(3);
        assert!(small_config().fit(&rows, &labels[1..], 1).is_err());
    }
}
