//! CART decision tree with Gini impurity

use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::types::verdict::Label;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Fraction of fraudulent training samples that reached this leaf
        probability: f64,
    },
}

/// Fitted tree stored as a flat node arena; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
    /// Normalized mean decrease in impurity per feature
    importances: Vec<f64>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    weighted_impurity: f64,
}

fn gini(n: usize, positives: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = positives as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

impl DecisionTree {
    /// Grow a tree over `samples`, indices into `rows` (duplicates allowed).
    pub fn fit<R: Rng>(
        rows: &[FeatureVector],
        labels: &[Label],
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
    ) -> Self {
        let mut nodes = vec![Node::Leaf { probability: 0.0 }];
        let mut importances = vec![0.0; FEATURE_COUNT];
        let mut pending = vec![(0usize, samples, 0usize)];

        while let Some((slot, samples, depth)) = pending.pop() {
            let n = samples.len();
            let positives = samples.iter().filter(|&&i| labels[i].is_fraud()).count();
            let probability = if n > 0 {
                positives as f64 / n as f64
            } else {
                0.0
            };

            let can_split = positives > 0
                && positives < n
                && n >= params.min_samples_split.max(2)
                && params.max_depth.map_or(true, |max| depth < max);

            let split = if can_split {
                Self::best_split(rows, labels, &samples, positives, params, rng)
            } else {
                None
            };

            let Some(split) = split else {
                nodes[slot] = Node::Leaf { probability };
                continue;
            };

            importances[split.feature] += n as f64 * gini(n, positives) - split.weighted_impurity;

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&i| rows[i].values()[split.feature] <= split.threshold);

            let left = nodes.len();
            nodes.push(Node::Leaf { probability: 0.0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { probability: 0.0 });

            nodes[slot] = Node::Split {
                feature: split.feature,
                threshold: split.threshold,
                left,
                right,
            };
            pending.push((right, right_samples, depth + 1));
            pending.push((left, left_samples, depth + 1));
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for importance in importances.iter_mut() {
                *importance /= total;
            }
        }

        Self { nodes, importances }
    }

    /// Lowest weighted child impurity over randomly ordered features, stopping
    /// once `max_features` non-constant features were examined.
    fn best_split<R: Rng>(
        rows: &[FeatureVector],
        labels: &[Label],
        samples: &[usize],
        positives: usize,
        params: &TreeParams,
        rng: &mut R,
    ) -> Option<Candidate> {
        let n = samples.len();
        let min_leaf = params.min_samples_leaf.max(1);
        let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
        features.shuffle(rng);

        let mut best: Option<Candidate> = None;
        let mut visited = 0;
        let mut column: Vec<(f64, bool)> = Vec::with_capacity(n);

        for feature in features {
            if visited >= params.max_features {
                break;
            }

            column.clear();
            column.extend(
                samples
                    .iter()
                    .map(|&i| (rows[i].values()[feature], labels[i].is_fraud())),
            );
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            if column[0].0 == column[n - 1].0 {
                continue;
            }
            visited += 1;

            let mut left_positives = 0;
            for i in 0..n - 1 {
                if column[i].1 {
                    left_positives += 1;
                }
                let (value, next) = (column[i].0, column[i + 1].0);
                if value == next {
                    continue;
                }

                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }

                let weighted = left_n as f64 * gini(left_n, left_positives)
                    + right_n as f64 * gini(right_n, positives - left_positives);

                if best
                    .as_ref()
                    .map_or(true, |b| weighted < b.weighted_impurity)
                {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(Candidate {
                        feature,
                        threshold,
                        weighted_impurity: weighted,
                    });
                }
            }
        }

        best
    }

    /// Fraud probability of the leaf `features` lands in
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let values = features.values();
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { probability } => return *probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if values[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((idx, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[idx] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        deepest
    }
}
