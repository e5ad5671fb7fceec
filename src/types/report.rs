//! Evaluation report data structures.
//!
//! Field names are part of the persisted document format consumed by
//! reporting collaborators.

use serde::{Deserialize, Serialize};

/// Binary confusion matrix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    #[serde(rename = "tn")]
    pub true_negatives: u64,
    #[serde(rename = "fp")]
    pub false_positives: u64,
    #[serde(rename = "fn")]
    pub false_negatives: u64,
    #[serde(rename = "tp")]
    pub true_positives: u64,
}

impl ConfusionMatrix {
    pub fn total(&self) -> u64 {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    /// Positive calls (tp + fp)
    pub fn predicted_positive(&self) -> u64 {
        self.true_positives + self.false_positives
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.true_positives + self.true_negatives, self.total())
    }

    /// tp / (tp + fp), 0 when nothing was called positive
    pub fn precision(&self) -> f64 {
        ratio(self.true_positives, self.predicted_positive())
    }

    /// tp / (tp + fn), 0 when there are no positives
    pub fn recall(&self) -> f64 {
        ratio(self.true_positives, self.true_positives + self.false_negatives)
    }

    pub fn f1(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        }
    }
}

fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Downsampled ROC curve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
}

/// Downsampled precision-recall curve
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrCurve {
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
}

/// Metrics recomputed at one probability cutoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPoint {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    /// False positives (cost of friction)
    pub fp: u64,
    /// False negatives (cost of fraud)
    #[serde(rename = "fn")]
    pub fn_: u64,
    pub tp: u64,
    pub tn: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Dataset-level class balance
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassBalance {
    pub total_transactions: usize,
    pub fraud_count: usize,
    pub fraud_rate: f64,
    pub avg_amount_legit: f64,
    pub avg_amount_fraud: f64,
}

/// Evaluation of one training run on its held-out partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsReport {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub auc: f64,
    pub confusion_matrix: ConfusionMatrix,
    pub roc_curve: RocCurve,
    pub pr_curve: PrCurve,
    pub threshold_analysis: Vec<ThresholdPoint>,
    pub feature_importance: Vec<FeatureImportance>,
    pub eda: ClassBalance,
}

impl MetricsReport {
    /// Every floating value in the report is finite
    pub fn is_finite(&self) -> bool {
        let mut values = vec![
            self.accuracy,
            self.precision,
            self.recall,
            self.f1,
            self.auc,
            self.eda.fraud_rate,
            self.eda.avg_amount_legit,
            self.eda.avg_amount_fraud,
        ];
        values.extend(&self.roc_curve.fpr);
        values.extend(&self.roc_curve.tpr);
        values.extend(&self.pr_curve.precision);
        values.extend(&self.pr_curve.recall);
        for point in &self.threshold_analysis {
            values.extend([point.threshold, point.precision, point.recall]);
        }
        values.extend(self.feature_importance.iter().map(|f| f.importance));

        values.iter().all(|v| v.is_finite())
    }
}
