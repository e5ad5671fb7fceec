//! Held-out evaluation: confusion matrix, curves, threshold sweep and
//! feature importance ranking.
//!
//! All ratios with an empty denominator evaluate to 0 so the report stays
//! finite even when a threshold collapses every prediction onto one class.

use crate::features::{FeatureVector, FEATURE_NAMES};
use crate::models::classifier::Classifier;
use crate::types::report::{
    ClassBalance, ConfusionMatrix, FeatureImportance, MetricsReport, PrCurve, RocCurve,
    ThresholdPoint,
};
use crate::types::verdict::Label;

/// Evaluation settings
#[derive(Debug, Clone)]
pub struct Evaluator {
    /// Cutoff for the headline metrics
    pub threshold: f64,
    /// Upper bound on points kept per curve
    pub max_curve_points: usize,
    /// Number of features kept in the importance ranking
    pub top_features: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            max_curve_points: 100,
            top_features: 10,
        }
    }
}

impl Evaluator {
    /// Evaluate a classifier on an already transformed held-out partition.
    ///
    /// `class_balance` describes the full dataset and is copied into the
    /// report unchanged.
    pub fn evaluate<C: Classifier + ?Sized>(
        &self,
        classifier: &C,
        rows: &[FeatureVector],
        labels: &[Label],
        class_balance: ClassBalance,
    ) -> MetricsReport {
        let scores: Vec<f64> = rows.iter().map(|r| classifier.predict_proba(r)).collect();
        let confusion = confusion_at(labels, &scores, self.threshold);

        let roc = roc_curve(labels, &scores);
        let auc = roc_auc(labels, &roc);
        let (precision_curve, recall_curve) = precision_recall_curve(labels, &scores);

        MetricsReport {
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            auc,
            confusion_matrix: confusion,
            roc_curve: RocCurve {
                fpr: downsample(&roc.fpr, self.max_curve_points),
                tpr: downsample(&roc.tpr, self.max_curve_points),
            },
            pr_curve: PrCurve {
                precision: downsample(&precision_curve, self.max_curve_points),
                recall: downsample(&recall_curve, self.max_curve_points),
            },
            threshold_analysis: threshold_sweep(labels, &scores),
            feature_importance: top_importances(
                &classifier.feature_importances(),
                self.top_features,
            ),
            eda: class_balance,
        }
    }
}

/// Confusion matrix for `score >= threshold` predictions
pub fn confusion_at(labels: &[Label], scores: &[f64], threshold: f64) -> ConfusionMatrix {
    let mut cm = ConfusionMatrix::default();
    for (label, &score) in labels.iter().zip(scores) {
        let predicted = Label::from_probability(score, threshold);
        match (label.is_fraud(), predicted.is_fraud()) {
            (false, false) => cm.true_negatives += 1,
            (false, true) => cm.false_positives += 1,
            (true, false) => cm.false_negatives += 1,
            (true, true) => cm.true_positives += 1,
        }
    }
    cm
}

/// Cutoffs 0.1, 0.2, ..., 0.9
pub fn sweep_thresholds() -> Vec<f64> {
    (1..=9).map(|i| i as f64 / 10.0).collect()
}

/// Precision, recall and confusion counts at every sweep cutoff
pub fn threshold_sweep(labels: &[Label], scores: &[f64]) -> Vec<ThresholdPoint> {
    sweep_thresholds()
        .into_iter()
        .map(|threshold| {
            let cm = confusion_at(labels, scores, threshold);
            ThresholdPoint {
                threshold,
                precision: cm.precision(),
                recall: cm.recall(),
                fp: cm.false_positives,
                fn_: cm.false_negatives,
                tp: cm.true_positives,
                tn: cm.true_negatives,
            }
        })
        .collect()
}

/// Full-resolution ROC curve
#[derive(Debug, Clone, PartialEq)]
pub struct Roc {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
}

/// Cumulative (false positives, true positives) at each distinct score,
/// highest score first.
fn cumulative_counts(labels: &[Label], scores: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut fps = Vec::new();
    let mut tps = Vec::new();
    let (mut fp, mut tp) = (0.0, 0.0);
    for (pos, &i) in order.iter().enumerate() {
        if labels[i].is_fraud() {
            tp += 1.0;
        } else {
            fp += 1.0;
        }
        let last_of_score = order
            .get(pos + 1)
            .map_or(true, |&next| scores[next] != scores[i]);
        if last_of_score {
            fps.push(fp);
            tps.push(tp);
        }
    }
    (fps, tps)
}

fn rate(count: f64, total: f64) -> f64 {
    if total > 0.0 {
        count / total
    } else {
        0.0
    }
}

/// ROC curve starting at (0, 0); rates are 0 for an absent class
pub fn roc_curve(labels: &[Label], scores: &[f64]) -> Roc {
    let (fps, tps) = cumulative_counts(labels, scores);
    let total_fp = fps.last().copied().unwrap_or(0.0);
    let total_tp = tps.last().copied().unwrap_or(0.0);

    let mut fpr = vec![0.0];
    let mut tpr = vec![0.0];
    fpr.extend(fps.iter().map(|&fp| rate(fp, total_fp)));
    tpr.extend(tps.iter().map(|&tp| rate(tp, total_tp)));
    Roc { fpr, tpr }
}

/// Trapezoidal area under the ROC curve; 0.5 when either class is absent
pub fn roc_auc(labels: &[Label], roc: &Roc) -> f64 {
    let positives = labels.iter().filter(|l| l.is_fraud()).count();
    if positives == 0 || positives == labels.len() {
        return 0.5;
    }

    roc.fpr
        .windows(2)
        .zip(roc.tpr.windows(2))
        .map(|(x, y)| (x[1] - x[0]) * (y[1] + y[0]) / 2.0)
        .sum()
}

/// Precision-recall curve ordered by decreasing threshold from full recall,
/// ending at (precision 1, recall 0).
pub fn precision_recall_curve(labels: &[Label], scores: &[f64]) -> (Vec<f64>, Vec<f64>) {
    let (fps, tps) = cumulative_counts(labels, scores);
    let total_tp = tps.last().copied().unwrap_or(0.0);

    // Stop at the first cutoff reaching full recall
    let last = tps
        .iter()
        .position(|&tp| tp == total_tp)
        .unwrap_or(0)
        .min(tps.len().saturating_sub(1));

    let mut precision = Vec::with_capacity(last + 2);
    let mut recall = Vec::with_capacity(last + 2);
    if !tps.is_empty() {
        for i in (0..=last).rev() {
            precision.push(rate(tps[i], tps[i] + fps[i]));
            recall.push(rate(tps[i], total_tp));
        }
    }
    precision.push(1.0);
    recall.push(0.0);
    (precision, recall)
}

/// Every `ceil(len / max_points)`-th point, first point always kept
pub fn downsample(values: &[f64], max_points: usize) -> Vec<f64> {
    let step = values.len().div_ceil(max_points.max(1)).max(1);
    values.iter().step_by(step).copied().collect()
}

/// Top-`n` features by importance, descending; ties keep contract order
pub fn top_importances(importances: &[f64], n: usize) -> Vec<FeatureImportance> {
    let mut ranked: Vec<(usize, f64)> = importances.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    ranked
        .into_iter()
        .take(n)
        .filter_map(|(idx, importance)| {
            FEATURE_NAMES.get(idx).map(|name| FeatureImportance {
                feature: name.to_string(),
                importance,
            })
        })
        .collect()
}
