//! Labels and scoring outcomes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ground-truth or predicted class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Label {
    Legitimate,
    Fraudulent,
}

impl Label {
    /// Threshold a fraud probability; `probability >= threshold` is fraudulent.
    pub fn from_probability(probability: f64, threshold: f64) -> Self {
        if probability >= threshold {
            Label::Fraudulent
        } else {
            Label::Legitimate
        }
    }

    pub fn is_fraud(self) -> bool {
        self == Label::Fraudulent
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Label::Legitimate => 0,
            Label::Fraudulent => 1,
        }
    }
}

impl From<Label> for u8 {
    fn from(label: Label) -> u8 {
        label.as_u8()
    }
}

impl TryFrom<u8> for Label {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Label::Legitimate),
            1 => Ok(Label::Fraudulent),
            other => Err(format!("class label must be 0 or 1, got {}", other)),
        }
    }
}

/// Decision presented to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Approved,
    Flagged,
}

impl From<Label> for Verdict {
    fn from(label: Label) -> Self {
        match label {
            Label::Legitimate => Verdict::Approved,
            Label::Fraudulent => Verdict::Flagged,
        }
    }
}

/// Outcome of scoring one transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringResult {
    /// Unique result identifier
    pub score_id: String,

    /// Flagged or approved
    pub label: Verdict,

    /// Fraud probability (0.0 - 1.0)
    pub probability: f64,

    /// Decision threshold the label was derived with
    pub threshold: f64,

    /// Classifier family that produced the probability
    pub model: String,

    /// Human-readable explanation
    pub notes: String,

    /// Wall-clock time spent scoring
    pub processing_time_ms: f64,

    pub scored_at: DateTime<Utc>,
}

impl ScoringResult {
    pub fn new(probability: f64, threshold: f64, model: impl Into<String>) -> Self {
        let label = Verdict::from(Label::from_probability(probability, threshold));
        let notes = match label {
            Verdict::Flagged => "Model flagged this transaction based on feature analysis.",
            Verdict::Approved => "Transaction appears normal.",
        };

        Self {
            score_id: Uuid::new_v4().to_string(),
            label,
            probability,
            threshold,
            model: model.into(),
            notes: notes.to_string(),
            processing_time_ms: 0.0,
            scored_at: Utc::now(),
        }
    }

    pub fn with_processing_time(mut self, elapsed: std::time::Duration) -> Self {
        self.processing_time_ms = elapsed.as_secs_f64() * 1000.0;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    pub fn is_flagged(&self) -> bool {
        self.label == Verdict::Flagged
    }
}

/// Aggregate outcome of scoring a batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_transactions: usize,
    pub fraud_count: usize,
    pub fraud_percentage: f64,
    pub processing_time_ms: f64,
}

impl BatchSummary {
    pub fn from_counts(total: usize, fraud_count: usize, elapsed: std::time::Duration) -> Self {
        let fraud_percentage = if total > 0 {
            fraud_count as f64 / total as f64 * 100.0
        } else {
            0.0
        };

        Self {
            total_transactions: total,
            fraud_count,
            fraud_percentage,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }
}

/// Service readiness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub model_loaded: bool,
    pub data_loaded: bool,
}
