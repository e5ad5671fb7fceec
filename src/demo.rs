//! Payment simulation for the demo-facing caller.
//!
//! The trigger override lives here and is applied to a finished
//! [`ScoringResult`]; the fitted pipeline never sees it.

use crate::error::{Result, SchemaError};
use crate::features::{FeatureVector, AMOUNT_INDEX, FEATURE_COUNT, TIME_INDEX};
use crate::scoring::ScoringService;
use crate::types::verdict::{ScoringResult, Verdict};
use chrono::Utc;
use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Seconds in the two-day window covered by the reference dataset
pub const TIME_WINDOW_SECS: i64 = 172_800;

const TRIGGERED_NOTE: &str = "SIMULATION: Suspicious amount detected (Demo Trigger).";
const CONFIRMED_NOTE: &str = "Model detected anomalies matching fraud patterns.";

/// Current wall-clock second folded into the dataset's time window
pub fn window_time() -> f64 {
    Utc::now().timestamp().rem_euclid(TIME_WINDOW_SECS) as f64
}

/// Build a feature vector for a bare payment amount at the current time
pub fn synthesize_features<R: Rng + ?Sized>(
    amount: f64,
    anomalous: bool,
    rng: &mut R,
) -> FeatureVector {
    synthesize_features_at(window_time(), amount, anomalous, rng)
}

/// Build a feature vector with an explicit `Time` value.
///
/// Latent components are drawn from N(0, 1), or from U(-10, 10) when
/// `anomalous` is set so the vector lands far outside the training cloud.
pub fn synthesize_features_at<R: Rng + ?Sized>(
    time: f64,
    amount: f64,
    anomalous: bool,
    rng: &mut R,
) -> FeatureVector {
    let mut values = [0.0; FEATURE_COUNT];
    values[TIME_INDEX] = time;
    values[AMOUNT_INDEX] = amount;

    for value in &mut values[TIME_INDEX + 1..AMOUNT_INDEX] {
        *value = if anomalous {
            rng.gen_range(-10.0..10.0)
        } else {
            rng.sample(StandardNormal)
        };
    }

    FeatureVector::from_values(values)
}

/// Amount-based override used to make live demos visibly flag fraud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoTrigger {
    pub enabled: bool,
    /// Exact amount that always triggers
    pub trigger_amount: f64,
    /// Amounts strictly above this trigger
    pub amount_ceiling: f64,
}

impl Default for DemoTrigger {
    fn default() -> Self {
        Self {
            enabled: true,
            trigger_amount: 9999.0,
            amount_ceiling: 5000.0,
        }
    }
}

impl DemoTrigger {
    pub fn is_triggered(&self, amount: f64) -> bool {
        self.enabled && (amount == self.trigger_amount || amount > self.amount_ceiling)
    }

    /// Post-process a model result for a triggering amount
    pub fn apply<R: Rng + ?Sized>(
        &self,
        amount: f64,
        result: ScoringResult,
        rng: &mut R,
    ) -> ScoringResult {
        if !self.is_triggered(amount) {
            return result;
        }

        if result.is_flagged() {
            return result.with_notes(CONFIRMED_NOTE);
        }

        let mut result = result.with_notes(TRIGGERED_NOTE);
        result.label = Verdict::Flagged;
        result.probability = rng.gen_range(0.85..0.99);
        result
    }
}

/// Score a synthetic payment, then apply the demo trigger
pub fn simulate_payment<R: Rng + ?Sized>(
    service: &ScoringService,
    trigger: &DemoTrigger,
    amount: f64,
    rng: &mut R,
) -> Result<ScoringResult> {
    if !amount.is_finite() {
        return Err(SchemaError::NonFinite {
            field: "amount".to_string(),
            row: None,
        }
        .into());
    }
    if amount <= 0.0 {
        return Err(SchemaError::NonPositive {
            field: "amount".to_string(),
            value: amount,
        }
        .into());
    }

    let triggered = trigger.is_triggered(amount);
    let features = synthesize_features(amount, triggered, rng);
    let result = trigger.apply(amount, service.score(&features)?, rng);

    info!(
        amount,
        triggered,
        label = ?result.label,
        probability = result.probability,
        "Payment simulated"
    );
    Ok(result)
}
