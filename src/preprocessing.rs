//! Feature standardization fitted on the training partition

use crate::error::{PipelineError, Result};
use crate::features::{FeatureVector, FEATURE_COUNT};
use serde::{Deserialize, Serialize};

/// Smallest per-field scale; near-constant fields divide by this instead of 0
pub const MIN_SCALE: f64 = 1e-8;

/// A fitted, stateless numeric transform applied identically at train and
/// inference time.
pub trait Preprocessor: Send + Sync {
    fn transform(&self, features: &FeatureVector) -> FeatureVector;

    fn transform_batch(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| self.transform(row)).collect()
    }
}

/// Per-field `(x - mean) / std` with population standard deviation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: [f64; FEATURE_COUNT],
    scale: [f64; FEATURE_COUNT],
}

impl StandardScaler {
    /// Fit per-field mean and scale.
    ///
    /// Must only ever see the training partition.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::Training(
                "cannot fit scaler on an empty partition".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, v) in mean.iter_mut().zip(row.values()) {
                *m += v;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut variance = [0.0; FEATURE_COUNT];
        for row in rows {
            for ((var, v), m) in variance.iter_mut().zip(row.values()).zip(&mean) {
                *var += (v - m).powi(2);
            }
        }

        let mut scale = [0.0; FEATURE_COUNT];
        for (s, var) in scale.iter_mut().zip(&variance) {
            *s = (var / n).sqrt().max(MIN_SCALE);
        }

        Ok(Self { mean, scale })
    }

    pub fn mean(&self) -> &[f64; FEATURE_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; FEATURE_COUNT] {
        &self.scale
    }
}

impl Preprocessor for StandardScaler {
    fn transform(&self, features: &FeatureVector) -> FeatureVector {
        let mut values = [0.0; FEATURE_COUNT];
        for (((out, v), m), s) in values
            .iter_mut()
            .zip(features.values())
            .zip(&self.mean)
            .zip(&self.scale)
        {
            *out = (v - m) / s;
        }
        FeatureVector::from_values(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(first: f64, rest: f64) -> FeatureVector {
        let mut values = [rest; FEATURE_COUNT];
        values[0] = first;
        FeatureVector::from_values(values)
    }

    #[test]
    fn test_fit_mean_and_scale() {
        let rows = vec![row(1.0, 5.0), row(3.0, 5.0)];
        let scaler = StandardScaler::fit(&rows).unwrap();

        assert_eq!(scaler.mean()[0], 2.0);
        assert_eq!(scaler.scale()[0], 1.0);
        // Constant field is floored instead of zero
        assert_eq!(scaler.scale()[1], MIN_SCALE);
    }

    #[test]
    fn test_transform_standardizes() {
        let rows = vec![row(1.0, 5.0), row(3.0, 5.0)];
        let scaler = StandardScaler::fit(&rows).unwrap();

        let out = scaler.transform_batch(&rows);
        assert_eq!(out[0].values()[0], -1.0);
        assert_eq!(out[1].values()[0], 1.0);
        assert_eq!(out[0].values()[1], 0.0);
        assert!(out.iter().all(|r| r.values().iter().all(|v| v.is_finite())));
    }

    #[test]
    fn test_transform_is_deterministic() {
        let rows: Vec<FeatureVector> = (0..20).map(|i| row(i as f64 * 0.37, i as f64)).collect();
        let scaler = StandardScaler::fit(&rows).unwrap();

        let sample = row(4.2, -1.3);
        assert_eq!(scaler.transform(&sample), scaler.transform(&sample));
    }

    #[test]
    fn test_fit_empty_fails() {
        assert!(StandardScaler::fit(&[]).is_err());
    }
}
