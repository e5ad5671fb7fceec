//! Seeded synthetic data shared by unit tests

use crate::dataset::{Dataset, LabeledExample};
use crate::demo::{synthesize_features_at, TIME_WINDOW_SECS};
use crate::models::forest::ForestConfig;
use crate::training::TrainingConfig;
use crate::types::verdict::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// `n` rows, every 20th fraudulent with a large amount and scattered
/// latent components. Every value, `Time` included, comes from one seed.
pub fn synthetic_dataset(n: usize) -> Dataset {
    let mut rng = StdRng::seed_from_u64(11);
    let examples = (0..n)
        .map(|i| {
            let fraud = i % 20 == 0;
            let amount = if fraud { 900.0 } else { 40.0 };
            let time = rng.gen_range(0.0..TIME_WINDOW_SECS as f64);
            LabeledExample {
                features: synthesize_features_at(time, amount, fraud, &mut rng),
                label: if fraud {
                    Label::Fraudulent
                } else {
                    Label::Legitimate
                },
            }
        })
        .collect();
    Dataset::new(examples)
}

pub fn quick_config() -> TrainingConfig {
    TrainingConfig {
        forest: ForestConfig {
            n_estimators: 10,
            ..ForestConfig::default()
        },
        ..TrainingConfig::default()
    }
}

#[test]
fn test_synthetic_dataset_is_reproducible() {
    let a = synthetic_dataset(50);
    let b = synthetic_dataset(50);
    assert_eq!(a.examples(), b.examples());
    assert!(a.examples().iter().any(|e| e.features.time() != a.examples()[0].features.time()));
}
