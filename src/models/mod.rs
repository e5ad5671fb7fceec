//! Classifier, fitted pipeline and artifact storage

pub mod classifier;
pub mod forest;
pub mod loader;
pub mod pipeline;
pub mod tree;

pub use classifier::Classifier;
pub use forest::{ForestConfig, MaxFeatures, RandomForest};
pub use loader::ArtifactStore;
pub use pipeline::FittedPipeline;
