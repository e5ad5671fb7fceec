//! Fraud Scoring Pipeline Library
//!
//! Trains a seeded random forest on labeled card transactions, evaluates it
//! on a stratified hold-out, and serves scoring requests with the exact
//! preprocessing the classifier was fitted with.

pub mod config;
pub mod consumer;
pub mod dataset;
pub mod demo;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod handler;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod producer;
pub mod scoring;
pub mod training;
pub mod types;

#[cfg(test)]
mod fixtures;

pub use config::AppConfig;
pub use consumer::RequestConsumer;
pub use dataset::{Dataset, LabeledExample};
pub use error::{PipelineError, Result, SchemaError};
pub use features::FeatureVector;
pub use handler::RequestHandler;
pub use models::{ArtifactStore, FittedPipeline};
pub use producer::ResultProducer;
pub use scoring::ScoringService;
pub use training::{Trainer, TrainingConfig};
pub use types::{MetricsReport, ScoringResult};
