//! Type definitions for the fraud scoring pipeline

pub mod report;
pub mod verdict;

pub use report::{ClassBalance, ConfusionMatrix, MetricsReport};
pub use verdict::{BatchSummary, Health, Label, ScoringResult, Verdict};
