//! Error taxonomy for training, evaluation and scoring

use std::path::PathBuf;
use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Feature-contract violations.
///
/// Every variant names the offending field; `row` is the zero-based data row
/// when the error comes from a multi-row input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("missing required field `{field}`{}", at_row(.row))]
    MissingField { field: String, row: Option<usize> },

    #[error("unexpected field `{field}`{}", at_row(.row))]
    UnexpectedField { field: String, row: Option<usize> },

    #[error("field `{field}` is not numeric (got {value}){}", at_row(.row))]
    NonNumeric {
        field: String,
        value: String,
        row: Option<usize>,
    },

    #[error("field `{field}` is not a finite number{}", at_row(.row))]
    NonFinite { field: String, row: Option<usize> },

    #[error("missing required columns: {}", .columns.join(", "))]
    MissingColumns { columns: Vec<String> },

    #[error("invalid class label `{value}`{}", at_row(.row))]
    InvalidLabel { value: String, row: Option<usize> },

    #[error("feature list mismatch: expected [{}], found [{}]", .expected.join(", "), .found.join(", "))]
    FeatureMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("field `{field}` must be positive (got {value})")]
    NonPositive { field: String, value: f64 },

    #[error("feature vector must be an object keyed by field name{}", at_row(.row))]
    NotAnObject { row: Option<usize> },

    #[error("JSON batch must be an array of feature objects")]
    NotAnArray,
}

fn at_row(row: &Option<usize>) -> String {
    match row {
        Some(row) => format!(" (row {})", row),
        None => String::new(),
    }
}

impl SchemaError {
    /// Attach a row index to a single-record error
    pub fn at(self, index: usize) -> Self {
        let row = Some(index);
        match self {
            SchemaError::MissingField { field, .. } => SchemaError::MissingField { field, row },
            SchemaError::UnexpectedField { field, .. } => {
                SchemaError::UnexpectedField { field, row }
            }
            SchemaError::NonNumeric { field, value, .. } => {
                SchemaError::NonNumeric { field, value, row }
            }
            SchemaError::NonFinite { field, .. } => SchemaError::NonFinite { field, row },
            SchemaError::InvalidLabel { value, .. } => SchemaError::InvalidLabel { value, row },
            SchemaError::NotAnObject { .. } => SchemaError::NotAnObject { row },
            other => other,
        }
    }
}

/// Errors surfaced by the fraud scoring pipeline
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("dataset not found at {}", .path.display())]
    DataNotFound { path: PathBuf },

    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("no fitted pipeline is loaded")]
    ModelUnavailable,

    #[error("metrics report not found at {}; run training first", .path.display())]
    ReportNotFound { path: PathBuf },

    #[error("reference dataset is not loaded")]
    DatasetUnavailable,

    #[error("inference failed: {context}")]
    Inference { context: String },

    #[error("training failed: {0}")]
    Training(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("pipeline artifact could not be encoded or decoded: {0}")]
    Artifact(#[from] bincode::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable machine-readable error kind
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::DataNotFound { .. } => "data_not_found",
            PipelineError::Schema(_) => "schema_error",
            PipelineError::ModelUnavailable => "model_unavailable",
            PipelineError::ReportNotFound { .. } => "not_found",
            PipelineError::DatasetUnavailable => "dataset_unavailable",
            PipelineError::Inference { .. } => "inference_error",
            PipelineError::Training(_) => "training_error",
            PipelineError::Io { .. } => "io_error",
            PipelineError::Artifact(_) => "artifact_error",
            PipelineError::Csv(_) => "csv_error",
            PipelineError::Json(_) => "json_error",
        }
    }

    /// Whether a serving caller should report this as a per-request condition
    /// rather than an internal fault.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            PipelineError::Schema(_)
                | PipelineError::ModelUnavailable
                | PipelineError::ReportNotFound { .. }
                | PipelineError::DatasetUnavailable
                | PipelineError::DataNotFound { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_names_field_and_row() {
        let err = SchemaError::MissingField {
            field: "Amount".to_string(),
            row: None,
        }
        .at(3);

        assert_eq!(err.to_string(), "missing required field `Amount` (row 3)");
    }

    #[test]
    fn test_error_kinds() {
        let err: PipelineError = SchemaError::NotAnObject { row: None }.into();
        assert_eq!(err.kind(), "schema_error");
        assert!(err.is_recoverable());

        let err = PipelineError::Inference {
            context: "non-finite probability".to_string(),
        };
        assert_eq!(err.kind(), "inference_error");
        assert!(!err.is_recoverable());
    }
}
