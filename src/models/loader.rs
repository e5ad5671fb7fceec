//! Pipeline artifact and metrics report storage

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};
use crate::models::pipeline::FittedPipeline;
use crate::types::report::MetricsReport;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Loader and writer for the persisted pipeline and its metrics report.
///
/// Writes go to a temporary file in the destination directory and are renamed
/// into place, so concurrent readers never observe a half-written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_path: PathBuf,
    metrics_path: PathBuf,
}

impl ArtifactStore {
    pub fn new(model_path: impl Into<PathBuf>, metrics_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            metrics_path: metrics_path.into(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(&config.model_path, &config.metrics_path)
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn metrics_path(&self) -> &Path {
        &self.metrics_path
    }

    /// Persist pipeline and report together.
    ///
    /// Both are fully written before either is renamed into place; an encoding
    /// failure leaves the previous artifacts untouched.
    pub fn persist(&self, pipeline: &FittedPipeline, report: &MetricsReport) -> Result<()> {
        let model_tmp = staged(&self.model_path, |writer| {
            bincode::serialize_into(writer, pipeline).map_err(PipelineError::from)
        })?;
        let metrics_tmp = staged(&self.metrics_path, |writer| {
            serde_json::to_writer_pretty(writer, report).map_err(PipelineError::from)
        })?;

        commit(model_tmp, &self.model_path)?;
        commit(metrics_tmp, &self.metrics_path)?;

        info!(
            model = %self.model_path.display(),
            metrics = %self.metrics_path.display(),
            "Pipeline and metrics persisted"
        );
        Ok(())
    }

    /// Load the persisted pipeline; `Ok(None)` when none has been trained
    pub fn load_pipeline(&self) -> Result<Option<FittedPipeline>> {
        if !self.model_path.exists() {
            warn!(path = %self.model_path.display(), "Pipeline artifact not found");
            return Ok(None);
        }

        let file = File::open(&self.model_path).map_err(|e| PipelineError::io(&self.model_path, e))?;
        let pipeline: FittedPipeline = bincode::deserialize_from(BufReader::new(file))?;
        pipeline.check_contract()?;

        info!(
            path = %self.model_path.display(),
            model = %pipeline.model_name(),
            trained_at = %pipeline.trained_at(),
            "Pipeline loaded"
        );
        Ok(Some(pipeline))
    }

    /// Load the persisted metrics report
    pub fn load_report(&self) -> Result<MetricsReport> {
        if !self.metrics_path.exists() {
            return Err(PipelineError::ReportNotFound {
                path: self.metrics_path.clone(),
            });
        }

        let file =
            File::open(&self.metrics_path).map_err(|e| PipelineError::io(&self.metrics_path, e))?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }
}

/// Write into a temp file next to `dest`
fn staged<F>(dest: &Path, write: F) -> Result<NamedTempFile>
where
    F: FnOnce(&mut BufWriter<&File>) -> Result<()>,
{
    let dir = match dest.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;

    let tmp = NamedTempFile::new_in(&dir).map_err(|e| PipelineError::io(&dir, e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        write(&mut writer)?;
        writer.flush().map_err(|e| PipelineError::io(tmp.path(), e))?;
    }
    tmp.as_file()
        .sync_all()
        .map_err(|e| PipelineError::io(tmp.path(), e))?;
    Ok(tmp)
}

fn commit(tmp: NamedTempFile, dest: &Path) -> Result<()> {
    tmp.persist(dest)
        .map_err(|e| PipelineError::io(dest, e.error))?;
    Ok(())
}
