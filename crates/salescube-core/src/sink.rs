//! Persisting cube and rank tables

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::{self, DataError, DataFrame, DataResult};
use crate::error::{PipelineError, PipelineResult};

/// On-disk table format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    /// Comma-separated with a header row; list cells become bracketed text
    #[default]
    Csv,
    Parquet,
    /// Newline-delimited JSON
    Json,
}

impl ArtifactFormat {
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactFormat::Csv => "csv",
            ArtifactFormat::Parquet => "parquet",
            ArtifactFormat::Json => "json",
        }
    }

    /// Format implied by a file extension
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArtifactFormat {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ArtifactFormat::Csv),
            "parquet" | "pq" => Ok(ArtifactFormat::Parquet),
            "json" | "ndjson" | "jsonl" => Ok(ArtifactFormat::Json),
            other => Err(DataError::InvalidOperation(format!(
                "unknown artifact format '{other}'"
            ))),
        }
    }
}

/// Destination for named tables
pub trait ArtifactSink: Send + Sync {
    /// Persist `table` under `name` (no extension) and return where it went
    ///
    /// # Errors
    /// Returns `PipelineError::Sink` if the table cannot be written
    fn write(&self, name: &str, table: &DataFrame) -> PipelineResult<PathBuf>;
}

/// Writes each table as one file in a directory
#[derive(Debug, Clone)]
pub struct FileSink {
    dir: PathBuf,
    format: ArtifactFormat,
}

impl FileSink {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>, format: ArtifactFormat) -> Self {
        Self {
            dir: dir.into(),
            format,
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File the table `name` is written to
    #[must_use]
    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{}", self.format.extension()))
    }
}

impl ArtifactSink for FileSink {
    fn write(&self, name: &str, table: &DataFrame) -> PipelineResult<PathBuf> {
        let path = self.path_for(name);
        std::fs::create_dir_all(&self.dir)
            .map_err(|e| PipelineError::sink(name, DataError::from(e)))?;

        match self.format {
            ArtifactFormat::Csv => data::write_csv(table, &path),
            ArtifactFormat::Parquet => data::write_parquet(table, &path),
            ArtifactFormat::Json => data::write_json(table, &path),
        }
        .map_err(|e| PipelineError::sink(name, e))?;

        tracing::info!(artifact = name, rows = table.num_rows(), path = %path.display(), "artifact written");
        Ok(path)
    }
}

/// Read a table written by [`FileSink`], picking the reader from the extension
///
/// # Errors
/// Returns error if the extension is unknown or the file cannot be read
pub fn read_artifact(path: &Path) -> DataResult<DataFrame> {
    match ArtifactFormat::from_path(path) {
        Some(ArtifactFormat::Csv) => data::read_csv(path),
        Some(ArtifactFormat::Parquet) => data::read_parquet(path),
        Some(ArtifactFormat::Json) => data::read_json(path),
        None => Err(DataError::InvalidOperation(format!(
            "cannot tell the format of '{}' from its extension",
            path.display()
        ))),
    }
}
