//! Stage-level errors
//!
//! Table operations fail with [`DataError`]; the pipeline classifies those
//! into the stage that could not complete.

use thiserror::Error;

use crate::config::ConfigError;
use crate::data::DataError;

/// Result type for pipeline stages
pub type PipelineResult<T> = Result<T, PipelineError>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Facts could not be loaded, or lack a required column
    #[error("cannot load facts from {origin}: {reason}")]
    Source { origin: String, reason: String },

    /// A named column or setting does not fit the supplied data
    #[error("{stage}: configuration error: {source}")]
    Configuration {
        stage: String,
        #[source]
        source: BoxError,
    },

    /// Aggregate could not be computed over the data
    #[error("cube aggregation failed: {0}")]
    Aggregation(#[source] DataError),

    #[error("cannot write artifact '{artifact}': {source}")]
    Sink {
        artifact: String,
        #[source]
        source: DataError,
    },

    /// Chart could not be drawn; never fatal
    #[error("cannot render chart '{chart}': {reason}")]
    Render { chart: String, reason: String },
}

impl PipelineError {
    /// Classify a table error raised while running `stage`
    ///
    /// Errors naming data that is not there become `Configuration`;
    /// everything else failed while computing and becomes `Aggregation`.
    #[must_use]
    pub fn from_data(stage: impl Into<String>, err: DataError) -> Self {
        if err.is_configuration() {
            PipelineError::Configuration {
                stage: stage.into(),
                source: Box::new(err),
            }
        } else {
            PipelineError::Aggregation(err)
        }
    }

    #[must_use]
    pub fn load_failed(origin: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::Source {
            origin: origin.into(),
            reason: reason.to_string(),
        }
    }

    #[must_use]
    pub fn sink(artifact: impl Into<String>, source: DataError) -> Self {
        PipelineError::Sink {
            artifact: artifact.into(),
            source,
        }
    }

    /// Whether the failure stops the run rather than being logged and skipped
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PipelineError::Render { .. })
    }
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Configuration {
            stage: "config".to_string(),
            source: Box::new(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let missing = PipelineError::from_data("cube", DataError::ColumnNotFound("Year".into()));
        assert!(matches!(missing, PipelineError::Configuration { ref stage, .. } if stage == "cube"));
        assert_eq!(
            missing.to_string(),
            "cube: configuration error: column not found: Year"
        );

        let text_sum = PipelineError::from_data(
            "cube",
            DataError::NonNumeric {
                op: "sum",
                column: "region".into(),
                found: "Utf8".into(),
            },
        );
        assert!(matches!(text_sum, PipelineError::Aggregation(_)));
    }

    #[test]
    fn test_render_is_not_fatal() {
        let err = PipelineError::Render {
            chart: "heatmap".into(),
            reason: "empty table".into(),
        };
        assert!(!err.is_fatal());
        assert!(PipelineError::load_failed("warehouse", "missing").is_fatal());
    }
}
