//! Pipeline configuration (`salescube.toml`)
//!
//! Every section is optional; a missing file or section means the defaults
//! of the standard smart-sales layout.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::cube::{default_metrics, CubeBuilder, MetricSpec};
use crate::data::rank::{standard_policies, RankPolicy};
use crate::sink::ArtifactFormat;

/// Conventional config file name
pub const CONFIG_FILE: &str = "salescube.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to parse config: {0}")]
    Syntax(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("unknown ranking policy '{0}'")]
    UnknownPolicy(String),

    #[error("invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Where facts come from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    #[default]
    Sqlite,
    Csv,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// SQLite data warehouse
    pub warehouse: PathBuf,
    /// Directory receiving the cube artifact
    pub olap_output: PathBuf,
    /// Directory receiving rank artifacts and charts
    pub results: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            warehouse: PathBuf::from("data/dw/smart_sales.db"),
            olap_output: PathBuf::from("data/olap_cubing_outputs"),
            results: PathBuf::from("data/results"),
        }
    }
}

/// Fact source selection and the names of its required columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub sales_csv: Option<PathBuf>,
    /// Joined on `customer_column` to supply the region when set
    pub customers_csv: Option<PathBuf>,
    pub id_column: String,
    pub timestamp_column: String,
    pub amount_column: String,
    pub product_column: String,
    pub region_column: String,
    pub customer_column: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Sqlite,
            sales_csv: None,
            customers_csv: None,
            id_column: "sale_id".to_string(),
            timestamp_column: "sale_date".to_string(),
            amount_column: "sale_amount".to_string(),
            product_column: "product_name".to_string(),
            region_column: "region".to_string(),
            customer_column: "customer_id".to_string(),
        }
    }
}

impl SourceConfig {
    /// Columns every fact table must carry
    #[must_use]
    pub fn required_columns(&self) -> [&str; 5] {
        [
            self.id_column.as_str(),
            self.timestamp_column.as_str(),
            self.amount_column.as_str(),
            self.product_column.as_str(),
            self.region_column.as_str(),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CubeConfig {
    pub dimensions: Vec<String>,
    pub metrics: Vec<MetricSpec>,
    /// Cube artifact file name, extension included
    pub file: String,
}

impl Default for CubeConfig {
    fn default() -> Self {
        Self {
            dimensions: ["Year", "Month", "region", "product_name"]
                .into_iter()
                .map(String::from)
                .collect(),
            metrics: default_metrics(),
            file: "multidimensional_olap_cube.csv".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RankingConfig {
    /// Overrides the window of every standard policy
    pub window: Option<usize>,
    /// Adds `Year` to the region/month partition
    pub year_scoped_month_ranking: bool,
    /// Policy names to run; empty runs all of them
    pub only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub format: ArtifactFormat,
    pub charts: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: ArtifactFormat::Csv,
            charts: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Also append logs to this file
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// The complete salescube.toml
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub paths: PathsConfig,
    pub source: SourceConfig,
    pub cube: CubeConfig,
    pub ranking: RankingConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

impl PipelineConfig {
    /// Load from `path`, or the defaults when no path is given
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::default()),
        }
    }

    /// # Errors
    /// Returns an error if the file cannot be read or parsed
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns an error if the TOML is invalid
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.ranking.window == Some(0) {
            return Err(ConfigError::Invalid {
                key: "ranking.window",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.cube.file.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "cube.file",
                reason: "must not be empty".to_string(),
            });
        }
        self.policies().map(|_| ())
    }

    /// # Errors
    /// Returns an error if serialization fails
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// # Errors
    /// Returns an error if the file cannot be written
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Cube builder for the configured dimensions and metrics
    #[must_use]
    pub fn cube_builder(&self) -> CubeBuilder {
        CubeBuilder::new(self.cube.dimensions.iter().cloned())
            .metrics(self.cube.metrics.iter().cloned())
            .trace_ids(self.source.id_column.clone())
    }

    /// The standard policies with the ranking section applied, in table order
    ///
    /// # Errors
    /// Returns an error if `ranking.only` names an unknown policy or the
    /// window override is zero
    pub fn policies(&self) -> Result<Vec<RankPolicy>, ConfigError> {
        let table = standard_policies(self.ranking.year_scoped_month_ranking);
        for name in &self.ranking.only {
            if !table.iter().any(|p| p.name() == name) {
                return Err(ConfigError::UnknownPolicy(name.clone()));
            }
        }

        table
            .into_iter()
            .filter(|p| self.ranking.only.is_empty() || self.ranking.only.iter().any(|n| n == p.name()))
            .map(|p| match self.ranking.window {
                Some(window) => p.with_window(window).map_err(|e| ConfigError::Invalid {
                    key: "ranking.window",
                    reason: e.to_string(),
                }),
                None => Ok(p),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::AggOp;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.source.kind, SourceKind::Sqlite);
        assert_eq!(config.cube.dimensions, vec!["Year", "Month", "region", "product_name"]);
        assert_eq!(config.cube.file, "multidimensional_olap_cube.csv");
        assert_eq!(config.policies().unwrap().len(), 4);
        assert_eq!(config.output.format, ArtifactFormat::Csv);
    }

    #[test]
    fn test_partial_file() {
        let config = PipelineConfig::parse(
            r#"
            [source]
            kind = "csv"
            sales_csv = "data/prepared/sales_data_prepared.csv"

            [ranking]
            window = 5
            only = ["top_products_by_region_year"]
            "#,
        )
        .unwrap();

        assert_eq!(config.source.kind, SourceKind::Csv);
        assert_eq!(config.source.id_column, "sale_id");
        let policies = config.policies().unwrap();
        assert_eq!(policies.len(), 1);
        assert_eq!(policies[0].window(), 5);
    }

    #[test]
    fn test_round_trip_keeps_metric_order() {
        let mut config = PipelineConfig::default();
        config.cube.metrics = vec![
            MetricSpec::new("sale_id", AggOp::Count),
            MetricSpec::new("sale_amount", vec![AggOp::Max, AggOp::Sum]),
        ];
        config.logging.file = Some(PathBuf::from("logs/project_log.log"));

        let text = config.to_toml_string().unwrap();
        let back = PipelineConfig::parse(&text).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            PipelineConfig::parse("[output]\nformat = \"xlsx\""),
            Err(ConfigError::Syntax(_))
        ));
        assert!(matches!(
            PipelineConfig::parse("[ranking]\nonly = [\"best_ever\"]"),
            Err(ConfigError::UnknownPolicy(_))
        ));
        assert!(matches!(
            PipelineConfig::parse("[ranking]\nwindow = 0"),
            Err(ConfigError::Invalid { key: "ranking.window", .. })
        ));
        assert!(PipelineConfig::parse("[cube]\nmetrics = [{ column = \"x\", functions = \"median\" }]").is_err());
    }

    #[test]
    fn test_file_errors_name_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[paths\n").unwrap();

        let err = PipelineConfig::from_path(&path).unwrap_err();
        assert!(err.to_string().contains(CONFIG_FILE));

        let missing = PipelineConfig::load(Some(&dir.path().join("nope.toml"))).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
