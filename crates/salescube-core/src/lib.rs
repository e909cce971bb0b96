//! Salescube Core - OLAP cubing and ranking over smart-sales facts
//!
//! This crate provides:
//! - Data: Arrow-backed DataFrame, grouping, cube building and ranking
//! - Source: fact tables from a SQLite warehouse or prepared CSV files
//! - Sink: cube and rank artifacts as CSV, Parquet or NDJSON
//! - Render: PNG bar charts and heatmaps of ranked tables
//! - Pipeline: the cube and rank stages with per-stage failure isolation

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Pipeline configuration loaded from `salescube.toml`
pub mod config;

/// Data operations module - DataFrame, Series, cubes and ranking
pub mod data;

/// Stage-level error taxonomy
pub mod error;

/// Stage wiring
pub mod pipeline;

/// Chart rendering
pub mod render;

/// Artifact sinks
pub mod sink;

/// Fact sources
pub mod source;

/// Convenience re-export of the configuration root
pub use config::{ConfigError, PipelineConfig};

/// Convenience re-export of cube and ranking types
pub use data::{Cube, CubeBuilder, DataFrame, MetricSpec, RankPolicy};

/// Convenience re-export of stage errors
pub use error::{PipelineError, PipelineResult};

/// Convenience re-export of the pipeline
pub use pipeline::{Pipeline, RankReport, RunReport};
