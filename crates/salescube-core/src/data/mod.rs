//! Data operations module
//!
//! This module provides:
//! - DataFrame: Apache Arrow-backed columnar data structure
//! - Series: Single column representation
//! - GroupedDataFrame: DataFrame partitioned by key columns for aggregation
//! - Cube: one row per dimension combination with measures and sale ids
//! - Ranking policies: top-N / bottom-N extraction over a cube
//! - Calendar dimensions derived from timestamps
//! - File I/O for Parquet, CSV, and JSON

pub mod calendar;
pub mod cube;
mod dataframe;
mod error;
mod grouped;
pub mod io;
mod join;
pub mod naming;
pub mod rank;
mod series;
mod value;

pub use calendar::derive_calendar;
pub use cube::{default_metrics, AggFuncs, Cube, CubeBuilder, MetricSpec, TRACE_COLUMN};
pub use dataframe::DataFrame;
pub use error::{DataError, DataResult};
pub use grouped::{AggOp, AggSpec, GroupKey, GroupedDataFrame};
pub use io::{read_csv, read_json, read_parquet, write_csv, write_json, write_parquet};
pub use join::{JoinSpec, JoinType};
pub use naming::column_names;
pub use rank::{extract, standard_policies, RankPolicy, SortKey};
pub use series::Series;
pub use value::Value;
