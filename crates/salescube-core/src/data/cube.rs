//! OLAP cube construction
//!
//! A cube is a DataFrame with one row per distinct combination of dimension
//! values. Each row carries the requested measures and the list of sale
//! identifiers that contributed to it.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::dataframe::DataFrame;
use super::error::{DataError, DataResult};
use super::grouped::{AggOp, AggSpec, GroupedDataFrame};
use super::naming;

/// Name of the traceability column appended to every cube
pub const TRACE_COLUMN: &str = "sale_ids";

/// Default identifier column collected into [`TRACE_COLUMN`]
pub const DEFAULT_ID_COLUMN: &str = "sale_id";

/// One aggregate function or an ordered list of them
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggFuncs {
    One(AggOp),
    Many(Vec<AggOp>),
}

impl AggFuncs {
    #[must_use]
    pub fn ops(&self) -> &[AggOp] {
        match self {
            AggFuncs::One(op) => std::slice::from_ref(op),
            AggFuncs::Many(ops) => ops,
        }
    }
}

impl From<AggOp> for AggFuncs {
    fn from(op: AggOp) -> Self {
        AggFuncs::One(op)
    }
}

impl From<Vec<AggOp>> for AggFuncs {
    fn from(ops: Vec<AggOp>) -> Self {
        AggFuncs::Many(ops)
    }
}

/// Aggregates to compute over one source column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub column: String,
    pub functions: AggFuncs,
}

impl MetricSpec {
    #[must_use]
    pub fn new(column: impl Into<String>, functions: impl Into<AggFuncs>) -> Self {
        Self {
            column: column.into(),
            functions: functions.into(),
        }
    }
}

/// Measures of the standard sales cube: revenue sum and mean, sale count
#[must_use]
pub fn default_metrics() -> Vec<MetricSpec> {
    vec![
        MetricSpec::new("sale_amount", vec![AggOp::Sum, AggOp::Mean]),
        MetricSpec::new(DEFAULT_ID_COLUMN, AggOp::Count),
    ]
}

/// A built cube
#[derive(Clone)]
pub struct Cube {
    frame: Arc<DataFrame>,
    dimensions: Vec<String>,
    measures: Vec<String>,
}

impl Cube {
    /// The cube as a table
    #[must_use]
    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    #[must_use]
    pub fn into_frame(self) -> DataFrame {
        Arc::unwrap_or_clone(self.frame)
    }

    #[must_use]
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    #[must_use]
    pub fn measure_names(&self) -> &[String] {
        &self.measures
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.frame.num_rows()
    }
}

impl fmt::Debug for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cube")
            .field("dimensions", &self.dimensions)
            .field("measures", &self.measures)
            .field("row_count", &self.row_count())
            .finish()
    }
}

impl fmt::Display for Cube {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Cube [{} dims x {} measures x {} rows]>",
            self.dimensions.len(),
            self.measures.len(),
            self.row_count()
        )
    }
}

impl PartialEq for Cube {
    fn eq(&self, other: &Self) -> bool {
        self.dimensions == other.dimensions
            && self.measures == other.measures
            && self.frame.batches() == other.frame.batches()
    }
}

/// Builder for cubes
///
/// ```ignore
/// let cube = CubeBuilder::new(["Year", "region"])
///     .metric("sale_amount", vec![AggOp::Sum, AggOp::Mean])
///     .metric("sale_id", AggOp::Count)
///     .build(&facts)?;
/// ```
#[derive(Debug, Clone)]
pub struct CubeBuilder {
    dimensions: Vec<String>,
    metrics: Vec<MetricSpec>,
    id_column: String,
}

impl CubeBuilder {
    /// Start a cube over the given dimensions, in grouping order
    pub fn new<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: Vec::new(),
            id_column: DEFAULT_ID_COLUMN.to_string(),
        }
    }

    /// Add a metric entry
    #[must_use]
    pub fn metric(mut self, column: impl Into<String>, functions: impl Into<AggFuncs>) -> Self {
        self.metrics.push(MetricSpec::new(column, functions));
        self
    }

    /// Add several metric entries, keeping their order
    #[must_use]
    pub fn metrics(mut self, metrics: impl IntoIterator<Item = MetricSpec>) -> Self {
        self.metrics.extend(metrics);
        self
    }

    /// Column whose values are collected into the traceability list
    #[must_use]
    pub fn trace_ids(mut self, column: impl Into<String>) -> Self {
        self.id_column = column.into();
        self
    }

    /// Output column names the built cube will have, traceability included
    #[must_use]
    pub fn output_columns(&self) -> Vec<String> {
        let mut names = naming::column_names(&self.dimensions, &self.metrics);
        names.push(TRACE_COLUMN.to_string());
        names
    }

    /// Group `facts` and compute every metric
    ///
    /// # Errors
    /// Fails without a partial result when a dimension, metric or id
    /// column is missing, a dimension cannot be a group key, a numeric
    /// function targets a non-numeric column, or two metrics produce the
    /// same column name.
    pub fn build(&self, facts: &DataFrame) -> DataResult<Cube> {
        for name in self.dimensions.iter().chain(std::iter::once(&self.id_column)) {
            if !facts.has_column(name) {
                return Err(DataError::ColumnNotFound(name.clone()));
            }
        }

        let names = self.output_columns();
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(DataError::SchemaMismatch(format!(
                    "cube column '{name}' would be produced twice"
                )));
            }
        }

        let measures: Vec<String> = names[self.dimensions.len()..names.len() - 1].to_vec();
        let mut specs: Vec<AggSpec> = Vec::with_capacity(measures.len() + 1);
        let mut measure_names = measures.iter();
        for metric in &self.metrics {
            for &op in metric.functions.ops() {
                if let Some(output) = measure_names.next() {
                    specs.push(AggSpec::new(op, metric.column.clone(), output.clone()));
                }
            }
        }
        specs.push(AggSpec::list(&self.id_column, TRACE_COLUMN));

        let grouped = GroupedDataFrame::new(Arc::new(facts.clone()), self.dimensions.clone())?;
        let frame = grouped.aggregate(&specs)?;

        tracing::debug!(
            groups = frame.num_rows(),
            facts = facts.num_rows(),
            "cube aggregated"
        );

        Ok(Cube {
            frame: Arc::new(frame),
            dimensions: self.dimensions.clone(),
            measures,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Series, Value};

    fn facts() -> DataFrame {
        DataFrame::from_series(vec![
            Series::from_ints("sale_id", vec![1, 2, 3, 4]),
            Series::from_ints("Year", vec![2024, 2024, 2024, 2023]),
            Series::from_strings("region", vec!["North", "North", "North", "South"]),
            Series::from_strings("product_name", vec!["A", "B", "A", "A"]),
            Series::from_floats("sale_amount", vec![10.0, 30.0, 5.0, 7.5]),
        ])
        .unwrap()
    }

    fn standard_builder() -> CubeBuilder {
        CubeBuilder::new(["Year", "region", "product_name"]).metrics(default_metrics())
    }

    #[test]
    fn test_cube_layout() {
        let cube = standard_builder().build(&facts()).unwrap();

        assert_eq!(
            cube.frame().columns(),
            vec![
                "Year",
                "region",
                "product_name",
                "sale_amount_sum",
                "sale_amount_mean",
                "sale_id_count",
                "sale_ids"
            ]
        );
        assert_eq!(
            cube.measure_names(),
            &["sale_amount_sum", "sale_amount_mean", "sale_id_count"]
        );
        assert_eq!(cube.row_count(), 3);
    }

    #[test]
    fn test_rows_emitted_in_key_order() {
        let cube = standard_builder().build(&facts()).unwrap();
        let frame = cube.frame();

        // (2023, South, A) precedes the 2024 groups
        assert_eq!(frame.column("Year").unwrap().get(0).unwrap(), Value::Int(2023));
        assert_eq!(
            frame.column("product_name").unwrap().get(1).unwrap(),
            Value::string("A")
        );
        assert_eq!(
            frame.column("sale_amount_sum").unwrap().get(1).unwrap(),
            Value::Float(15.0)
        );
        assert_eq!(
            frame.column(TRACE_COLUMN).unwrap().get(1).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(3)])
        );
    }

    #[test]
    fn test_rebuild_is_identical() {
        let builder = standard_builder();
        let first = builder.build(&facts()).unwrap();
        let second = builder.build(&facts()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_missing_dimension() {
        let err = CubeBuilder::new(["Quarter"])
            .metrics(default_metrics())
            .build(&facts())
            .unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(ref c) if c == "Quarter"));
    }

    #[test]
    fn test_missing_id_column() {
        let err = CubeBuilder::new(["region"])
            .trace_ids("transaction_id")
            .build(&facts())
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_mean_of_text_aborts() {
        let err = CubeBuilder::new(["Year"])
            .metric("region", AggOp::Mean)
            .build(&facts())
            .unwrap_err();
        assert!(matches!(err, DataError::NonNumeric { op: "mean", .. }));
    }

    #[test]
    fn test_duplicate_output_column() {
        let err = CubeBuilder::new(["Year"])
            .metric("sale_amount", AggOp::Sum)
            .metric("sale_amount", AggOp::Sum)
            .build(&facts())
            .unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch(_)));
    }

    #[test]
    fn test_empty_facts() {
        let empty = facts().head(0).unwrap();
        let cube = standard_builder().build(&empty).unwrap();
        assert_eq!(cube.row_count(), 0);
        assert_eq!(cube.frame().num_columns(), 7);
    }

    #[test]
    fn test_agg_funcs_from_toml_shapes() {
        #[derive(Deserialize)]
        struct Doc {
            metrics: Vec<MetricSpec>,
        }
        let doc: Doc = toml::from_str(
            r#"
            [[metrics]]
            column = "sale_amount"
            functions = ["sum", "mean"]

            [[metrics]]
            column = "sale_id"
            functions = "count"
            "#,
        )
        .unwrap();
        assert_eq!(doc.metrics, default_metrics());
    }
}
