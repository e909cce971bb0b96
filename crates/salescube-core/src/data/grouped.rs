//! GroupedDataFrame: A DataFrame partitioned by key columns for aggregation

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use arrow::datatypes::{DataType, Field, Schema};
use serde::{Deserialize, Serialize};

use super::dataframe::DataFrame;
use super::error::{DataError, DataResult};
use super::series::Series;
use super::value::Value;

/// Aggregation operation type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggOp {
    /// Sum of values
    Sum,
    /// Mean/average of values
    Mean,
    /// Count of non-null values
    Count,
    /// Minimum value
    Min,
    /// Maximum value
    Max,
    /// Every value of the group, in source row order
    List,
}

impl AggOp {
    /// Get the operation name
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AggOp::Sum => "sum",
            AggOp::Mean => "mean",
            AggOp::Count => "count",
            AggOp::Min => "min",
            AggOp::Max => "max",
            AggOp::List => "list",
        }
    }

    /// Whether the operation only makes sense over numbers
    #[must_use]
    pub fn requires_numeric(&self) -> bool {
        matches!(self, AggOp::Sum | AggOp::Mean | AggOp::Min | AggOp::Max)
    }
}

impl fmt::Display for AggOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggOp {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(AggOp::Sum),
            "mean" | "avg" => Ok(AggOp::Mean),
            "count" => Ok(AggOp::Count),
            "min" => Ok(AggOp::Min),
            "max" => Ok(AggOp::Max),
            "list" => Ok(AggOp::List),
            other => Err(DataError::InvalidOperation(format!(
                "unknown aggregate function '{other}'"
            ))),
        }
    }
}

/// Aggregation specification - describes one aggregation to perform
#[derive(Debug, Clone, PartialEq)]
pub struct AggSpec {
    /// The aggregation operation
    pub op: AggOp,
    /// The source column name
    pub column: String,
    /// The output column name
    pub output_name: String,
}

impl AggSpec {
    #[must_use]
    pub fn new(op: AggOp, column: impl Into<String>, output_name: impl Into<String>) -> Self {
        Self {
            op,
            column: column.into(),
            output_name: output_name.into(),
        }
    }

    #[must_use]
    pub fn sum(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::Sum, column, output_name)
    }

    #[must_use]
    pub fn mean(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::Mean, column, output_name)
    }

    /// Count of non-null values in `column`
    #[must_use]
    pub fn count(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::Count, column, output_name)
    }

    #[must_use]
    pub fn min(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::Min, column, output_name)
    }

    #[must_use]
    pub fn max(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::Max, column, output_name)
    }

    /// Collect the column's values per group into a list cell
    #[must_use]
    pub fn list(column: &str, output_name: &str) -> Self {
        Self::new(AggOp::List, column, output_name)
    }
}

/// A value that can be used as a group key
///
/// The derived ordering puts `Null` before every other key, so a null
/// dimension value forms its own group at the front.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GroupKey {
    Null,
    Bool(bool),
    Int(i64),
    /// Float bits remapped so integer order is numeric order
    Float(i64),
    String(String),
}

impl GroupKey {
    #[must_use]
    pub fn to_value(&self) -> Value {
        match self {
            GroupKey::Null => Value::Null,
            GroupKey::Bool(b) => Value::Bool(*b),
            GroupKey::Int(i) => Value::Int(*i),
            GroupKey::Float(bits) => Value::Float(f64::from_bits(total_order(*bits) as u64)),
            GroupKey::String(s) => Value::string(s.clone()),
        }
    }

    /// Key for a float; `-0.0` groups with `0.0` and NaN groups with nulls
    #[must_use]
    pub fn float(value: f64) -> Self {
        if value.is_nan() {
            return GroupKey::Null;
        }
        let value = if value == 0.0 { 0.0 } else { value };
        GroupKey::Float(total_order(value.to_bits() as i64))
    }
}

/// Flips the magnitude bits of negative floats; its own inverse
fn total_order(bits: i64) -> i64 {
    bits ^ (((bits >> 63) as u64) >> 1) as i64
}

fn is_groupable_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Null
            | DataType::Boolean
            | DataType::Int32
            | DataType::Int64
            | DataType::Float64
            | DataType::Utf8
            | DataType::LargeUtf8
    )
}

/// A grouped DataFrame - the result of partitioning a DataFrame by key columns
///
/// Groups are held in key order, so every aggregate comes out sorted by
/// the group columns regardless of input row order.
#[derive(Clone)]
pub struct GroupedDataFrame {
    source: Arc<DataFrame>,
    group_columns: Vec<String>,
    /// Group key to the source rows belonging to it, in row order
    groups: BTreeMap<Vec<GroupKey>, Vec<usize>>,
}

impl GroupedDataFrame {
    /// Partition `source` by `group_columns`
    ///
    /// # Errors
    /// Returns error if a group column is missing or has a type that
    /// cannot act as a key (lists)
    pub fn new(source: Arc<DataFrame>, group_columns: Vec<String>) -> DataResult<Self> {
        let group_series: Vec<Series> = group_columns
            .iter()
            .map(|name| source.column(name))
            .collect::<DataResult<Vec<_>>>()?;

        for series in &group_series {
            if !is_groupable_type(series.data_type()) {
                return Err(DataError::UngroupableColumn {
                    column: series.name().to_string(),
                    found: format!("{:?}", series.data_type()),
                });
            }
        }

        let groups = Self::build_groups(source.num_rows(), &group_series)?;

        Ok(Self {
            source,
            group_columns,
            groups,
        })
    }

    fn build_groups(
        num_rows: usize,
        group_series: &[Series],
    ) -> DataResult<BTreeMap<Vec<GroupKey>, Vec<usize>>> {
        let mut groups: BTreeMap<Vec<GroupKey>, Vec<usize>> = BTreeMap::new();

        for row_idx in 0..num_rows {
            let key = group_series
                .iter()
                .map(|series| value_to_group_key(&series.get(row_idx)?, series.name()))
                .collect::<DataResult<Vec<_>>>()?;
            groups.entry(key).or_default().push(row_idx);
        }

        Ok(groups)
    }

    #[must_use]
    pub fn source(&self) -> &Arc<DataFrame> {
        &self.source
    }

    #[must_use]
    pub fn group_columns(&self) -> &[String] {
        &self.group_columns
    }

    #[must_use]
    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Apply aggregations and return one row per group
    ///
    /// Columns are the group columns followed by one column per spec, in
    /// the order given.
    ///
    /// # Errors
    /// Returns error if a spec names a missing column, or a numeric
    /// operation targets a non-numeric column. Both are checked before any
    /// group is computed.
    pub fn aggregate(&self, specs: &[AggSpec]) -> DataResult<DataFrame> {
        let sources = self.validate(specs)?;

        if self.groups.is_empty() {
            return self.empty_aggregate_result(specs, &sources);
        }

        let mut result_columns: Vec<Series> = Vec::with_capacity(self.group_columns.len() + specs.len());

        for (col_idx, col_name) in self.group_columns.iter().enumerate() {
            let values: Vec<Value> = self.groups.keys().map(|key| key[col_idx].to_value()).collect();
            if values.iter().all(Value::is_null) {
                // keep the source's type when every key is null
                let dtype = self.source.column(col_name)?.data_type().clone();
                result_columns.push(Series::new(
                    col_name,
                    arrow::array::new_null_array(&dtype, values.len()),
                ));
            } else {
                result_columns.push(Series::from_values(col_name, &values)?);
            }
        }

        for (spec, column) in specs.iter().zip(&sources) {
            let values = self
                .groups
                .values()
                .map(|rows| {
                    let mut acc = Accumulator::new(spec.op);
                    for &row in rows {
                        acc.push(column.get(row)?);
                    }
                    Ok(acc.finish())
                })
                .collect::<DataResult<Vec<Value>>>()?;

            let series = if values.iter().all(Value::is_null) {
                Series::new(
                    &spec.output_name,
                    arrow::array::new_null_array(&output_type(spec.op, column.data_type()), values.len()),
                )
            } else {
                Series::from_values(&spec.output_name, &values)?
            };
            result_columns.push(series);
        }

        DataFrame::from_series(result_columns)
    }

    fn validate(&self, specs: &[AggSpec]) -> DataResult<Vec<Series>> {
        specs
            .iter()
            .map(|spec| {
                let column = self.source.column(&spec.column)?;
                if spec.op.requires_numeric() && !column.is_numeric() {
                    return Err(DataError::NonNumeric {
                        op: spec.op.name(),
                        column: spec.column.clone(),
                        found: format!("{:?}", column.data_type()),
                    });
                }
                Ok(column)
            })
            .collect()
    }

    /// Zero-row result that still carries the full output schema
    fn empty_aggregate_result(&self, specs: &[AggSpec], sources: &[Series]) -> DataResult<DataFrame> {
        let mut fields = Vec::with_capacity(self.group_columns.len() + specs.len());

        for col_name in &self.group_columns {
            let dtype = self.source.column(col_name)?.data_type().clone();
            fields.push(Field::new(col_name, dtype, true));
        }

        for (spec, column) in specs.iter().zip(sources) {
            fields.push(Field::new(
                &spec.output_name,
                output_type(spec.op, column.data_type()),
                true,
            ));
        }

        Ok(DataFrame::empty(Arc::new(Schema::new(fields))))
    }
}

/// Arrow type an aggregate produces from a source column of `input` type
fn output_type(op: AggOp, input: &DataType) -> DataType {
    let integral = matches!(input, DataType::Int32 | DataType::Int64);
    match op {
        AggOp::Count => DataType::Int64,
        AggOp::Mean => DataType::Float64,
        AggOp::Sum | AggOp::Min | AggOp::Max if integral => DataType::Int64,
        AggOp::Sum | AggOp::Min | AggOp::Max => DataType::Float64,
        AggOp::List => {
            let item = match input {
                DataType::Int32 | DataType::Int64 => DataType::Int64,
                DataType::Float64 => DataType::Float64,
                DataType::Boolean => DataType::Boolean,
                _ => DataType::Utf8,
            };
            DataType::List(Arc::new(Field::new("item", item, true)))
        }
    }
}

/// Running state of one aggregate over one group
///
/// Nulls are skipped by every operation except `List`, which keeps them.
enum Accumulator {
    Sum { int: i64, float: f64, is_float: bool, seen: bool },
    Mean { total: f64, count: usize },
    Count(i64),
    Min(Option<Value>),
    Max(Option<Value>),
    List(Vec<Value>),
}

impl Accumulator {
    fn new(op: AggOp) -> Self {
        match op {
            AggOp::Sum => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
                seen: false,
            },
            AggOp::Mean => Accumulator::Mean { total: 0.0, count: 0 },
            AggOp::Count => Accumulator::Count(0),
            AggOp::Min => Accumulator::Min(None),
            AggOp::Max => Accumulator::Max(None),
            AggOp::List => Accumulator::List(Vec::new()),
        }
    }

    fn push(&mut self, value: Value) {
        if let Accumulator::List(items) = self {
            items.push(value);
            return;
        }
        if value.is_null() {
            return;
        }

        match self {
            Accumulator::Sum {
                int,
                float,
                is_float,
                seen,
            } => {
                *seen = true;
                match value {
                    Value::Int(i) if !*is_float => match int.checked_add(i) {
                        Some(total) => *int = total,
                        None => {
                            *float = *int as f64 + i as f64;
                            *is_float = true;
                        }
                    },
                    other => {
                        if !*is_float {
                            *float = *int as f64;
                            *is_float = true;
                        }
                        *float += other.as_f64().unwrap_or(0.0);
                    }
                }
            }
            Accumulator::Mean { total, count } => {
                if let Some(x) = value.as_f64() {
                    *total += x;
                    *count += 1;
                }
            }
            Accumulator::Count(n) => *n += 1,
            Accumulator::Min(best) => {
                if best.as_ref().map_or(true, |b| less_than(&value, b)) {
                    *best = Some(value);
                }
            }
            Accumulator::Max(best) => {
                if best.as_ref().map_or(true, |b| less_than(b, &value)) {
                    *best = Some(value);
                }
            }
            Accumulator::List(_) => {}
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Sum { seen: false, .. } => Value::Null,
            Accumulator::Sum {
                float,
                is_float: true,
                ..
            } => Value::Float(float),
            Accumulator::Sum { int, .. } => Value::Int(int),
            Accumulator::Mean { count: 0, .. } => Value::Null,
            Accumulator::Mean { total, count } => Value::Float(total / count as f64),
            Accumulator::Count(n) => Value::Int(n),
            Accumulator::Min(best) | Accumulator::Max(best) => best.unwrap_or(Value::Null),
            Accumulator::List(items) => Value::List(items),
        }
    }
}

fn less_than(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Int(x), Value::Int(y)) => x < y,
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x < y,
            _ => false,
        },
    }
}

impl fmt::Debug for GroupedDataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupedDataFrame")
            .field("group_columns", &self.group_columns)
            .field("num_groups", &self.groups.len())
            .field("source_rows", &self.source.num_rows())
            .finish()
    }
}

pub(crate) fn value_to_group_key(value: &Value, column: &str) -> DataResult<GroupKey> {
    match value {
        Value::Null => Ok(GroupKey::Null),
        Value::Bool(b) => Ok(GroupKey::Bool(*b)),
        Value::Int(i) => Ok(GroupKey::Int(*i)),
        Value::Float(f) => Ok(GroupKey::float(*f)),
        Value::String(s) => Ok(GroupKey::String(s.clone())),
        other => Err(DataError::UngroupableColumn {
            column: column.to_string(),
            found: other.type_name().to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sales_data() -> DataFrame {
        let regions =
            Series::from_strings("region", vec!["North", "South", "North", "South", "North"]);
        let amounts = Series::from_ints("amount", vec![100, 200, 150, 250, 175]);
        let ids = Series::from_ints("sale_id", vec![1, 2, 3, 4, 5]);

        DataFrame::from_series(vec![regions, amounts, ids]).unwrap()
    }

    fn grouped(df: DataFrame, by: &[&str]) -> GroupedDataFrame {
        GroupedDataFrame::new(Arc::new(df), by.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_groups_come_out_in_key_order() {
        let result = grouped(sample_sales_data(), &["region"])
            .aggregate(&[AggSpec::sum("amount", "total")])
            .unwrap();

        assert_eq!(result.num_rows(), 2);
        let region = result.column("region").unwrap();
        let total = result.column("total").unwrap();
        assert_eq!(region.get(0).unwrap(), Value::string("North"));
        assert_eq!(total.get(0).unwrap(), Value::Int(425));
        assert_eq!(region.get(1).unwrap(), Value::string("South"));
        assert_eq!(total.get(1).unwrap(), Value::Int(450));
    }

    #[test]
    fn test_mean_count_and_list() {
        let specs = vec![
            AggSpec::mean("amount", "avg"),
            AggSpec::count("sale_id", "n"),
            AggSpec::list("sale_id", "ids"),
        ];
        let result = grouped(sample_sales_data(), &["region"]).aggregate(&specs).unwrap();

        assert_eq!(result.columns(), vec!["region", "avg", "n", "ids"]);
        let avg = result.column("avg").unwrap();
        match avg.get(0).unwrap() {
            Value::Float(m) => assert!((m - 141.666_666).abs() < 0.001),
            other => panic!("expected float, got {other:?}"),
        }
        assert_eq!(result.column("n").unwrap().get(1).unwrap(), Value::Int(2));
        assert_eq!(
            result.column("ids").unwrap().get(0).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(3), Value::Int(5)])
        );
    }

    #[test]
    fn test_nulls_are_skipped() {
        let regions = Series::from_strings("region", vec!["East", "East", "West"]);
        let amounts = Series::from_values(
            "amount",
            &[Value::Float(2.5), Value::Null, Value::Null],
        )
        .unwrap();
        let df = DataFrame::from_series(vec![regions, amounts]).unwrap();

        let result = grouped(df, &["region"])
            .aggregate(&[
                AggSpec::sum("amount", "s"),
                AggSpec::count("amount", "c"),
                AggSpec::max("amount", "m"),
            ])
            .unwrap();

        assert_eq!(result.column("s").unwrap().get(0).unwrap(), Value::Float(2.5));
        assert_eq!(result.column("c").unwrap().get(0).unwrap(), Value::Int(1));
        assert_eq!(result.column("s").unwrap().get(1).unwrap(), Value::Null);
        assert_eq!(result.column("c").unwrap().get(1).unwrap(), Value::Int(0));
        assert_eq!(result.column("m").unwrap().get(1).unwrap(), Value::Null);
    }

    #[test]
    fn test_null_key_sorts_first() {
        let regions = Series::from_optional_strings("region", vec![Some("North"), None]);
        let amounts = Series::from_ints("amount", vec![1, 2]);
        let df = DataFrame::from_series(vec![regions, amounts]).unwrap();

        let result = grouped(df, &["region"])
            .aggregate(&[AggSpec::sum("amount", "s")])
            .unwrap();
        assert!(result.column("region").unwrap().is_null(0));
        assert_eq!(result.column("s").unwrap().get(0).unwrap(), Value::Int(2));
    }

    #[test]
    fn test_sum_of_text_is_rejected() {
        let err = grouped(sample_sales_data(), &["sale_id"])
            .aggregate(&[AggSpec::sum("region", "s")])
            .unwrap_err();
        assert!(matches!(err, DataError::NonNumeric { op: "sum", .. }));
    }

    #[test]
    fn test_float_keys_group_by_value() {
        let df = DataFrame::from_series(vec![
            Series::from_floats("price", vec![2.5, -1.0, 2.5, -0.0, 0.0, -3.5]),
            Series::from_ints("n", vec![1, 1, 1, 1, 1, 1]),
        ])
        .unwrap();
        let grouped = GroupedDataFrame::new(Arc::new(df), vec!["price".to_string()]).unwrap();
        let result = grouped.aggregate(&[AggSpec::count("n", "n_count")]).unwrap();

        assert_eq!(
            result.column("price").unwrap().to_values().unwrap(),
            vec![
                Value::Float(-3.5),
                Value::Float(-1.0),
                Value::Float(0.0),
                Value::Float(2.5)
            ]
        );
        assert_eq!(
            result.column("n_count").unwrap().to_values().unwrap(),
            vec![Value::Int(1), Value::Int(1), Value::Int(2), Value::Int(2)]
        );
    }

    #[test]
    fn test_list_key_is_rejected() {
        let ids = Series::from_values("ids", &[Value::List(vec![Value::Int(1)])]).unwrap();
        let df = DataFrame::from_series(vec![ids]).unwrap();
        let err = GroupedDataFrame::new(Arc::new(df), vec!["ids".to_string()]).unwrap_err();
        assert!(matches!(err, DataError::UngroupableColumn { .. }));
        assert!(err.is_configuration());
    }

    #[test]
    fn test_empty_input_keeps_schema() {
        let df = sample_sales_data().head(0).unwrap();
        let result = grouped(df, &["region"])
            .aggregate(&[AggSpec::sum("amount", "total"), AggSpec::list("sale_id", "ids")])
            .unwrap();

        assert_eq!(result.num_rows(), 0);
        assert_eq!(result.columns(), vec!["region", "total", "ids"]);
        let ids_type = result.schema().field(2).data_type().clone();
        assert!(matches!(ids_type, DataType::List(_)));
    }

    #[test]
    fn test_parse_agg_op() {
        assert_eq!("SUM".parse::<AggOp>().unwrap(), AggOp::Sum);
        assert_eq!("mean".parse::<AggOp>().unwrap(), AggOp::Mean);
        assert!("median".parse::<AggOp>().is_err());
    }
}
