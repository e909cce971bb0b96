//! Top-N / bottom-N extraction over a cube
//!
//! Every ranked report is one [`RankPolicy`] run through [`extract`]: sort the
//! cube stably, then keep the first `window` rows seen for each partition.

use std::collections::HashMap;
use std::fmt;

use super::dataframe::DataFrame;
use super::error::{DataError, DataResult};
use super::grouped::{value_to_group_key, GroupKey};
use super::series::Series;

pub const LOWEST_PRODUCTS_BY_REGION_YEAR: &str = "lowest_products_by_region_year";
pub const TOP_PRODUCTS_BY_REGION_YEAR: &str = "top_products_by_region_year";
pub const TOP_PRODUCTS_BY_REGION_MONTH: &str = "top_products_by_region_month";
pub const TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH: &str =
    "top_volume_products_by_region_year_month";

/// Window used by the standard policies
pub const DEFAULT_WINDOW: usize = 3;

/// One sort key and its direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub column: String,
    pub descending: bool,
}

impl SortKey {
    #[must_use]
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    #[must_use]
    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dir = if self.descending { "desc" } else { "asc" };
        write!(f, "{} {dir}", self.column)
    }
}

/// A (partition, sort keys, window) triple defining one ranked report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankPolicy {
    name: String,
    partition: Vec<String>,
    sort: Vec<SortKey>,
    window: usize,
}

impl RankPolicy {
    /// # Errors
    /// Returns error if `window` is zero
    pub fn new(
        name: impl Into<String>,
        partition: Vec<String>,
        sort: Vec<SortKey>,
        window: usize,
    ) -> DataResult<Self> {
        let name = name.into();
        if window == 0 {
            return Err(DataError::InvalidOperation(format!(
                "ranking policy '{name}' needs a window of at least 1"
            )));
        }
        Ok(Self {
            name,
            partition,
            sort,
            window,
        })
    }

    /// Highest `window` rows by `metric` within each partition
    ///
    /// # Errors
    /// Returns error if `window` is zero
    pub fn top_n(
        name: impl Into<String>,
        partition: &[&str],
        metric: &str,
        window: usize,
    ) -> DataResult<Self> {
        Self::ranked(name, partition, SortKey::desc(metric), window)
    }

    /// Lowest `window` rows by `metric` within each partition
    ///
    /// # Errors
    /// Returns error if `window` is zero
    pub fn bottom_n(
        name: impl Into<String>,
        partition: &[&str],
        metric: &str,
        window: usize,
    ) -> DataResult<Self> {
        Self::ranked(name, partition, SortKey::asc(metric), window)
    }

    fn ranked(
        name: impl Into<String>,
        partition: &[&str],
        metric: SortKey,
        window: usize,
    ) -> DataResult<Self> {
        let partition: Vec<String> = partition.iter().map(|c| (*c).to_string()).collect();
        let mut sort: Vec<SortKey> = partition.iter().map(SortKey::asc).collect();
        sort.push(metric);
        Self::new(name, partition, sort, window)
    }

    /// Same policy with another window
    ///
    /// # Errors
    /// Returns error if `window` is zero
    pub fn with_window(self, window: usize) -> DataResult<Self> {
        Self::new(self.name, self.partition, self.sort, window)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn partition(&self) -> &[String] {
        &self.partition
    }

    #[must_use]
    pub fn sort_keys(&self) -> &[SortKey] {
        &self.sort
    }

    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    /// Every column the policy reads, partition first, without duplicates
    #[must_use]
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = Vec::new();
        for col in self
            .partition
            .iter()
            .chain(self.sort.iter().map(|k| &k.column))
        {
            if !cols.contains(&col.as_str()) {
                cols.push(col);
            }
        }
        cols
    }
}

impl fmt::Display for RankPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sort: Vec<String> = self.sort.iter().map(ToString::to_string).collect();
        write!(
            f,
            "{}: partition [{}], sort [{}], window {}",
            self.name,
            self.partition.join(", "),
            sort.join(", "),
            self.window
        )
    }
}

/// The four standard sales reports
///
/// `year_scoped_month_ranking` adds `Year` to the region/month partition;
/// otherwise same-month rows from different years share one window.
#[must_use]
pub fn standard_policies(year_scoped_month_ranking: bool) -> Vec<RankPolicy> {
    let month_partition: &[&str] = if year_scoped_month_ranking {
        &["Year", "region", "Month"]
    } else {
        &["region", "Month"]
    };

    // DEFAULT_WINDOW is non-zero, so none of these can fail
    [
        RankPolicy::bottom_n(
            LOWEST_PRODUCTS_BY_REGION_YEAR,
            &["Year", "region"],
            "sale_amount_sum",
            DEFAULT_WINDOW,
        ),
        RankPolicy::top_n(
            TOP_PRODUCTS_BY_REGION_YEAR,
            &["Year", "region"],
            "sale_amount_sum",
            DEFAULT_WINDOW,
        ),
        RankPolicy::top_n(
            TOP_PRODUCTS_BY_REGION_MONTH,
            month_partition,
            "sale_amount_sum",
            DEFAULT_WINDOW,
        ),
        RankPolicy::top_n(
            TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH,
            &["Year", "Month", "region"],
            "sale_id_count",
            DEFAULT_WINDOW,
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

/// Run `policy` over `cube`
///
/// The output keeps the cube's columns and the sorted row order. Rows tying
/// on every sort key stay in cube order.
///
/// # Errors
/// Returns `ColumnNotFound` if a partition or sort column is not in the cube,
/// or `UngroupableColumn` for a list partition column
pub fn extract(cube: &DataFrame, policy: &RankPolicy) -> DataResult<DataFrame> {
    for col in policy.required_columns() {
        if !cube.has_column(col) {
            return Err(DataError::ColumnNotFound(col.to_string()));
        }
    }
    for col in &policy.partition {
        let series = cube.column(col)?;
        if series.is_list() {
            return Err(DataError::UngroupableColumn {
                column: col.clone(),
                found: format!("{:?}", series.data_type()),
            });
        }
    }

    let keys: Vec<(&str, bool)> = policy
        .sort
        .iter()
        .map(|k| (k.column.as_str(), k.descending))
        .collect();
    let sorted = cube.sort_by(&keys)?;

    let partition: Vec<Series> = policy
        .partition
        .iter()
        .map(|c| sorted.column(c))
        .collect::<DataResult<_>>()?;

    let mut emitted: HashMap<Vec<GroupKey>, usize> = HashMap::new();
    let mut keep = Vec::new();
    for row in 0..sorted.num_rows() {
        let key = partition
            .iter()
            .map(|s| value_to_group_key(&s.get(row)?, s.name()))
            .collect::<DataResult<Vec<_>>>()?;
        let count = emitted.entry(key).or_insert(0);
        if *count < policy.window {
            *count += 1;
            keep.push(row);
        }
    }

    tracing::debug!(
        policy = policy.name(),
        partitions = emitted.len(),
        rows = keep.len(),
        "policy extracted"
    );

    sorted.take_rows(&keep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn cube() -> DataFrame {
        DataFrame::from_series(vec![
            Series::from_ints("Year", vec![2024, 2024, 2024, 2024, 2024, 2023]),
            Series::from_strings("region", vec!["North"; 6]),
            Series::from_strings("product_name", vec!["A", "B", "C", "D", "E", "A"]),
            Series::from_floats("sale_amount_sum", vec![10.0, 50.0, 30.0, 50.0, 20.0, 99.0]),
            Series::from_ints("sale_id_count", vec![1, 5, 3, 2, 2, 9]),
        ])
        .unwrap()
    }

    fn products(df: &DataFrame) -> Vec<Value> {
        df.column("product_name").unwrap().to_values().unwrap()
    }

    #[test]
    fn test_top_window_and_tie_break() {
        let policy = RankPolicy::top_n("t", &["Year", "region"], "sale_amount_sum", 3).unwrap();
        let out = extract(&cube(), &policy).unwrap();

        // 2023 partition first, then the three highest of 2024 with B before D
        assert_eq!(
            products(&out),
            vec![
                Value::string("A"),
                Value::string("B"),
                Value::string("D"),
                Value::string("C")
            ]
        );
        assert_eq!(out.columns(), cube().columns());
    }

    #[test]
    fn test_bottom_non_decreasing() {
        let policy =
            RankPolicy::bottom_n("b", &["Year", "region"], "sale_amount_sum", 3).unwrap();
        let out = extract(&cube(), &policy).unwrap();
        let sums: Vec<f64> = out
            .column("sale_amount_sum")
            .unwrap()
            .to_values()
            .unwrap()
            .iter()
            .skip(1)
            .filter_map(Value::as_f64)
            .collect();
        assert_eq!(sums, vec![10.0, 20.0, 30.0]);
    }

    #[test]
    fn test_small_partition_keeps_everything() {
        let policy =
            RankPolicy::top_n("t", &["Year", "region"], "sale_amount_sum", 10).unwrap();
        assert_eq!(extract(&cube(), &policy).unwrap().num_rows(), 6);
    }

    #[test]
    fn test_zero_window_rejected() {
        assert!(RankPolicy::top_n("t", &["region"], "sale_amount_sum", 0).is_err());
        let policy = RankPolicy::top_n("t", &["region"], "sale_amount_sum", 1).unwrap();
        assert!(policy.with_window(0).is_err());
    }

    #[test]
    fn test_missing_column() {
        let policy =
            RankPolicy::top_n("t", &["Year", "Month", "region"], "sale_id_count", 3).unwrap();
        let err = extract(&cube(), &policy).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(ref c) if c == "Month"));
    }

    #[test]
    fn test_standard_table() {
        let policies = standard_policies(false);
        let names: Vec<&str> = policies.iter().map(RankPolicy::name).collect();
        assert_eq!(
            names,
            vec![
                LOWEST_PRODUCTS_BY_REGION_YEAR,
                TOP_PRODUCTS_BY_REGION_YEAR,
                TOP_PRODUCTS_BY_REGION_MONTH,
                TOP_VOLUME_PRODUCTS_BY_REGION_YEAR_MONTH
            ]
        );
        assert_eq!(policies[2].partition(), &["region", "Month"]);
        assert_eq!(
            policies[3].sort_keys().last(),
            Some(&SortKey::desc("sale_id_count"))
        );

        let scoped = standard_policies(true);
        assert_eq!(scoped[2].partition(), &["Year", "region", "Month"]);
    }

    fn month_cube() -> DataFrame {
        DataFrame::from_series(vec![
            Series::from_ints("Year", vec![2023, 2023, 2023, 2023, 2024, 2024, 2024, 2024]),
            Series::from_ints("Month", vec![1; 8]),
            Series::from_strings("region", vec!["North"; 8]),
            Series::from_strings("product_name", vec!["A", "B", "C", "D", "A", "B", "C", "D"]),
            Series::from_floats(
                "sale_amount_sum",
                vec![90.0, 80.0, 10.0, 20.0, 85.0, 5.0, 70.0, 15.0],
            ),
        ])
        .unwrap()
    }

    fn month_policy(year_scoped: bool) -> RankPolicy {
        standard_policies(year_scoped)
            .into_iter()
            .find(|p| p.name() == TOP_PRODUCTS_BY_REGION_MONTH)
            .unwrap()
    }

    fn years(df: &DataFrame) -> Vec<Value> {
        df.column("Year").unwrap().to_values().unwrap()
    }

    #[test]
    fn test_region_month_window_spans_years() {
        let out = extract(&month_cube(), &month_policy(false)).unwrap();

        // one (North, 1) window over both years: 90, 85, 80
        assert_eq!(out.num_rows(), 3);
        assert_eq!(
            years(&out),
            vec![Value::Int(2023), Value::Int(2024), Value::Int(2023)]
        );
        assert_eq!(
            products(&out),
            vec![Value::string("A"), Value::string("A"), Value::string("B")]
        );
    }

    #[test]
    fn test_year_scoped_region_month_window() {
        let out = extract(&month_cube(), &month_policy(true)).unwrap();

        assert_eq!(out.num_rows(), 6);
        assert_eq!(
            years(&out),
            vec![
                Value::Int(2023),
                Value::Int(2023),
                Value::Int(2023),
                Value::Int(2024),
                Value::Int(2024),
                Value::Int(2024)
            ]
        );
        assert_eq!(
            products(&out),
            vec![
                Value::string("A"),
                Value::string("B"),
                Value::string("D"),
                Value::string("A"),
                Value::string("C"),
                Value::string("D")
            ]
        );
    }

    #[test]
    fn test_float_and_null_partitions() {
        let cube = DataFrame::from_series(vec![
            Series::from_values(
                "band",
                &[Value::Float(0.5), Value::Null, Value::Float(0.5), Value::Null],
            )
            .unwrap(),
            Series::from_ints("sale_id_count", vec![1, 4, 2, 3]),
        ])
        .unwrap();
        let policy = RankPolicy::top_n("t", &["band"], "sale_id_count", 1).unwrap();
        let out = extract(&cube, &policy).unwrap();

        // nulls sort last and form their own partition
        assert_eq!(
            out.column("sale_id_count").unwrap().to_values().unwrap(),
            vec![Value::Int(2), Value::Int(4)]
        );
    }

    #[test]
    fn test_list_partition_rejected() {
        let ids = Series::from_values("sale_ids", &[Value::List(vec![Value::Int(1)])]).unwrap();
        let cube = DataFrame::from_series(vec![ids, Series::from_ints("sale_id_count", vec![1])])
            .unwrap();
        let policy = RankPolicy::top_n("t", &["sale_ids"], "sale_id_count", 1).unwrap();
        assert!(matches!(
            extract(&cube, &policy),
            Err(DataError::UngroupableColumn { .. })
        ));
    }

    #[test]
    fn test_policy_display() {
        let policy = RankPolicy::top_n("t", &["region"], "sale_amount_sum", 2).unwrap();
        assert_eq!(
            policy.to_string(),
            "t: partition [region], sort [region asc, sale_amount_sum desc], window 2"
        );
    }
}
