//! Key joins between DataFrames

use std::collections::HashMap;

use arrow::array::UInt32Array;
use arrow::compute::take;

use super::dataframe::DataFrame;
use super::error::DataResult;
use super::grouped::{value_to_group_key, GroupKey};
use super::series::Series;

/// Type of join operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// Only rows whose key appears on both sides
    Inner,
    /// Every left row; right columns are null where the key has no match
    Left,
}

impl JoinType {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            JoinType::Inner => "inner",
            JoinType::Left => "left",
        }
    }
}

/// Join specification - describes how to join two DataFrames
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub join_type: JoinType,
    pub left_column: String,
    pub right_column: String,
}

impl JoinSpec {
    /// Inner join on a column present under the same name on both sides
    #[must_use]
    pub fn on(column: &str) -> Self {
        Self::cols(column, column)
    }

    /// Inner join on differently named key columns
    #[must_use]
    pub fn cols(left: &str, right: &str) -> Self {
        Self {
            join_type: JoinType::Inner,
            left_column: left.to_string(),
            right_column: right.to_string(),
        }
    }

    #[must_use]
    pub fn left(column: &str) -> Self {
        Self {
            join_type: JoinType::Left,
            ..Self::on(column)
        }
    }
}

impl DataFrame {
    /// Join this DataFrame with another using the given specification
    ///
    /// Output rows follow left row order; a left row matching several right
    /// rows repeats once per match, in right row order. Null keys never
    /// match. The right key column is dropped when it shares the left key's
    /// name, and other clashing right columns get a `_right` suffix.
    ///
    /// # Errors
    /// Returns error if a key column is missing or cannot act as a key
    pub fn join(&self, other: &DataFrame, spec: &JoinSpec) -> DataResult<DataFrame> {
        let left_key = self.column(&spec.left_column)?;
        let right_key = other.column(&spec.right_column)?;

        let mut right_rows: HashMap<GroupKey, Vec<u32>> = HashMap::new();
        for idx in 0..other.num_rows() {
            let key = value_to_group_key(&right_key.get(idx)?, right_key.name())?;
            if key != GroupKey::Null {
                right_rows.entry(key).or_default().push(idx as u32);
            }
        }

        let mut left_take: Vec<u32> = Vec::new();
        let mut right_take: Vec<Option<u32>> = Vec::new();
        for idx in 0..self.num_rows() {
            let key = value_to_group_key(&left_key.get(idx)?, left_key.name())?;
            match right_rows.get(&key) {
                Some(matches) => {
                    for &right_idx in matches {
                        left_take.push(idx as u32);
                        right_take.push(Some(right_idx));
                    }
                }
                None if spec.join_type == JoinType::Left => {
                    left_take.push(idx as u32);
                    right_take.push(None);
                }
                None => {}
            }
        }

        let left_indices = UInt32Array::from(left_take);
        let right_indices = UInt32Array::from(right_take);

        let mut result_columns: Vec<Series> = Vec::with_capacity(self.num_columns() + other.num_columns());
        for series in self.iter_columns() {
            let series = series?;
            let array = take(series.array().as_ref(), &left_indices, None)?;
            result_columns.push(Series::new(series.name(), array));
        }

        let left_columns = self.columns();
        let shared_key = spec.left_column == spec.right_column;
        for series in other.iter_columns() {
            let series = series?;
            if shared_key && series.name() == spec.right_column {
                continue;
            }
            let output_name = if left_columns.iter().any(|c| c == series.name()) {
                format!("{}_right", series.name())
            } else {
                series.name().to_string()
            };
            let array = take(series.array().as_ref(), &right_indices, None)?;
            result_columns.push(Series::new(output_name, array));
        }

        DataFrame::from_series(result_columns)
    }
}
