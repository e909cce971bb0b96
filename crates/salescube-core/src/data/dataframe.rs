//! DataFrame: A columnar data structure backed by Apache Arrow

use std::fmt;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, UInt32Array};
use arrow::compute::{lexsort_to_indices, take, SortColumn, SortOptions};
use arrow::datatypes::{Field, Schema, SchemaRef};

use super::error::{DataError, DataResult};
use super::series::Series;

/// A DataFrame is a two-dimensional, column-oriented data structure
/// backed by Apache Arrow.
#[derive(Clone)]
pub struct DataFrame {
    /// The Arrow schema (column names and types)
    schema: SchemaRef,
    /// The data as Arrow RecordBatches
    batches: Vec<RecordBatch>,
}

impl DataFrame {
    /// Create an empty DataFrame with a schema
    #[must_use]
    pub fn empty(schema: SchemaRef) -> Self {
        Self {
            schema,
            batches: Vec::new(),
        }
    }

    /// Create a DataFrame from a single RecordBatch
    #[must_use]
    pub fn from_batch(batch: RecordBatch) -> Self {
        let schema = batch.schema();
        Self {
            schema,
            batches: vec![batch],
        }
    }

    /// Create a DataFrame from multiple RecordBatches
    ///
    /// # Errors
    /// Returns error if batches have incompatible schemas
    pub fn from_batches(schema: SchemaRef, batches: Vec<RecordBatch>) -> DataResult<Self> {
        for (i, batch) in batches.iter().enumerate() {
            if batch.schema() != schema {
                return Err(DataError::SchemaMismatch(format!(
                    "batch {i} has incompatible schema"
                )));
            }
        }
        Ok(Self { schema, batches })
    }

    /// Create a DataFrame from a vector of Series
    ///
    /// # Errors
    /// Returns error if series have different lengths
    pub fn from_series(columns: Vec<Series>) -> DataResult<Self> {
        if columns.is_empty() {
            return Ok(Self::empty(Arc::new(Schema::empty())));
        }

        let len = columns[0].len();
        for col in &columns {
            if col.len() != len {
                return Err(DataError::SchemaMismatch(format!(
                    "column '{}' has {} rows, expected {}",
                    col.name(),
                    col.len(),
                    len
                )));
            }
        }

        let fields: Vec<Field> = columns
            .iter()
            .map(|s| Field::new(s.name(), s.data_type().clone(), true))
            .collect();
        let schema = Arc::new(Schema::new(fields));

        let arrays: Vec<ArrayRef> = columns.iter().map(|s| s.array().clone()).collect();
        let batch = RecordBatch::try_new(schema.clone(), arrays)?;

        Ok(Self {
            schema,
            batches: vec![batch],
        })
    }

    /// Get the schema
    #[must_use]
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Get column names
    #[must_use]
    pub fn columns(&self) -> Vec<String> {
        self.schema
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }

    /// Check whether a column exists
    #[must_use]
    pub fn has_column(&self, name: &str) -> bool {
        self.schema.index_of(name).is_ok()
    }

    /// Get the number of columns
    #[must_use]
    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    /// Get the number of rows
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Check if the DataFrame is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Get a column by name as a Series
    ///
    /// # Errors
    /// Returns error if column not found
    pub fn column(&self, name: &str) -> DataResult<Series> {
        let idx = self
            .schema
            .index_of(name)
            .map_err(|_| DataError::ColumnNotFound(name.to_string()))?;
        self.column_by_index(idx)
    }

    /// Get a column by index as a Series
    ///
    /// # Errors
    /// Returns error if index is out of bounds
    pub fn column_by_index(&self, index: usize) -> DataResult<Series> {
        if index >= self.num_columns() {
            return Err(DataError::InvalidColumnIndex(index));
        }

        let field = self.schema.field(index);
        let name = field.name().clone();

        if self.batches.is_empty() {
            let array = arrow::array::new_empty_array(field.data_type());
            return Ok(Series::new(name, array));
        }

        if self.batches.len() == 1 {
            return Ok(Series::new(name, self.batches[0].column(index).clone()));
        }

        // Multiple batches - need to concatenate
        let arrays: Vec<_> = self
            .batches
            .iter()
            .map(|b| b.column(index).as_ref())
            .collect();
        let concatenated = arrow::compute::concat(&arrays)?;
        Ok(Series::new(name, concatenated))
    }

    /// Get the first n rows
    ///
    /// # Errors
    /// Returns error if slicing fails
    pub fn head(&self, n: usize) -> DataResult<Self> {
        let take_rows = n.min(self.num_rows());

        if take_rows == 0 {
            return Ok(Self::empty(self.schema.clone()));
        }

        let mut remaining = take_rows;
        let mut new_batches = Vec::new();

        for batch in &self.batches {
            if remaining == 0 {
                break;
            }

            let batch_rows = batch.num_rows();
            if batch_rows <= remaining {
                new_batches.push(batch.clone());
                remaining -= batch_rows;
            } else {
                new_batches.push(batch.slice(0, remaining));
                remaining = 0;
            }
        }

        Ok(Self {
            schema: self.schema.clone(),
            batches: new_batches,
        })
    }

    /// Get the underlying RecordBatches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Iterate over columns, returning each column as a Series
    pub fn iter_columns(&self) -> impl Iterator<Item = DataResult<Series>> + '_ {
        (0..self.num_columns()).map(move |i| self.column_by_index(i))
    }

    /// Select specific columns by name
    ///
    /// # Errors
    /// Returns error if any column is not found
    pub fn select(&self, columns: &[&str]) -> DataResult<Self> {
        let series: Result<Vec<_>, _> = columns.iter().map(|name| self.column(name)).collect();
        DataFrame::from_series(series?)
    }

    /// Add a column, or replace the existing column of the same name in place
    ///
    /// # Errors
    /// Returns error if the series length does not match the row count
    pub fn with_column(&self, series: Series) -> DataResult<Self> {
        if self.num_columns() > 0 && series.len() != self.num_rows() {
            return Err(DataError::SchemaMismatch(format!(
                "column '{}' has {} rows, expected {}",
                series.name(),
                series.len(),
                self.num_rows()
            )));
        }

        let mut replaced = false;
        let mut columns = Vec::with_capacity(self.num_columns() + 1);
        for existing in self.iter_columns() {
            let existing = existing?;
            if existing.name() == series.name() {
                columns.push(series.clone());
                replaced = true;
            } else {
                columns.push(existing);
            }
        }
        if !replaced {
            columns.push(series);
        }

        DataFrame::from_series(columns)
    }

    /// Sort the DataFrame by one or more columns
    ///
    /// Each column carries a descending flag. The sort is stable: rows that
    /// compare equal on every key keep their current relative order. Nulls
    /// sort last in both directions.
    ///
    /// # Errors
    /// Returns error if any column is not found
    pub fn sort_by(&self, columns: &[(&str, bool)]) -> DataResult<Self> {
        for (col_name, _) in columns {
            if !self.has_column(col_name) {
                return Err(DataError::ColumnNotFound((*col_name).to_string()));
            }
        }

        if columns.is_empty() || self.is_empty() {
            return Ok(self.clone());
        }

        let mut sort_columns = Vec::with_capacity(columns.len() + 1);
        for (col_name, descending) in columns {
            let series = self.column(col_name)?;
            sort_columns.push(SortColumn {
                values: series.array().clone(),
                options: Some(SortOptions {
                    descending: *descending,
                    nulls_first: false,
                }),
            });
        }

        // lexsort is unstable; the row position as a final key restores stability
        let positions: Vec<u32> = (0..self.num_rows() as u32).collect();
        sort_columns.push(SortColumn {
            values: Arc::new(UInt32Array::from(positions)),
            options: Some(SortOptions::default()),
        });

        let indices: UInt32Array = lexsort_to_indices(&sort_columns, None)?;
        self.take_indices(&indices)
    }

    /// Take rows at the given positions, in the given order
    ///
    /// # Errors
    /// Returns error if any index is out of bounds
    pub fn take_rows(&self, rows: &[usize]) -> DataResult<Self> {
        let num_rows = self.num_rows();
        if let Some(&bad) = rows.iter().find(|&&idx| idx >= num_rows) {
            return Err(DataError::OutOfBounds {
                index: bad,
                length: num_rows,
            });
        }
        let indices = UInt32Array::from(rows.iter().map(|&r| r as u32).collect::<Vec<_>>());
        self.take_indices(&indices)
    }

    fn take_indices(&self, indices: &UInt32Array) -> DataResult<Self> {
        if indices.is_empty() {
            return Ok(Self::empty(self.schema.clone()));
        }
        let mut arrays = Vec::with_capacity(self.num_columns());
        for series in self.iter_columns() {
            arrays.push(take(series?.array().as_ref(), indices, None)?);
        }
        let batch = RecordBatch::try_new(self.schema.clone(), arrays)?;
        Ok(Self::from_batch(batch))
    }

    /// Pretty print the DataFrame for display
    #[must_use]
    pub fn to_pretty_string(&self, max_rows: usize) -> String {
        use arrow::util::pretty::pretty_format_batches;

        if self.batches.is_empty() {
            return format!("Empty DataFrame with columns: {:?}", self.columns());
        }

        let display_df = match self.head(max_rows) {
            Ok(df) => df,
            Err(_) => return "Error formatting DataFrame".to_string(),
        };

        match pretty_format_batches(&display_df.batches) {
            Ok(table) => {
                let total = self.num_rows();
                if total > max_rows {
                    format!("{table}\n... showing {max_rows} of {total} rows")
                } else {
                    table.to_string()
                }
            }
            Err(e) => format!("Error formatting: {e}"),
        }
    }
}

impl fmt::Debug for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataFrame")
            .field("columns", &self.columns())
            .field("num_rows", &self.num_rows())
            .finish()
    }
}

impl fmt::Display for DataFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_pretty_string(20))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;

    fn sample() -> DataFrame {
        DataFrame::from_series(vec![
            Series::from_strings("region", vec!["North", "South", "North", "East"]),
            Series::from_ints("amount", vec![30, 10, 30, 20]),
            Series::from_ints("id", vec![1, 2, 3, 4]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_series_length_mismatch() {
        let result = DataFrame::from_series(vec![
            Series::from_ints("a", vec![1, 2]),
            Series::from_ints("b", vec![1]),
        ]);
        assert!(matches!(result, Err(DataError::SchemaMismatch(_))));
    }

    #[test]
    fn test_sort_by_is_stable_on_ties() {
        let sorted = sample().sort_by(&[("amount", true)]).unwrap();
        let ids = sorted.column("id").unwrap().to_values().unwrap();
        // ids 1 and 3 tie on amount 30 and keep their input order
        assert_eq!(
            ids,
            vec![Value::Int(1), Value::Int(3), Value::Int(4), Value::Int(2)]
        );
    }

    #[test]
    fn test_sort_by_multiple_keys() {
        let sorted = sample()
            .sort_by(&[("region", false), ("amount", false)])
            .unwrap();
        let regions = sorted.column("region").unwrap().to_values().unwrap();
        assert_eq!(regions[0], Value::string("East"));
        assert_eq!(regions[3], Value::string("South"));
    }

    #[test]
    fn test_sort_by_missing_column() {
        let err = sample().sort_by(&[("revenue", true)]).unwrap_err();
        assert!(matches!(err, DataError::ColumnNotFound(c) if c == "revenue"));
    }

    #[test]
    fn test_take_rows_and_head() {
        let df = sample();
        let taken = df.take_rows(&[3, 0]).unwrap();
        assert_eq!(taken.num_rows(), 2);
        assert_eq!(taken.column("id").unwrap().get(0).unwrap(), Value::Int(4));

        assert!(df.take_rows(&[9]).is_err());
        assert_eq!(df.head(2).unwrap().num_rows(), 2);
        assert_eq!(df.head(10).unwrap().num_rows(), 4);
    }

    #[test]
    fn test_with_column_replaces_in_place() {
        let df = sample()
            .with_column(Series::from_ints("amount", vec![1, 2, 3, 4]))
            .unwrap();
        assert_eq!(df.columns(), vec!["region", "amount", "id"]);
        assert_eq!(df.column("amount").unwrap().get(3).unwrap(), Value::Int(4));

        let df = df.with_column(Series::from_ints("extra", vec![0; 4])).unwrap();
        assert_eq!(df.num_columns(), 4);
    }
}
