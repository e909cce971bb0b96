//! Series: A single column of data backed by Arrow arrays

use std::fmt;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float64Array, Int32Array, Int64Array, Int64Builder,
    LargeStringArray, ListArray, ListBuilder, StringArray, StringBuilder,
};
use arrow::compute;
use arrow::datatypes::DataType;

use super::error::{DataError, DataResult};
use super::value::Value;

/// A single column of homogeneous data backed by an Arrow array
#[derive(Clone)]
pub struct Series {
    /// Column name
    name: String,
    /// The underlying Arrow array (reference-counted for zero-copy)
    array: ArrayRef,
}

impl Series {
    /// Create a new Series from an Arrow array
    #[must_use]
    pub fn new(name: impl Into<String>, array: ArrayRef) -> Self {
        Self {
            name: name.into(),
            array,
        }
    }

    /// Create a Series from a vector of integers
    #[must_use]
    pub fn from_ints(name: impl Into<String>, values: Vec<i64>) -> Self {
        let array = Arc::new(Int64Array::from(values)) as ArrayRef;
        Self::new(name, array)
    }

    /// Create a Series from a vector of floats
    #[must_use]
    pub fn from_floats(name: impl Into<String>, values: Vec<f64>) -> Self {
        let array = Arc::new(Float64Array::from(values)) as ArrayRef;
        Self::new(name, array)
    }

    /// Create a Series from a vector of strings
    #[must_use]
    pub fn from_strings(name: impl Into<String>, values: Vec<&str>) -> Self {
        let array = Arc::new(StringArray::from(values)) as ArrayRef;
        Self::new(name, array)
    }

    /// Create a Series from a vector of optional integers
    #[must_use]
    pub fn from_optional_ints(name: impl Into<String>, values: Vec<Option<i64>>) -> Self {
        let array = Arc::new(Int64Array::from(values)) as ArrayRef;
        Self::new(name, array)
    }

    /// Create a Series from a vector of optional strings
    #[must_use]
    pub fn from_optional_strings(name: impl Into<String>, values: Vec<Option<&str>>) -> Self {
        let array = Arc::new(StringArray::from(values)) as ArrayRef;
        Self::new(name, array)
    }

    /// Create a Series from a slice of Values
    ///
    /// The type is inferred from the first non-null value.
    ///
    /// # Errors
    /// Returns error if values have mixed types
    pub fn from_values(name: impl Into<String>, values: &[Value]) -> DataResult<Self> {
        let first = values.iter().find(|v| !v.is_null());

        match first {
            Some(Value::Int(_)) => {
                let ints: Vec<Option<i64>> = values
                    .iter()
                    .map(|v| match v {
                        Value::Int(i) => Ok(Some(*i)),
                        Value::Null => Ok(None),
                        other => Err(mismatch("Int", other)),
                    })
                    .collect::<DataResult<Vec<_>>>()?;
                Ok(Self::from_optional_ints(name, ints))
            }
            Some(Value::Float(_)) => {
                let floats: Vec<Option<f64>> = values
                    .iter()
                    .map(|v| match v {
                        Value::Float(f) => Ok(Some(*f)),
                        Value::Int(i) => Ok(Some(*i as f64)), // Allow int -> float coercion
                        Value::Null => Ok(None),
                        other => Err(mismatch("Float", other)),
                    })
                    .collect::<DataResult<Vec<_>>>()?;
                let array = Arc::new(Float64Array::from(floats)) as ArrayRef;
                Ok(Self::new(name, array))
            }
            Some(Value::Bool(_)) => {
                let bools: Vec<Option<bool>> = values
                    .iter()
                    .map(|v| match v {
                        Value::Bool(b) => Ok(Some(*b)),
                        Value::Null => Ok(None),
                        other => Err(mismatch("Bool", other)),
                    })
                    .collect::<DataResult<Vec<_>>>()?;
                let array = Arc::new(BooleanArray::from(bools)) as ArrayRef;
                Ok(Self::new(name, array))
            }
            Some(Value::String(_)) => {
                let strings: Vec<Option<&str>> = values
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => Ok(Some(s.as_str())),
                        Value::Null => Ok(None),
                        other => Err(mismatch("String", other)),
                    })
                    .collect::<DataResult<Vec<_>>>()?;
                Ok(Self::from_optional_strings(name, strings))
            }
            Some(Value::List(_)) => Ok(Self::new(name, list_array_from_values(values)?)),
            Some(Value::Null) | None => {
                // All null values - default to Int64
                Ok(Self::from_optional_ints(name, vec![None; values.len()]))
            }
        }
    }

    /// Get the column name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the series
    #[must_use]
    pub fn rename(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Get the number of elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.array.len()
    }

    /// Check if the series is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.array.is_empty()
    }

    /// Get the Arrow data type
    #[must_use]
    pub fn data_type(&self) -> &DataType {
        self.array.data_type()
    }

    /// Get the underlying Arrow array
    #[must_use]
    pub fn array(&self) -> &ArrayRef {
        &self.array
    }

    /// Get the number of null values
    #[must_use]
    pub fn null_count(&self) -> usize {
        self.array.null_count()
    }

    /// Check if a value at index is null
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.array.is_null(index)
    }

    fn downcast<T: 'static>(&self) -> DataResult<&T> {
        self.array
            .as_any()
            .downcast_ref::<T>()
            .ok_or_else(|| DataError::TypeMismatch {
                expected: std::any::type_name::<T>().to_string(),
                found: format!("{:?}", self.data_type()),
            })
    }

    /// Get a value at the given index
    ///
    /// # Errors
    /// Returns error if index is out of bounds
    pub fn get(&self, index: usize) -> DataResult<Value> {
        if index >= self.len() {
            return Err(DataError::OutOfBounds {
                index,
                length: self.len(),
            });
        }

        if self.is_null(index) {
            return Ok(Value::Null);
        }

        match self.array.data_type() {
            DataType::Int64 => Ok(Value::Int(self.downcast::<Int64Array>()?.value(index))),
            DataType::Int32 => Ok(Value::Int(i64::from(
                self.downcast::<Int32Array>()?.value(index),
            ))),
            DataType::Float64 => Ok(Value::Float(self.downcast::<Float64Array>()?.value(index))),
            DataType::Boolean => Ok(Value::Bool(self.downcast::<BooleanArray>()?.value(index))),
            DataType::Utf8 => Ok(Value::string(self.downcast::<StringArray>()?.value(index))),
            DataType::LargeUtf8 => Ok(Value::string(
                self.downcast::<LargeStringArray>()?.value(index),
            )),
            DataType::List(_) => {
                let items = Series::new("item", self.downcast::<ListArray>()?.value(index));
                Ok(Value::List(items.to_values()?))
            }
            other => Err(DataError::InvalidOperation(format!(
                "cannot get value of type {other:?}"
            ))),
        }
    }

    /// Calculate the sum of numeric values
    ///
    /// # Errors
    /// Returns error for non-numeric types
    pub fn sum(&self) -> DataResult<Value> {
        match self.array.data_type() {
            DataType::Int64 => {
                let sum = compute::sum(self.downcast::<Int64Array>()?).unwrap_or(0);
                Ok(Value::Int(sum))
            }
            DataType::Float64 => {
                let sum = compute::sum(self.downcast::<Float64Array>()?).unwrap_or(0.0);
                Ok(Value::Float(sum))
            }
            other => Err(DataError::TypeMismatch {
                expected: "numeric type".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// Calculate the mean of numeric values
    ///
    /// # Errors
    /// Returns error for non-numeric types
    pub fn mean(&self) -> DataResult<Value> {
        let count = self.count();
        let total = match self.sum()? {
            Value::Int(i) => i as f64,
            Value::Float(f) => f,
            _ => return Ok(Value::Null),
        };
        if count == 0 {
            Ok(Value::Null)
        } else {
            Ok(Value::Float(total / count as f64))
        }
    }

    /// Count non-null values
    #[must_use]
    pub fn count(&self) -> usize {
        self.len() - self.null_count()
    }

    /// Convert to a vector of Values
    ///
    /// # Errors
    /// Returns error if conversion fails
    pub fn to_values(&self) -> DataResult<Vec<Value>> {
        (0..self.len()).map(|i| self.get(i)).collect()
    }

    /// Cast the series to another Arrow type
    ///
    /// # Errors
    /// Returns error if Arrow has no cast between the two types
    pub fn cast(&self, to: &DataType) -> DataResult<Self> {
        let array = compute::cast(&self.array, to)?;
        Ok(Self::new(self.name.clone(), array))
    }

    /// Check if this is a string series
    #[must_use]
    pub fn is_string(&self) -> bool {
        matches!(self.data_type(), DataType::Utf8 | DataType::LargeUtf8)
    }

    /// Check if this is a list series
    #[must_use]
    pub fn is_list(&self) -> bool {
        matches!(self.data_type(), DataType::List(_))
    }

    /// Check if this is a numeric series
    #[must_use]
    pub fn is_numeric(&self) -> bool {
        is_numeric_type(self.data_type())
    }
}

/// Whether an Arrow type can feed a numeric aggregate
#[must_use]
pub fn is_numeric_type(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Int32 | DataType::Int64 | DataType::Float64
    )
}

fn mismatch(expected: &str, found: &Value) -> DataError {
    DataError::TypeMismatch {
        expected: expected.to_string(),
        found: found.type_name().to_string(),
    }
}

/// Build a List array; the item type follows the first non-null item (Int64 if none)
fn list_array_from_values(values: &[Value]) -> DataResult<ArrayRef> {
    let string_items = values
        .iter()
        .filter_map(|v| match v {
            Value::List(items) => Some(items),
            _ => None,
        })
        .flatten()
        .find(|item| !item.is_null())
        .is_some_and(|item| matches!(item, Value::String(_)));

    if string_items {
        let mut builder = ListBuilder::new(StringBuilder::new());
        for value in values {
            match value {
                Value::List(items) => {
                    for item in items {
                        match item {
                            Value::String(s) => builder.values().append_value(s),
                            Value::Null => builder.values().append_null(),
                            other => return Err(mismatch("String", other)),
                        }
                    }
                    builder.append(true);
                }
                Value::Null => builder.append(false),
                other => return Err(mismatch("List", other)),
            }
        }
        Ok(Arc::new(builder.finish()))
    } else {
        let mut builder = ListBuilder::new(Int64Builder::new());
        for value in values {
            match value {
                Value::List(items) => {
                    for item in items {
                        match item {
                            Value::Int(i) => builder.values().append_value(*i),
                            Value::Null => builder.values().append_null(),
                            other => return Err(mismatch("Int", other)),
                        }
                    }
                    builder.append(true);
                }
                Value::Null => builder.append(false),
                other => return Err(mismatch("List", other)),
            }
        }
        Ok(Arc::new(builder.finish()))
    }
}

impl fmt::Debug for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Series {{ name: {:?}, dtype: {:?}, len: {} }}",
            self.name,
            self.data_type(),
            self.len()
        )
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Series: {} ({:?})", self.name, self.data_type())?;
        let max_display = 10;
        let len = self.len();

        for i in 0..len.min(max_display) {
            if let Ok(val) = self.get(i) {
                writeln!(f, "  {i}: {val}")?;
            }
        }

        if len > max_display {
            writeln!(f, "  ... ({} more rows)", len - max_display)?;
        }

        Ok(())
    }
}
