//! File I/O operations for DataFrame
//!
//! Supports reading and writing DataFrames in Parquet, CSV, and JSON formats.
//! CSV cannot hold nested values, so list columns are written as bracketed
//! text (`[1, 2, 3]`) and come back as plain strings.

use std::fs::File;
use std::io::{BufReader, BufWriter, Seek, SeekFrom};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{ArrayRef, RecordBatch, StringArray};
use arrow::datatypes::SchemaRef;
use arrow_csv::{ReaderBuilder as CsvReaderBuilder, WriterBuilder as CsvWriterBuilder};
use arrow_json::{LineDelimitedWriter as JsonLineWriter, ReaderBuilder as JsonReaderBuilder};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::arrow::ArrowWriter;

use super::dataframe::DataFrame;
use super::error::{DataError, DataResult};
use super::series::Series;
use super::value::Value;

fn open(path: &Path) -> DataResult<File> {
    File::open(path)
        .map_err(|e| DataError::Io(format!("failed to open file '{}': {e}", path.display())))
}

fn create(path: &Path) -> DataResult<File> {
    File::create(path)
        .map_err(|e| DataError::Io(format!("failed to create file '{}': {e}", path.display())))
}

fn rewind(file: &mut File) -> DataResult<()> {
    file.seek(SeekFrom::Start(0))?;
    Ok(())
}

/// Read a Parquet file into a DataFrame
///
/// # Errors
/// Returns error if file cannot be read or is not valid Parquet
pub fn read_parquet<P: AsRef<Path>>(path: P) -> DataResult<DataFrame> {
    let file = open(path.as_ref())?;

    let builder = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(|e| DataError::Parquet(format!("failed to read parquet: {e}")))?;

    let schema = builder.schema().clone();
    let reader = builder
        .build()
        .map_err(|e| DataError::Parquet(format!("failed to build reader: {e}")))?;

    let batches: Vec<RecordBatch> = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::Parquet(format!("failed to read batches: {e}")))?;

    DataFrame::from_batches(schema, batches)
}

/// Write a DataFrame to a Parquet file
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_parquet<P: AsRef<Path>>(df: &DataFrame, path: P) -> DataResult<()> {
    let file = create(path.as_ref())?;

    let mut writer = ArrowWriter::try_new(file, df.schema().clone(), None)
        .map_err(|e| DataError::Parquet(format!("failed to create writer: {e}")))?;

    for batch in df.batches() {
        writer
            .write(batch)
            .map_err(|e| DataError::Parquet(format!("failed to write batch: {e}")))?;
    }

    writer
        .close()
        .map_err(|e| DataError::Parquet(format!("failed to close writer: {e}")))?;

    Ok(())
}

/// Read a comma-separated CSV file with a header row
///
/// # Errors
/// Returns error if file cannot be read or is not valid CSV
pub fn read_csv<P: AsRef<Path>>(path: P) -> DataResult<DataFrame> {
    read_csv_with_options(path, true, b',')
}

/// Read a CSV file into a DataFrame with options
///
/// Column types are inferred from every row of the file.
///
/// # Errors
/// Returns error if file cannot be read or is not valid CSV
pub fn read_csv_with_options<P: AsRef<Path>>(
    path: P,
    has_header: bool,
    delimiter: u8,
) -> DataResult<DataFrame> {
    let mut file = open(path.as_ref())?;

    let (schema, _) = arrow_csv::reader::Format::default()
        .with_header(has_header)
        .with_delimiter(delimiter)
        .infer_schema(BufReader::new(&file), None)
        .map_err(|e| DataError::Csv(format!("failed to infer schema: {e}")))?;
    rewind(&mut file)?;

    let schema_ref: SchemaRef = Arc::new(schema);

    let csv_reader = CsvReaderBuilder::new(schema_ref.clone())
        .with_header(has_header)
        .with_delimiter(delimiter)
        .build(BufReader::new(file))
        .map_err(|e| DataError::Csv(format!("failed to build CSV reader: {e}")))?;

    let batches: Vec<RecordBatch> = csv_reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::Csv(format!("failed to read CSV batches: {e}")))?;

    DataFrame::from_batches(schema_ref, batches)
}

/// Write a DataFrame to a comma-separated CSV file with a header row
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> DataResult<()> {
    write_csv_with_options(df, path, true, b',')
}

/// Write a DataFrame to a CSV file with options
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_csv_with_options<P: AsRef<Path>>(
    df: &DataFrame,
    path: P,
    with_header: bool,
    delimiter: u8,
) -> DataResult<()> {
    let flat = stringify_lists(df)?;
    let file = create(path.as_ref())?;

    let mut csv_writer = CsvWriterBuilder::new()
        .with_header(with_header)
        .with_delimiter(delimiter)
        .build(BufWriter::new(file));

    if flat.batches().is_empty() {
        // the header still has to land for a zero-row table
        let empty = RecordBatch::new_empty(flat.schema().clone());
        csv_writer
            .write(&empty)
            .map_err(|e| DataError::Csv(format!("failed to write header: {e}")))?;
    }

    for batch in flat.batches() {
        csv_writer
            .write(batch)
            .map_err(|e| DataError::Csv(format!("failed to write batch: {e}")))?;
    }

    Ok(())
}

/// Replace every list column with its bracketed text rendering
///
/// # Errors
/// Returns error if a list cell cannot be read
pub fn stringify_lists(df: &DataFrame) -> DataResult<DataFrame> {
    let mut flat = df.clone();
    for series in df.iter_columns() {
        let series = series?;
        if !series.is_list() {
            continue;
        }
        let text: Vec<Option<String>> = series
            .to_values()?
            .into_iter()
            .map(|v| match v {
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect();
        let array = Arc::new(StringArray::from(text)) as ArrayRef;
        flat = flat.with_column(Series::new(series.name(), array))?;
    }
    Ok(flat)
}

/// Read a JSON file (records format) into a DataFrame
///
/// Expects newline-delimited JSON (NDJSON), one object per line.
///
/// # Errors
/// Returns error if file cannot be read or is not valid JSON
pub fn read_json<P: AsRef<Path>>(path: P) -> DataResult<DataFrame> {
    let mut file = open(path.as_ref())?;

    let (schema, _) = arrow_json::reader::infer_json_schema(BufReader::new(&file), None)
        .map_err(|e| DataError::Json(format!("failed to infer schema: {e}")))?;
    rewind(&mut file)?;

    let schema_ref: SchemaRef = Arc::new(schema);

    let json_reader = JsonReaderBuilder::new(schema_ref.clone())
        .build(BufReader::new(file))
        .map_err(|e| DataError::Json(format!("failed to build JSON reader: {e}")))?;

    let batches: Vec<RecordBatch> = json_reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DataError::Json(format!("failed to read JSON batches: {e}")))?;

    DataFrame::from_batches(schema_ref, batches)
}

/// Write a DataFrame as newline-delimited JSON
///
/// # Errors
/// Returns error if file cannot be written
pub fn write_json<P: AsRef<Path>>(df: &DataFrame, path: P) -> DataResult<()> {
    let file = create(path.as_ref())?;
    let mut json_writer = JsonLineWriter::new(BufWriter::new(file));

    for batch in df.batches() {
        json_writer
            .write(batch)
            .map_err(|e| DataError::Json(format!("failed to write batch: {e}")))?;
    }

    json_writer
        .finish()
        .map_err(|e| DataError::Json(format!("failed to finish writing: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_cube() -> DataFrame {
        let regions = Series::from_strings("region", vec!["North", "South"]);
        let sums = Series::from_floats("sale_amount_sum", vec![15.0, 30.5]);
        let ids = Series::from_values(
            "sale_ids",
            &[
                Value::List(vec![Value::Int(1), Value::Int(3)]),
                Value::List(vec![Value::Int(2)]),
            ],
        )
        .unwrap();

        DataFrame::from_series(vec![regions, sums, ids]).unwrap()
    }

    #[test]
    fn test_csv_writes_lists_as_text() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.csv");

        write_csv(&sample_cube(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("region,sale_amount_sum,sale_ids"));
        let first = lines.next().unwrap();
        assert!(first.starts_with("North,"));
        assert!(first.ends_with(",\"[1, 3]\""));

        let loaded = read_csv(&path).unwrap();
        assert_eq!(loaded.columns(), sample_cube().columns());
        assert_eq!(
            loaded.column("sale_ids").unwrap().get(1).unwrap(),
            Value::string("[2]")
        );
    }

    #[test]
    fn test_csv_header_for_empty_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.csv");

        write_csv(&sample_cube().head(0).unwrap(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim_end(), "region,sale_amount_sum,sale_ids");
    }

    #[test]
    fn test_parquet_keeps_lists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.parquet");

        write_parquet(&sample_cube(), &path).unwrap();
        let loaded = read_parquet(&path).unwrap();

        assert_eq!(loaded.num_rows(), 2);
        assert_eq!(
            loaded.column("sale_ids").unwrap().get(0).unwrap(),
            Value::List(vec![Value::Int(1), Value::Int(3)])
        );
    }

    #[test]
    fn test_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cube.json");

        write_json(&sample_cube(), &path).unwrap();
        let loaded = read_json(&path).unwrap();

        assert_eq!(loaded.num_rows(), 2);
        assert_eq!(loaded.num_columns(), 3);
    }

    #[test]
    fn test_missing_file() {
        let err = read_csv("/nonexistent/facts.csv").unwrap_err();
        assert!(matches!(err, DataError::Io(_)));
    }
}
