//! Calendar dimensions derived from a timestamp column

use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::DataType;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Weekday};

use super::dataframe::DataFrame;
use super::error::{DataError, DataResult};
use super::series::Series;
use super::value::Value;

pub const YEAR: &str = "Year";
pub const MONTH: &str = "Month";
pub const DAY_OF_WEEK: &str = "DayOfWeek";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y"];

/// Parse timestamp text into a calendar date
///
/// Accepts ISO dates, ISO date-times with a space or `T` separator,
/// RFC 3339 with an offset (the local date is kept), and `MM/DD/YYYY`.
#[must_use]
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt.date());
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
}

fn day_name(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}

/// Add `Year`, `Month` and `DayOfWeek` columns computed from `column`
///
/// Date and timestamp columns are rendered to text first, so the same
/// parsing applies whatever type the source produced. Null or blank
/// timestamps give null calendar values. Existing calendar columns are
/// replaced.
///
/// # Errors
/// Returns `ColumnNotFound` if `column` is missing, or `Timestamp` for the
/// first value no supported format accepts
pub fn derive_calendar(df: &DataFrame, column: &str) -> DataResult<DataFrame> {
    let source = df.column(column)?;
    let text = match source.data_type() {
        DataType::Utf8 => source,
        _ => source.cast(&DataType::Utf8)?,
    };

    let mut years: Vec<Option<i64>> = Vec::with_capacity(text.len());
    let mut months: Vec<Option<i64>> = Vec::with_capacity(text.len());
    let mut days: Vec<Option<&'static str>> = Vec::with_capacity(text.len());

    for value in text.to_values()? {
        let raw = match value {
            Value::String(s) if !s.trim().is_empty() => s,
            _ => {
                years.push(None);
                months.push(None);
                days.push(None);
                continue;
            }
        };
        let date = parse_date(&raw).ok_or_else(|| DataError::Timestamp {
            column: column.to_string(),
            value: raw.clone(),
        })?;
        years.push(Some(i64::from(date.year())));
        months.push(Some(i64::from(date.month())));
        days.push(Some(day_name(date.weekday())));
    }

    let year = Arc::new(Int64Array::from(years)) as ArrayRef;
    let month = Arc::new(Int64Array::from(months)) as ArrayRef;
    let day = Arc::new(StringArray::from(days)) as ArrayRef;

    df.with_column(Series::new(DAY_OF_WEEK, day))?
        .with_column(Series::new(MONTH, month))?
        .with_column(Series::new(YEAR, year))
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::Date32Array;

    #[test]
    fn test_friday_in_march() {
        let df = DataFrame::from_series(vec![Series::from_strings(
            "sale_date",
            vec!["2024-03-15"],
        )])
        .unwrap();
        let out = derive_calendar(&df, "sale_date").unwrap();

        assert_eq!(out.columns(), vec!["sale_date", DAY_OF_WEEK, MONTH, YEAR]);
        assert_eq!(out.column(YEAR).unwrap().get(0).unwrap(), Value::Int(2024));
        assert_eq!(out.column(MONTH).unwrap().get(0).unwrap(), Value::Int(3));
        assert_eq!(
            out.column(DAY_OF_WEEK).unwrap().get(0).unwrap(),
            Value::string("Friday")
        );
    }

    #[test]
    fn test_accepted_formats() {
        for text in [
            "2024-03-15",
            "2024-03-15 08:30:00",
            "2024-03-15T08:30:00.250",
            "2024-03-15T08:30:00+02:00",
            "03/15/2024",
        ] {
            assert_eq!(
                parse_date(text),
                NaiveDate::from_ymd_opt(2024, 3, 15),
                "{text}"
            );
        }
        assert_eq!(parse_date("15th of March"), None);
    }

    #[test]
    fn test_nulls_and_bad_text() {
        let df = DataFrame::from_series(vec![Series::from_optional_strings(
            "sale_date",
            vec![Some("2023-12-31"), None, Some(" ")],
        )])
        .unwrap();
        let out = derive_calendar(&df, "sale_date").unwrap();
        assert!(out.column(YEAR).unwrap().is_null(1));
        assert!(out.column(DAY_OF_WEEK).unwrap().is_null(2));

        let bad = DataFrame::from_series(vec![Series::from_strings("sale_date", vec!["soon"])])
            .unwrap();
        let err = derive_calendar(&bad, "sale_date").unwrap_err();
        assert!(matches!(err, DataError::Timestamp { ref value, .. } if value == "soon"));
    }

    #[test]
    fn test_date32_column() {
        // 19797 days after the epoch is 2024-03-15
        let dates = Series::new("sale_date", Arc::new(Date32Array::from(vec![19797])) as ArrayRef);
        let df = DataFrame::from_series(vec![dates]).unwrap();
        let out = derive_calendar(&df, "sale_date").unwrap();
        assert_eq!(
            out.column(DAY_OF_WEEK).unwrap().get(0).unwrap(),
            Value::string("Friday")
        );
    }
}
