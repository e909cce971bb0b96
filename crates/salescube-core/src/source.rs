//! Fact sources: where joined sales records come from

use std::path::PathBuf;

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};

use crate::config::{ConfigError, PipelineConfig, SourceKind};
use crate::data::{self, DataFrame, DataResult, JoinSpec, Series, Value};
use crate::error::{PipelineError, PipelineResult};

/// Sales joined with the customer's region
pub const FACTS_QUERY: &str =
    "SELECT s.*, c.region FROM sale s JOIN customer c ON s.customer_id = c.customer_id";

/// Supplies the flat fact table the cube is built from
pub trait FactSource {
    /// Human-readable origin for logs and errors
    fn describe(&self) -> String;

    /// # Errors
    /// Returns `PipelineError::Source` if the facts cannot be read
    fn load_facts(&self) -> PipelineResult<DataFrame>;
}

/// Facts queried from a SQLite data warehouse
#[derive(Debug, Clone)]
pub struct SqliteWarehouse {
    path: PathBuf,
    query: String,
}

impl SqliteWarehouse {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            query: FACTS_QUERY.to_string(),
        }
    }

    /// Replace the fact query
    #[must_use]
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    fn query_frame(&self) -> DataResult<DataFrame> {
        // read-only so a wrong path fails instead of creating an empty database
        let conn = Connection::open_with_flags(&self.path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        let mut stmt = conn.prepare(&self.query)?;

        let column_names: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();
        let mut columns: Vec<Vec<Value>> = vec![Vec::new(); column_names.len()];

        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            for (i, column) in columns.iter_mut().enumerate() {
                column.push(sqlite_value(row.get_ref(i)?));
            }
        }

        let series = column_names
            .iter()
            .zip(columns)
            .map(|(name, values)| column_from_rows(name, values))
            .collect::<DataResult<Vec<_>>>()?;
        DataFrame::from_series(series)
    }
}

impl FactSource for SqliteWarehouse {
    fn describe(&self) -> String {
        format!("warehouse {}", self.path.display())
    }

    fn load_facts(&self) -> PipelineResult<DataFrame> {
        if !self.path.is_file() {
            return Err(PipelineError::load_failed(self.describe(), "file does not exist"));
        }
        let facts = self
            .query_frame()
            .map_err(|e| PipelineError::load_failed(self.describe(), e))?;
        tracing::info!(rows = facts.num_rows(), source = %self.describe(), "sales data (with region) loaded");
        Ok(facts)
    }
}

fn sqlite_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(s) | ValueRef::Blob(s) => Value::string(String::from_utf8_lossy(s)),
    }
}

/// SQLite columns are dynamically typed; a REAL anywhere makes the
/// whole column Float64
fn column_from_rows(name: &str, mut values: Vec<Value>) -> DataResult<Series> {
    if values.iter().any(|v| matches!(v, Value::Float(_))) {
        for v in &mut values {
            if let Value::Int(i) = v {
                *v = Value::Float(*i as f64);
            }
        }
    }
    Series::from_values(name, &values)
}

/// Facts read from a prepared sales CSV, optionally joined with customers
#[derive(Debug, Clone)]
pub struct CsvFacts {
    sales: PathBuf,
    customers: Option<CustomerJoin>,
}

#[derive(Debug, Clone)]
struct CustomerJoin {
    path: PathBuf,
    key: String,
    region: String,
}

impl CsvFacts {
    #[must_use]
    pub fn new(sales: impl Into<PathBuf>) -> Self {
        Self {
            sales: sales.into(),
            customers: None,
        }
    }

    /// Inner-join a customers file on `key`, taking its `region` column
    #[must_use]
    pub fn with_customers(
        mut self,
        path: impl Into<PathBuf>,
        key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        self.customers = Some(CustomerJoin {
            path: path.into(),
            key: key.into(),
            region: region.into(),
        });
        self
    }

    fn read(&self) -> DataResult<DataFrame> {
        let sales = data::read_csv(&self.sales)?;
        match &self.customers {
            None => Ok(sales),
            Some(join) => {
                let customers = data::read_csv(&join.path)?;
                let regions = customers.select(&[join.key.as_str(), join.region.as_str()])?;
                sales.join(&regions, &JoinSpec::on(&join.key))
            }
        }
    }
}

impl FactSource for CsvFacts {
    fn describe(&self) -> String {
        match &self.customers {
            Some(join) => format!(
                "{} joined with {}",
                self.sales.display(),
                join.path.display()
            ),
            None => self.sales.display().to_string(),
        }
    }

    fn load_facts(&self) -> PipelineResult<DataFrame> {
        let facts = self
            .read()
            .map_err(|e| PipelineError::load_failed(self.describe(), e))?;
        tracing::info!(rows = facts.num_rows(), source = %self.describe(), "sales data loaded from CSV");
        Ok(facts)
    }
}

/// Build the source the configuration selects
///
/// # Errors
/// Returns a configuration error if a CSV source has no sales file
pub fn from_config(config: &PipelineConfig) -> PipelineResult<Box<dyn FactSource>> {
    match config.source.kind {
        SourceKind::Sqlite => Ok(Box::new(SqliteWarehouse::new(&config.paths.warehouse))),
        SourceKind::Csv => {
            let sales = config.source.sales_csv.as_deref().ok_or_else(|| {
                PipelineError::from(ConfigError::Invalid {
                    key: "source.sales_csv",
                    reason: "required when source.kind = \"csv\"".to_string(),
                })
            })?;
            let mut csv = CsvFacts::new(sales);
            if let Some(customers) = &config.source.customers_csv {
                csv = csv.with_customers(
                    customers,
                    config.source.customer_column.clone(),
                    config.source.region_column.clone(),
                );
            }
            Ok(Box::new(csv))
        }
    }
}

/// Load facts and check every required column is present
///
/// # Errors
/// Returns `PipelineError::Source` naming the first missing column
pub fn load_checked(source: &dyn FactSource, required: &[&str]) -> PipelineResult<DataFrame> {
    let facts = source.load_facts()?;
    if let Some(missing) = required.iter().find(|c| !facts.has_column(c)) {
        return Err(PipelineError::load_failed(
            source.describe(),
            format!("missing required column '{missing}'"),
        ));
    }
    Ok(facts)
}
