//! Deterministic output column names for cube tables

use super::cube::MetricSpec;

/// Name of the column produced by aggregating `column` with `function`
///
/// An empty function name leaves the bare column name. Trailing
/// underscores are stripped either way.
#[must_use]
pub fn metric_name(column: &str, function: &str) -> String {
    let raw = if function.is_empty() {
        column.to_string()
    } else {
        format!("{column}_{function}")
    };
    raw.trim_end_matches('_').to_string()
}

/// Ordered column names of a cube: dimensions verbatim, then one name per
/// (column, function) pair in specification order
///
/// The traceability column is not included.
#[must_use]
pub fn column_names<S: AsRef<str>>(dimensions: &[S], metrics: &[MetricSpec]) -> Vec<String> {
    let mut names: Vec<String> = dimensions.iter().map(|d| d.as_ref().to_string()).collect();
    for metric in metrics {
        for op in metric.functions.ops() {
            names.push(metric_name(&metric.column, op.name()));
        }
    }
    names
}
