use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;
use thiserror::Error;

pub mod column;
pub mod dataset;
pub mod pipeline;
pub mod query_builder;
pub mod stats;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV at line {line}: {reason}")]
    Malformed { line: usize, reason: String },

    /// Schema error: a referenced column is not part of the dataset.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// Schema error: the column exists but has the wrong type for the operation.
    #[error("Column '{column}' is {found}, expected {expected}")]
    ColumnType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Dataset has no rows to aggregate")]
    EmptyInput,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ProcessorError {
    /// True for errors caused by the query not matching the dataset schema.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ProcessorError::MissingColumn(_) | ProcessorError::ColumnType { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct ParseSummary {
    pub rows_processed: usize,
    pub errors: Vec<ParseError>,
}

/// A row skipped during a lenient load; `line` is 1-based and counts the header.
#[derive(Debug, Clone)]
pub struct ParseError {
    pub line: usize,
    pub reason: String,
}

/// Owned cell value, used for predicates and row inspection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Timestamp(NaiveDateTime),
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Int(v) => v.hash(state),
            Value::Float(v) => v.to_bits().hash(state),
            Value::Str(v) => v.hash(state),
            Value::Timestamp(v) => v.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
            Value::Timestamp(v) => write!(f, "{}", v.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// Filter predicate
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterPredicate {
    Equals(Value),
    GreaterThan(Value),
    LessThan(Value),
    /// Inclusive on both ends
    Between(Value, Value),
}

/// Aggregate operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregateOp {
    /// Arithmetic mean of the non-null values
    Mean,
    /// Total of the non-null values
    Sum,
    /// Number of rows in the partition
    Count,
}

impl AggregateOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            AggregateOp::Mean => "mean",
            AggregateOp::Sum => "sum",
            AggregateOp::Count => "count",
        }
    }
}

impl fmt::Display for AggregateOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AggregateOp {
    type Err = ProcessorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mean" | "avg" | "average" => Ok(AggregateOp::Mean),
            "sum" | "total" => Ok(AggregateOp::Sum),
            "count" => Ok(AggregateOp::Count),
            other => Err(ProcessorError::InvalidArgument(format!(
                "unknown aggregate '{other}' (expected mean, sum or count)"
            ))),
        }
    }
}

/// One ranked output row: a distinct dimension value and its aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub key: String,
    pub value: f64,
}

/// Ranked top-N summary produced by [`pipeline::group_and_rank`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub dimension: String,
    pub measure: String,
    pub op: AggregateOp,
    pub rows: Vec<RankedRow>,
}

impl AggregationResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> + '_ {
        self.rows.iter().map(|r| r.key.as_str())
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.rows.iter().find(|r| r.key == key).map(|r| r.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_op_parse() {
        assert_eq!("avg".parse::<AggregateOp>().unwrap(), AggregateOp::Mean);
        assert_eq!("SUM".parse::<AggregateOp>().unwrap(), AggregateOp::Sum);
        assert_eq!("count".parse::<AggregateOp>().unwrap(), AggregateOp::Count);
        assert!("median".parse::<AggregateOp>().is_err());
    }

    #[test]
    fn test_value_equality_is_type_aware() {
        assert_eq!(Value::Int(1), Value::Int(1));
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_eq!(Value::Float(f64::NAN), Value::Float(f64::NAN));
    }

    #[test]
    fn test_schema_error_classification() {
        assert!(ProcessorError::MissingColumn("x".into()).is_schema_error());
        assert!(!ProcessorError::EmptyInput.is_schema_error());
    }
}
