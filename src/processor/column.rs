use chrono::NaiveDateTime;

use crate::processor::{ProcessorError, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Str,
    Timestamp,
}

impl ColumnType {
    pub fn name(&self) -> &'static str {
        match self {
            ColumnType::Int64 => "int64",
            ColumnType::Float64 => "float64",
            ColumnType::Str => "string",
            ColumnType::Timestamp => "timestamp",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Int64 | ColumnType::Float64)
    }
}

/// A nullable column. `None` is a missing cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int64(Vec<Option<i64>>),
    Float64(Vec<Option<f64>>),
    Str(Vec<Option<(usize, usize)>>), // Absolute offsets into the dataset buffer
    Timestamp(Vec<Option<NaiveDateTime>>),
}

impl Column {
    pub fn with_capacity(col_type: ColumnType, capacity: usize) -> Self {
        match col_type {
            ColumnType::Int64 => Column::Int64(Vec::with_capacity(capacity)),
            ColumnType::Float64 => Column::Float64(Vec::with_capacity(capacity)),
            ColumnType::Str => Column::Str(Vec::with_capacity(capacity)),
            ColumnType::Timestamp => Column::Timestamp(Vec::with_capacity(capacity)),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Str(_) => ColumnType::Str,
            Column::Timestamp(_) => ColumnType::Timestamp,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Column::Int64(v) => v.len(),
            Column::Float64(v) => v.len(),
            Column::Str(v) => v.len(),
            Column::Timestamp(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Int64(v) => v.get(row).map_or(true, Option::is_none),
            Column::Float64(v) => v.get(row).map_or(true, Option::is_none),
            Column::Str(v) => v.get(row).map_or(true, Option::is_none),
            Column::Timestamp(v) => v.get(row).map_or(true, Option::is_none),
        }
    }

    /// Numeric cell widened to f64; `None` for nulls and non-numeric columns.
    pub fn f64_at(&self, row: usize) -> Option<f64> {
        match self {
            Column::Int64(v) => v.get(row).copied().flatten().map(|x| x as f64),
            Column::Float64(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    pub fn timestamp_at(&self, row: usize) -> Option<NaiveDateTime> {
        match self {
            Column::Timestamp(v) => v.get(row).copied().flatten(),
            _ => None,
        }
    }

    /// Owned value of a cell. String cells are resolved against `buf`.
    pub fn value_at(&self, row: usize, buf: &[u8]) -> Option<Value> {
        match self {
            Column::Int64(v) => v.get(row).copied().flatten().map(Value::Int),
            Column::Float64(v) => v.get(row).copied().flatten().map(Value::Float),
            Column::Str(v) => v.get(row).copied().flatten().map(|(s, e)| {
                Value::Str(String::from_utf8_lossy(&buf[s..e]).into_owned())
            }),
            Column::Timestamp(v) => v.get(row).copied().flatten().map(Value::Timestamp),
        }
    }

    /// Moves the cells of `other` onto the end of this column.
    pub fn append(&mut self, other: Column) -> Result<(), ProcessorError> {
        match (self, other) {
            (Column::Int64(a), Column::Int64(b)) => a.extend(b),
            (Column::Float64(a), Column::Float64(b)) => a.extend(b),
            (Column::Str(a), Column::Str(b)) => a.extend(b),
            (Column::Timestamp(a), Column::Timestamp(b)) => a.extend(b),
            (this, other) => {
                return Err(ProcessorError::InvalidArgument(format!(
                    "cannot append {} cells to a {} column",
                    other.column_type().name(),
                    this.column_type().name()
                )));
            }
        }
        Ok(())
    }

    /// New column holding the given rows, in the given order.
    pub fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int64(v) => Column::Int64(rows.iter().map(|&i| v[i]).collect()),
            Column::Float64(v) => Column::Float64(rows.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(rows.iter().map(|&i| v[i]).collect()),
            Column::Timestamp(v) => Column::Timestamp(rows.iter().map(|&i| v[i]).collect()),
        }
    }

    pub fn null_count(&self) -> usize {
        match self {
            Column::Int64(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Float64(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Str(v) => v.iter().filter(|c| c.is_none()).count(),
            Column::Timestamp(v) => v.iter().filter(|c| c.is_none()).count(),
        }
    }
}
