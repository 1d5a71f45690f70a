use chrono::{NaiveDate, NaiveDateTime};
use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{
    borrow::Cow, cmp::Ordering, fs::File, io::Read, ops::Deref, path::Path, str, sync::Arc,
};
use tracing::{debug, info, warn};

use crate::processor::{
    FilterPredicate, ParseError, ParseSummary, ProcessorError, Value,
    column::{Column, ColumnType},
};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Bytes that string columns point into
#[derive(Debug)]
pub enum Buffer {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl Deref for Buffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Buffer::Mapped(mmap) => &mmap[..],
            Buffer::Owned(bytes) => bytes,
        }
    }
}

/// Options controlling how a CSV file is turned into a [`Dataset`]
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Columns parsed as timestamps whenever they appear in the header
    pub timestamp_columns: Vec<String>,
    /// Number of leading data rows used to guess column types. Cells further
    /// down that do not fit the guess widen the column and trigger a re-parse.
    pub infer_rows: usize,
    /// Reject rows whose field count differs from the header instead of skipping them
    pub strict: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            timestamp_columns: vec!["shipping_limit_date".to_string()],
            infer_rows: 1000,
            strict: true,
        }
    }
}

/// Column data parsed from one line-aligned slice of the input
#[derive(Debug)]
struct BatchResult {
    columns: Vec<Column>,
    row_count: usize,
    /// Lines seen in this chunk, blank and rejected ones included
    line_count: usize,
    /// Per column, the type every non-empty cell in this chunk fits
    widened: Vec<ColumnType>,
    /// Rows with the wrong number of fields: (chunk-local line, found)
    ragged: Vec<(usize, usize)>,
}

/// Immutable, column-oriented view of a CSV dataset.
///
/// String cells are stored as offsets into a shared buffer, so [`Dataset::take`]
/// and [`Dataset::with_column`] produce new datasets without copying text.
///
/// # Examples
///
/// ```rust,no_run
/// # use order_insights::Dataset;
/// let mut dataset = Dataset::new();
/// dataset.load_csv("orders.csv".as_ref()).unwrap();
/// println!("{} rows", dataset.row_count());
/// ```
#[derive(Debug, Clone)]
pub struct Dataset {
    buffer: Arc<Buffer>,
    headers: Vec<String>,
    columns: Vec<Column>,
    row_count: usize,
}

impl Dataset {
    /// Create an empty dataset
    pub fn new() -> Self {
        Dataset {
            buffer: Arc::new(Buffer::Owned(Vec::new())),
            headers: Vec::new(),
            columns: Vec::new(),
            row_count: 0,
        }
    }

    /// Loads a CSV file into memory using memory mapping, with default options
    ///
    /// # Errors
    /// Returns a [`ProcessorError`] if:
    /// - File cannot be opened or mapped
    /// - CSV is malformed (missing header, rows mismatch header)
    pub fn load_csv(&mut self, path: &Path) -> Result<ParseSummary, ProcessorError> {
        self.load_csv_with(path, &LoadOptions::default())
    }

    /// Loads a CSV file into memory using memory mapping
    ///
    /// Column types (Int, Float, Str) are guessed from the first
    /// `options.infer_rows` data rows and widened (Int → Float → Str) when a
    /// later cell does not fit. `options.timestamp_columns` are parsed as
    /// timestamps.
    pub fn load_csv_with(
        &mut self,
        path: &Path,
        options: &LoadOptions,
    ) -> Result<ParseSummary, ProcessorError> {
        let file = File::open(path)?;
        let len = file.metadata()?.len();
        debug!(path = %path.display(), bytes = len, "mapping csv");

        // Zero-length files cannot be mapped on every platform.
        let buffer = if len == 0 {
            Buffer::Owned(Vec::new())
        } else {
            // SAFETY: the mapping is read-only and lives as long as the dataset.
            Buffer::Mapped(unsafe { Mmap::map(&file)? })
        };
        self.load_buffer(buffer, options)
    }

    /// Loads CSV bytes from any reader (an uploaded file, stdin, ...)
    pub fn load_reader<R: Read>(
        &mut self,
        mut reader: R,
        options: &LoadOptions,
    ) -> Result<ParseSummary, ProcessorError> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        debug!(bytes = bytes.len(), "read csv from stream");
        self.load_buffer(Buffer::Owned(bytes), options)
    }

    fn load_buffer(
        &mut self,
        buffer: Buffer,
        options: &LoadOptions,
    ) -> Result<ParseSummary, ProcessorError> {
        let buf: &[u8] = &buffer[..];
        let bom = if buf.starts_with(UTF8_BOM) {
            UTF8_BOM.len()
        } else {
            0
        };

        // Parse header
        let header_end = memchr(b'\n', &buf[bom..]).map_or(buf.len(), |p| bom + p);
        let header_line = trim_cr(&buf[bom..header_end]);
        if header_line.is_empty() {
            return Err(ProcessorError::Malformed {
                line: 1,
                reason: "missing header line".into(),
            });
        }
        let mut ranges = Vec::new();
        split_fields(header_line, &mut ranges);
        let headers: Vec<String> = ranges
            .iter()
            .map(|&(s, e)| String::from_utf8_lossy(&header_line[s..e]).trim().to_string())
            .collect();

        let data_start = (header_end + 1).min(buf.len());
        let data = &buf[data_start..];

        // Find chunk boundaries (split by newlines)
        let num_threads = rayon::current_num_threads();
        let chunks = Self::find_chunk_boundaries(data, num_threads);

        let estimated_rows_per_chunk = {
            let avg_line_len = header_line.len().max(1) + 1;
            (data.len() / num_threads.max(1) / avg_line_len) + 16
        };

        // Parse chunks in parallel; collect() keeps chunk order
        let parse_all = |schema: &[ColumnType]| -> Vec<BatchResult> {
            chunks
                .par_iter()
                .map(|&(start, end)| {
                    Self::parse_chunk(
                        &data[start..end],
                        schema,
                        estimated_rows_per_chunk,
                        data_start + start, // Absolute offset in buffer
                    )
                })
                .collect()
        };

        let mut schema = Self::infer_schema(data, &headers, options);
        debug!(?schema, "inferred schema");

        // Types only ever widen, so this settles after at most two re-parses
        let batch_results = loop {
            let batches = parse_all(&schema);
            let widened = widen_schema(&schema, &batches);
            if widened == schema {
                break batches;
            }
            info!(
                ?widened,
                "cells past the inference sample do not fit, re-parsing with wider types"
            );
            schema = widened;
        };

        // Merge batch results
        let mut columns: Vec<Column> = schema
            .iter()
            .map(|&col_type| Column::with_capacity(col_type, 0))
            .collect();

        let mut total_rows = 0;
        let mut lines_before = 0;
        let mut all_errors = Vec::new();

        for batch in batch_results {
            // +2: header line, and 1-based numbering
            let line_base = lines_before + 2;

            if let Some(&(local, found)) = batch.ragged.first() {
                if options.strict {
                    return Err(ProcessorError::Malformed {
                        line: line_base + local,
                        reason: format!("expected {} fields, got {}", headers.len(), found),
                    });
                }
            }
            for (local, found) in batch.ragged {
                all_errors.push(ParseError {
                    line: line_base + local,
                    reason: format!("expected {} fields, got {}", headers.len(), found),
                });
            }

            for (col, chunk_col) in columns.iter_mut().zip(batch.columns) {
                col.append(chunk_col)?;
            }

            total_rows += batch.row_count;
            lines_before += batch.line_count;
        }

        if !all_errors.is_empty() {
            warn!(
                errors = all_errors.len(),
                first_line = all_errors[0].line,
                "some rows could not be parsed"
            );
        }
        info!(
            rows = total_rows,
            columns = headers.len(),
            "dataset loaded"
        );

        self.buffer = Arc::new(buffer);
        self.columns = columns;
        self.headers = headers;
        self.row_count = total_rows;

        Ok(ParseSummary {
            rows_processed: total_rows,
            errors: all_errors,
        })
    }

    fn infer_schema(data: &[u8], headers: &[String], options: &LoadOptions) -> Vec<ColumnType> {
        let num_cols = headers.len();
        let mut sampled: Vec<Option<ColumnType>> = vec![None; num_cols];
        let mut ranges = Vec::with_capacity(num_cols);

        for line in lines(data).filter(|l| !l.is_empty()).take(options.infer_rows) {
            split_fields(line, &mut ranges);
            if ranges.len() != num_cols {
                continue;
            }
            for (col_idx, &(s, e)) in ranges.iter().enumerate() {
                let field = &line[s..e];
                if field.is_empty() || sampled[col_idx] == Some(ColumnType::Str) {
                    continue;
                }
                let t = cell_type(field);
                sampled[col_idx] = Some(sampled[col_idx].map_or(t, |cur| wider(cur, t)));
            }
        }

        headers
            .iter()
            .zip(sampled)
            .map(|(name, t)| {
                if options.timestamp_columns.iter().any(|ts| ts == name) {
                    ColumnType::Timestamp
                } else {
                    t.unwrap_or(ColumnType::Str)
                }
            })
            .collect()
    }

    fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
        if data.is_empty() {
            return vec![];
        }

        let num_chunks = num_chunks.max(1);
        let chunk_size = data.len() / num_chunks;
        let mut boundaries = Vec::with_capacity(num_chunks);
        let mut start = 0;

        for i in 0..num_chunks - 1 {
            let mut end = ((i + 1) * chunk_size).max(start);

            // Find next newline
            match memchr(b'\n', &data[end..]) {
                Some(p) => end += p + 1, // Include the newline
                None => end = data.len(),
            }

            if start < end {
                boundaries.push((start, end));
            }
            start = end;
        }

        // Last chunk gets everything remaining
        if start < data.len() {
            boundaries.push((start, data.len()));
        }

        boundaries
    }

    fn parse_chunk(
        chunk: &[u8],
        schema: &[ColumnType],
        estimated_rows: usize,
        chunk_offset: usize, // Absolute offset of this chunk in the buffer
    ) -> BatchResult {
        let num_cols = schema.len();
        let mut columns: Vec<Column> = schema
            .iter()
            .map(|&col_type| Column::with_capacity(col_type, estimated_rows))
            .collect();

        let mut widened = schema.to_vec();
        let mut ragged = Vec::new();
        let mut row_count = 0;
        let mut line_count = 0;
        let mut fields = Vec::with_capacity(num_cols);

        for line in lines(chunk) {
            let local_line = line_count;
            line_count += 1;

            if line.is_empty() {
                continue;
            }

            let line_offset = chunk_offset + (line.as_ptr() as usize - chunk.as_ptr() as usize);

            split_fields(line, &mut fields);
            if fields.len() != num_cols {
                ragged.push((local_line, fields.len()));
                continue;
            }

            // Parse each field according to schema. A cell that does not fit
            // is pushed as null and widens the column for the next pass.
            for (col_idx, column) in columns.iter_mut().enumerate() {
                let (s, e) = fields[col_idx];
                let field = &line[s..e];

                match column {
                    Column::Int64(values) => {
                        if field.is_empty() {
                            values.push(None);
                        } else {
                            match atoi_simd::parse::<i64>(field) {
                                Ok(v) => values.push(Some(v)),
                                Err(_) => {
                                    widened[col_idx] = wider(widened[col_idx], cell_type(field));
                                    values.push(None);
                                }
                            }
                        }
                    }
                    Column::Float64(values) => {
                        if field.is_empty() {
                            values.push(None);
                        } else {
                            match fast_float::parse::<f64, _>(field) {
                                Ok(v) if v.is_nan() => values.push(None),
                                Ok(v) if v.abs() >= I64_LIMIT && is_integer_literal(field) => {
                                    widened[col_idx] = ColumnType::Str;
                                    values.push(None);
                                }
                                Ok(v) => values.push(Some(v)),
                                Err(_) => {
                                    widened[col_idx] = ColumnType::Str;
                                    values.push(None);
                                }
                            }
                        }
                    }
                    Column::Str(values) => {
                        if field.is_empty() {
                            values.push(None);
                        } else {
                            values.push(Some((line_offset + s, line_offset + e)));
                        }
                    }
                    // Unparseable timestamps are nulls, not errors
                    Column::Timestamp(values) => values.push(parse_timestamp(field)),
                }
            }

            row_count += 1;
        }

        BatchResult {
            columns,
            row_count,
            line_count,
            widened,
            ragged,
        }
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Column names with their inferred types
    pub fn schema(&self) -> Vec<(&str, ColumnType)> {
        self.headers
            .iter()
            .zip(&self.columns)
            .map(|(h, c)| (h.as_str(), c.column_type()))
            .collect()
    }

    pub fn get_col(&self, col_name: &str) -> Result<&Column, ProcessorError> {
        let col_pos = self
            .headers
            .iter()
            .position(|cn| cn == col_name)
            .ok_or_else(|| ProcessorError::MissingColumn(col_name.to_string()))?;

        self.columns
            .get(col_pos)
            .ok_or_else(|| ProcessorError::MissingColumn(col_name.to_string()))
    }

    /// Looks a column up and checks that it is numeric
    pub fn numeric_col(&self, col_name: &str) -> Result<&Column, ProcessorError> {
        let col = self.get_col(col_name)?;
        if !col.column_type().is_numeric() {
            return Err(ProcessorError::ColumnType {
                column: col_name.to_string(),
                expected: "numeric",
                found: col.column_type().name(),
            });
        }
        Ok(col)
    }

    /// Cell rendered as a grouping key; `None` for null cells.
    pub fn key_at<'a>(&'a self, col: &'a Column, row: usize) -> Option<Cow<'a, str>> {
        match col {
            Column::Str(v) => v[row].map(|(s, e)| String::from_utf8_lossy(&self.buffer[s..e])),
            Column::Int64(v) => v[row].map(|x| Cow::Owned(x.to_string())),
            Column::Float64(v) => v[row].map(|x| Cow::Owned(x.to_string())),
            Column::Timestamp(v) => {
                v[row].map(|x| Cow::Owned(x.format("%Y-%m-%d %H:%M:%S").to_string()))
            }
        }
    }

    /// All cells of one row, in header order
    pub fn row(&self, row: usize) -> Option<Vec<Option<Value>>> {
        if row >= self.row_count {
            return None;
        }
        Some(
            self.columns
                .iter()
                .map(|c| c.value_at(row, &self.buffer))
                .collect(),
        )
    }

    /// New dataset with the given rows, sharing this dataset's buffer
    pub fn take(&self, rows: &[usize]) -> Dataset {
        Dataset {
            buffer: Arc::clone(&self.buffer),
            headers: self.headers.clone(),
            columns: self.columns.iter().map(|c| c.take(rows)).collect(),
            row_count: rows.len(),
        }
    }

    /// New dataset with `column` added, or replacing an existing column of that name
    pub fn with_column(&self, name: &str, column: Column) -> Result<Dataset, ProcessorError> {
        if column.len() != self.row_count {
            return Err(ProcessorError::InvalidArgument(format!(
                "column '{}' has {} rows, dataset has {}",
                name,
                column.len(),
                self.row_count
            )));
        }

        let mut out = self.clone();
        match out.headers.iter().position(|h| h == name) {
            Some(idx) => out.columns[idx] = column,
            None => {
                out.headers.push(name.to_string());
                out.columns.push(column);
            }
        }
        Ok(out)
    }

    /// Row indices matching `predicate` on `column`. Null cells never match.
    pub fn filter(
        &self,
        column: &str,
        predicate: &FilterPredicate,
    ) -> Result<Vec<usize>, ProcessorError> {
        let col = self.get_col(column)?;

        let targets: Vec<&Value> = match predicate {
            FilterPredicate::Equals(v)
            | FilterPredicate::GreaterThan(v)
            | FilterPredicate::LessThan(v) => vec![v],
            FilterPredicate::Between(lo, hi) => vec![lo, hi],
        };
        if !targets.iter().all(|t| comparable(col.column_type(), t)) {
            return Err(ProcessorError::InvalidArgument(
                "Predicate & column-type combination not supported".into(),
            ));
        }

        let keep = |row: usize| -> bool {
            match predicate {
                FilterPredicate::Equals(v) => self.cell_cmp(col, row, v) == Some(Ordering::Equal),
                FilterPredicate::GreaterThan(v) => {
                    self.cell_cmp(col, row, v) == Some(Ordering::Greater)
                }
                FilterPredicate::LessThan(v) => self.cell_cmp(col, row, v) == Some(Ordering::Less),
                FilterPredicate::Between(lo, hi) => {
                    matches!(
                        self.cell_cmp(col, row, lo),
                        Some(Ordering::Greater | Ordering::Equal)
                    ) && matches!(
                        self.cell_cmp(col, row, hi),
                        Some(Ordering::Less | Ordering::Equal)
                    )
                }
            }
        };

        Ok((0..self.row_count).filter(|&row| keep(row)).collect())
    }

    fn cell_cmp(&self, col: &Column, row: usize, target: &Value) -> Option<Ordering> {
        match (col, target) {
            (Column::Int64(v), Value::Int(t)) => v[row].map(|x| x.cmp(t)),
            (Column::Int64(v), Value::Float(t)) => v[row].and_then(|x| (x as f64).partial_cmp(t)),
            (Column::Float64(v), Value::Float(t)) => v[row].and_then(|x| x.partial_cmp(t)),
            (Column::Float64(v), Value::Int(t)) => v[row].and_then(|x| x.partial_cmp(&(*t as f64))),
            (Column::Str(v), Value::Str(t)) => {
                v[row].map(|(s, e)| self.buffer[s..e].cmp(t.as_bytes()))
            }
            (Column::Timestamp(v), Value::Timestamp(t)) => v[row].map(|x| x.cmp(t)),
            _ => None,
        }
    }

    /// Keeps rows whose timestamp lies in `[start, end]`; null timestamps are dropped
    pub fn filter_date_range(
        &self,
        column: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Result<Dataset, ProcessorError> {
        self.timestamp_col(column)?;
        let rows = self.filter(
            column,
            &FilterPredicate::Between(Value::Timestamp(start), Value::Timestamp(end)),
        )?;
        debug!(
            column,
            %start,
            %end,
            kept = rows.len(),
            of = self.row_count,
            "date range filter"
        );
        Ok(self.take(&rows))
    }

    /// Earliest and latest non-null timestamp, or `None` if there is none
    pub fn timestamp_domain(
        &self,
        column: &str,
    ) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, ProcessorError> {
        let values = self.timestamp_col(column)?;
        let mut it = values.iter().flatten().copied();
        let first = match it.next() {
            Some(ts) => ts,
            None => return Ok(None),
        };
        Ok(Some(it.fold((first, first), |(lo, hi), ts| {
            (lo.min(ts), hi.max(ts))
        })))
    }

    fn timestamp_col(&self, column: &str) -> Result<&[Option<NaiveDateTime>], ProcessorError> {
        match self.get_col(column)? {
            Column::Timestamp(values) => Ok(values.as_slice()),
            other => Err(ProcessorError::ColumnType {
                column: column.to_string(),
                expected: "timestamp",
                found: other.column_type().name(),
            }),
        }
    }
}

impl Default for Dataset {
    fn default() -> Self {
        Self::new()
    }
}

fn comparable(col_type: ColumnType, value: &Value) -> bool {
    matches!(
        (col_type, value),
        (ColumnType::Int64 | ColumnType::Float64, Value::Int(_) | Value::Float(_))
            | (ColumnType::Str, Value::Str(_))
            | (ColumnType::Timestamp, Value::Timestamp(_))
    )
}

const I64_LIMIT: f64 = i64::MAX as f64;

/// Narrowest type holding a non-empty cell. Integers outside i64 are text so
/// long ids keep every digit.
fn cell_type(field: &[u8]) -> ColumnType {
    if atoi_simd::parse::<i64>(field).is_ok() {
        ColumnType::Int64
    } else if is_integer_literal(field) {
        ColumnType::Str
    } else if fast_float::parse::<f64, _>(field).is_ok() {
        ColumnType::Float64
    } else {
        ColumnType::Str
    }
}

fn is_integer_literal(field: &[u8]) -> bool {
    let digits = field.strip_prefix(b"-").unwrap_or(field);
    !digits.is_empty() && digits.iter().all(u8::is_ascii_digit)
}

/// Int64 < Float64 < Str. Timestamp columns are configured, never widened.
fn wider(current: ColumnType, cell: ColumnType) -> ColumnType {
    fn rank(t: ColumnType) -> u8 {
        match t {
            ColumnType::Int64 => 0,
            ColumnType::Float64 => 1,
            ColumnType::Str | ColumnType::Timestamp => 2,
        }
    }
    match current {
        ColumnType::Timestamp => current,
        _ if rank(cell) > rank(current) => match cell {
            ColumnType::Timestamp => ColumnType::Str,
            other => other,
        },
        _ => current,
    }
}

fn widen_schema(schema: &[ColumnType], batches: &[BatchResult]) -> Vec<ColumnType> {
    schema
        .iter()
        .enumerate()
        .map(|(i, &t)| batches.iter().fold(t, |acc, b| wider(acc, b.widened[i])))
        .collect()
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Lines of `data` without their terminators; a final unterminated line is included.
fn lines(data: &[u8]) -> impl Iterator<Item = &[u8]> + '_ {
    let mut start = 0;
    let mut newlines = memchr_iter(b'\n', data);
    std::iter::from_fn(move || {
        if start >= data.len() {
            return None;
        }
        let end = newlines.next().unwrap_or(data.len());
        let line = &data[start..end];
        start = end + 1;
        Some(trim_cr(line))
    })
}

/// Splits a line into field ranges. Double-quoted fields may contain commas;
/// the surrounding quotes are not part of the range.
fn split_fields(line: &[u8], out: &mut Vec<(usize, usize)>) {
    out.clear();

    if memchr(b'"', line).is_none() {
        let mut start = 0;
        for comma_pos in memchr_iter(b',', line) {
            out.push((start, comma_pos));
            start = comma_pos + 1;
        }
        out.push((start, line.len()));
        return;
    }

    let mut i = 0;
    loop {
        if line.get(i) == Some(&b'"') {
            let content_start = i + 1;
            let mut j = content_start;
            let close = loop {
                match memchr(b'"', &line[j..]) {
                    // "" inside a quoted field is an escaped quote
                    Some(p) if line.get(j + p + 1) == Some(&b'"') => j += p + 2,
                    Some(p) => break j + p,
                    None => break line.len(),
                }
            };
            out.push((content_start, close));
            i = (close + 1).min(line.len());
            match memchr(b',', &line[i..]) {
                Some(p) => i += p + 1,
                None => return,
            }
        } else {
            match memchr(b',', &line[i..]) {
                Some(p) => {
                    out.push((i, i + p));
                    i += p + 1;
                }
                None => {
                    out.push((i, line.len()));
                    return;
                }
            }
        }
    }
}

/// Parses `YYYY-MM-DD HH:MM:SS[.fff]`, the `T`-separated form, or a bare date
pub fn parse_timestamp(field: &[u8]) -> Option<NaiveDateTime> {
    let s = str::from_utf8(field).ok()?.trim();
    if s.is_empty() {
        return None;
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
