//! Row adapters: one pull-based contract satisfied by native result
//! sets, the empty/count shortcuts, and the in-memory surrogate used by
//! tests and dry-run mode.
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::DbError;
use crate::value::SqlValue;

/// One scanned row. Getters perform kind-based conversion, so a `TEXT`
/// column holding `"42"` still scans into an `i64` destination.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<Vec<String>>,
    values: Vec<SqlValue>,
}

impl Row {
    pub fn new(columns: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn value(&self, idx: usize) -> Result<&SqlValue, DbError> {
        self.values
            .get(idx)
            .ok_or_else(|| DbError::BadInput(format!("column index {idx} out of range")))
    }

    pub fn value_by_name(&self, name: &str) -> Result<&SqlValue, DbError> {
        let idx = self
            .columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| DbError::BadInput(format!("no column named {name:?}")))?;
        self.value(idx)
    }

    pub fn get_i64(&self, idx: usize) -> Result<i64, DbError> {
        self.value(idx)?.as_i64()
    }

    pub fn get_string(&self, idx: usize) -> Result<String, DbError> {
        self.value(idx)?.as_string()
    }

    pub fn get_bool(&self, idx: usize) -> Result<bool, DbError> {
        self.value(idx)?.as_bool()
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// Pull-based result set. Backends may buffer internally; consumers see
/// one contract either way. Scan errors are per-row, never global.
pub trait Rows: Send {
    fn columns(&self) -> &[String];

    /// Advance and return the next row, `None` when drained.
    fn next_row(&mut self) -> Result<Option<Row>, DbError>;

    fn close(&mut self) -> Result<(), DbError> {
        Ok(())
    }
}

impl fmt::Debug for dyn Rows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rows(..)")
    }
}

/// Used when a compiled filter proves the result set empty before any
/// SQL is issued.
#[derive(Debug, Default)]
pub struct EmptyRows;

impl Rows for EmptyRows {
    fn columns(&self) -> &[String] {
        &[]
    }

    fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        Ok(None)
    }
}

/// Materializes a single `COUNT` result.
#[derive(Debug)]
pub struct CountRows {
    columns: Arc<Vec<String>>,
    count: Option<i64>,
}

impl CountRows {
    pub fn new(count: i64) -> Self {
        Self {
            columns: Arc::new(vec!["count".to_string()]),
            count: Some(count),
        }
    }
}

impl Rows for CountRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        Ok(self
            .count
            .take()
            .map(|n| Row::new(self.columns.clone(), vec![SqlValue::Int(n)])))
    }
}

/// In-memory rows, used by unit tests and surrogate backends.
#[derive(Debug, Default)]
pub struct SurrogateRows {
    columns: Arc<Vec<String>>,
    rows: VecDeque<Vec<SqlValue>>,
}

impl SurrogateRows {
    pub fn new(columns: Vec<&str>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self {
            columns: Arc::new(columns.into_iter().map(|c| c.to_string()).collect()),
            rows: rows.into(),
        }
    }
}

impl Rows for SurrogateRows {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next_row(&mut self) -> Result<Option<Row>, DbError> {
        Ok(self
            .rows
            .pop_front()
            .map(|values| Row::new(self.columns.clone(), values)))
    }
}

/// Drain a result set into string cells, header row first. Used by the
/// settings dump and the explain log stream.
pub fn dump(rows: &mut dyn Rows) -> Result<Vec<Vec<String>>, DbError> {
    let mut out = vec![rows.columns().to_vec()];
    while let Some(row) = rows.next_row()? {
        let mut cells = Vec::with_capacity(row.len());
        for idx in 0..row.len() {
            let value = row.value(idx)?;
            cells.push(if value.is_null() {
                "NULL".to_string()
            } else {
                value.as_string().unwrap_or_else(|_| format!("{value:?}"))
            });
        }
        out.push(cells);
    }
    rows.close()?;
    Ok(out)
}
