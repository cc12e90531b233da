use crate::sql::ColumnLocator;
use crate::{QueryResult, ShardlineError, Value};

/// A forward-only cursor over result rows. `value` reads the current row;
/// it is only valid after `next` returned `true`.
pub trait QueryResultCursor {
    fn columns(&self) -> &[String];

    /// Advances to the next row. A closed cursor is exhausted.
    fn next(&mut self) -> Result<bool, ShardlineError>;

    /// Zero-based column of the current row.
    fn value(&self, column: usize) -> Result<&Value, ShardlineError>;

    fn close(&mut self);

    fn value_by_label(&self, label: &str) -> Result<&Value, ShardlineError> {
        let index = ColumnLocator::Label(label.to_string()).resolve(self.columns())?;
        self.value(index)
    }

    /// Drains the remaining rows.
    fn collect_rows(&mut self) -> Result<Vec<Vec<Value>>, ShardlineError> {
        let width = self.columns().len();
        let mut rows = Vec::new();
        while self.next()? {
            let mut row = Vec::with_capacity(width);
            for column in 0..width {
                row.push(self.value(column)?.clone());
            }
            rows.push(row);
        }
        Ok(rows)
    }
}

pub(crate) fn no_current_row() -> ShardlineError {
    ShardlineError::merge("cursor has no current row")
}

/// Rows already in memory.
#[derive(Debug, Clone)]
pub struct MemoryQueryResult {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    /// One past the current row; 0 before the first `next`.
    position: usize,
    closed: bool,
}

impl MemoryQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            position: 0,
            closed: false,
        }
    }

    pub(crate) fn current_row(&self) -> Option<&[Value]> {
        if self.closed || self.position == 0 {
            return None;
        }
        self.rows.get(self.position - 1).map(Vec::as_slice)
    }
}

impl From<QueryResult> for MemoryQueryResult {
    fn from(result: QueryResult) -> Self {
        Self::new(result.columns, result.rows)
    }
}

impl QueryResultCursor for MemoryQueryResult {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardlineError> {
        if self.closed || self.position >= self.rows.len() {
            self.position = self.rows.len() + 1;
            return Ok(false);
        }
        self.position += 1;
        Ok(true)
    }

    fn value(&self, column: usize) -> Result<&Value, ShardlineError> {
        let row = self.current_row().ok_or_else(no_current_row)?;
        row.get(column).ok_or_else(|| {
            ShardlineError::merge(format!(
                "column {} is out of range for a row of {} values",
                column + 1,
                row.len()
            ))
        })
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

/// Concatenates cursors in unit order.
pub struct IteratorStreamCursor {
    cursors: Vec<Box<dyn QueryResultCursor>>,
    columns: Vec<String>,
    current: usize,
    failed: bool,
}

impl IteratorStreamCursor {
    pub fn new(cursors: Vec<Box<dyn QueryResultCursor>>) -> Self {
        let columns = cursors
            .first()
            .map(|cursor| cursor.columns().to_vec())
            .unwrap_or_default();
        Self {
            cursors,
            columns,
            current: 0,
            failed: false,
        }
    }
}

impl QueryResultCursor for IteratorStreamCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardlineError> {
        if self.failed {
            return Ok(false);
        }
        while let Some(cursor) = self.cursors.get_mut(self.current) {
            match cursor.next() {
                Ok(true) => return Ok(true),
                Ok(false) => self.current += 1,
                Err(error) => {
                    self.failed = true;
                    self.close();
                    return Err(error);
                }
            }
        }
        Ok(false)
    }

    fn value(&self, column: usize) -> Result<&Value, ShardlineError> {
        if self.failed {
            return Err(no_current_row());
        }
        self.cursors
            .get(self.current)
            .ok_or_else(no_current_row)?
            .value(column)
    }

    fn close(&mut self) {
        for cursor in &mut self.cursors {
            cursor.close();
        }
    }
}

/// Skips `offset` merged rows, then yields at most `limit`.
pub struct PaginationCursor {
    inner: Box<dyn QueryResultCursor>,
    offset: u64,
    limit: Option<u64>,
    skipped: bool,
    yielded: u64,
}

impl PaginationCursor {
    pub fn new(inner: Box<dyn QueryResultCursor>, offset: u64, limit: Option<u64>) -> Self {
        Self {
            inner,
            offset,
            limit,
            skipped: false,
            yielded: 0,
        }
    }
}

impl QueryResultCursor for PaginationCursor {
    fn columns(&self) -> &[String] {
        self.inner.columns()
    }

    fn next(&mut self) -> Result<bool, ShardlineError> {
        if !self.skipped {
            self.skipped = true;
            for _ in 0..self.offset {
                if !self.inner.next()? {
                    return Ok(false);
                }
            }
        }
        if self.limit.is_some_and(|limit| self.yielded >= limit) {
            return Ok(false);
        }
        let advanced = self.inner.next()?;
        if advanced {
            self.yielded += 1;
        }
        Ok(advanced)
    }

    fn value(&self, column: usize) -> Result<&Value, ShardlineError> {
        self.inner.value(column)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

/// Hides trailing derived columns from the logical result.
pub struct TrimmingCursor {
    inner: Box<dyn QueryResultCursor>,
    visible: usize,
}

impl TrimmingCursor {
    pub fn new(inner: Box<dyn QueryResultCursor>, hidden: usize) -> Self {
        let visible = inner.columns().len().saturating_sub(hidden);
        Self { inner, visible }
    }
}

impl QueryResultCursor for TrimmingCursor {
    fn columns(&self) -> &[String] {
        &self.inner.columns()[..self.visible]
    }

    fn next(&mut self) -> Result<bool, ShardlineError> {
        self.inner.next()
    }

    fn value(&self, column: usize) -> Result<&Value, ShardlineError> {
        if column >= self.visible {
            return Err(ShardlineError::merge(format!(
                "column {} is out of range for a row of {} values",
                column + 1,
                self.visible
            )));
        }
        self.inner.value(column)
    }

    fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::{
        IteratorStreamCursor, MemoryQueryResult, PaginationCursor, QueryResultCursor,
        TrimmingCursor,
    };
    use crate::Value;

    pub(crate) fn memory(columns: &[&str], rows: Vec<Vec<i64>>) -> Box<dyn QueryResultCursor> {
        Box::new(MemoryQueryResult::new(
            columns.iter().map(|column| column.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(Value::Integer).collect())
                .collect(),
        ))
    }

    fn first_column(cursor: &mut dyn QueryResultCursor) -> Vec<i64> {
        cursor
            .collect_rows()
            .expect("rows")
            .into_iter()
            .map(|row| row[0].as_i64().expect("integer"))
            .collect()
    }

    #[test]
    fn closed_memory_cursor_is_exhausted() {
        let mut cursor = memory(&["id"], vec![vec![1], vec![2]]);
        assert!(cursor.next().expect("next"));
        cursor.close();
        assert!(!cursor.next().expect("next"));
        assert!(cursor.value(0).is_err());
    }

    #[test]
    fn iterator_stream_concatenates_in_unit_order() {
        let mut cursor = IteratorStreamCursor::new(vec![
            memory(&["id"], vec![vec![3], vec![1]]),
            memory(&["id"], vec![]),
            memory(&["id"], vec![vec![2]]),
        ]);
        assert_eq!(first_column(&mut cursor), vec![3, 1, 2]);
    }

    #[test]
    fn pagination_skips_then_limits() {
        let rows = (1..=20).map(|id| vec![id]).collect();
        let mut cursor = PaginationCursor::new(memory(&["id"], rows), 10, Some(5));
        assert_eq!(first_column(&mut cursor), vec![11, 12, 13, 14, 15]);
    }

    #[test]
    fn trimming_hides_trailing_columns() {
        let mut cursor = TrimmingCursor::new(
            memory(&["id", "ORDER_BY_DERIVED_0"], vec![vec![1, 9]]),
            1,
        );
        assert_eq!(cursor.columns(), ["id".to_string()]);
        assert!(cursor.next().expect("next"));
        assert_eq!(cursor.value_by_label("id").expect("id"), &Value::Integer(1));
        assert!(cursor.value(1).is_err());
    }
}
