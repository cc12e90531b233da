use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::rc::Rc;

use crate::sql::MergeKey;
use crate::{ShardlineError, Value};

use super::compare::RowComparator;
use super::cursor::{no_current_row, QueryResultCursor};

/// Head row of one unit's cursor.
struct QueueEntry {
    keys: Vec<Value>,
    index: usize,
    comparator: Rc<RowComparator>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    // BinaryHeap pops the greatest entry: reverse so the smallest row, then
    // the lowest unit index, comes out first.
    fn cmp(&self, other: &Self) -> Ordering {
        self.comparator
            .compare_keys(&other.keys, &self.keys)
            .then_with(|| other.index.cmp(&self.index))
    }
}

/// Streaming k-way merge of per-unit cursors that are each already sorted
/// by the ORDER BY keys.
pub struct OrderByStreamCursor {
    cursors: Vec<Box<dyn QueryResultCursor>>,
    columns: Vec<String>,
    comparator: Rc<RowComparator>,
    queue: BinaryHeap<QueueEntry>,
    current: Option<usize>,
    failed: bool,
}

impl OrderByStreamCursor {
    pub fn new(
        mut cursors: Vec<Box<dyn QueryResultCursor>>,
        order_by: &[MergeKey],
        nulls_sort_smallest: bool,
    ) -> Result<Self, ShardlineError> {
        let columns = cursors
            .first()
            .map(|cursor| cursor.columns().to_vec())
            .unwrap_or_default();
        let comparator = match RowComparator::new(order_by, &columns, nulls_sort_smallest) {
            Ok(comparator) => Rc::new(comparator),
            Err(error) => {
                cursors.iter_mut().for_each(|cursor| cursor.close());
                return Err(error);
            }
        };
        let mut merged = Self {
            cursors,
            columns,
            comparator,
            queue: BinaryHeap::new(),
            current: None,
            failed: false,
        };
        for index in 0..merged.cursors.len() {
            merged.advance(index)?;
        }
        Ok(merged)
    }

    /// Moves one unit forward and queues its new head, if any.
    fn advance(&mut self, index: usize) -> Result<(), ShardlineError> {
        let head = self.cursors[index].next().and_then(|advanced| {
            if !advanced {
                return Ok(None);
            }
            let cursor = &self.cursors[index];
            let keys = self
                .comparator
                .keys()
                .iter()
                .map(|key| cursor.value(key.column).cloned())
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(keys))
        });
        match head {
            Ok(Some(keys)) => {
                self.queue.push(QueueEntry {
                    keys,
                    index,
                    comparator: Rc::clone(&self.comparator),
                });
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(error) => {
                self.failed = true;
                self.queue.clear();
                self.current = None;
                self.close();
                Err(error)
            }
        }
    }
}

impl QueryResultCursor for OrderByStreamCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn next(&mut self) -> Result<bool, ShardlineError> {
        if self.failed {
            return Ok(false);
        }
        if let Some(index) = self.current.take() {
            self.advance(index)?;
        }
        match self.queue.pop() {
            Some(entry) => {
                self.current = Some(entry.index);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn value(&self, column: usize) -> Result<&Value, ShardlineError> {
        let index = self.current.ok_or_else(no_current_row)?;
        self.cursors[index].value(column)
    }

    fn close(&mut self) {
        for cursor in &mut self.cursors {
            cursor.close();
        }
    }
}
