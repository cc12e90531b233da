use std::cmp::Ordering;

use crate::sql::{MergeKey, NullsOrder, OrderDirection};
use crate::{ShardlineError, Value};

/// A merge key resolved against one result's columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedKey {
    pub column: usize,
    pub direction: OrderDirection,
    pub nulls_first: bool,
}

/// Multi-column row comparator honouring direction and NULL placement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowComparator {
    keys: Vec<ResolvedKey>,
}

impl RowComparator {
    pub fn new(
        keys: &[MergeKey],
        columns: &[String],
        nulls_sort_smallest: bool,
    ) -> Result<Self, ShardlineError> {
        let keys = keys
            .iter()
            .map(|key| {
                let nulls_first = match key.nulls {
                    Some(NullsOrder::First) => true,
                    Some(NullsOrder::Last) => false,
                    // The smallest value leads an ascending order.
                    None => nulls_sort_smallest == (key.direction == OrderDirection::Asc),
                };
                Ok(ResolvedKey {
                    column: key.locator.resolve(columns)?,
                    direction: key.direction,
                    nulls_first,
                })
            })
            .collect::<Result<Vec<_>, ShardlineError>>()?;
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[ResolvedKey] {
        &self.keys
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn key_values(&self, row: &[Value]) -> Result<Vec<Value>, ShardlineError> {
        self.keys
            .iter()
            .map(|key| {
                row.get(key.column).cloned().ok_or_else(|| {
                    ShardlineError::merge(format!(
                        "row of {} values has no merge column {}",
                        row.len(),
                        key.column + 1
                    ))
                })
            })
            .collect()
    }

    /// Compares two key tuples produced by [`Self::key_values`].
    pub fn compare_keys(&self, left: &[Value], right: &[Value]) -> Ordering {
        for (key, (left, right)) in self.keys.iter().zip(left.iter().zip(right)) {
            let ordering = compare_value(key, left, right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }

    pub fn compare_rows(&self, left: &[Value], right: &[Value]) -> Ordering {
        for key in &self.keys {
            let ordering = match (left.get(key.column), right.get(key.column)) {
                (Some(left), Some(right)) => compare_value(key, left, right),
                _ => Ordering::Equal,
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

fn compare_value(key: &ResolvedKey, left: &Value, right: &Value) -> Ordering {
    match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) if key.nulls_first => Ordering::Less,
        (true, false) => Ordering::Greater,
        (false, true) if key.nulls_first => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ordering = left.total_cmp(right);
            match key.direction {
                OrderDirection::Asc => ordering,
                OrderDirection::Desc => ordering.reverse(),
            }
        }
    }
}
