use std::cmp::Ordering;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::sql::{AggregationFunction, SelectContext};
use crate::{ShardlineError, Value};

use super::compare::RowComparator;
use super::cursor::{MemoryQueryResult, QueryResultCursor};

#[derive(Debug, Clone)]
struct GroupKey(Vec<Value>);

impl PartialEq for GroupKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for GroupKey {}

impl PartialOrd for GroupKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for GroupKey {
    fn cmp(&self, other: &Self) -> Ordering {
        for (left, right) in self.0.iter().zip(&other.0) {
            let ordering = left.total_cmp(right);
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.0.len().cmp(&other.0.len())
    }
}

/// Running numeric total; integers widen to reals on overflow.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
enum Total {
    #[default]
    Empty,
    Integer(i64),
    Real(f64),
}

impl Total {
    fn add(self, value: &Value) -> Result<Self, ShardlineError> {
        let next = match (self, value) {
            (total, Value::Null) => total,
            (Self::Empty, Value::Integer(value)) => Self::Integer(*value),
            (Self::Integer(total), Value::Integer(value)) => match total.checked_add(*value) {
                Some(sum) => Self::Integer(sum),
                None => Self::Real(total as f64 + *value as f64),
            },
            (total, value) => {
                let addend = value.as_f64().ok_or_else(|| {
                    ShardlineError::merge(format!(
                        "cannot add {} '{value}' to an aggregate",
                        value.type_name()
                    ))
                })?;
                match total {
                    Self::Empty => Self::Real(addend),
                    Self::Integer(total) => Self::Real(total as f64 + addend),
                    Self::Real(total) => Self::Real(total + addend),
                }
            }
        };
        Ok(next)
    }

    fn as_f64(self) -> Option<f64> {
        match self {
            Self::Empty => None,
            Self::Integer(value) => Some(value as f64),
            Self::Real(value) => Some(value),
        }
    }

    fn into_value(self, empty: Value) -> Value {
        match self {
            Self::Empty => empty,
            Self::Integer(value) => Value::Integer(value),
            Self::Real(value) => Value::Real(value),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Aggregator {
    Count(Total),
    Sum(Total),
    Min(Option<Value>),
    Max(Option<Value>),
    Avg { count: Total, sum: Total },
}

/// Columns an aggregation reads and writes in the physical row.
#[derive(Debug, Clone, Copy)]
struct AggregationColumns {
    function: AggregationFunction,
    column: usize,
    avg: Option<(usize, usize)>,
}

impl AggregationColumns {
    fn start(&self) -> Aggregator {
        match self.function {
            AggregationFunction::Count => Aggregator::Count(Total::Empty),
            AggregationFunction::Sum => Aggregator::Sum(Total::Empty),
            AggregationFunction::Min => Aggregator::Min(None),
            AggregationFunction::Max => Aggregator::Max(None),
            AggregationFunction::Avg => Aggregator::Avg {
                count: Total::Empty,
                sum: Total::Empty,
            },
        }
    }
}

impl Aggregator {
    fn fold(
        &mut self,
        columns: &AggregationColumns,
        cursor: &dyn QueryResultCursor,
    ) -> Result<(), ShardlineError> {
        let cell = move |column: usize| cursor.value(column);
        match self {
            Self::Count(total) | Self::Sum(total) => *total = total.add(cell(columns.column)?)?,
            Self::Min(current) | Self::Max(current) => {
                let value = cell(columns.column)?;
                if value.is_null() {
                    return Ok(());
                }
                let keep_new = match current {
                    None => true,
                    Some(existing) => {
                        let ordering = value.total_cmp(existing);
                        if columns.function == AggregationFunction::Min {
                            ordering == Ordering::Less
                        } else {
                            ordering == Ordering::Greater
                        }
                    }
                };
                if keep_new {
                    *current = Some(value.clone());
                }
            }
            Self::Avg { count, sum } => {
                let (count_column, sum_column) = columns.avg.ok_or_else(|| {
                    ShardlineError::merge("AVG is missing its derived COUNT and SUM columns")
                })?;
                *count = count.add(cell(count_column)?)?;
                *sum = sum.add(cell(sum_column)?)?;
            }
        }
        Ok(())
    }

    fn write(&self, columns: &AggregationColumns, row: &mut [Value]) {
        let mut set = |column: usize, value: Value| {
            if let Some(slot) = row.get_mut(column) {
                *slot = value;
            }
        };
        match self {
            Self::Count(total) => set(columns.column, total.into_value(Value::Integer(0))),
            Self::Sum(total) => set(columns.column, total.into_value(Value::Null)),
            Self::Min(value) | Self::Max(value) => {
                set(columns.column, value.clone().unwrap_or(Value::Null))
            }
            Self::Avg { count, sum } => {
                let average = match (count.as_f64(), sum.as_f64()) {
                    (Some(count), Some(sum)) if count != 0.0 => Value::Real(sum / count),
                    _ => Value::Null,
                };
                set(columns.column, average);
                if let Some((count_column, sum_column)) = columns.avg {
                    set(count_column, count.into_value(Value::Integer(0)));
                    set(sum_column, sum.into_value(Value::Null));
                }
            }
        }
    }
}

struct Group {
    row: Vec<Value>,
    aggregators: Vec<Aggregator>,
}

/// Folds every unit's rows into one row per group as they arrive; only
/// per-group state is held. `visible` counts the columns before derived
/// ones.
pub fn merge_group_by(
    mut cursors: Vec<Box<dyn QueryResultCursor>>,
    select: &SelectContext,
    visible: usize,
    nulls_sort_smallest: bool,
) -> Result<MemoryQueryResult, ShardlineError> {
    let merged = fold_groups(&mut cursors, select, visible, nulls_sort_smallest);
    if merged.is_err() {
        cursors.iter_mut().for_each(|cursor| cursor.close());
    }
    merged
}

fn fold_groups(
    cursors: &mut [Box<dyn QueryResultCursor>],
    select: &SelectContext,
    visible: usize,
    nulls_sort_smallest: bool,
) -> Result<MemoryQueryResult, ShardlineError> {
    let columns = cursors
        .first()
        .map(|cursor| cursor.columns().to_vec())
        .unwrap_or_default();

    let key_columns = if select.distinct_rows {
        (0..visible.min(columns.len())).collect::<Vec<_>>()
    } else {
        select
            .group_by
            .iter()
            .map(|key| key.locator.resolve(&columns))
            .collect::<Result<Vec<_>, _>>()?
    };
    let aggregations = select
        .aggregations
        .iter()
        .map(|item| {
            let avg = match &item.avg_components {
                Some((count, sum)) => Some((count.resolve(&columns)?, sum.resolve(&columns)?)),
                None => None,
            };
            Ok(AggregationColumns {
                function: item.function,
                column: item.locator.resolve(&columns)?,
                avg,
            })
        })
        .collect::<Result<Vec<_>, ShardlineError>>()?;

    let mut groups: BTreeMap<GroupKey, Group> = BTreeMap::new();
    for cursor in cursors.iter_mut() {
        while cursor.next()? {
            let current: &dyn QueryResultCursor = &**cursor;
            let key = GroupKey(
                key_columns
                    .iter()
                    .map(|column| current.value(*column).cloned())
                    .collect::<Result<_, _>>()?,
            );
            let group = match groups.entry(key) {
                Entry::Occupied(entry) => entry.into_mut(),
                Entry::Vacant(entry) => entry.insert(Group {
                    aggregators: aggregations.iter().map(AggregationColumns::start).collect(),
                    row: (0..columns.len())
                        .map(|column| current.value(column).cloned())
                        .collect::<Result<_, _>>()?,
                }),
            };
            for (aggregator, columns) in group.aggregators.iter_mut().zip(&aggregations) {
                aggregator.fold(columns, current)?;
            }
        }
    }

    let mut rows = groups
        .into_values()
        .map(|mut group| {
            for (aggregator, columns) in group.aggregators.iter().zip(&aggregations) {
                aggregator.write(columns, &mut group.row);
            }
            group.row
        })
        .collect::<Vec<_>>();

    let order = select.effective_order();
    if !order.is_empty() && !columns.is_empty() {
        let comparator = RowComparator::new(order, &columns, nulls_sort_smallest)?;
        rows.sort_by(|left, right| comparator.compare_rows(left, right));
    }
    Ok(MemoryQueryResult::new(columns, rows))
}
