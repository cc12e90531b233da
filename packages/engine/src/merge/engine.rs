use tracing::debug;

use crate::backend::SqlDialect;
use crate::sql::SelectContext;
use crate::{QueryResult, ShardlineError, Value};

use super::cursor::{
    IteratorStreamCursor, MemoryQueryResult, PaginationCursor, QueryResultCursor, TrimmingCursor,
};
use super::group_by::merge_group_by;
use super::order_by::OrderByStreamCursor;

/// What the merger needs to know about the logical query.
#[derive(Debug, Clone, Copy)]
pub struct MergeContext<'a> {
    pub select: Option<&'a SelectContext>,
    pub params: &'a [Value],
    pub dialect: SqlDialect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeShape {
    PassThrough,
    GroupBy,
    OrderByStream,
    IteratorStream,
}

impl MergeShape {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PassThrough => "pass-through",
            Self::GroupBy => "group-by",
            Self::OrderByStream => "order-by-stream",
            Self::IteratorStream => "iterator-stream",
        }
    }
}

pub fn merge_shape(select: Option<&SelectContext>, units: usize) -> MergeShape {
    match select {
        _ if units <= 1 => MergeShape::PassThrough,
        None => MergeShape::IteratorStream,
        Some(select) if select.is_grouped() => MergeShape::GroupBy,
        Some(select) if !select.order_by.is_empty() => MergeShape::OrderByStream,
        Some(_) => MergeShape::IteratorStream,
    }
}

/// Merges one cursor per route unit into the logical result.
pub fn merge_query_results(
    context: &MergeContext<'_>,
    mut cursors: Vec<Box<dyn QueryResultCursor>>,
) -> Result<Box<dyn QueryResultCursor>, ShardlineError> {
    if let Err(error) = check_column_counts(&cursors) {
        cursors.iter_mut().for_each(|cursor| cursor.close());
        return Err(error);
    }
    let hidden = context
        .select
        .map(|select| select.derived.len())
        .unwrap_or(0);
    let width = cursors
        .first()
        .map(|cursor| cursor.columns().len())
        .unwrap_or(0);
    let visible = width.saturating_sub(hidden);
    let units = cursors.len();
    let shape = merge_shape(context.select, units);
    debug!(shape = shape.as_str(), units, "merging query results");

    let nulls_sort_smallest = context.dialect.nulls_sort_smallest();
    let merged: Box<dyn QueryResultCursor> = match (shape, context.select) {
        (MergeShape::PassThrough, _) => match cursors.pop() {
            Some(cursor) => cursor,
            None => Box::new(MemoryQueryResult::new(Vec::new(), Vec::new())),
        },
        (MergeShape::GroupBy, Some(select)) => Box::new(merge_group_by(
            cursors,
            select,
            visible,
            nulls_sort_smallest,
        )?),
        (MergeShape::OrderByStream, Some(select)) => Box::new(OrderByStreamCursor::new(
            cursors,
            &select.order_by,
            nulls_sort_smallest,
        )?),
        _ => Box::new(IteratorStreamCursor::new(cursors)),
    };

    let paginated = match (shape, context.select.and_then(|select| select.pagination)) {
        (MergeShape::PassThrough, _) | (_, None) => merged,
        (_, Some(pagination)) => {
            let offset = match pagination.offset {
                Some(segment) => segment.resolve(context.params),
                None => Ok(0),
            };
            let limit = pagination
                .row_count
                .map(|segment| segment.resolve(context.params))
                .transpose();
            match (offset, limit) {
                (Ok(offset), Ok(limit)) => Box::new(PaginationCursor::new(merged, offset, limit)),
                (Err(error), _) | (_, Err(error)) => {
                    let mut merged = merged;
                    merged.close();
                    return Err(error);
                }
            }
        }
    };

    if hidden == 0 {
        return Ok(paginated);
    }
    Ok(Box::new(TrimmingCursor::new(paginated, hidden)))
}

fn check_column_counts(cursors: &[Box<dyn QueryResultCursor>]) -> Result<(), ShardlineError> {
    let Some(first) = cursors.first() else {
        return Ok(());
    };
    let expected = first.columns().len();
    for (index, cursor) in cursors.iter().enumerate().skip(1) {
        let found = cursor.columns().len();
        if found != expected {
            return Err(ShardlineError::merge(format!(
                "unit {index} returned {found} columns, unit 0 returned {expected}"
            )));
        }
    }
    Ok(())
}

/// Affected-row total of a write routed to several units.
pub fn merge_update_counts(results: &[QueryResult]) -> u64 {
    results
        .iter()
        .fold(0u64, |total, result| total.saturating_add(result.rows_affected))
}

#[cfg(test)]
mod tests {
    use super::{merge_query_results, merge_shape, merge_update_counts, MergeContext, MergeShape};
    use crate::backend::SqlDialect;
    use crate::merge::cursor::{MemoryQueryResult, QueryResultCursor};
    use crate::sql::{bind_statement, SelectContext};
    use crate::{ErrorCode, QueryResult, Value};

    fn select(sql: &str, params: usize) -> SelectContext {
        let statement = bind_statement(sql, params, SqlDialect::MySql).expect("bind");
        SelectContext::new(statement.select.as_ref().expect("select")).expect("select context")
    }

    fn shard(columns: &[&str], rows: Vec<Vec<i64>>) -> Box<dyn QueryResultCursor> {
        Box::new(MemoryQueryResult::new(
            columns.iter().map(|column| column.to_string()).collect(),
            rows.into_iter()
                .map(|row| row.into_iter().map(Value::Integer).collect())
                .collect(),
        ))
    }

    #[test]
    fn picks_shape_from_the_select() {
        let ordered = select("SELECT id FROM t_order ORDER BY id", 0);
        let grouped = select("SELECT user_id, COUNT(*) FROM t_order GROUP BY user_id", 0);
        let plain = select("SELECT id FROM t_order", 0);
        assert_eq!(merge_shape(Some(&ordered), 1), MergeShape::PassThrough);
        assert_eq!(merge_shape(Some(&ordered), 3), MergeShape::OrderByStream);
        assert_eq!(merge_shape(Some(&grouped), 3), MergeShape::GroupBy);
        assert_eq!(merge_shape(Some(&plain), 3), MergeShape::IteratorStream);
        assert_eq!(merge_shape(None, 3), MergeShape::IteratorStream);
    }

    #[test]
    fn paginates_after_the_global_merge() {
        let select = select("SELECT id FROM t_order ORDER BY id LIMIT 5 OFFSET ?", 1);
        let params = [Value::Integer(10)];
        let shards = (0..3)
            .map(|shard_index| {
                let rows = (0..15).map(|row| vec![row * 3 + shard_index + 1]).collect();
                shard(&["id"], rows)
            })
            .collect();
        let mut merged = merge_query_results(
            &MergeContext {
                select: Some(&select),
                params: &params,
                dialect: SqlDialect::MySql,
            },
            shards,
        )
        .expect("merge");
        let ids = merged
            .collect_rows()
            .expect("rows")
            .into_iter()
            .map(|row| row[0].clone())
            .collect::<Vec<_>>();
        assert_eq!(ids, (11..=15).map(Value::Integer).collect::<Vec<_>>());
    }

    #[test]
    fn trims_derived_columns() {
        let select = select("SELECT id FROM t_order ORDER BY created_at", 0);
        let mut merged = merge_query_results(
            &MergeContext {
                select: Some(&select),
                params: &[],
                dialect: SqlDialect::MySql,
            },
            vec![
                shard(&["id", "ORDER_BY_DERIVED_0"], vec![vec![2, 20]]),
                shard(&["id", "ORDER_BY_DERIVED_0"], vec![vec![1, 10]]),
            ],
        )
        .expect("merge");
        assert_eq!(merged.columns(), ["id".to_string()]);
        assert_eq!(
            merged.collect_rows().expect("rows"),
            vec![vec![Value::Integer(1)], vec![Value::Integer(2)]]
        );
    }

    #[test]
    fn mismatched_column_counts_fail() {
        let error = merge_query_results(
            &MergeContext {
                select: None,
                params: &[],
                dialect: SqlDialect::Sqlite,
            },
            vec![shard(&["a"], vec![]), shard(&["a", "b"], vec![])],
        )
        .err()
        .expect("must fail");
        assert_eq!(error.code(), ErrorCode::Merge);
    }

    #[test]
    fn sums_affected_rows() {
        let results = [QueryResult::affected(2), QueryResult::affected(0), QueryResult::affected(3)];
        assert_eq!(merge_update_counts(&results), 5);
    }
}
