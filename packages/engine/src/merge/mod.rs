//! Result merging: one cursor per route unit in, one logical cursor out.

mod compare;
mod cursor;
mod engine;
mod group_by;
mod order_by;

pub use compare::{ResolvedKey, RowComparator};
pub use cursor::{
    IteratorStreamCursor, MemoryQueryResult, PaginationCursor, QueryResultCursor, TrimmingCursor,
};
pub use engine::{merge_query_results, merge_shape, merge_update_counts, MergeContext, MergeShape};
pub use group_by::merge_group_by;
pub use order_by::OrderByStreamCursor;
