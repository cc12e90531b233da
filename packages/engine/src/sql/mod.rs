mod bind;
mod placeholder;
mod select_context;
mod span;
mod statement;

pub use bind::bind_statement;
pub use select_context::{
    AggregationItem, ColumnLocator, DerivedProjection, MergeKey, SelectContext,
    AVG_DERIVED_COUNT_PREFIX, AVG_DERIVED_SUM_PREFIX, GROUP_BY_DERIVED_PREFIX,
    ORDER_BY_DERIVED_PREFIX,
};
pub use statement::{
    AggregationFunction, Assignment, ColumnSegment, CompareOperator, InsertRow, InsertSegment,
    NullsOrder, Operand, OrderDirection, OrderItemSegment, OrderTarget, PaginationOperand,
    PaginationSegment, PaginationValueSegment, ParameterMarker, Predicate, Projection,
    ProjectionKind, SelectSegment, StatementContext, StatementKind, TableSegment, TextSpan,
    UpdateSegment,
};
