//! Bound statement context: the parser-independent view of one DML
//! statement that the routing, rewriting and merging stages consume.
//!
//! Every span is a half-open byte range over [`StatementContext::sql`].

use crate::backend::SqlDialect;
use crate::{ShardlineError, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TextSpan {
    pub start: usize,
    pub stop: usize,
}

impl TextSpan {
    pub const fn new(start: usize, stop: usize) -> Self {
        Self { start, stop }
    }

    pub const fn point(index: usize) -> Self {
        Self {
            start: index,
            stop: index,
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.start <= index && index < self.stop
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

impl StatementKind {
    pub fn is_query(self) -> bool {
        matches!(self, Self::Select)
    }
}

/// One reference to a table anywhere in the statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSegment {
    /// Normalized (dialect case rules) table name used for rule lookup.
    pub name: String,
    pub alias: Option<String>,
    pub quote_style: Option<char>,
    /// Span of the table identifier only; schema qualifiers stay untouched.
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSegment {
    pub owner: Option<String>,
    pub name: String,
    pub span: TextSpan,
}

impl ColumnSegment {
    pub fn new(owner: Option<&str>, name: &str) -> Self {
        Self {
            owner: owner.map(str::to_string),
            name: name.to_string(),
            span: TextSpan::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Literal(Value),
    /// Zero-based index into the bound parameter list.
    Parameter(usize),
    /// Anything that cannot be evaluated without executing SQL.
    Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOperator {
    Eq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOperator {
    /// Operator seen from the other side: `5 < col` is `col > 5`.
    pub fn flipped(self) -> Self {
        match self {
            Self::Eq => Self::Eq,
            Self::Lt => Self::Gt,
            Self::LtEq => Self::GtEq,
            Self::Gt => Self::Lt,
            Self::GtEq => Self::LtEq,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Compare {
        column: ColumnSegment,
        operator: CompareOperator,
        operand: Operand,
    },
    In {
        column: ColumnSegment,
        operands: Vec<Operand>,
    },
    Between {
        column: ColumnSegment,
        low: Operand,
        high: Operand,
    },
    /// A predicate that constrains no column in a way routing can use.
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertRow {
    pub operands: Vec<Operand>,
    /// Span of the parenthesized tuple, parentheses included.
    pub span: TextSpan,
    /// Parameter indices referenced inside the tuple, in textual order.
    pub parameter_indices: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InsertSegment {
    pub columns: Vec<ColumnSegment>,
    /// Offset right after the last listed column, where extra columns go.
    pub columns_stop: Option<usize>,
    pub rows: Vec<InsertRow>,
    /// Span from the first tuple's `(` to the last tuple's `)`.
    pub values_span: TextSpan,
}

impl InsertSegment {
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|each| each.name.eq_ignore_ascii_case(column))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: ColumnSegment,
    pub operand: Operand,
    /// Offset right after the assigned expression.
    pub value_stop: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateSegment {
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregationFunction {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().as_str() {
            "COUNT" => Some(Self::Count),
            "SUM" => Some(Self::Sum),
            "AVG" => Some(Self::Avg),
            "MIN" => Some(Self::Min),
            "MAX" => Some(Self::Max),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionKind {
    Column {
        owner: Option<String>,
        name: String,
    },
    Aggregation {
        function: AggregationFunction,
        distinct: bool,
        argument: String,
    },
    Wildcard,
    Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub kind: ProjectionKind,
    pub alias: Option<String>,
    /// Original expression text without the alias.
    pub expression: String,
}

impl Projection {
    /// Column label a backend reports for this projection.
    pub fn label(&self) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.kind {
            ProjectionKind::Column { name, .. } => name.clone(),
            _ => self.expression.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Column { owner: Option<String>, name: String },
    /// One-based select-list position (`ORDER BY 2`).
    Ordinal(usize),
    Expression(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderItemSegment {
    pub target: OrderTarget,
    /// Expression text as written, quoting preserved.
    pub expression: String,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginationOperand {
    Literal(u64),
    Parameter(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginationValueSegment {
    pub operand: PaginationOperand,
    pub span: TextSpan,
}

impl PaginationValueSegment {
    /// The bound value; parameters must hold non-negative integers.
    pub fn resolve(&self, params: &[Value]) -> Result<u64, ShardlineError> {
        match self.operand {
            PaginationOperand::Literal(value) => Ok(value),
            PaginationOperand::Parameter(index) => {
                let value = params.get(index).ok_or_else(|| {
                    ShardlineError::malformed(format!(
                        "parameter {} is not bound ({} parameters supplied)",
                        index + 1,
                        params.len()
                    ))
                })?;
                value
                    .as_i64()
                    .and_then(|number| u64::try_from(number).ok())
                    .ok_or_else(|| {
                        ShardlineError::malformed(format!(
                            "LIMIT/OFFSET parameter must be a non-negative integer, got '{value}'"
                        ))
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PaginationSegment {
    pub offset: Option<PaginationValueSegment>,
    pub row_count: Option<PaginationValueSegment>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectSegment {
    pub projections: Vec<Projection>,
    /// Offset right after the last projection, where derived columns go.
    pub projections_stop: Option<usize>,
    pub distinct: bool,
    pub group_by: Vec<OrderItemSegment>,
    pub order_by: Vec<OrderItemSegment>,
    /// Where an `ORDER BY` clause can be inserted: after GROUP BY / HAVING
    /// and before LIMIT. `None` when the query already orders its rows or
    /// ends in a clause the clause cannot precede.
    pub order_by_insert_at: Option<usize>,
    pub pagination: Option<PaginationSegment>,
}

impl SelectSegment {
    pub fn has_wildcard(&self) -> bool {
        self.projections
            .iter()
            .any(|projection| matches!(projection.kind, ProjectionKind::Wildcard))
    }

    pub fn has_aggregation(&self) -> bool {
        self.projections
            .iter()
            .any(|projection| matches!(projection.kind, ProjectionKind::Aggregation { .. }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterMarker {
    pub index: usize,
    pub span: TextSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatementContext {
    pub sql: String,
    pub dialect: SqlDialect,
    pub kind: StatementKind,
    pub tables: Vec<TableSegment>,
    pub where_predicate: Option<Predicate>,
    pub insert: Option<InsertSegment>,
    pub update: Option<UpdateSegment>,
    pub select: Option<SelectSegment>,
    pub parameter_markers: Vec<ParameterMarker>,
}

impl StatementContext {
    /// Distinct table names in first-appearance order.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            if !names.contains(&table.name) {
                names.push(table.name.clone());
            }
        }
        names
    }

    /// Resolves a column owner (alias or table name) to a table name.
    /// Unqualified columns resolve only when one table is referenced.
    pub fn resolve_owner(&self, owner: Option<&str>) -> Option<String> {
        match owner {
            Some(owner) => {
                let normalized = self.dialect.normalize_identifier(owner, None);
                self.tables
                    .iter()
                    .find(|table| {
                        table
                            .alias
                            .as_deref()
                            .is_some_and(|alias| alias.eq_ignore_ascii_case(owner))
                    })
                    .or_else(|| self.tables.iter().find(|table| table.name == normalized))
                    .map(|table| table.name.clone())
            }
            None => {
                let names = self.table_names();
                if names.len() == 1 {
                    names.into_iter().next()
                } else {
                    None
                }
            }
        }
    }

    pub fn parameter_count(&self) -> usize {
        self.parameter_markers
            .iter()
            .map(|marker| marker.index + 1)
            .max()
            .unwrap_or(0)
    }
}
