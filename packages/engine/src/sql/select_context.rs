//! Merge-oriented view of a SELECT: where ORDER BY / GROUP BY keys and
//! aggregations sit in the result row, and which projections must be
//! derived so every shard returns them.

use crate::ShardlineError;

use super::statement::{
    AggregationFunction, NullsOrder, OrderDirection, OrderItemSegment, OrderTarget,
    PaginationSegment, Projection, ProjectionKind, SelectSegment,
};

pub const ORDER_BY_DERIVED_PREFIX: &str = "ORDER_BY_DERIVED_";
pub const GROUP_BY_DERIVED_PREFIX: &str = "GROUP_BY_DERIVED_";
pub const AVG_DERIVED_COUNT_PREFIX: &str = "AVG_DERIVED_COUNT_";
pub const AVG_DERIVED_SUM_PREFIX: &str = "AVG_DERIVED_SUM_";

/// How a merge key finds its column in a physical result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnLocator {
    /// Zero-based position; valid when no wildcard precedes the projection.
    Position(usize),
    /// Case-insensitive column label lookup.
    Label(String),
}

impl ColumnLocator {
    pub fn resolve(&self, columns: &[String]) -> Result<usize, ShardlineError> {
        match self {
            Self::Position(index) if *index < columns.len() => Ok(*index),
            Self::Position(index) => Err(ShardlineError::merge(format!(
                "result has {} columns but merge key expects column {}",
                columns.len(),
                index + 1
            ))),
            Self::Label(label) => columns
                .iter()
                .position(|column| column.eq_ignore_ascii_case(label))
                .ok_or_else(|| {
                    ShardlineError::merge(format!("result has no column labelled '{label}'"))
                }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeKey {
    pub locator: ColumnLocator,
    pub direction: OrderDirection,
    pub nulls: Option<NullsOrder>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregationItem {
    pub function: AggregationFunction,
    pub locator: ColumnLocator,
    /// Derived COUNT and SUM columns backing an AVG.
    pub avg_components: Option<(ColumnLocator, ColumnLocator)>,
}

/// A column appended to the select list as `expression AS alias`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedProjection {
    pub expression: String,
    pub alias: String,
}

impl DerivedProjection {
    pub fn render(&self) -> String {
        format!("{} AS {}", self.expression, self.alias)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectContext {
    pub projections: Vec<Projection>,
    pub derived: Vec<DerivedProjection>,
    pub order_by: Vec<MergeKey>,
    pub group_by: Vec<MergeKey>,
    pub aggregations: Vec<AggregationItem>,
    /// `SELECT DISTINCT` without aggregation: rows are grouped on every
    /// visible column.
    pub distinct_rows: bool,
    pub pagination: Option<PaginationSegment>,
}

impl SelectContext {
    pub fn new(segment: &SelectSegment) -> Result<Self, ShardlineError> {
        let mut builder = Builder {
            projections: &segment.projections,
            derived: Vec::new(),
        };

        let mut aggregations = Vec::new();
        let mut avg_ordinal = 0usize;
        for (index, projection) in segment.projections.iter().enumerate() {
            let ProjectionKind::Aggregation {
                function, argument, ..
            } = &projection.kind
            else {
                continue;
            };
            let avg_components = if *function == AggregationFunction::Avg {
                let count = builder.derive(
                    format!("COUNT({argument})"),
                    format!("{AVG_DERIVED_COUNT_PREFIX}{avg_ordinal}"),
                );
                let sum = builder.derive(
                    format!("SUM({argument})"),
                    format!("{AVG_DERIVED_SUM_PREFIX}{avg_ordinal}"),
                );
                avg_ordinal += 1;
                Some((count, sum))
            } else {
                None
            };
            aggregations.push(AggregationItem {
                function: *function,
                locator: builder.locator_for(index),
                avg_components,
            });
        }

        let mut order_by = Vec::with_capacity(segment.order_by.len());
        for (ordinal, item) in segment.order_by.iter().enumerate() {
            order_by.push(builder.merge_key(item, ORDER_BY_DERIVED_PREFIX, ordinal)?);
        }
        let mut group_by = Vec::with_capacity(segment.group_by.len());
        for (ordinal, item) in segment.group_by.iter().enumerate() {
            group_by.push(builder.merge_key(item, GROUP_BY_DERIVED_PREFIX, ordinal)?);
        }

        let distinct_rows =
            segment.distinct && group_by.is_empty() && aggregations.is_empty();

        Ok(Self {
            projections: segment.projections.clone(),
            derived: builder.derived,
            order_by,
            group_by,
            aggregations,
            distinct_rows,
            pagination: segment.pagination,
        })
    }

    pub fn is_grouped(&self) -> bool {
        !self.group_by.is_empty() || !self.aggregations.is_empty() || self.distinct_rows
    }

    /// Order of the merged output. A grouped query without ORDER BY is
    /// emitted in group key order.
    pub fn effective_order(&self) -> &[MergeKey] {
        if self.order_by.is_empty() {
            &self.group_by
        } else {
            &self.order_by
        }
    }

    /// Whether grouped rows arrive from each shard already ordered by the
    /// group key, so each shard only needs its first offset+limit groups.
    pub fn is_same_group_and_order(&self) -> bool {
        if self.group_by.is_empty() || self.order_by.is_empty() {
            return true;
        }
        self.group_by.len() == self.order_by.len()
            && self
                .group_by
                .iter()
                .zip(&self.order_by)
                .all(|(group, order)| group.locator == order.locator)
    }

    /// Whether every shard has to return all of its rows for pagination to
    /// stay correct after the merge.
    pub fn needs_all_rows(&self) -> bool {
        (!self.group_by.is_empty() && !self.is_same_group_and_order()) || self.distinct_rows
    }
}

struct Builder<'a> {
    projections: &'a [Projection],
    derived: Vec<DerivedProjection>,
}

impl Builder<'_> {
    fn locator_for(&self, index: usize) -> ColumnLocator {
        let wildcard_before = self.projections[..index]
            .iter()
            .any(|projection| matches!(projection.kind, ProjectionKind::Wildcard));
        if wildcard_before {
            ColumnLocator::Label(self.projections[index].label())
        } else {
            ColumnLocator::Position(index)
        }
    }

    fn derive(&mut self, expression: String, alias: String) -> ColumnLocator {
        if let Some(existing) = self
            .derived
            .iter()
            .find(|derived| derived.expression.eq_ignore_ascii_case(&expression))
        {
            return ColumnLocator::Label(existing.alias.clone());
        }
        self.derived.push(DerivedProjection {
            expression,
            alias: alias.clone(),
        });
        ColumnLocator::Label(alias)
    }

    fn merge_key(
        &mut self,
        item: &OrderItemSegment,
        prefix: &str,
        ordinal: usize,
    ) -> Result<MergeKey, ShardlineError> {
        let locator = match &item.target {
            OrderTarget::Ordinal(position) => {
                if *position == 0 || *position > self.projections.len() {
                    return Err(ShardlineError::malformed(format!(
                        "ORDER/GROUP BY position {position} is not in the select list"
                    )));
                }
                self.locator_for(position - 1)
            }
            OrderTarget::Column { owner, name } => {
                match self.find_column(owner.as_deref(), name) {
                    Some(locator) => locator,
                    None => {
                        let expression = match owner {
                            Some(owner) => format!("{owner}.{name}"),
                            None => name.clone(),
                        };
                        self.derive(expression, format!("{prefix}{ordinal}"))
                    }
                }
            }
            OrderTarget::Expression(expression) => {
                match self.projections.iter().position(|projection| {
                    projection.expression.eq_ignore_ascii_case(expression)
                        || projection
                            .alias
                            .as_deref()
                            .is_some_and(|alias| alias.eq_ignore_ascii_case(expression))
                }) {
                    Some(index) => self.locator_for(index),
                    None => self.derive(expression.clone(), format!("{prefix}{ordinal}")),
                }
            }
        };
        Ok(MergeKey {
            locator,
            direction: item.direction,
            nulls: item.nulls,
        })
    }

    fn find_column(&self, owner: Option<&str>, name: &str) -> Option<ColumnLocator> {
        for (index, projection) in self.projections.iter().enumerate() {
            let matched = match &projection.kind {
                ProjectionKind::Column {
                    owner: projection_owner,
                    name: projection_name,
                } => {
                    projection_name.eq_ignore_ascii_case(name)
                        && match (owner, projection_owner.as_deref()) {
                            (Some(left), Some(right)) => left.eq_ignore_ascii_case(right),
                            _ => true,
                        }
                }
                _ => false,
            };
            let alias_matched = owner.is_none()
                && projection
                    .alias
                    .as_deref()
                    .is_some_and(|alias| alias.eq_ignore_ascii_case(name));
            if matched || alias_matched {
                return Some(self.locator_for(index));
            }
        }

        let covered_by_wildcard = self.projections.iter().any(|projection| {
            if !matches!(projection.kind, ProjectionKind::Wildcard) {
                return false;
            }
            match projection.expression.strip_suffix(".*") {
                None => true,
                Some(qualifier) => owner.is_some_and(|owner| {
                    qualifier
                        .rsplit('.')
                        .next()
                        .is_some_and(|last| last.eq_ignore_ascii_case(owner))
                }),
            }
        });
        covered_by_wildcard.then(|| ColumnLocator::Label(name.to_string()))
    }
}
