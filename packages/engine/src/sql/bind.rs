//! Binds parsed SQL (`sqlparser`) into a [`StatementContext`].

use std::collections::HashMap;
use std::ops::ControlFlow;

use sqlparser::ast::{
    AssignmentTarget, BinaryOperator, Distinct, DuplicateTreatment, Expr, FunctionArguments,
    GroupByExpr, Ident, LimitClause, ObjectName, ObjectNamePart, OrderByExpr, OrderByKind, Query,
    Select, SelectItem, SetExpr, Spanned, Statement, TableFactor, TableObject, UnaryOperator,
    Value as SqlValue, ValueWithSpan, Visit, Visitor,
};
use sqlparser::parser::Parser;

use crate::backend::SqlDialect;
use crate::{ShardlineError, Value};

use super::placeholder::{resolve_placeholder_index, PlaceholderState};
use super::span::SourceOffsets;
use super::statement::{
    AggregationFunction, Assignment, ColumnSegment, CompareOperator, InsertRow, InsertSegment,
    NullsOrder, Operand, OrderDirection, OrderItemSegment, OrderTarget, PaginationOperand,
    PaginationSegment, PaginationValueSegment, ParameterMarker, Predicate, Projection,
    ProjectionKind, SelectSegment, StatementContext, StatementKind, TableSegment, TextSpan,
    UpdateSegment,
};

/// Parses `sql` and binds it into a statement context. `params_len` is the
/// number of bound parameters; markers beyond it are malformed.
pub fn bind_statement(
    sql: &str,
    params_len: usize,
    dialect: SqlDialect,
) -> Result<StatementContext, ShardlineError> {
    let parser_dialect = dialect.parser_dialect();
    let mut statements = Parser::parse_sql(parser_dialect.as_ref(), sql)
        .map_err(|error| ShardlineError::Parse(error.to_string()))?;
    if statements.len() != 1 {
        return Err(ShardlineError::unsupported(format!(
            "expected exactly one statement, found {}",
            statements.len()
        )));
    }
    let statement = statements.remove(0);

    let offsets = SourceOffsets::new(sql);
    let parameter_markers = collect_parameter_markers(&statement, &offsets, params_len)?;
    let binder = Binder {
        sql,
        dialect,
        offsets,
        markers: parameter_markers
            .iter()
            .map(|marker| (marker.span.start, marker.index))
            .collect(),
    };
    binder.bind(&statement, parameter_markers)
}

struct Binder<'a> {
    sql: &'a str,
    dialect: SqlDialect,
    offsets: SourceOffsets<'a>,
    markers: HashMap<usize, usize>,
}

impl<'a> Binder<'a> {
    fn bind(
        &self,
        statement: &Statement,
        parameter_markers: Vec<ParameterMarker>,
    ) -> Result<StatementContext, ShardlineError> {
        let mut context = StatementContext {
            sql: self.sql.to_string(),
            dialect: self.dialect,
            kind: StatementKind::Select,
            tables: Vec::new(),
            where_predicate: None,
            insert: None,
            update: None,
            select: None,
            parameter_markers,
        };

        match statement {
            Statement::Query(query) => {
                let select = query_select(query)?;
                context.select = Some(self.select_segment(query, select)?);
                context.where_predicate = select.selection.as_ref().map(|expr| self.predicate(expr));
            }
            Statement::Insert(insert) => {
                context.kind = StatementKind::Insert;
                if insert.on.is_some() {
                    return Err(ShardlineError::unsupported(
                        "INSERT with ON DUPLICATE KEY / ON CONFLICT clauses",
                    ));
                }
                let TableObject::TableName(name) = &insert.table else {
                    return Err(ShardlineError::unsupported("INSERT into a table function"));
                };
                context.tables.push(self.table_segment(name, None)?);
                let Some(source) = &insert.source else {
                    return Err(ShardlineError::unsupported("INSERT without VALUES"));
                };
                let SetExpr::Values(values) = source.body.as_ref() else {
                    return Err(ShardlineError::unsupported("INSERT ... SELECT"));
                };
                context.insert = Some(self.insert_segment(&insert.columns, &values.rows)?);
            }
            Statement::Update(update) => {
                context.kind = StatementKind::Update;
                let mut assignments = Vec::with_capacity(update.assignments.len());
                for assignment in &update.assignments {
                    let AssignmentTarget::ColumnName(name) = &assignment.target else {
                        return Err(ShardlineError::unsupported("tuple assignments in UPDATE"));
                    };
                    let Some(ident) = last_ident(name) else {
                        return Err(ShardlineError::unsupported("unnamed UPDATE target column"));
                    };
                    assignments.push(Assignment {
                        column: self.column_from_idents(None, ident),
                        operand: self.operand(&assignment.value),
                        value_stop: self.offsets.offset(assignment.value.span().end),
                    });
                }
                context.update = Some(UpdateSegment { assignments });
                context.where_predicate = update.selection.as_ref().map(|expr| self.predicate(expr));
            }
            Statement::Delete(delete) => {
                context.kind = StatementKind::Delete;
                context.where_predicate = delete.selection.as_ref().map(|expr| self.predicate(expr));
            }
            other => {
                return Err(ShardlineError::unsupported(format!(
                    "statement kind is not routable: {}",
                    statement_label(other)
                )));
            }
        }

        let mut collector = TableCollector {
            binder: self,
            tables: Vec::new(),
        };
        if let ControlFlow::Break(error) = statement.visit(&mut collector) {
            return Err(error);
        }
        context.tables.extend(collector.tables);
        Ok(context)
    }

    fn table_segment(
        &self,
        name: &ObjectName,
        alias: Option<&str>,
    ) -> Result<TableSegment, ShardlineError> {
        let ident = last_ident(name)
            .ok_or_else(|| ShardlineError::unsupported(format!("unnamed table '{name}'")))?;
        let span = self.offsets.span(ident.span).ok_or_else(|| {
            ShardlineError::unsupported(format!("cannot locate table '{}' in SQL text", ident.value))
        })?;
        Ok(TableSegment {
            name: self
                .dialect
                .normalize_identifier(&ident.value, ident.quote_style),
            alias: alias.map(str::to_string),
            quote_style: ident.quote_style,
            span,
        })
    }

    fn select_segment(&self, query: &Query, select: &Select) -> Result<SelectSegment, ShardlineError> {
        let distinct = match &select.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(_) => return Err(ShardlineError::unsupported("SELECT DISTINCT ON")),
        };

        let mut projections = Vec::with_capacity(select.projection.len());
        for item in &select.projection {
            projections.push(self.projection(item)?);
        }

        let projections_stop = select
            .from
            .first()
            .and_then(|from| match &from.relation {
                TableFactor::Table { name, .. } => name.0.first().and_then(ObjectNamePart::as_ident),
                _ => None,
            })
            .and_then(|ident| self.offsets.offset(ident.span.start))
            .and_then(|start| self.offsets.select_list_end(start));

        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs, _) => exprs
                .iter()
                .map(|expr| self.order_item(expr, None, None))
                .collect(),
            GroupByExpr::All(_) => return Err(ShardlineError::unsupported("GROUP BY ALL")),
        };

        let order_by = match &query.order_by {
            None => Vec::new(),
            Some(order_by) => match &order_by.kind {
                OrderByKind::Expressions(exprs) => exprs
                    .iter()
                    .map(|expr| self.order_by_item(expr))
                    .collect(),
                OrderByKind::All(_) => return Err(ShardlineError::unsupported("ORDER BY ALL")),
            },
        };

        let pagination = match &query.limit_clause {
            None => None,
            Some(LimitClause::LimitOffset {
                limit,
                offset,
                limit_by,
            }) => {
                if !limit_by.is_empty() {
                    return Err(ShardlineError::unsupported("LIMIT BY"));
                }
                Some(PaginationSegment {
                    offset: offset
                        .as_ref()
                        .map(|offset| self.pagination_value(&offset.value))
                        .transpose()?,
                    row_count: limit
                        .as_ref()
                        .map(|limit| self.pagination_value(limit))
                        .transpose()?,
                })
            }
            Some(LimitClause::OffsetCommaLimit { offset, limit }) => Some(PaginationSegment {
                offset: Some(self.pagination_value(offset)?),
                row_count: Some(self.pagination_value(limit)?),
            }),
        };

        let order_by_insert_at = if query.order_by.is_some()
            || query.fetch.is_some()
            || !query.locks.is_empty()
        {
            None
        } else {
            let pagination_start = pagination.and_then(|pagination| {
                [pagination.offset, pagination.row_count]
                    .into_iter()
                    .flatten()
                    .map(|value| value.span.start)
                    .min()
            });
            Some(match pagination_start {
                Some(start) => self.offsets.before_keyword(start),
                None => self.offsets.statement_end(),
            })
        };

        Ok(SelectSegment {
            projections,
            projections_stop,
            distinct,
            group_by,
            order_by,
            order_by_insert_at,
            pagination,
        })
    }

    fn projection(&self, item: &SelectItem) -> Result<Projection, ShardlineError> {
        match item {
            SelectItem::UnnamedExpr(expr) => self.projection_from_expr(expr, None),
            SelectItem::ExprWithAlias { expr, alias } => {
                self.projection_from_expr(expr, Some(alias.value.clone()))
            }
            other => {
                if matches!(
                    other,
                    SelectItem::Wildcard(_) | SelectItem::QualifiedWildcard(..)
                ) {
                    Ok(Projection {
                        kind: ProjectionKind::Wildcard,
                        alias: None,
                        expression: other.to_string(),
                    })
                } else {
                    Ok(Projection {
                        kind: ProjectionKind::Expression,
                        alias: None,
                        expression: other.to_string(),
                    })
                }
            }
        }
    }

    fn projection_from_expr(
        &self,
        expr: &Expr,
        alias: Option<String>,
    ) -> Result<Projection, ShardlineError> {
        let expression = expr.to_string();
        if let Some(column) = self.column(expr) {
            return Ok(Projection {
                kind: ProjectionKind::Column {
                    owner: column.owner,
                    name: column.name,
                },
                alias,
                expression,
            });
        }
        if let Expr::Function(function) = expr {
            if let Some(aggregation) = AggregationFunction::from_name(&function.name.to_string()) {
                if function.over.is_none() {
                    if let FunctionArguments::List(list) = &function.args {
                        let distinct =
                            matches!(list.duplicate_treatment, Some(DuplicateTreatment::Distinct));
                        if distinct {
                            return Err(ShardlineError::unsupported(format!(
                                "DISTINCT aggregation '{expression}' cannot be merged across shards"
                            )));
                        }
                        let argument = list
                            .args
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>()
                            .join(", ");
                        return Ok(Projection {
                            kind: ProjectionKind::Aggregation {
                                function: aggregation,
                                distinct,
                                argument,
                            },
                            alias,
                            expression,
                        });
                    }
                }
            }
        }
        Ok(Projection {
            kind: ProjectionKind::Expression,
            alias,
            expression,
        })
    }

    fn order_by_item(&self, expr: &OrderByExpr) -> OrderItemSegment {
        let direction = match expr.options.asc {
            Some(false) => OrderDirection::Desc,
            _ => OrderDirection::Asc,
        };
        let nulls = expr.options.nulls_first.map(|first| {
            if first {
                NullsOrder::First
            } else {
                NullsOrder::Last
            }
        });
        self.order_item(&expr.expr, Some(direction), nulls)
    }

    fn order_item(
        &self,
        expr: &Expr,
        direction: Option<OrderDirection>,
        nulls: Option<NullsOrder>,
    ) -> OrderItemSegment {
        let target = if let Some(column) = self.column(expr) {
            OrderTarget::Column {
                owner: column.owner,
                name: column.name,
            }
        } else if let Expr::Value(ValueWithSpan {
            value: SqlValue::Number(number, _),
            ..
        }) = expr
        {
            match number.parse::<usize>() {
                Ok(position) if position > 0 => OrderTarget::Ordinal(position),
                _ => OrderTarget::Expression(expr.to_string()),
            }
        } else {
            OrderTarget::Expression(expr.to_string())
        };
        OrderItemSegment {
            target,
            expression: expr.to_string(),
            direction: direction.unwrap_or_default(),
            nulls,
        }
    }

    fn pagination_value(&self, expr: &Expr) -> Result<PaginationValueSegment, ShardlineError> {
        let Expr::Value(ValueWithSpan { value, span }) = expr else {
            return Err(ShardlineError::unsupported(format!(
                "pagination value '{expr}' must be a literal or a parameter marker"
            )));
        };
        let span = self
            .offsets
            .span(*span)
            .ok_or_else(|| ShardlineError::unsupported("cannot locate pagination value"))?;
        let operand = match value {
            SqlValue::Number(number, _) => {
                PaginationOperand::Literal(number.parse::<u64>().map_err(|_| {
                    ShardlineError::malformed(format!("invalid pagination value '{number}'"))
                })?)
            }
            SqlValue::Placeholder(_) => {
                PaginationOperand::Parameter(*self.markers.get(&span.start).ok_or_else(|| {
                    ShardlineError::unsupported("unresolved pagination parameter marker")
                })?)
            }
            other => {
                return Err(ShardlineError::unsupported(format!(
                    "pagination value '{other}' must be a literal or a parameter marker"
                )))
            }
        };
        Ok(PaginationValueSegment { operand, span })
    }

    fn insert_segment(
        &self,
        columns: &[Ident],
        rows: &[Vec<Expr>],
    ) -> Result<InsertSegment, ShardlineError> {
        let column_segments = columns
            .iter()
            .map(|ident| self.column_from_idents(None, ident))
            .collect::<Vec<_>>();
        let columns_stop = columns
            .last()
            .and_then(|ident| self.offsets.offset(ident.span.end));

        let mut insert_rows = Vec::with_capacity(rows.len());
        for row in rows {
            let span = self.row_span(row)?;
            let mut parameter_indices = self
                .markers
                .iter()
                .filter(|(start, _)| span.contains(**start))
                .map(|(start, index)| (*start, *index))
                .collect::<Vec<_>>();
            parameter_indices.sort_by_key(|(start, _)| *start);
            insert_rows.push(InsertRow {
                operands: row.iter().map(|expr| self.operand(expr)).collect(),
                span,
                parameter_indices: parameter_indices
                    .into_iter()
                    .map(|(_, index)| index)
                    .collect(),
            });
        }

        let values_span = match (insert_rows.first(), insert_rows.last()) {
            (Some(first), Some(last)) => TextSpan::new(first.span.start, last.span.stop),
            _ => return Err(ShardlineError::unsupported("INSERT without rows")),
        };

        Ok(InsertSegment {
            columns: column_segments,
            columns_stop,
            rows: insert_rows,
            values_span,
        })
    }

    fn row_span(&self, row: &[Expr]) -> Result<TextSpan, ShardlineError> {
        let locate_error = || ShardlineError::unsupported("cannot locate VALUES tuple in SQL text");
        let (Some(first), Some(last)) = (row.first(), row.last()) else {
            return Err(ShardlineError::unsupported("empty VALUES tuple"));
        };
        let first_start = self.offsets.offset(first.span().start).ok_or_else(locate_error)?;
        let last_end = self.offsets.offset(last.span().end).ok_or_else(locate_error)?;
        let open = self
            .offsets
            .prev_char_at(first_start, '(')
            .ok_or_else(locate_error)?;
        let close = self
            .offsets
            .next_char_at(last_end, ')')
            .ok_or_else(locate_error)?;
        Ok(TextSpan::new(open, close + 1))
    }

    fn predicate(&self, expr: &Expr) -> Predicate {
        match expr {
            Expr::Nested(inner) => self.predicate(inner),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => {
                let mut parts = Vec::new();
                for side in [left, right] {
                    match self.predicate(side) {
                        Predicate::And(nested) => parts.extend(nested),
                        other => parts.push(other),
                    }
                }
                Predicate::And(parts)
            }
            Expr::BinaryOp {
                left,
                op: BinaryOperator::Or,
                right,
            } => {
                let mut parts = Vec::new();
                for side in [left, right] {
                    match self.predicate(side) {
                        Predicate::Or(nested) => parts.extend(nested),
                        other => parts.push(other),
                    }
                }
                Predicate::Or(parts)
            }
            Expr::BinaryOp { left, op, right } => {
                let Some(operator) = compare_operator(op) else {
                    return Predicate::Other;
                };
                if let Some(column) = self.column(left) {
                    let operand = self.operand(right);
                    if operand != Operand::Expression {
                        return Predicate::Compare {
                            column,
                            operator,
                            operand,
                        };
                    }
                }
                if let Some(column) = self.column(right) {
                    let operand = self.operand(left);
                    if operand != Operand::Expression {
                        return Predicate::Compare {
                            column,
                            operator: operator.flipped(),
                            operand,
                        };
                    }
                }
                Predicate::Other
            }
            Expr::InList {
                expr,
                list,
                negated: false,
            } => match self.column(expr) {
                Some(column) => Predicate::In {
                    column,
                    operands: list.iter().map(|item| self.operand(item)).collect(),
                },
                None => Predicate::Other,
            },
            Expr::Between {
                expr,
                negated: false,
                low,
                high,
            } => match self.column(expr) {
                Some(column) => Predicate::Between {
                    column,
                    low: self.operand(low),
                    high: self.operand(high),
                },
                None => Predicate::Other,
            },
            _ => Predicate::Other,
        }
    }

    fn column(&self, expr: &Expr) -> Option<ColumnSegment> {
        match expr {
            Expr::Nested(inner) => self.column(inner),
            Expr::Identifier(ident) => Some(self.column_from_idents(None, ident)),
            Expr::CompoundIdentifier(idents) if idents.len() >= 2 => {
                let owner = &idents[idents.len() - 2];
                Some(self.column_from_idents(Some(owner), &idents[idents.len() - 1]))
            }
            _ => None,
        }
    }

    fn column_from_idents(&self, owner: Option<&Ident>, ident: &Ident) -> ColumnSegment {
        ColumnSegment {
            owner: owner.map(|owner| owner.value.clone()),
            name: self
                .dialect
                .normalize_identifier(&ident.value, ident.quote_style),
            span: self.offsets.span(ident.span).unwrap_or_default(),
        }
    }

    fn operand(&self, expr: &Expr) -> Operand {
        match unwrap_wrappers(expr) {
            Expr::Value(ValueWithSpan {
                value: SqlValue::Placeholder(_),
                span,
            }) => self
                .offsets
                .span(*span)
                .and_then(|span| self.markers.get(&span.start).copied())
                .map(Operand::Parameter)
                .unwrap_or(Operand::Expression),
            Expr::Value(ValueWithSpan { value, .. }) => literal_value(value, false)
                .map(Operand::Literal)
                .unwrap_or(Operand::Expression),
            Expr::UnaryOp {
                op: UnaryOperator::Minus,
                expr,
            } => match unwrap_wrappers(expr) {
                Expr::Value(ValueWithSpan { value, .. }) => literal_value(value, true)
                    .map(Operand::Literal)
                    .unwrap_or(Operand::Expression),
                _ => Operand::Expression,
            },
            _ => Operand::Expression,
        }
    }
}

struct TableCollector<'a, 'b> {
    binder: &'b Binder<'a>,
    tables: Vec<TableSegment>,
}

impl Visitor for TableCollector<'_, '_> {
    type Break = ShardlineError;

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<Self::Break> {
        if let TableFactor::Table { name, alias, .. } = table_factor {
            let alias = alias.as_ref().map(|alias| alias.name.value.as_str());
            match self.binder.table_segment(name, alias) {
                Ok(segment) => self.tables.push(segment),
                Err(error) => return ControlFlow::Break(error),
            }
        }
        ControlFlow::Continue(())
    }
}

struct MarkerCollector<'a, 'b> {
    offsets: &'b SourceOffsets<'a>,
    found: Vec<(TextSpan, String)>,
}

impl Visitor for MarkerCollector<'_, '_> {
    type Break = ShardlineError;

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<Self::Break> {
        if let Expr::Value(ValueWithSpan {
            value: SqlValue::Placeholder(token),
            span,
        }) = expr
        {
            let Some(span) = self.offsets.span(*span) else {
                return ControlFlow::Break(ShardlineError::unsupported(format!(
                    "cannot locate parameter marker '{token}' in SQL text"
                )));
            };
            self.found.push((span, token.clone()));
        }
        ControlFlow::Continue(())
    }
}

fn collect_parameter_markers(
    statement: &Statement,
    offsets: &SourceOffsets<'_>,
    params_len: usize,
) -> Result<Vec<ParameterMarker>, ShardlineError> {
    let mut collector = MarkerCollector {
        offsets,
        found: Vec::new(),
    };
    if let ControlFlow::Break(error) = statement.visit(&mut collector) {
        return Err(error);
    }
    let mut found = collector.found;
    found.sort_by_key(|(span, _)| span.start);
    found.dedup_by_key(|(span, _)| span.start);

    let mut state = PlaceholderState::new();
    let mut markers = Vec::with_capacity(found.len());
    for (span, token) in found {
        let index = resolve_placeholder_index(&token, params_len, &mut state)?;
        markers.push(ParameterMarker { index, span });
    }
    Ok(markers)
}

fn query_select(query: &Query) -> Result<&Select, ShardlineError> {
    if query.with.is_some() {
        return Err(ShardlineError::unsupported("common table expressions"));
    }
    match query.body.as_ref() {
        SetExpr::Select(select) => Ok(select),
        _ => Err(ShardlineError::unsupported(
            "set operations and nested query bodies",
        )),
    }
}

fn last_ident(name: &ObjectName) -> Option<&Ident> {
    name.0.last().and_then(ObjectNamePart::as_ident)
}

fn unwrap_wrappers(mut expr: &Expr) -> &Expr {
    loop {
        match expr {
            Expr::Nested(inner) => expr = inner.as_ref(),
            Expr::Cast { expr: inner, .. } => expr = inner.as_ref(),
            _ => return expr,
        }
    }
}

fn compare_operator(op: &BinaryOperator) -> Option<CompareOperator> {
    match op {
        BinaryOperator::Eq => Some(CompareOperator::Eq),
        BinaryOperator::Lt => Some(CompareOperator::Lt),
        BinaryOperator::LtEq => Some(CompareOperator::LtEq),
        BinaryOperator::Gt => Some(CompareOperator::Gt),
        BinaryOperator::GtEq => Some(CompareOperator::GtEq),
        _ => None,
    }
}

fn literal_value(value: &SqlValue, negate: bool) -> Option<Value> {
    match value {
        SqlValue::Number(number, _) => {
            let text = if negate {
                format!("-{number}")
            } else {
                number.clone()
            };
            text.parse::<i64>()
                .map(Value::Integer)
                .ok()
                .or_else(|| text.parse::<f64>().ok().map(Value::Real))
        }
        _ if negate => None,
        SqlValue::SingleQuotedString(text)
        | SqlValue::DoubleQuotedString(text)
        | SqlValue::NationalStringLiteral(text)
        | SqlValue::EscapedStringLiteral(text) => Some(Value::Text(text.clone())),
        SqlValue::Boolean(flag) => Some(Value::Boolean(*flag)),
        SqlValue::Null => Some(Value::Null),
        _ => None,
    }
}

fn statement_label(statement: &Statement) -> String {
    let rendered = statement.to_string();
    rendered
        .split_whitespace()
        .next()
        .unwrap_or("unknown")
        .to_ascii_uppercase()
}
