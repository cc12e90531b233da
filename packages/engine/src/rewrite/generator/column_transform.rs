use crate::rewrite::{
    ColumnTransformRule, GeneratedTokens, ParameterEdit, RewriteContext, SqlToken,
    SqlTokenGenerator, TokenContent,
};
use crate::sql::{ColumnSegment, CompareOperator, Operand, Predicate, StatementContext, StatementKind};
use crate::{ShardlineError, Value};

use super::insert::bound_operand;

/// Stores transformed values for configured columns. Written values are
/// replaced by their transformed form; assisted-query columns are filled on
/// write and take over equality lookups.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColumnTransformTokenGenerator;

impl SqlTokenGenerator for ColumnTransformTokenGenerator {
    fn name(&self) -> &'static str {
        "column_transform"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let mut generated = GeneratedTokens::default();
        if context.transforms.is_empty() {
            return Ok(generated);
        }
        match context.statement.kind {
            StatementKind::Insert => insert_values(context, &mut generated)?,
            StatementKind::Update => update_assignments(context, &mut generated)?,
            StatementKind::Select | StatementKind::Delete => {}
        }
        if let Some(predicate) = &context.statement.where_predicate {
            where_predicate(context, predicate, &mut generated)?;
        }
        Ok(generated)
    }
}

fn find_rule<'a>(
    context: &RewriteContext<'a>,
    table: &str,
    column: &str,
) -> Option<&'a ColumnTransformRule> {
    context
        .transforms
        .iter()
        .find(|rule| rule.matches(table, column))
}

fn insert_values(
    context: &RewriteContext<'_>,
    generated: &mut GeneratedTokens,
) -> Result<(), ShardlineError> {
    let statement = context.statement;
    let (Some(table), Some(insert)) = (statement.tables.first(), statement.insert.as_ref()) else {
        return Ok(());
    };
    for (index, column) in insert.columns.iter().enumerate() {
        let Some(rule) = find_rule(context, &table.name, &column.name) else {
            continue;
        };
        for row in &insert.rows {
            let operand = row.operands.get(index);
            let plain = bound_operand(operand, context.params, &rule.column)?;
            if let Some(Operand::Parameter(parameter)) = operand {
                generated.parameter_edits.push(ParameterEdit::Replace {
                    index: *parameter,
                    value: rule.transformer.transform(plain)?,
                });
            }
        }
    }
    Ok(())
}

fn update_assignments(
    context: &RewriteContext<'_>,
    generated: &mut GeneratedTokens,
) -> Result<(), ShardlineError> {
    let statement = context.statement;
    let (Some(table), Some(update)) = (statement.tables.first(), statement.update.as_ref()) else {
        return Ok(());
    };
    for assignment in &update.assignments {
        let Some(rule) = find_rule(context, &table.name, &assignment.column.name) else {
            continue;
        };
        let plain = bound_operand(Some(&assignment.operand), context.params, &rule.column)?;
        let Operand::Parameter(parameter) = assignment.operand else {
            continue;
        };
        generated.parameter_edits.push(ParameterEdit::Replace {
            index: parameter,
            value: rule.transformer.transform(plain)?,
        });
        if let Some(assisted) = &rule.assisted_query {
            let index = assignment.value_stop.ok_or_else(|| {
                ShardlineError::unsupported(format!(
                    "cannot locate the value assigned to '{}'",
                    rule.column
                ))
            })?;
            generated.tokens.push(SqlToken::insert(
                index,
                TokenContent::Text(format!(", {} = ?", assisted.column)),
            ));
            generated.parameter_edits.push(ParameterEdit::Add {
                index: parameter + 1,
                value: assisted.transformer.transform(plain)?,
            });
        }
    }
    Ok(())
}

fn where_predicate(
    context: &RewriteContext<'_>,
    predicate: &Predicate,
    generated: &mut GeneratedTokens,
) -> Result<(), ShardlineError> {
    match predicate {
        Predicate::And(children) | Predicate::Or(children) => {
            for child in children {
                where_predicate(context, child, generated)?;
            }
            Ok(())
        }
        Predicate::Compare {
            column,
            operator,
            operand,
        } => {
            let Some(rule) = column_rule(context, column) else {
                return Ok(());
            };
            if *operator != CompareOperator::Eq {
                return Err(ShardlineError::unsupported(format!(
                    "range comparison on transformed column '{}'",
                    rule.column
                )));
            }
            lookup(context, rule, column, std::slice::from_ref(operand), generated)
        }
        Predicate::In { column, operands } => {
            let Some(rule) = column_rule(context, column) else {
                return Ok(());
            };
            lookup(context, rule, column, operands, generated)
        }
        Predicate::Between { column, .. } => match column_rule(context, column) {
            Some(rule) => Err(ShardlineError::unsupported(format!(
                "BETWEEN on transformed column '{}'",
                rule.column
            ))),
            None => Ok(()),
        },
        Predicate::Other => Ok(()),
    }
}

fn column_rule<'a>(
    context: &RewriteContext<'a>,
    column: &ColumnSegment,
) -> Option<&'a ColumnTransformRule> {
    let statement: &StatementContext = context.statement;
    match statement.resolve_owner(column.owner.as_deref()) {
        Some(table) => find_rule(context, &table, &column.name),
        None if column.owner.is_some() => None,
        None => {
            let mut matching = statement
                .table_names()
                .into_iter()
                .filter_map(|table| find_rule(context, &table, &column.name));
            let rule = matching.next()?;
            matching.next().is_none().then_some(rule)
        }
    }
}

/// Equality lookup: against the assisted-query column when there is one,
/// otherwise against the transformed value.
fn lookup(
    context: &RewriteContext<'_>,
    rule: &ColumnTransformRule,
    column: &ColumnSegment,
    operands: &[Operand],
    generated: &mut GeneratedTokens,
) -> Result<(), ShardlineError> {
    for operand in operands {
        let plain = bound_operand(Some(operand), context.params, &rule.column)?;
        let Operand::Parameter(index) = operand else {
            continue;
        };
        let value: Value = match &rule.assisted_query {
            Some(assisted) => assisted.transformer.transform(plain)?,
            None => rule.transformer.transform(plain)?,
        };
        generated.parameter_edits.push(ParameterEdit::Replace {
            index: *index,
            value,
        });
    }
    if let Some(assisted) = &rule.assisted_query {
        if column.span.stop > column.span.start {
            generated.tokens.push(SqlToken::substitute(
                column.span,
                TokenContent::Text(assisted.column.clone()),
            ));
        }
    }
    Ok(())
}
