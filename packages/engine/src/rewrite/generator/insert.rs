use crate::rewrite::{
    GeneratedTokens, InsertValuesRow, ParameterEdit, RewriteContext, SqlToken, SqlTokenGenerator,
    TokenContent,
};
use crate::sql::Operand;
use crate::{ShardlineError, Value};

/// A column the rewrite appends to every VALUES row.
#[derive(Debug, Clone, PartialEq)]
struct InsertAddition {
    column: String,
    /// One value per row, in row order.
    values: Vec<Value>,
    /// Rendered as a `?` marker with the value appended to the row's
    /// parameters, instead of as a literal.
    as_parameter: bool,
}

/// Appended columns in render order: the generated key first, then
/// assisted-query columns in transform rule order.
fn insert_additions(context: &RewriteContext<'_>) -> Result<Vec<InsertAddition>, ShardlineError> {
    let statement = context.statement;
    let (Some(table), Some(insert)) = (statement.tables.first(), statement.insert.as_ref()) else {
        return Ok(Vec::new());
    };
    let mut additions = Vec::new();
    if let Some(key) = context.generated_key.filter(|key| key.generated) {
        additions.push(InsertAddition {
            column: key.column.clone(),
            values: key.values.clone(),
            as_parameter: !statement.parameter_markers.is_empty(),
        });
    }
    for rule in context
        .transforms
        .iter()
        .filter(|rule| rule.table.eq_ignore_ascii_case(&table.name))
    {
        let Some(assisted) = &rule.assisted_query else {
            continue;
        };
        let Some(index) = insert.column_index(&rule.column) else {
            continue;
        };
        let mut values = Vec::with_capacity(insert.rows.len());
        for row in &insert.rows {
            let plain = bound_operand(row.operands.get(index), context.params, &rule.column)?;
            values.push(assisted.transformer.transform(plain)?);
        }
        additions.push(InsertAddition {
            column: assisted.column.clone(),
            values,
            as_parameter: true,
        });
    }
    Ok(additions)
}

/// Value of a transformed column operand; only bound parameters qualify.
pub(super) fn bound_operand<'a>(
    operand: Option<&Operand>,
    params: &'a [Value],
    column: &str,
) -> Result<&'a Value, ShardlineError> {
    match operand {
        Some(Operand::Parameter(index)) => params.get(*index).ok_or_else(|| {
            ShardlineError::malformed(format!(
                "parameter {} is not bound ({} parameters supplied)",
                index + 1,
                params.len()
            ))
        }),
        _ => Err(ShardlineError::unsupported(format!(
            "values of transformed column '{column}' must be bound parameters"
        ))),
    }
}

/// Adds generated-key and assisted-query columns to the column list.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertColumnsTokenGenerator;

impl SqlTokenGenerator for InsertColumnsTokenGenerator {
    fn name(&self) -> &'static str {
        "insert_columns"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let additions = insert_additions(context)?;
        if additions.is_empty() {
            return Ok(GeneratedTokens::default());
        }
        let index = context
            .statement
            .insert
            .as_ref()
            .and_then(|insert| insert.columns_stop)
            .ok_or_else(|| {
                ShardlineError::unsupported("INSERT needs an explicit column list to add columns")
            })?;
        let text = additions
            .iter()
            .map(|addition| format!(", {}", addition.column))
            .collect::<String>();
        Ok(GeneratedTokens {
            tokens: vec![SqlToken::insert(index, TokenContent::Text(text))],
            parameter_edits: Vec::new(),
        })
    }
}

/// Rewrites the VALUES rows: appends added column values to each row and,
/// when rows go to different units, lets each unit render only its rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct InsertValuesTokenGenerator;

impl SqlTokenGenerator for InsertValuesTokenGenerator {
    fn name(&self) -> &'static str {
        "insert_values"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let Some(insert) = context.statement.insert.as_ref() else {
            return Ok(GeneratedTokens::default());
        };
        let additions = insert_additions(context)?;
        let route = context.route;
        let split_rows =
            route.units.len() > 1 && route.original_data_nodes.len() == insert.rows.len();
        if additions.is_empty() && !split_rows {
            return Ok(GeneratedTokens::default());
        }

        let sql = context.statement.sql.as_str();
        let mut rows = Vec::with_capacity(insert.rows.len());
        let mut parameter_edits = Vec::new();
        for (row_index, row) in insert.rows.iter().enumerate() {
            let inner = row
                .span
                .stop
                .checked_sub(1)
                .and_then(|close| sql.get(row.span.start..close))
                .ok_or_else(|| {
                    ShardlineError::RewriteInvariantViolation(format!(
                        "VALUES row {} has an invalid span",
                        row_index + 1
                    ))
                })?;
            let mut text = inner.trim_end().to_string();
            for addition in &additions {
                let value = addition.values.get(row_index).ok_or_else(|| {
                    ShardlineError::RewriteInvariantViolation(format!(
                        "no '{}' value for VALUES row {}",
                        addition.column,
                        row_index + 1
                    ))
                })?;
                if addition.as_parameter {
                    text.push_str(", ?");
                    parameter_edits.push(ParameterEdit::AppendToRow {
                        row: row_index,
                        value: value.clone(),
                    });
                } else {
                    text.push_str(", ");
                    text.push_str(&value.to_sql_literal());
                }
            }
            text.push(')');
            rows.push(InsertValuesRow {
                text,
                data_node: split_rows.then(|| route.original_data_nodes[row_index].clone()),
            });
        }
        Ok(GeneratedTokens {
            tokens: vec![SqlToken::substitute(
                insert.values_span,
                TokenContent::InsertValues(rows),
            )],
            parameter_edits,
        })
    }
}
