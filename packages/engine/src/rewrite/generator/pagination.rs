use crate::rewrite::{
    GeneratedTokens, ParameterEdit, RewriteContext, SqlToken, SqlTokenGenerator, TokenContent,
};
use crate::sql::{PaginationOperand, PaginationValueSegment};
use crate::{ShardlineError, Value};

/// Rewrites LIMIT/OFFSET for multi-unit reads: each shard skips nothing and
/// returns its first offset+limit rows, or every row when the merge has to
/// see all of them.
#[derive(Debug, Default, Clone, Copy)]
pub struct PaginationTokenGenerator;

/// Row count standing in for "no limit".
const ALL_ROWS: u64 = i64::MAX as u64;

impl SqlTokenGenerator for PaginationTokenGenerator {
    fn name(&self) -> &'static str {
        "pagination"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let mut generated = GeneratedTokens::default();
        if context.route.units.len() <= 1 {
            return Ok(generated);
        }
        let Some(select) = context.select else {
            return Ok(generated);
        };
        let Some(pagination) = select.pagination else {
            return Ok(generated);
        };

        let offset = match &pagination.offset {
            Some(segment) => segment.resolve(context.params)?,
            None => 0,
        };
        if let Some(segment) = &pagination.offset {
            if offset != 0 {
                rewrite_value(segment, 0, &mut generated);
            }
        }
        if let Some(segment) = &pagination.row_count {
            let row_count = segment.resolve(context.params)?;
            let revised = if select.needs_all_rows() {
                ALL_ROWS
            } else {
                offset.saturating_add(row_count).min(ALL_ROWS)
            };
            if revised != row_count {
                rewrite_value(segment, revised, &mut generated);
            }
        }
        Ok(generated)
    }
}

fn rewrite_value(segment: &PaginationValueSegment, value: u64, generated: &mut GeneratedTokens) {
    match segment.operand {
        PaginationOperand::Literal(_) => generated.tokens.push(SqlToken::substitute(
            segment.span,
            TokenContent::Text(value.to_string()),
        )),
        PaginationOperand::Parameter(index) => {
            generated.parameter_edits.push(ParameterEdit::Replace {
                index,
                value: Value::Integer(i64::try_from(value).unwrap_or(i64::MAX)),
            })
        }
    }
}
