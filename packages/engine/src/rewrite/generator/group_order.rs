use crate::rewrite::{GeneratedTokens, RewriteContext, SqlToken, SqlTokenGenerator, TokenContent};
use crate::ShardlineError;

/// Gives a grouped multi-unit read without ORDER BY an `ORDER BY <group
/// keys>`, so each shard emits its groups in key order and a pushed-down
/// LIMIT keeps the same groups on every shard.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupOrderTokenGenerator;

impl SqlTokenGenerator for GroupOrderTokenGenerator {
    fn name(&self) -> &'static str {
        "group_order"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        if context.route.units.len() <= 1 {
            return Ok(GeneratedTokens::default());
        }
        let Some(segment) = context
            .statement
            .select
            .as_ref()
            .filter(|segment| segment.order_by.is_empty() && !segment.group_by.is_empty())
        else {
            return Ok(GeneratedTokens::default());
        };
        let index = segment.order_by_insert_at.ok_or_else(|| {
            ShardlineError::unsupported("cannot place ORDER BY for a grouped query")
        })?;
        let keys = segment
            .group_by
            .iter()
            .map(|item| item.expression.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        Ok(GeneratedTokens {
            tokens: vec![SqlToken::insert(
                index,
                TokenContent::Text(format!(" ORDER BY {keys}")),
            )],
            parameter_edits: Vec::new(),
        })
    }
}
