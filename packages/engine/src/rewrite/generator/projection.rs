use crate::rewrite::{GeneratedTokens, RewriteContext, SqlToken, SqlTokenGenerator, TokenContent};
use crate::ShardlineError;

/// Appends derived ORDER BY / GROUP BY / AVG columns to the select list so
/// every shard returns what the merger needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct DerivedProjectionTokenGenerator;

impl SqlTokenGenerator for DerivedProjectionTokenGenerator {
    fn name(&self) -> &'static str {
        "derived_projection"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let Some(select) = context.select.filter(|select| !select.derived.is_empty()) else {
            return Ok(GeneratedTokens::default());
        };
        let index = context
            .statement
            .select
            .as_ref()
            .and_then(|segment| segment.projections_stop)
            .ok_or_else(|| {
                ShardlineError::unsupported("cannot locate the end of the select list")
            })?;
        let text = select
            .derived
            .iter()
            .map(|derived| format!(", {}", derived.render()))
            .collect::<String>();
        Ok(GeneratedTokens {
            tokens: vec![SqlToken::insert(index, TokenContent::Text(text))],
            parameter_edits: Vec::new(),
        })
    }
}
