use crate::rewrite::{GeneratedTokens, RewriteContext, SqlToken, SqlTokenGenerator, TokenContent};
use crate::ShardlineError;

/// Replaces every logic table reference that some unit maps to a
/// different actual table.
#[derive(Debug, Default, Clone, Copy)]
pub struct TableTokenGenerator;

impl SqlTokenGenerator for TableTokenGenerator {
    fn name(&self) -> &'static str {
        "table"
    }

    fn generate(&self, context: &RewriteContext<'_>) -> Result<GeneratedTokens, ShardlineError> {
        let tokens = context
            .statement
            .tables
            .iter()
            .filter(|table| {
                context.route.units.iter().any(|unit| {
                    unit.actual_table(&table.name)
                        .is_some_and(|actual| actual != table.name)
                })
            })
            .map(|table| {
                SqlToken::substitute(
                    table.span,
                    TokenContent::Table {
                        logic_table: table.name.clone(),
                        quote_style: table.quote_style,
                    },
                )
            })
            .collect();
        Ok(GeneratedTokens {
            tokens,
            parameter_edits: Vec::new(),
        })
    }
}
